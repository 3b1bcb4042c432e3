//! Error types for the terminus node.

use terminus_core::CatalogError;
use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can stop the node from starting or serving.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog could not be built
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
