//! Terminus node - claim a metro station, one per person.
//!
//! Serves the reservation core over HTTP and pushes ownership changes to
//! connected browsers.
//!
//! # Architecture
//!
//! - **API**: JSON endpoints for items, identity and claims
//! - **WS**: live feed of committed transitions
//! - **Admin Socket**: Unix socket for local admin commands (terminus-admin CLI)
//! - **Node**: configuration and process wiring
//!
//! # Example
//!
//! ```no_run
//! use terminus_server::{NodeConfig, TerminusNode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     let node = TerminusNode::new(config)?;
//!     node.run().await?;
//!     Ok(())
//! }
//! ```

pub mod admin_socket;
pub mod api;
pub mod error;
pub mod node;
pub mod ws;

pub use error::{Error, Result};
pub use node::{AppState, IdentityMode, NodeConfig, TerminusNode};
