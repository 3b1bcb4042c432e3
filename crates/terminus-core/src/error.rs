//! Error types for terminus-core.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for reservation operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

/// Who already holds the claim that blocked a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Holder {
    /// The caller itself holds `item`.
    Caller { item: String },
    /// Another identity holds the requested item.
    Other,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Caller { item } => write!(f, "you already hold {item}"),
            Self::Other => write!(f, "item already taken"),
        }
    }
}

/// Rejections produced by the reservation coordinator.
///
/// None of these are fatal; the request boundary turns each into a
/// structured error response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// No identity could be resolved for the caller.
    #[error("not logged in")]
    Unauthenticated,

    /// The caller already holds a claim, or the item is taken.
    #[error("{holder}")]
    AlreadyClaimed { holder: Holder },

    /// Item name is not part of the catalog.
    #[error("invalid item")]
    InvalidItem,

    /// Force-release on an item nobody holds.
    #[error("item is not claimed")]
    NotClaimed,

    /// Self-service release by an identity without a claim.
    #[error("no active claim")]
    NoActiveClaim,

    /// Claim budget exhausted for the current window.
    #[error("claim budget exhausted, retry in {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Handle is registered already (case-insensitive).
    #[error("handle already taken")]
    HandleTaken,

    /// Login with a handle that was never registered.
    #[error("unknown handle")]
    UnknownHandle,

    /// Handle is empty, too long, or contains control characters.
    #[error("invalid handle: {0}")]
    InvalidHandle(&'static str),

    /// Admin token mismatch.
    #[error("forbidden")]
    Forbidden,
}

/// Errors building a [`Catalog`](crate::Catalog).
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No claimable items after parsing.
    #[error("catalog is empty")]
    Empty,
}
