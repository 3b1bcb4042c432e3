//! Terminus core - exclusive claims over a fixed catalog.
//!
//! Each identity may hold at most one catalog item and each item at most one
//! claimant. Claims cost budget from a per-identity rate guard; committed
//! transitions are broadcast to observers.
//!
//! # Architecture
//!
//! - **Catalog**: immutable ordered item list
//! - **Rate Guard**: fixed-window claim budget per caller address
//! - **Identity Directory**: handles, address bindings, claim pointers
//! - **Reservation Table**: item ↔ claimant index
//! - **Coordinator**: the state machine serialising all of the above
//! - **Events**: publish/subscribe fan-out of committed transitions
//!
//! # Example
//!
//! ```
//! use terminus_core::{AddressResolver, Catalog, ClientAddr, Coordinator, CoordinatorConfig};
//!
//! # block_on(async {
//! let catalog = Catalog::new(["Bastille", "Nation"]).unwrap();
//! let coord = Coordinator::with_resolver(catalog, CoordinatorConfig::default(), AddressResolver::anonymous());
//!
//! let me = ClientAddr::new("10.0.0.1");
//! assert_eq!(coord.claim(&me, "Bastille").await.unwrap(), "Bastille");
//! # });
//! # fn block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod address;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod identity;
pub mod rate_guard;
pub mod table;

pub use address::ClientAddr;
pub use catalog::Catalog;
pub use coordinator::{AdminToken, ClaimRecord, Coordinator, CoordinatorConfig, ItemStatus};
pub use error::{CatalogError, Holder, ReservationError, Result};
pub use events::{Notifier, ReservationEvent};
pub use identity::{
    AddressResolver, HandleStatus, Identity, IdentityDirectory, IdentityKey, IdentityResolver,
};
pub use rate_guard::{RateGuard, RateGuardConfig};
pub use table::ReservationTable;
