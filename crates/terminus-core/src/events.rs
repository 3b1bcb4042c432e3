//! Notification fan-out.
//!
//! The coordinator publishes one [`ReservationEvent`] per committed
//! transition. Observers subscribe through a [`Notifier`]; delivery is
//! fire-and-forget. A subscriber that falls more than the channel capacity
//! behind sees `RecvError::Lagged` and should resynchronise from a snapshot.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A committed ownership change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReservationEvent {
    /// `item` is now held. `handle` is absent for anonymous claimants.
    ItemClaimed { item: String, handle: Option<String> },
    /// `item` is free again.
    ItemReleased { item: String },
    /// Every claim was dropped.
    AllReleased,
}

/// Publish/subscribe hub for reservation events.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<ReservationEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.tx.subscribe()
    }

    /// Deliver to every current observer. Never blocks; having no observers
    /// is not an error.
    pub fn publish(&self, event: ReservationEvent) {
        match self.tx.send(event) {
            Ok(n) => tracing::trace!("Event delivered to {} observers", n),
            Err(_) => tracing::trace!("Event dropped, no observers"),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
