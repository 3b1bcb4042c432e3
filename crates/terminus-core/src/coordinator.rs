//! Reservation coordinator.
//!
//! Owns the catalog, reservation table, identity directory and rate guard,
//! and is the only code that mutates them. Every operation takes the single
//! state mutex for its whole duration, so claim's checks and commit observe
//! one consistent snapshot and no partial update is ever visible.
//!
//! ```text
//!              claim (budget ok, item free)
//!   Unclaimed ───────────────────────────────▶ Claimed
//!       ▲                                         │
//!       └──── release / force_release / reset_all ┘
//! ```
//!
//! Events are published after the commit while the lock is still held, which
//! keeps the event stream in commit order.

use crate::address::ClientAddr;
use crate::catalog::Catalog;
use crate::error::{Holder, ReservationError, Result};
use crate::events::{Notifier, ReservationEvent, DEFAULT_CAPACITY};
use crate::identity::{
    AddressResolver, HandleStatus, Identity, IdentityDirectory, IdentityKey, IdentityResolver,
};
use crate::rate_guard::{RateGuard, RateGuardConfig};
use crate::table::ReservationTable;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Static shared secret gating administrative transitions.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminToken(String);

impl AdminToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Exact match.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(***)")
    }
}

/// Coordinator settings.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub admin_token: AdminToken,
    pub rate: RateGuardConfig,
    /// Buffered events per observer before it starts lagging.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            admin_token: AdminToken::new("reset123"),
            rate: RateGuardConfig::default(),
            event_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// One catalog entry as seen by a given caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemStatus {
    pub name: String,
    pub reserved: bool,
    /// Holder's handle; `None` when free or held anonymously.
    pub reserved_by: Option<String>,
    pub is_caller_selection: bool,
}

/// A current claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRecord {
    pub item: String,
    pub handle: Option<String>,
    /// Operator-facing description of the claimant (address or `@handle`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimant: Option<String>,
}

struct ReservationState {
    table: ReservationTable,
    directory: IdentityDirectory,
    guard: RateGuard,
}

/// The reservation state machine.
pub struct Coordinator {
    catalog: Arc<Catalog>,
    state: Mutex<ReservationState>,
    resolver: Box<dyn IdentityResolver>,
    notifier: Notifier,
    admin_token: AdminToken,
}

impl Coordinator {
    /// Coordinator with handle-based resolution.
    pub fn new(catalog: Catalog, config: CoordinatorConfig) -> Self {
        Self::with_resolver(catalog, config, AddressResolver::registered())
    }

    pub fn with_resolver(
        catalog: Catalog,
        config: CoordinatorConfig,
        resolver: impl IdentityResolver + 'static,
    ) -> Self {
        Self {
            catalog: Arc::new(catalog),
            state: Mutex::new(ReservationState {
                table: ReservationTable::new(),
                directory: IdentityDirectory::new(),
                guard: RateGuard::new(config.rate),
            }),
            resolver: Box::new(resolver),
            notifier: Notifier::new(config.event_capacity),
            admin_token: config.admin_token,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Register a new observer.
    pub fn subscribe(&self) -> broadcast::Receiver<ReservationEvent> {
        self.notifier.subscribe()
    }

    /// Current claims plus a receiver for everything committed afterwards.
    ///
    /// Taken under the state lock, so no event falls between the two.
    pub async fn subscribe_with_snapshot(
        &self,
    ) -> (Vec<ClaimRecord>, broadcast::Receiver<ReservationEvent>) {
        let state = self.state.lock().await;
        let rx = self.notifier.subscribe();
        (self.public_claims(&state), rx)
    }

    // --- Queries ---

    /// Every catalog item with its status relative to `caller`.
    pub async fn items(&self, caller: &ClientAddr) -> Vec<ItemStatus> {
        let state = self.state.lock().await;
        let selection = self
            .resolver
            .resolve(&state.directory, caller)
            .and_then(|key| state.table.claimant_item(&key).cloned());

        self.catalog
            .all()
            .map(|name| {
                let owner = state.table.owner_of(name);
                ItemStatus {
                    name: name.to_string(),
                    reserved: owner.is_some(),
                    reserved_by: owner
                        .and_then(|key| state.directory.handle_of(key))
                        .map(str::to_string),
                    is_caller_selection: selection.as_ref() == Some(name),
                }
            })
            .collect()
    }

    /// Current claims, in catalog order, including who holds them.
    pub async fn claims(&self) -> Vec<ClaimRecord> {
        let state = self.state.lock().await;
        self.catalog
            .all()
            .filter_map(|name| {
                state.table.owner_of(name).map(|key| ClaimRecord {
                    item: name.to_string(),
                    handle: state.directory.handle_of(key).map(str::to_string),
                    claimant: Some(key.to_string()),
                })
            })
            .collect()
    }

    fn public_claims(&self, state: &ReservationState) -> Vec<ClaimRecord> {
        self.catalog
            .all()
            .filter_map(|name| {
                state.table.owner_of(name).map(|key| ClaimRecord {
                    item: name.to_string(),
                    handle: state.directory.handle_of(key).map(str::to_string),
                    claimant: None,
                })
            })
            .collect()
    }

    // --- Identity ---

    pub async fn check_handle(&self, handle: &str, caller: &ClientAddr) -> Result<HandleStatus> {
        let state = self.state.lock().await;
        state.directory.check_handle(handle, caller)
    }

    pub async fn register(&self, handle: &str, caller: &ClientAddr) -> Result<Identity> {
        let mut state = self.state.lock().await;
        let identity = state.directory.register(handle, caller)?;
        info!("Registered {} from {}", identity.key, caller);
        Ok(identity)
    }

    pub async fn login(&self, handle: &str, caller: &ClientAddr) -> Result<Identity> {
        let mut state = self.state.lock().await;
        let identity = state.directory.login(handle, caller)?;
        info!("{} logged in from {}", identity.key, caller);
        Ok(identity)
    }

    /// Who `caller` is, per the configured resolver.
    pub async fn current_identity(&self, caller: &ClientAddr) -> Option<Identity> {
        let state = self.state.lock().await;
        self.resolver
            .resolve(&state.directory, caller)
            .map(|key| state.directory.view(&key))
    }

    /// Unbind the caller's address. Returns whether a binding existed.
    pub async fn logout(&self, caller: &ClientAddr) -> bool {
        let mut state = self.state.lock().await;
        match state.directory.logout(caller) {
            Some(key) => {
                info!("{} logged out from {}", key, caller);
                true
            }
            None => false,
        }
    }

    // --- Transitions ---

    /// Claim `item_name` for the caller.
    ///
    /// The budget of the caller's address is charged before the item is
    /// validated: an unknown or already-taken item still costs the attempt.
    /// Every handle acting from one address draws on that address's budget.
    pub async fn claim(&self, caller: &ClientAddr, item_name: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let key = self
            .resolver
            .resolve(&state.directory, caller)
            .ok_or(ReservationError::Unauthenticated)?;

        if let Some(held) = state.table.claimant_item(&key) {
            return Err(ReservationError::AlreadyClaimed {
                holder: Holder::Caller {
                    item: held.to_string(),
                },
            });
        }

        if let Err(exhausted) = state.guard.try_consume(caller) {
            debug!("Claim by {} from {} rate limited", key, caller);
            return Err(ReservationError::RateLimited {
                retry_after: exhausted.retry_after,
            });
        }

        let item = self
            .catalog
            .get(item_name)
            .ok_or(ReservationError::InvalidItem)?;

        if state.table.is_taken(&item) {
            debug!("Claim by {} on taken item {}", key, item);
            return Err(ReservationError::AlreadyClaimed {
                holder: Holder::Other,
            });
        }

        state.table.set(Arc::clone(&item), key.clone());
        state
            .directory
            .set_claim(&key, Arc::clone(&item), caller.clone());

        info!("{} claimed {}", key, item);
        self.notifier.publish(ReservationEvent::ItemClaimed {
            item: item.to_string(),
            handle: state.directory.handle_of(&key).map(str::to_string),
        });

        Ok(item.to_string())
    }

    /// Give up the caller's own claim.
    ///
    /// Restores the budget of the address that paid for the claim and of the
    /// caller's address, when they differ.
    pub async fn release(&self, caller: &ClientAddr) -> Result<String> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let key = self
            .resolver
            .resolve(&state.directory, caller)
            .ok_or(ReservationError::Unauthenticated)?;

        let item = state
            .table
            .claimant_item(&key)
            .cloned()
            .ok_or(ReservationError::NoActiveClaim)?;

        Self::release_locked(state, &item, &key);
        state.guard.reset(caller);

        info!("{} released {}", key, item);
        self.notifier.publish(ReservationEvent::ItemReleased {
            item: item.to_string(),
        });

        Ok(item.to_string())
    }

    /// Administrative release of `item`, whoever holds it.
    pub async fn force_release(&self, item: &str, admin_token: &str) -> Result<()> {
        self.authorize(admin_token, "force-release")?;

        let mut state = self.state.lock().await;
        let state = &mut *state;

        let owner = state
            .table
            .owner_of(item)
            .cloned()
            .ok_or(ReservationError::NotClaimed)?;

        Self::release_locked(state, item, &owner);

        info!("{} force-released from {}", item, owner);
        self.notifier.publish(ReservationEvent::ItemReleased {
            item: item.to_string(),
        });

        Ok(())
    }

    /// Drop every claim and every budget. Returns how many claims were held.
    pub async fn reset_all(&self, admin_token: &str) -> Result<usize> {
        self.authorize(admin_token, "reset-all")?;

        let mut state = self.state.lock().await;
        let released = state.table.len();

        state.directory.clear_all_claims();
        state.table.clear_all();
        state.guard.reset_all();

        info!("Reset all: {} claims released", released);
        self.notifier.publish(ReservationEvent::AllReleased);

        Ok(released)
    }

    /// Drop expired rate budgets. Returns how many were removed.
    pub async fn sweep_budgets(&self) -> usize {
        self.state.lock().await.guard.sweep(Instant::now())
    }

    /// Cross-check the table, the directory pointers and the catalog.
    ///
    /// Returns one line per discrepancy; empty when consistent.
    pub async fn audit(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut problems = Vec::new();

        for (item, owner) in state.table.entries() {
            if !self.catalog.contains(item) {
                problems.push(format!("{item} is claimed but not in the catalog"));
            }
            match state.directory.claim_of(owner) {
                Some(pointer) if pointer == item => {}
                Some(pointer) => problems.push(format!(
                    "{item} is held by {owner} but {owner} points at {pointer}"
                )),
                None => problems.push(format!(
                    "{item} is held by {owner} but {owner} has no claim pointer"
                )),
            }
            if state.directory.charged_to(owner).is_none() {
                problems.push(format!("{item} is held by {owner} but no address paid for it"));
            }
            if state.table.claimant_item(owner) != Some(item) {
                problems.push(format!("reverse index for {owner} disagrees on {item}"));
            }
        }

        for (key, item) in state.directory.claims() {
            if state.table.owner_of(item) != Some(key) {
                problems.push(format!("{key} points at {item} but the table disagrees"));
            }
        }

        problems
    }

    fn authorize(&self, admin_token: &str, action: &str) -> Result<()> {
        if self.admin_token.matches(admin_token) {
            Ok(())
        } else {
            warn!("Rejected {} with bad admin token", action);
            Err(ReservationError::Forbidden)
        }
    }

    /// Clear `owner`'s claim on `item` and restore the budget of the address
    /// that paid for it.
    fn release_locked(state: &mut ReservationState, item: &str, owner: &IdentityKey) {
        let charged = state.directory.charged_to(owner).cloned();
        state.table.clear(item);
        state.directory.clear_claim(owner);
        if let Some(addr) = charged {
            state.guard.reset(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tokio::sync::broadcast::error::TryRecvError;

    const TOKEN: &str = "reset123";

    fn addr(s: &str) -> ClientAddr {
        ClientAddr::new(s)
    }

    fn catalog(names: &[&str]) -> Catalog {
        Catalog::new(names.iter().copied()).unwrap()
    }

    fn anonymous(names: &[&str]) -> Coordinator {
        Coordinator::with_resolver(
            catalog(names),
            CoordinatorConfig::default(),
            AddressResolver::anonymous(),
        )
    }

    #[tokio::test]
    async fn claim_release_scenario() {
        let coord = anonymous(&["A", "B"]);
        let mut events = coord.subscribe();
        let x = addr("10.0.0.1");
        let y = addr("10.0.0.2");

        assert_eq!(coord.claim(&x, "A").await, Ok("A".to_string()));
        assert_eq!(
            coord.claim(&y, "A").await,
            Err(ReservationError::AlreadyClaimed {
                holder: Holder::Other
            })
        );
        // The losing attempt spent Y's only point.
        assert!(matches!(
            coord.claim(&y, "B").await,
            Err(ReservationError::RateLimited { .. })
        ));

        assert_eq!(coord.release(&x).await, Ok("A".to_string()));
        let items = coord.items(&x).await;
        assert!(!items[0].reserved);

        assert_eq!(
            events.recv().await.unwrap(),
            ReservationEvent::ItemClaimed {
                item: "A".into(),
                handle: None
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            ReservationEvent::ItemReleased { item: "A".into() }
        );
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn second_claimant_takes_other_item() {
        let coord = Coordinator::with_resolver(
            catalog(&["A", "B"]),
            CoordinatorConfig {
                rate: RateGuardConfig {
                    points: 2,
                    ..RateGuardConfig::default()
                },
                ..CoordinatorConfig::default()
            },
            AddressResolver::anonymous(),
        );
        let x = addr("10.0.0.1");
        let y = addr("10.0.0.2");

        coord.claim(&x, "A").await.unwrap();
        assert!(coord.claim(&y, "A").await.is_err());
        assert_eq!(coord.claim(&y, "B").await, Ok("B".to_string()));
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_in_registered_mode() {
        let coord = Coordinator::new(catalog(&["A"]), CoordinatorConfig::default());
        let caller = addr("10.0.0.1");

        assert_eq!(
            coord.claim(&caller, "A").await,
            Err(ReservationError::Unauthenticated)
        );
        assert_eq!(
            coord.release(&caller).await,
            Err(ReservationError::Unauthenticated)
        );

        coord.register("alice", &caller).await.unwrap();
        assert_eq!(coord.claim(&caller, "A").await, Ok("A".to_string()));

        let items = coord.items(&addr("10.0.0.2")).await;
        assert_eq!(items[0].reserved_by.as_deref(), Some("alice"));
        assert!(!items[0].is_caller_selection);
        assert!(coord.items(&caller).await[0].is_caller_selection);
    }

    #[tokio::test]
    async fn handle_registration_is_case_insensitive() {
        let coord = Coordinator::new(catalog(&["A"]), CoordinatorConfig::default());
        assert!(coord.register("alice", &addr("10.0.0.1")).await.is_ok());
        assert_eq!(
            coord.register("Alice", &addr("10.0.0.2")).await,
            Err(ReservationError::HandleTaken)
        );
    }

    #[tokio::test]
    async fn already_claimed_self() {
        let coord = anonymous(&["A", "B"]);
        let x = addr("10.0.0.1");
        coord.claim(&x, "A").await.unwrap();
        assert_eq!(
            coord.claim(&x, "B").await,
            Err(ReservationError::AlreadyClaimed {
                holder: Holder::Caller { item: "A".into() }
            })
        );
    }

    #[tokio::test]
    async fn invalid_item_costs_the_attempt() {
        let coord = anonymous(&["A"]);
        let x = addr("10.0.0.1");

        assert_eq!(
            coord.claim(&x, "Nowhere").await,
            Err(ReservationError::InvalidItem)
        );
        assert!(matches!(
            coord.claim(&x, "A").await,
            Err(ReservationError::RateLimited { .. })
        ));
        assert!(!coord.items(&x).await[0].reserved);
    }

    #[tokio::test]
    async fn release_restores_budget() {
        let coord = anonymous(&["A", "B"]);
        let x = addr("10.0.0.1");

        coord.claim(&x, "A").await.unwrap();
        coord.release(&x).await.unwrap();
        assert_eq!(coord.claim(&x, "B").await, Ok("B".to_string()));
    }

    #[tokio::test]
    async fn release_without_claim() {
        let coord = anonymous(&["A"]);
        assert_eq!(
            coord.release(&addr("10.0.0.1")).await,
            Err(ReservationError::NoActiveClaim)
        );
    }

    #[tokio::test]
    async fn release_resets_mapped_address_budget() {
        let coord = anonymous(&["A", "B"]);
        let plain = addr("10.0.0.1");
        let mapped = addr("::ffff:10.0.0.1");

        // Same client seen under two textual forms burns both budgets.
        coord.claim(&plain, "A").await.unwrap();
        assert_eq!(coord.claim(&mapped, "Z").await, Err(ReservationError::InvalidItem));

        coord.release(&plain).await.unwrap();
        assert_eq!(coord.claim(&mapped, "B").await, Ok("B".to_string()));
    }

    #[tokio::test]
    async fn force_release_requires_token() {
        let coord = anonymous(&["A"]);
        let x = addr("10.0.0.1");
        coord.claim(&x, "A").await.unwrap();

        assert_eq!(
            coord.force_release("A", "wrong").await,
            Err(ReservationError::Forbidden)
        );
        assert!(coord.items(&x).await[0].reserved);
    }

    #[tokio::test]
    async fn force_release_frees_item_and_owner_budget() {
        let coord = anonymous(&["A", "B"]);
        let mut events = coord.subscribe();
        let x = addr("10.0.0.1");
        coord.claim(&x, "A").await.unwrap();
        events.recv().await.unwrap();

        coord.force_release("A", TOKEN).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ReservationEvent::ItemReleased { item: "A".into() }
        );

        assert_eq!(coord.claim(&x, "B").await, Ok("B".to_string()));
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn force_release_unclaimed() {
        let coord = anonymous(&["A"]);
        assert_eq!(
            coord.force_release("A", TOKEN).await,
            Err(ReservationError::NotClaimed)
        );
        assert_eq!(
            coord.force_release("Nowhere", TOKEN).await,
            Err(ReservationError::NotClaimed)
        );
    }

    #[tokio::test]
    async fn reset_all_unblocks_everyone() {
        let coord = anonymous(&["A", "B", "C"]);
        let mut events = coord.subscribe();
        let x = addr("10.0.0.1");
        let y = addr("10.0.0.2");
        let z = addr("10.0.0.3");

        coord.claim(&x, "A").await.unwrap();
        coord.claim(&y, "B").await.unwrap();
        // z burns its budget without a claim.
        coord.claim(&z, "A").await.unwrap_err();

        assert_eq!(coord.reset_all("nope").await, Err(ReservationError::Forbidden));
        assert_eq!(coord.reset_all(TOKEN).await, Ok(2));
        assert!(coord.claims().await.is_empty());

        for _ in 0..2 {
            events.recv().await.unwrap();
        }
        assert_eq!(events.recv().await.unwrap(), ReservationEvent::AllReleased);

        assert!(coord.claim(&z, "A").await.is_ok());
        assert!(coord.claim(&x, "B").await.is_ok());
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn handles_share_their_address_budget() {
        let coord = Coordinator::new(catalog(&["A", "B", "C"]), CoordinatorConfig::default());
        let caller = addr("10.0.0.1");

        coord.register("h1", &caller).await.unwrap();
        assert_eq!(coord.claim(&caller, "A").await, Ok("A".to_string()));

        coord.register("h2", &caller).await.unwrap();
        assert!(matches!(
            coord.claim(&caller, "B").await,
            Err(ReservationError::RateLimited { .. })
        ));

        coord.register("h3", &addr("10.0.0.2")).await.unwrap();
        assert_eq!(coord.claim(&addr("10.0.0.2"), "C").await, Ok("C".to_string()));
    }

    #[tokio::test]
    async fn release_leaves_other_handles_budgets_alone() {
        let coord = Coordinator::new(catalog(&["A", "B"]), CoordinatorConfig::default());
        let bob = addr("10.0.0.1");
        let lookalike = addr("10.0.0.2");

        coord.register("bob", &bob).await.unwrap();
        assert_eq!(coord.claim(&bob, "Nowhere").await, Err(ReservationError::InvalidItem));

        coord.register("bob%x", &lookalike).await.unwrap();
        coord.claim(&lookalike, "A").await.unwrap();
        coord.release(&lookalike).await.unwrap();

        assert!(matches!(
            coord.claim(&bob, "B").await,
            Err(ReservationError::RateLimited { .. })
        ));
        assert_eq!(coord.claim(&lookalike, "B").await, Ok("B".to_string()));
    }

    #[tokio::test]
    async fn force_release_restores_logged_out_owner_budget() {
        let coord = Coordinator::new(catalog(&["A", "B"]), CoordinatorConfig::default());
        let home = addr("10.0.0.1");

        coord.register("eve", &home).await.unwrap();
        coord.claim(&home, "A").await.unwrap();
        assert!(coord.logout(&home).await);

        coord.force_release("A", TOKEN).await.unwrap();
        assert!(coord.claims().await.is_empty());

        coord.login("eve", &home).await.unwrap();
        assert_eq!(coord.claim(&home, "B").await, Ok("B".to_string()));
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn force_release_resets_paying_address_after_rebind() {
        let coord = Coordinator::new(catalog(&["A", "B"]), CoordinatorConfig::default());
        let home = addr("10.0.0.1");
        let work = addr("10.0.0.2");

        coord.register("finn", &home).await.unwrap();
        coord.claim(&home, "A").await.unwrap();
        coord.login("finn", &work).await.unwrap();

        coord.force_release("A", TOKEN).await.unwrap();

        // The home address paid for A, so it gets its point back.
        coord.register("gus", &home).await.unwrap();
        assert_eq!(coord.claim(&home, "B").await, Ok("B".to_string()));
    }

    #[tokio::test]
    async fn login_keeps_claim_across_addresses() {
        let coord = Coordinator::new(catalog(&["A"]), CoordinatorConfig::default());
        let home = addr("10.0.0.1");
        let work = addr("10.0.0.2");

        coord.register("bob", &home).await.unwrap();
        coord.claim(&home, "A").await.unwrap();

        let identity = coord.login("BOB", &work).await.unwrap();
        assert_eq!(identity.claim.as_deref(), Some("A"));
        assert!(coord.current_identity(&home).await.is_none());

        // The claim follows the handle.
        assert_eq!(coord.release(&work).await, Ok("A".to_string()));
    }

    #[tokio::test]
    async fn logout_keeps_claim() {
        let coord = Coordinator::new(catalog(&["A"]), CoordinatorConfig::default());
        let caller = addr("10.0.0.1");
        coord.register("carol", &caller).await.unwrap();
        coord.claim(&caller, "A").await.unwrap();

        assert!(coord.logout(&caller).await);
        assert!(!coord.logout(&caller).await);
        assert!(coord.current_identity(&caller).await.is_none());

        let claims = coord.claims().await;
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].handle.as_deref(), Some("carol"));
        assert_eq!(claims[0].claimant.as_deref(), Some("@carol"));
    }

    #[tokio::test]
    async fn check_handle_reports_station() {
        let coord = Coordinator::new(catalog(&["A"]), CoordinatorConfig::default());
        let caller = addr("10.0.0.1");
        coord.register("dana", &caller).await.unwrap();
        coord.claim(&caller, "A").await.unwrap();

        assert_eq!(
            coord.check_handle("Dana", &addr("10.0.0.9")).await,
            Ok(HandleStatus::Registered {
                owner_is_caller: false,
                current_station: Some(Arc::from("A")),
            })
        );
    }

    #[tokio::test]
    async fn snapshot_then_events_without_gaps() {
        let coord = anonymous(&["A", "B"]);
        coord.claim(&addr("10.0.0.1"), "A").await.unwrap();

        let (snapshot, mut rx) = coord.subscribe_with_snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].item, "A");
        assert_eq!(snapshot[0].claimant, None);

        coord.claim(&addr("10.0.0.2"), "B").await.unwrap();
        assert!(matches!(
            rx.recv().await.unwrap(),
            ReservationEvent::ItemClaimed { ref item, .. } if item == "B"
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_have_one_winner() {
        let coord = Arc::new(anonymous(&["A"]));
        let mut tasks = Vec::new();
        for i in 0..32 {
            let coord = Arc::clone(&coord);
            tasks.push(tokio::spawn(async move {
                coord.claim(&addr(&format!("10.0.1.{i}")), "A").await
            }));
        }

        let mut wins = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => assert_eq!(
                    e,
                    ReservationError::AlreadyClaimed {
                        holder: Holder::Other
                    }
                ),
            }
        }
        assert_eq!(wins, 1);
        assert!(coord.audit().await.is_empty());
    }

    #[tokio::test]
    async fn random_operations_keep_indexes_consistent() {
        let names = ["A", "B", "C", "D"];
        let coord = anonymous(&names);
        let callers: Vec<ClientAddr> = (0..6).map(|i| addr(&format!("10.0.2.{i}"))).collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let caller = &callers[rng.gen_range(0..callers.len())];
            let item = names[rng.gen_range(0..names.len())];
            match rng.gen_range(0..10) {
                0..=4 => {
                    let _ = coord.claim(caller, item).await;
                }
                5..=7 => {
                    let _ = coord.release(caller).await;
                }
                8 => {
                    let _ = coord.force_release(item, TOKEN).await;
                }
                _ => {
                    let _ = coord.reset_all(TOKEN).await;
                }
            }

            assert_eq!(coord.audit().await, Vec::<String>::new());

            let claims = coord.claims().await;
            let mut holders: Vec<_> = claims.iter().map(|c| c.claimant.clone()).collect();
            holders.sort();
            holders.dedup();
            assert_eq!(holders.len(), claims.len(), "an identity holds two items");
        }
    }
}
