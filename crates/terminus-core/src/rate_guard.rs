//! Per-client claim budget.
//!
//! Fixed-window counter keyed by caller address, whatever identity the caller
//! acts as. A window opens on the first consumption for an address and lasts [`RateGuardConfig::window`]; within
//! it at most [`RateGuardConfig::points`] consumptions succeed. Expiry is
//! evaluated lazily when an address is touched; [`RateGuard::sweep`] can drop stale
//! entries in bulk.
//!
//! The guard holds no lock of its own. It lives inside the coordinator's
//! state, so every call already runs under the coordinator's mutex.

use crate::address::{equivalent_forms, ClientAddr};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One day, the default window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(86_400);

/// Budget parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateGuardConfig {
    /// Consumptions allowed per window.
    pub points: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateGuardConfig {
    fn default() -> Self {
        Self {
            points: 1,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Budget was exhausted; try again after `retry_after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub retry_after: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Budget {
    consumed: u32,
    opened_at: Instant,
}

/// Per-address claim budgets.
#[derive(Debug)]
pub struct RateGuard {
    config: RateGuardConfig,
    budgets: HashMap<String, Budget>,
}

impl RateGuard {
    pub fn new(config: RateGuardConfig) -> Self {
        Self {
            config,
            budgets: HashMap::new(),
        }
    }

    /// Consume one point for `addr` now.
    pub fn try_consume(&mut self, addr: &ClientAddr) -> Result<(), Exhausted> {
        self.try_consume_at(addr, Instant::now())
    }

    /// Consume one point for `addr` as of `now`.
    pub fn try_consume_at(&mut self, addr: &ClientAddr, now: Instant) -> Result<(), Exhausted> {
        let window = self.config.window;
        let budget = self.budgets.entry(addr.as_str().to_string()).or_insert(Budget {
            consumed: 0,
            opened_at: now,
        });

        if now.saturating_duration_since(budget.opened_at) >= window {
            budget.consumed = 0;
            budget.opened_at = now;
        }

        if budget.consumed < self.config.points {
            budget.consumed += 1;
            Ok(())
        } else {
            let elapsed = now.saturating_duration_since(budget.opened_at);
            Err(Exhausted {
                retry_after: window.saturating_sub(elapsed),
            })
        }
    }

    /// Points left for `addr` as of `now`.
    pub fn remaining_at(&self, addr: &ClientAddr, now: Instant) -> u32 {
        match self.budgets.get(addr.as_str()) {
            Some(b) if now.saturating_duration_since(b.opened_at) < self.config.window => {
                self.config.points.saturating_sub(b.consumed)
            }
            _ => self.config.points,
        }
    }

    /// Restore the full budget for `addr` and every equivalent form of it.
    ///
    /// Returns how many stored entries were dropped.
    pub fn reset(&mut self, addr: &ClientAddr) -> usize {
        let mut dropped = 0;
        for form in equivalent_forms(addr) {
            if self.budgets.remove(&form).is_some() {
                tracing::debug!("Budget reset for {}", form);
                dropped += 1;
            }
        }
        dropped
    }

    /// Discard every budget.
    pub fn reset_all(&mut self) {
        *self = Self::new(self.config);
    }

    /// Drop entries whose window has elapsed as of `now`.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let window = self.config.window;
        let before = self.budgets.len();
        self.budgets
            .retain(|_, b| now.saturating_duration_since(b.opened_at) < window);
        before - self.budgets.len()
    }

    /// Number of tracked addresses.
    pub fn len(&self) -> usize {
        self.budgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.budgets.is_empty()
    }
}

impl Default for RateGuard {
    fn default() -> Self {
        Self::new(RateGuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn addr(s: &str) -> ClientAddr {
        ClientAddr::new(s)
    }

    #[test]
    fn one_point_per_window() {
        let mut guard = RateGuard::default();
        let t0 = Instant::now();

        assert!(guard.try_consume_at(&addr("10.0.0.1"), t0).is_ok());
        let err = guard.try_consume_at(&addr("10.0.0.1"), t0 + HOUR).unwrap_err();
        assert_eq!(err.retry_after, DEFAULT_WINDOW - HOUR);

        // Other addresses are independent.
        assert!(guard.try_consume_at(&addr("10.0.0.2"), t0 + HOUR).is_ok());
    }

    #[test]
    fn window_expiry_restores_budget() {
        let mut guard = RateGuard::default();
        let t0 = Instant::now();

        guard.try_consume_at(&addr("10.0.0.7"), t0).unwrap();
        assert_eq!(guard.remaining_at(&addr("10.0.0.7"), t0), 0);
        assert_eq!(guard.remaining_at(&addr("10.0.0.7"), t0 + DEFAULT_WINDOW), 1);
        assert!(guard.try_consume_at(&addr("10.0.0.7"), t0 + DEFAULT_WINDOW).is_ok());
    }

    #[test]
    fn multiple_points() {
        let mut guard = RateGuard::new(RateGuardConfig {
            points: 3,
            window: HOUR,
        });
        let t0 = Instant::now();
        for _ in 0..3 {
            guard.try_consume_at(&addr("10.0.0.7"), t0).unwrap();
        }
        assert!(guard.try_consume_at(&addr("10.0.0.7"), t0).is_err());
    }

    #[test]
    fn reset_covers_address_variants() {
        let mut guard = RateGuard::default();
        let t0 = Instant::now();

        guard.try_consume_at(&addr("::ffff:10.0.0.9"), t0).unwrap();
        guard.try_consume_at(&addr("10.0.0.9"), t0).unwrap();

        assert_eq!(guard.reset(&addr("10.0.0.9")), 2);
        assert!(guard.try_consume_at(&addr("::ffff:10.0.0.9"), t0).is_ok());
        assert!(guard.try_consume_at(&addr("10.0.0.9"), t0).is_ok());
    }

    #[test]
    fn reset_is_best_effort_for_unrelated_forms() {
        let mut guard = RateGuard::default();
        let t0 = Instant::now();

        guard.try_consume_at(&addr("2001:db8::1"), t0).unwrap();
        // A different address of the same host is not recognised.
        assert_eq!(guard.reset(&addr("2001:db8::2")), 0);
        assert!(guard.try_consume_at(&addr("2001:db8::1"), t0).is_err());
    }

    #[test]
    fn reset_all_clears_everything() {
        let mut guard = RateGuard::default();
        guard.try_consume(&addr("10.0.0.1")).unwrap();
        guard.try_consume(&addr("10.0.0.2")).unwrap();
        guard.reset_all();
        assert!(guard.is_empty());
        assert!(guard.try_consume(&addr("10.0.0.1")).is_ok());
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let mut guard = RateGuard::new(RateGuardConfig {
            points: 1,
            window: HOUR,
        });
        let t0 = Instant::now();
        guard.try_consume_at(&addr("10.0.0.3"), t0).unwrap();
        guard.try_consume_at(&addr("10.0.0.4"), t0 + HOUR / 2).unwrap();

        assert_eq!(guard.sweep(t0 + HOUR), 1);
        assert_eq!(guard.len(), 1);
        assert_eq!(guard.remaining_at(&addr("10.0.0.4"), t0 + HOUR), 0);
    }
}
