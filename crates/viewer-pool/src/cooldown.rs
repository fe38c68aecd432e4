//! Per-submitter rate limiting for chat requests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::identity::normalize;

/// Last-use timestamps keyed by case-folded submitter name.
pub struct CooldownLedger {
    last_use: DashMap<String, Instant>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CooldownLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownLedger")
            .field("tracked", &self.last_use.len())
            .finish_non_exhaustive()
    }
}

impl Default for CooldownLedger {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl CooldownLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            last_use: DashMap::new(),
            clock,
        }
    }

    /// Time since `submitter` last used the command, if ever.
    fn elapsed(&self, submitter: &str) -> Option<Duration> {
        let last = *self.last_use.get(&normalize(submitter))?;
        Some(self.clock.now().saturating_duration_since(last))
    }

    /// A zero window disables the cooldown.
    pub fn is_on_cooldown(&self, submitter: &str, window: Duration) -> bool {
        if window.is_zero() {
            return false;
        }
        self.elapsed(submitter)
            .is_some_and(|elapsed| elapsed < window)
    }

    pub fn record_use(&self, submitter: &str) {
        self.last_use.insert(normalize(submitter), self.clock.now());
    }

    /// Time left before `submitter` may use the command again.
    pub fn remaining(&self, submitter: &str, window: Duration) -> Duration {
        if window.is_zero() {
            return Duration::ZERO;
        }
        match self.elapsed(submitter) {
            Some(elapsed) => window.saturating_sub(elapsed),
            None => Duration::ZERO,
        }
    }

    pub fn remaining_seconds(&self, submitter: &str, window: Duration) -> f64 {
        self.remaining(submitter, window).as_secs_f64()
    }

    /// Forget submitters whose window has run out. Returns how many were
    /// dropped.
    pub fn prune(&self, window: Duration) -> usize {
        let now = self.clock.now();
        let before = self.last_use.len();
        self.last_use
            .retain(|_, last| !window.is_zero() && now.saturating_duration_since(*last) < window);
        let pruned = before.saturating_sub(self.last_use.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned expired cooldown records");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.last_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_use.is_empty()
    }

    pub fn clear(&self) {
        self.last_use.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const MINUTE: Duration = Duration::from_secs(60);

    fn ledger() -> (CooldownLedger, ManualClock) {
        let clock = ManualClock::new();
        (CooldownLedger::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn unknown_submitter_is_not_on_cooldown() {
        let (ledger, _) = ledger();
        assert!(!ledger.is_on_cooldown("bob", MINUTE));
        assert_eq!(ledger.remaining("bob", MINUTE), Duration::ZERO);
    }

    #[test]
    fn cooldown_expires_after_window() {
        let (ledger, clock) = ledger();
        ledger.record_use("bob");
        assert!(ledger.is_on_cooldown("bob", MINUTE));

        clock.advance(Duration::from_secs(59));
        assert!(ledger.is_on_cooldown("bob", MINUTE));

        clock.advance(Duration::from_secs(1));
        assert!(!ledger.is_on_cooldown("bob", MINUTE));
    }

    #[test]
    fn remaining_decreases_toward_zero() {
        let (ledger, clock) = ledger();
        ledger.record_use("bob");

        let mut previous = ledger.remaining_seconds("bob", MINUTE);
        assert_eq!(previous, 60.0);
        for _ in 0..7 {
            clock.advance(Duration::from_secs(10));
            let now = ledger.remaining_seconds("bob", MINUTE);
            assert!(now <= previous);
            assert!(now >= 0.0);
            previous = now;
        }
        assert_eq!(previous, 0.0);
    }

    #[test]
    fn submitter_names_are_case_insensitive() {
        let (ledger, _) = ledger();
        ledger.record_use("Bob");
        assert!(ledger.is_on_cooldown("  bOB ", MINUTE));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn zero_window_disables_cooldown() {
        let (ledger, _) = ledger();
        ledger.record_use("bob");
        assert!(!ledger.is_on_cooldown("bob", Duration::ZERO));
        assert_eq!(ledger.remaining("bob", Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn prune_drops_only_expired_records() {
        let (ledger, clock) = ledger();
        ledger.record_use("old");
        clock.advance(Duration::from_secs(45));
        ledger.record_use("fresh");
        clock.advance(Duration::from_secs(20));

        assert_eq!(ledger.prune(MINUTE), 1);
        assert!(ledger.is_on_cooldown("fresh", MINUTE));
        assert!(!ledger.is_on_cooldown("old", MINUTE));
        assert_eq!(ledger.len(), 1);
    }
}
