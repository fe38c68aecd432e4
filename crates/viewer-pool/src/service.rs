//! ViewerPoolService: the explicitly constructed core instance.
//!
//! This service owns:
//! - The identifier pool and the assignment tracker
//! - The submitter cooldown ledger
//! - The optional predefined-name fallback
//!
//! Configuration is read through a [`SharedConfig`] snapshot at call time.
//! Chat ingestion and the lifecycle adapter both hold it behind an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::{Clock, SystemClock};
use crate::config::SharedConfig;
use crate::cooldown::CooldownLedger;
use crate::directory::EntityDirectory;
use crate::error::NamesError;
use crate::identity::{EntityId, Identifier};
use crate::names::PredefinedNames;
use crate::pool::{Admission, IdentifierPool, SelectionPolicy};
use crate::tracker::{AssignmentTracker, PendingReservation, pick_uniform};

/// Point-in-time counts for logging and status displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub admitted: usize,
    pub available: usize,
    pub in_use: usize,
    pub assigned: usize,
    pub pending: bool,
    pub policy: SelectionPolicy,
    pub cooldowns_tracked: usize,
}

impl PoolSnapshot {
    /// Every admitted identifier is on screen.
    pub fn is_exhausted(&self) -> bool {
        self.admitted > 0 && self.available == 0
    }
}

pub struct ViewerPoolService {
    pool: Arc<IdentifierPool>,
    tracker: AssignmentTracker,
    cooldowns: CooldownLedger,
    config: SharedConfig,
    clock: Arc<dyn Clock>,
    names: Option<PredefinedNames>,
}

impl std::fmt::Debug for ViewerPoolService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerPoolService")
            .field("pool", &self.pool)
            .field("tracker", &self.tracker)
            .field("cooldowns", &self.cooldowns)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

impl ViewerPoolService {
    pub fn new(config: SharedConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: SharedConfig, clock: Arc<dyn Clock>) -> Self {
        let policy = config.snapshot().selection;
        let pool = Arc::new(IdentifierPool::with_policy(policy));
        Self {
            tracker: AssignmentTracker::new(Arc::clone(&pool)),
            pool,
            cooldowns: CooldownLedger::new(Arc::clone(&clock)),
            config,
            clock,
            names: None,
        }
    }

    /// Construct and load the names file when the fallback is enabled.
    pub fn from_config(config: SharedConfig, clock: Arc<dyn Clock>) -> Result<Self, NamesError> {
        let names = config.snapshot().predefined_names;
        let service = Self::with_clock(config, clock);
        if names.enabled {
            return Ok(service.with_names(PredefinedNames::load(names.path)?));
        }
        Ok(service)
    }

    pub fn with_names(mut self, names: PredefinedNames) -> Self {
        self.names = Some(names);
        self
    }

    pub fn pool(&self) -> &Arc<IdentifierPool> {
        &self.pool
    }

    pub fn tracker(&self) -> &AssignmentTracker {
        &self.tracker
    }

    pub fn cooldowns(&self) -> &CooldownLedger {
        &self.cooldowns
    }

    pub fn config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn names(&self) -> Option<&PredefinedNames> {
        self.names.as_ref()
    }

    /// Apply the configured selection policy before touching the round.
    fn sync_policy(&self) {
        self.pool.set_policy(self.config.snapshot().selection);
    }

    /// Admit raw submitter text, honoring the configured capacity.
    ///
    /// A name that is already on screen is admitted as in use, so the pool
    /// only offers it once its entity is released.
    pub fn admit(&self, raw: &str) -> Admission {
        let Some(identifier) = Identifier::parse(raw) else {
            return Admission::Blank;
        };
        let config = self.config.snapshot();
        self.pool.set_policy(config.selection);
        let admission = self.pool.admit(identifier.clone(), config.max_pool_size);
        if !admission.is_accepted() {
            return admission;
        }

        if self.tracker.is_assigned(&identifier) && self.pool.mark_in_use(&identifier) {
            if self.tracker.is_assigned(&identifier) {
                tracing::debug!(identifier = %identifier, "Admitted identifier is already on screen");
            } else {
                // Released between the check and the mark.
                self.pool.mark_available(&identifier);
            }
        }
        tracing::info!(identifier = %identifier, pool_size = self.pool.count(), "Viewer joined the pool");
        admission
    }

    pub fn has_available(&self) -> bool {
        self.pool.available_count() > 0
    }

    /// Name `entity` from the pending slot or the pool, then from the
    /// predefined names when enabled.
    pub fn try_assign(&self, entity: EntityId, use_pending: bool) -> bool {
        self.sync_policy();
        if self.tracker.try_assign(entity, use_pending) {
            return true;
        }
        if self.tracker.assigned_identifier(entity).is_some() {
            return false;
        }
        self.assign_fallback_name(entity)
    }

    fn assign_fallback_name(&self, entity: EntityId) -> bool {
        if !self.config.snapshot().predefined_names.enabled {
            return false;
        }
        let Some(names) = &self.names else {
            return false;
        };
        let Some(name) = names.random_name(|name| self.tracker.is_assigned(name)) else {
            tracing::debug!(entity = %entity, "No unused predefined name left");
            return false;
        };
        self.tracker.assign_identifier(entity, name)
    }

    /// Claim the next identifier and park it in the pending slot.
    pub fn reserve_next(&self) -> Option<PendingReservation<'_>> {
        self.sync_policy();
        let identifier = self.pool.next_and_reserve()?;
        Some(self.tracker.reserve_pending(identifier))
    }

    pub fn try_overwrite_idle_entity<D: EntityDirectory + ?Sized>(
        &self,
        identifier: &Identifier,
        directory: &D,
    ) -> Option<EntityId> {
        let excluded = self.config.snapshot().excluded_states;
        self.tracker
            .try_overwrite_idle_entity(identifier.clone(), directory, &excluded, pick_uniform)
    }

    pub fn on_released(&self, entity: EntityId) -> Option<Identifier> {
        self.tracker.on_released(entity)
    }

    /// Recover assignments held by entities the directory no longer knows.
    pub fn sweep<D: EntityDirectory + ?Sized>(&self, directory: &D) -> usize {
        self.tracker.sweep(|entity| directory.is_live(entity))
    }

    pub fn assigned_identifier(&self, entity: EntityId) -> Option<Identifier> {
        self.tracker.assigned_identifier(entity)
    }

    /// Remaining cooldown for `submitter`, or `None` if they may proceed.
    pub fn cooldown_remaining(&self, submitter: &str) -> Option<Duration> {
        let window = self.config.snapshot().cooldown_window();
        self.cooldowns
            .is_on_cooldown(submitter, window)
            .then(|| self.cooldowns.remaining(submitter, window))
    }

    pub fn record_use(&self, submitter: &str) {
        self.cooldowns.record_use(submitter);
    }

    pub fn prune_cooldowns(&self) -> usize {
        self.cooldowns.prune(self.config.snapshot().cooldown_window())
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            admitted: self.pool.count(),
            available: self.pool.available_count(),
            in_use: self.pool.in_use_count(),
            assigned: self.tracker.len(),
            pending: self.tracker.has_pending(),
            policy: self.pool.policy(),
            cooldowns_tracked: self.cooldowns.len(),
        }
    }

    /// Full reset: assignments, pending slot, pool and cooldowns.
    pub fn cleanup(&self) {
        self.tracker.reset();
        self.pool.clear();
        self.cooldowns.clear();
        tracing::info!("Viewer pool cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{NamesConfig, PoolConfig};
    use crate::directory::EntityState;

    struct Directory(Vec<EntityId>);

    impl EntityDirectory for Directory {
        fn live_entities(&self) -> Vec<EntityId> {
            self.0.clone()
        }

        fn is_live(&self, entity: EntityId) -> bool {
            self.0.contains(&entity)
        }

        fn current_state(&self, entity: EntityId) -> Option<EntityState> {
            self.is_live(entity).then(|| EntityState::new("browsing"))
        }
    }

    fn fifo_service() -> ViewerPoolService {
        let config = PoolConfig {
            selection: SelectionPolicy::Fifo,
            ..PoolConfig::default()
        };
        ViewerPoolService::with_clock(config.into(), Arc::new(ManualClock::new()))
    }

    fn e(raw: u64) -> EntityId {
        EntityId::new(raw)
    }

    #[test]
    fn admit_honors_configured_capacity_at_call_time() {
        let service = fifo_service();
        service.config().update(|c| c.max_pool_size = 1);

        assert_eq!(service.admit("a"), Admission::Accepted);
        assert_eq!(service.admit("b"), Admission::Full);

        service.config().update(|c| c.max_pool_size = 0);
        assert_eq!(service.admit("b"), Admission::Accepted);
    }

    #[test]
    fn admitting_on_screen_name_keeps_it_unavailable() {
        let service = fifo_service();
        let directory = Directory(vec![e(2)]);
        assert_eq!(
            service.try_overwrite_idle_entity(&Identifier::parse("zed").unwrap(), &directory),
            Some(e(2))
        );

        assert_eq!(service.admit("zed"), Admission::Accepted);
        assert!(!service.has_available());
        assert_eq!(service.admit("amy"), Admission::Accepted);

        assert!(service.try_assign(e(3), false));
        assert_eq!(
            service.assigned_identifier(e(3)),
            Some(Identifier::parse("amy").unwrap())
        );

        service.on_released(e(2));
        assert!(service.has_available());
    }

    #[test]
    fn policy_change_applies_on_next_assignment() {
        let service = fifo_service();
        service.admit("a");
        assert_eq!(service.pool().policy(), SelectionPolicy::Fifo);

        service.config().update(|c| c.selection = SelectionPolicy::Random);
        service.try_assign(e(1), false);
        assert_eq!(service.pool().policy(), SelectionPolicy::Random);
    }

    #[test]
    fn fallback_names_fill_in_when_pool_is_dry() {
        let config = PoolConfig {
            predefined_names: NamesConfig {
                enabled: true,
                ..NamesConfig::default()
            },
            ..PoolConfig::default()
        };
        let service = ViewerPoolService::new(config.into())
            .with_names(PredefinedNames::from_names(["Fallback"]));

        assert!(service.try_assign(e(1), true));
        assert_eq!(service.assigned_identifier(e(1)).unwrap().as_str(), "Fallback");
        assert_eq!(service.pool().count(), 0);

        // Only one name and it is taken.
        assert!(!service.try_assign(e(2), true));

        service.on_released(e(1));
        assert!(service.try_assign(e(2), true));
    }

    #[test]
    fn fallback_disabled_leaves_entity_unnamed() {
        let service = fifo_service().with_names(PredefinedNames::from_names(["Fallback"]));
        assert!(!service.try_assign(e(1), false));
        assert_eq!(service.assigned_identifier(e(1)), None);
    }

    #[test]
    fn from_config_loads_names_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "Solo\n").unwrap();
        let config = PoolConfig {
            predefined_names: NamesConfig {
                enabled: true,
                path,
            },
            ..PoolConfig::default()
        };

        let service =
            ViewerPoolService::from_config(config.into(), Arc::new(ManualClock::new())).unwrap();

        assert_eq!(service.names().map(PredefinedNames::len), Some(1));
    }

    #[test]
    fn reserve_next_feeds_the_created_entity() {
        let service = fifo_service();
        service.admit("alpha");

        let reservation = service.reserve_next().unwrap();
        assert!(service.try_assign(e(1), true));
        assert!(reservation.assign_to(e(1)));
        assert_eq!(service.assigned_identifier(e(1)).unwrap().as_str(), "alpha");
        assert!(service.reserve_next().is_none());
    }

    #[test]
    fn sweep_uses_directory_liveness() {
        let service = fifo_service();
        service.admit("q");
        service.admit("r");
        service.try_assign(e(3), false);
        service.try_assign(e(4), false);

        assert_eq!(service.sweep(&Directory(vec![e(4)])), 1);
        assert!(service.has_available());
        assert_eq!(service.assigned_identifier(e(3)), None);
    }

    #[test]
    fn overwrite_uses_configured_exclusions() {
        let service = fifo_service();
        service.config().update(|c| c.excluded_states = vec![EntityState::new("browsing")]);
        let zed = Identifier::parse("zed").unwrap();

        assert_eq!(service.try_overwrite_idle_entity(&zed, &Directory(vec![e(7)])), None);

        service.config().update(|c| c.excluded_states.clear());
        assert_eq!(
            service.try_overwrite_idle_entity(&zed, &Directory(vec![e(7)])),
            Some(e(7))
        );
    }

    #[test]
    fn cooldown_follows_configured_window() {
        let clock = ManualClock::new();
        let service =
            ViewerPoolService::with_clock(PoolConfig::default().into(), Arc::new(clock.clone()));

        service.record_use("Bob");
        assert_eq!(service.cooldown_remaining("bob"), Some(Duration::from_secs(60)));

        clock.advance(Duration::from_secs(60));
        assert_eq!(service.cooldown_remaining("bob"), None);
        assert_eq!(service.prune_cooldowns(), 1);
    }

    #[test]
    fn pool_snapshot() {
        let service = fifo_service();
        for name in ["a", "b", "c"] {
            service.admit(name);
        }
        service.try_assign(e(1), false);
        let _reservation = service.reserve_next();
        service.record_use("a");

        let snapshot = service.snapshot();
        assert!(!snapshot.is_exhausted());
        insta::assert_json_snapshot!("pool_snapshot", snapshot);
    }

    #[test]
    fn cleanup_resets_everything() {
        let service = fifo_service();
        service.admit("a");
        service.try_assign(e(1), false);
        service.record_use("a");

        service.cleanup();

        let snapshot = service.snapshot();
        assert_eq!(snapshot.admitted, 0);
        assert_eq!(snapshot.assigned, 0);
        assert_eq!(snapshot.cooldowns_tracked, 0);
        assert_eq!(service.admit("a"), Admission::Accepted);
    }
}
