//! Entity lifecycle adapter.
//!
//! The host simulation calls one typed event surface no matter how many hook
//! points it exposes: creation, becoming interactive, release, and a per-tick
//! update. The handler turns those into tracker operations and runs the
//! bounded-interval sweep and immediate-spawn paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::directory::EntityDirectory;
use crate::identity::{EntityId, Identifier};
use crate::service::ViewerPoolService;
use crate::telemetry::{LogThrottle, WarnOnce};

/// Minimum gap between immediate spawns.
pub const MIN_SPAWN_INTERVAL: Duration = Duration::from_secs(5);

const NEVER: u64 = u64::MAX;

/// The host simulation as seen by the core.
pub trait Simulation: EntityDirectory {
    /// Ask the host to create one entity. `None` when it could not.
    fn spawn_entity(&self) -> Option<EntityId>;

    /// Called after an entity received an identifier, for labelling.
    fn on_assigned(&self, _entity: EntityId, _identifier: &Identifier) {}
}

/// What one `on_tick` call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Assignments recovered, if the sweep was due.
    pub swept: Option<usize>,
    pub pruned: usize,
    pub spawned: Option<EntityId>,
}

pub struct LifecycleHandler {
    service: Arc<ViewerPoolService>,
    simulation: Arc<dyn Simulation>,
    started: Instant,
    last_sweep_ms: AtomicU64,
    last_spawn_ms: AtomicU64,
    dead_handles: LogThrottle,
    spawn_failures: LogThrottle,
    /// Armed again by the next successful spawn.
    spawn_refused: WarnOnce,
}

impl LifecycleHandler {
    pub fn new(service: Arc<ViewerPoolService>, simulation: Arc<dyn Simulation>) -> Self {
        let started = service.clock().now();
        Self {
            service,
            simulation,
            started,
            last_sweep_ms: AtomicU64::new(NEVER),
            last_spawn_ms: AtomicU64::new(NEVER),
            dead_handles: LogThrottle::new(50),
            spawn_failures: LogThrottle::new(10),
            spawn_refused: WarnOnce::new(),
        }
    }

    pub fn service(&self) -> &Arc<ViewerPoolService> {
        &self.service
    }

    fn now_ms(&self) -> u64 {
        let elapsed = self.service.clock().now().saturating_duration_since(self.started);
        u64::try_from(elapsed.as_millis()).unwrap_or(NEVER - 1)
    }

    /// Claim the slot in `last` if `interval` has passed since the previous
    /// claim. Only one caller wins per interval.
    fn claim_interval(&self, last: &AtomicU64, interval: Duration) -> bool {
        let now = self.now_ms();
        let interval = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        let previous = last.load(Ordering::Acquire);
        if previous != NEVER && now.saturating_sub(previous) < interval {
            return false;
        }
        last.compare_exchange(previous, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn assign(&self, entity: EntityId, use_pending: bool) -> bool {
        if !self.simulation.is_live(entity) {
            if let Some(seen) = self.dead_handles.hit() {
                tracing::debug!(entity = %entity, seen, "Lifecycle event for dead entity ignored");
            }
            return false;
        }
        if !self.service.try_assign(entity, use_pending) {
            return false;
        }
        self.notify_assigned(entity);
        true
    }

    fn notify_assigned(&self, entity: EntityId) {
        if let Some(identifier) = self.service.assigned_identifier(entity) {
            self.simulation.on_assigned(entity, &identifier);
        }
    }

    /// A new entity exists. Takes the pending identifier first.
    pub fn on_entity_created(&self, entity: EntityId) -> bool {
        self.assign(entity, true)
    }

    /// An existing entity reached a state where it deserves a name.
    pub fn on_entity_became_interactive(&self, entity: EntityId) -> bool {
        if self.service.assigned_identifier(entity).is_some() {
            return false;
        }
        self.assign(entity, false)
    }

    pub fn on_entity_released(&self, entity: EntityId) -> Option<Identifier> {
        self.service.on_released(entity)
    }

    pub fn on_tick(&self) -> TickReport {
        let config = self.service.config().snapshot();
        let mut report = TickReport::default();

        if self.claim_interval(&self.last_sweep_ms, config.sweep_interval()) {
            report.swept = Some(self.service.sweep(self.simulation.as_ref()));
            report.pruned = self.service.prune_cooldowns();
        }

        if config.immediate_spawn {
            report.spawned = self.try_immediate_spawn();
        }

        report
    }

    fn try_immediate_spawn(&self) -> Option<EntityId> {
        if !self.service.has_available() {
            return None;
        }
        if !self.claim_interval(&self.last_spawn_ms, MIN_SPAWN_INTERVAL) {
            return None;
        }

        let reservation = self.service.reserve_next()?;
        let identifier = reservation.identifier().clone();

        let Some(entity) = self.simulation.spawn_entity() else {
            let failures = self.spawn_failures.hit();
            if self.spawn_refused.first() {
                tracing::warn!(identifier = %identifier, "Host refused immediate spawn, releasing reservation");
            } else if let Some(failures) = failures {
                tracing::debug!(identifier = %identifier, failures, "Immediate spawn still refused");
            }
            // Dropping the reservation returns the identifier to the pool.
            return None;
        };
        self.spawn_refused.reset();

        if reservation.assign_to(entity) {
            tracing::info!(entity = %entity, identifier = %identifier, "Spawned entity for viewer");
            self.notify_assigned(entity);
            Some(entity)
        } else {
            tracing::debug!(entity = %entity, identifier = %identifier, "Spawned entity did not take the reservation");
            None
        }
    }

    /// Clear pool, tracker and pending slot.
    pub fn shutdown(&self) {
        self.service.cleanup();
        self.last_sweep_ms.store(NEVER, Ordering::Release);
        self.last_spawn_ms.store(NEVER, Ordering::Release);
    }
}
