//! Assignment tracker implementation.
//!
//! Two concurrent maps hold the bindings: entity -> identifier and the
//! reverse identifier key -> entity. A bind reserves the identifier side
//! first, then the entity side, and undoes the first step if the second
//! loses a race. Neither map's guard is held while touching the other.
//! Binds and releases share a read gate that `reset` takes exclusively,
//! so a reset never lands between the two halves of a bind.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::seq::IndexedRandom;
use serde::Serialize;

use super::pending::{PendingReservation, PendingSlot};
use crate::directory::{EntityDirectory, EntityState};
use crate::identity::{EntityId, Identifier};
use crate::pool::IdentifierPool;

/// A live binding of an entity to an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub entity: EntityId,
    pub identifier: Identifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bind {
    Bound,
    /// The entity already carries an identifier.
    EntityTaken,
    /// The identifier is already bound to another entity.
    IdentifierTaken,
}

/// Pick one candidate uniformly at random.
pub fn pick_uniform(candidates: &[EntityId]) -> Option<EntityId> {
    candidates.choose(&mut rand::rng()).copied()
}

/// Maps live entities to their assigned identifiers.
#[derive(Debug)]
pub struct AssignmentTracker {
    pub(super) pool: Arc<IdentifierPool>,
    assignments: DashMap<EntityId, Identifier>,
    owners: DashMap<String, EntityId>,
    gate: RwLock<()>,
    pub(super) pending: PendingSlot,
}

impl AssignmentTracker {
    pub fn new(pool: Arc<IdentifierPool>) -> Self {
        Self {
            pool,
            assignments: DashMap::new(),
            owners: DashMap::new(),
            gate: RwLock::new(()),
            pending: PendingSlot::default(),
        }
    }

    pub fn pool(&self) -> &Arc<IdentifierPool> {
        &self.pool
    }

    fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self, entity: EntityId, identifier: Identifier) -> Bind {
        let _gate = self.shared();
        let key = identifier.key().to_string();

        let reserved = match self.owners.entry(key.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(entity);
                true
            }
            Entry::Occupied(_) => false,
        };
        if !reserved {
            return Bind::IdentifierTaken;
        }

        let bound = match self.assignments.entry(entity) {
            Entry::Vacant(slot) => {
                slot.insert(identifier);
                true
            }
            Entry::Occupied(_) => false,
        };
        if !bound {
            self.owners.remove_if(&key, |_, owner| *owner == entity);
            return Bind::EntityTaken;
        }

        Bind::Bound
    }

    /// Bind an identifier this caller already holds in-use. On failure the
    /// claim is handed back unless another entity legitimately owns it.
    pub(super) fn bind_reserved(&self, entity: EntityId, identifier: Identifier) -> bool {
        self.bind_claimed(entity, identifier) == Bind::Bound
    }

    fn bind_claimed(&self, entity: EntityId, identifier: Identifier) -> Bind {
        let outcome = self.bind(entity, identifier.clone());
        match outcome {
            Bind::Bound => {
                tracing::info!(entity = %entity, identifier = %identifier, "Assigned identifier");
            }
            Bind::EntityTaken => {
                tracing::debug!(entity = %entity, identifier = %identifier, "Entity already assigned - releasing claim");
                self.pool.mark_available(&identifier);
            }
            Bind::IdentifierTaken => {
                tracing::warn!(entity = %entity, identifier = %identifier, "Identifier already bound to another entity");
            }
        }
        outcome
    }

    /// Give `entity` an identifier, from the pending slot first when
    /// `use_pending` is set, else from the pool.
    ///
    /// A candidate that is already on screen keeps its in-use marker and the
    /// next one is tried, so the scan ends after at most one pass over the
    /// pool. No-op (`false`) if the entity already has an assignment.
    pub fn try_assign(&self, entity: EntityId, use_pending: bool) -> bool {
        if self.assignments.contains_key(&entity) {
            return false;
        }

        if use_pending && let Some(identifier) = self.pending.consume() {
            tracing::debug!(entity = %entity, identifier = %identifier, "Using pending identifier");
            match self.bind_claimed(entity, identifier) {
                Bind::Bound => return true,
                Bind::EntityTaken => return false,
                Bind::IdentifierTaken => {}
            }
        }

        for _ in 0..self.pool.count() {
            let Some(identifier) = self.pool.next_and_reserve() else {
                return false;
            };
            match self.bind_claimed(entity, identifier) {
                Bind::Bound => return true,
                Bind::EntityTaken => return false,
                Bind::IdentifierTaken => {}
            }
        }
        false
    }

    /// Bind an identifier that did not come through pool selection (idle
    /// overwrite, name fallback). Pool members are marked in use so the pool
    /// never offers a name that is already on screen.
    pub fn assign_identifier(&self, entity: EntityId, identifier: Identifier) -> bool {
        match self.bind(entity, identifier.clone()) {
            Bind::Bound => {
                self.pool.mark_in_use(&identifier);
                tracing::info!(entity = %entity, identifier = %identifier, "Assigned identifier directly");
                true
            }
            Bind::EntityTaken | Bind::IdentifierTaken => false,
        }
    }

    /// Put `identifier` in the pending slot for the next entity creation.
    ///
    /// An older reservation that was never consumed is displaced and its
    /// identifier returned to the pool.
    pub fn reserve_pending(&self, identifier: Identifier) -> PendingReservation<'_> {
        let (ticket, displaced) = self.pending.reserve(identifier.clone());
        if let Some(displaced) = displaced {
            tracing::warn!(
                identifier = %displaced,
                "Pending reservation overwritten before it was consumed"
            );
            self.pool.mark_available(&displaced);
        }
        PendingReservation::new(self, ticket, identifier)
    }

    /// Take and clear the pending identifier, if any.
    pub fn consume_pending(&self) -> Option<Identifier> {
        self.pending.consume()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_occupied()
    }

    /// Assign `identifier` to a random live entity that has no assignment
    /// and is not in an excluded state. Bypasses the pool.
    ///
    /// Returns the chosen entity, or `None` when nothing is eligible, the
    /// identifier is already on screen, or the pick lost a race.
    pub fn try_overwrite_idle_entity<D, P>(
        &self,
        identifier: Identifier,
        directory: &D,
        excluded: &[EntityState],
        pick: P,
    ) -> Option<EntityId>
    where
        D: EntityDirectory + ?Sized,
        P: FnOnce(&[EntityId]) -> Option<EntityId>,
    {
        if self.owners.contains_key(identifier.key()) {
            tracing::debug!(identifier = %identifier, "Identifier already assigned - not overwriting");
            return None;
        }

        let candidates: Vec<EntityId> = directory
            .live_entities()
            .into_iter()
            .filter(|entity| !self.assignments.contains_key(entity))
            .filter(|entity| directory.is_live(*entity))
            .filter(|entity| {
                directory
                    .current_state(*entity)
                    .is_some_and(|state| !excluded.contains(&state))
            })
            .collect();

        if candidates.is_empty() {
            tracing::debug!(identifier = %identifier, "No idle entity eligible for overwrite");
            return None;
        }

        let entity = pick(&candidates)?;
        if self.assign_identifier(entity, identifier) {
            Some(entity)
        } else {
            tracing::debug!(entity = %entity, "Idle entity acquired an assignment first");
            None
        }
    }

    /// Drop the entity's assignment and make its identifier available.
    /// Safe on entities that were never assigned.
    pub fn on_released(&self, entity: EntityId) -> Option<Identifier> {
        let _gate = self.shared();
        let (_, identifier) = self.assignments.remove(&entity)?;
        self.owners
            .remove_if(identifier.key(), |_, owner| *owner == entity);
        self.pool.mark_available(&identifier);
        tracing::debug!(entity = %entity, identifier = %identifier, "Released assignment");
        Some(identifier)
    }

    /// Release every tracked entity that `is_live` reports dead. Returns the
    /// number of assignments recovered.
    pub fn sweep(&self, is_live: impl Fn(EntityId) -> bool) -> usize {
        // Snapshot keys first: the predicate must not run under a map guard.
        let tracked: Vec<EntityId> = self.assignments.iter().map(|r| *r.key()).collect();

        let recovered = tracked
            .into_iter()
            .filter(|entity| !is_live(*entity))
            .filter(|entity| self.on_released(*entity).is_some())
            .count();

        if recovered > 0 {
            tracing::info!(recovered, "Sweep recovered assignments from vanished entities");
        }
        recovered
    }

    pub fn assigned_identifier(&self, entity: EntityId) -> Option<Identifier> {
        self.assignments.get(&entity).map(|r| r.value().clone())
    }

    pub fn owner_of(&self, identifier: &Identifier) -> Option<EntityId> {
        self.owners.get(identifier.key()).map(|r| *r.value())
    }

    pub fn is_assigned(&self, identifier: &Identifier) -> bool {
        self.owners.contains_key(identifier.key())
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn assignments(&self) -> Vec<Assignment> {
        let mut all: Vec<Assignment> = self
            .assignments
            .iter()
            .map(|r| Assignment {
                entity: *r.key(),
                identifier: r.value().clone(),
            })
            .collect();
        all.sort_by_key(|a| a.entity);
        all
    }

    /// Clear assignments and the pending slot. The pool is left alone.
    ///
    /// Waits for in-flight binds and releases, so both maps come out empty
    /// together even when consumers are still calling in.
    pub fn reset(&self) {
        let _exclusive = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        let cleared = self.assignments.len();
        self.owners.clear();
        self.assignments.clear();
        if self.pending.clear().is_some() {
            tracing::debug!("Cleared pending reservation");
        }
        tracing::info!(cleared, "Assignment tracker reset");
    }
}
