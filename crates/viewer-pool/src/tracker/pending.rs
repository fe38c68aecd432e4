//! Pending-handoff slot and its reservation guard.
//!
//! The reservation uses typestate-by-drop: a `PendingReservation` that is
//! dropped or settled without being consumed clears its own ticket from the
//! slot and returns the identifier to the pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::AssignmentTracker;
use crate::identity::{EntityId, Identifier};

#[derive(Debug, Clone)]
struct Pending {
    ticket: u64,
    identifier: Identifier,
}

/// Single guarded value bridging a pre-creation decision to the
/// post-creation hook.
#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    inner: Mutex<Option<Pending>>,
    next_ticket: AtomicU64,
}

impl PendingSlot {
    fn lock(&self) -> MutexGuard<'_, Option<Pending>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a reservation. Returns its ticket and any unconsumed
    /// identifier it displaced.
    pub(crate) fn reserve(&self, identifier: Identifier) -> (u64, Option<Identifier>) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let displaced = self.lock().replace(Pending { ticket, identifier });
        (ticket, displaced.map(|p| p.identifier))
    }

    /// Clear-and-return whatever is reserved.
    pub(crate) fn consume(&self) -> Option<Identifier> {
        self.lock().take().map(|p| p.identifier)
    }

    /// Clear the slot only if it still holds `ticket`.
    pub(crate) fn clear_if(&self, ticket: u64) -> Option<Identifier> {
        let mut slot = self.lock();
        match slot.as_ref() {
            Some(pending) if pending.ticket == ticket => slot.take().map(|p| p.identifier),
            _ => None,
        }
    }

    pub(crate) fn clear(&self) -> Option<Identifier> {
        self.consume()
    }

    pub(crate) fn is_occupied(&self) -> bool {
        self.lock().is_some()
    }
}

/// What became of a reservation once the creation call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    /// A creation hook took the identifier.
    Consumed,
    /// Nobody took it; the slot was cleared and the identifier released.
    Unclaimed,
}

/// A live reservation in the pending slot.
///
/// Settle it after the creation call: `assign_to` when the new entity's
/// handle is known, `settle` otherwise. Dropping it is the same as
/// `settle`, which is the rollback path when creation fails.
#[must_use = "an unsettled reservation is rolled back on drop"]
#[derive(Debug)]
pub struct PendingReservation<'a> {
    tracker: &'a AssignmentTracker,
    ticket: u64,
    identifier: Identifier,
    settled: bool,
}

impl<'a> PendingReservation<'a> {
    pub(crate) fn new(tracker: &'a AssignmentTracker, ticket: u64, identifier: Identifier) -> Self {
        Self {
            tracker,
            ticket,
            identifier,
            settled: false,
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Bind the reserved identifier to `entity` if the slot still holds
    /// this reservation. If a creation hook already consumed it, reports
    /// whether that hook bound it to the same entity.
    pub fn assign_to(mut self, entity: EntityId) -> bool {
        self.settled = true;
        match self.tracker.pending.clear_if(self.ticket) {
            Some(identifier) => self.tracker.bind_reserved(entity, identifier),
            None => self
                .tracker
                .assigned_identifier(entity)
                .is_some_and(|assigned| assigned == self.identifier),
        }
    }

    pub fn settle(mut self) -> PendingOutcome {
        self.settled = true;
        self.rollback()
    }

    fn rollback(&self) -> PendingOutcome {
        match self.tracker.pending.clear_if(self.ticket) {
            Some(identifier) => {
                tracing::debug!(
                    identifier = %identifier,
                    ticket = self.ticket,
                    "Pending reservation unclaimed - returning identifier to pool"
                );
                self.tracker.pool.mark_available(&identifier);
                PendingOutcome::Unclaimed
            }
            None => PendingOutcome::Consumed,
        }
    }
}

impl Drop for PendingReservation<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.rollback();
        }
    }
}
