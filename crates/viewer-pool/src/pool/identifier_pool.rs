//! The identifier pool itself.
//!
//! Entry list and round state live under one mutex so structural mutation
//! and round bookkeeping stay atomic together. Membership and the in-use
//! markers are concurrent sets, readable and togglable without that lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashSet;
use serde::Serialize;

use super::round::{RoundState, Scan, SelectionPolicy};
use crate::identity::Identifier;

/// One admitted identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolEntry {
    pub identifier: Identifier,
    pub insertion_index: u64,
}

/// Result of an admission attempt. Only `Accepted` adds an entry; the
/// rest are ordinary rejections, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    Accepted,
    Blank,
    Duplicate,
    Full,
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Blank => "blank",
            Self::Duplicate => "duplicate",
            Self::Full => "full",
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    entries: Vec<PoolEntry>,
    round: Option<RoundState>,
    policy: SelectionPolicy,
    next_index: u64,
}

/// Deduplicated set of admitted identifiers and their availability.
#[derive(Debug, Default)]
pub struct IdentifierPool {
    state: Mutex<PoolState>,
    members: DashSet<String>,
    in_use: DashSet<String>,
    count: AtomicUsize,
}

impl IdentifierPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: SelectionPolicy) -> Self {
        let pool = Self::default();
        pool.set_policy(policy);
        pool
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Pool state mutex poisoned - continuing with inner state");
            poisoned.into_inner()
        })
    }

    /// Admit an identifier. `max_size == 0` means unlimited.
    pub fn admit(&self, identifier: Identifier, max_size: usize) -> Admission {
        let mut state = self.lock_state();

        if self.members.contains(identifier.key()) {
            tracing::debug!(identifier = %identifier, "Identifier already in pool, skipping duplicate");
            return Admission::Duplicate;
        }

        if max_size > 0 && state.entries.len() >= max_size {
            tracing::warn!(identifier = %identifier, max_size, "Pool is full, cannot admit identifier");
            return Admission::Full;
        }

        self.members.insert(identifier.key().to_string());
        let insertion_index = state.next_index;
        state.next_index += 1;
        state.entries.push(PoolEntry {
            identifier,
            insertion_index,
        });
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::debug!(insertion_index, pool_size = count, "Identifier admitted to pool");
        Admission::Accepted
    }

    /// Parse and admit raw text in one call.
    pub fn admit_str(&self, raw: &str, max_size: usize) -> Admission {
        match Identifier::parse(raw) {
            Some(identifier) => self.admit(identifier, max_size),
            None => Admission::Blank,
        }
    }

    /// Switch the selection policy. A change invalidates the active round.
    pub fn set_policy(&self, policy: SelectionPolicy) {
        let mut state = self.lock_state();
        if state.policy != policy {
            tracing::debug!(from = %state.policy, to = %policy, "Selection policy changed, discarding round");
            state.policy = policy;
            state.round = None;
        }
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.lock_state().policy
    }

    /// Peek the next available identifier and advance the round bookmark.
    ///
    /// Does not mark the result in use: two callers racing between `next`
    /// and `mark_in_use` can receive the same identifier. Consumers should
    /// prefer [`IdentifierPool::next_and_reserve`].
    pub fn next(&self) -> Option<Identifier> {
        self.select(false)
    }

    /// Select the next available identifier and mark it in use atomically.
    pub fn next_and_reserve(&self) -> Option<Identifier> {
        self.select(true)
    }

    fn select(&self, claim: bool) -> Option<Identifier> {
        let mut guard = self.lock_state();
        let PoolState {
            entries,
            round,
            policy,
            ..
        } = &mut *guard;

        if entries.is_empty() {
            *round = None;
            return None;
        }

        let active = round.get_or_insert_with(|| RoundState::build(entries.len(), *policy));
        let scan = active.scan(|index| {
            let key = entries[index].identifier.key();
            if claim {
                // Test-and-set: losing to a concurrent mark_in_use is a skip.
                self.in_use.insert(key.to_string())
            } else {
                !self.in_use.contains(key)
            }
        });

        match scan {
            Scan::Found { index, wrapped } => {
                if wrapped {
                    *round = None;
                }
                Some(entries[index].identifier.clone())
            }
            Scan::Exhausted => {
                *round = None;
                None
            }
        }
    }

    /// Mark an identifier in use. Identifiers not in the pool are ignored.
    ///
    /// Returns `true` if the identifier is a pool member (and now marked).
    pub fn mark_in_use(&self, identifier: &Identifier) -> bool {
        let key = identifier.key();
        if !self.members.contains(key) {
            return false;
        }
        self.in_use.insert(key.to_string());

        // A concurrent clear may have dropped membership between the check
        // and the insert.
        if !self.members.contains(key) {
            self.in_use.remove(key);
            return false;
        }
        true
    }

    /// Return an identifier to the available state. No-op if absent.
    pub fn mark_available(&self, identifier: &Identifier) {
        if self.in_use.remove(identifier.key()).is_some() {
            tracing::trace!(identifier = %identifier, "Identifier available again");
        }
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.members.contains(identifier.key())
    }

    pub fn is_in_use(&self, identifier: &Identifier) -> bool {
        self.in_use.contains(identifier.key())
    }

    /// Number of admitted identifiers. Lock-free.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn available_count(&self) -> usize {
        self.count().saturating_sub(self.in_use_count())
    }

    /// Snapshot of entries in insertion order.
    pub fn entries(&self) -> Vec<PoolEntry> {
        self.lock_state().entries.clone()
    }

    /// Wipe entries, round state and markers.
    pub fn clear(&self) {
        let mut state = self.lock_state();
        let removed = state.entries.len();
        state.entries.clear();
        state.round = None;
        state.next_index = 0;
        self.members.clear();
        self.in_use.clear();
        self.count.store(0, Ordering::Release);
        tracing::info!(removed, "Cleared identifier pool");
    }
}
