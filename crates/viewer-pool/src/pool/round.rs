//! Round bookkeeping for candidate selection.
//!
//! A round is one pass over a permutation of entry indices. FIFO rounds use
//! ascending insertion order; random rounds are a fresh Fisher-Yates shuffle
//! drawn from the thread-local RNG.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// How the pool orders candidates within a round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPolicy {
    #[default]
    Random,
    Fifo,
}

impl SelectionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Fifo => "fifo",
        }
    }
}

impl std::fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of scanning a round for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scan {
    /// Candidate accepted. `wrapped` is set when the cursor passed the end
    /// of the order, which finishes the round.
    Found { index: usize, wrapped: bool },
    /// A full cycle found nothing acceptable.
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct RoundState {
    order: Vec<usize>,
    cursor: usize,
}

impl RoundState {
    pub(crate) fn build(len: usize, policy: SelectionPolicy) -> Self {
        let mut order: Vec<usize> = (0..len).collect();
        if policy == SelectionPolicy::Random {
            order.shuffle(&mut rand::rng());
        }
        Self { order, cursor: 0 }
    }

    #[cfg(test)]
    pub(crate) fn order(&self) -> &[usize] {
        &self.order
    }

    /// Walk forward from the cursor for at most one full cycle, advancing the
    /// cursor past every inspected slot, until `accept` takes an index.
    pub(crate) fn scan(&mut self, mut accept: impl FnMut(usize) -> bool) -> Scan {
        let len = self.order.len();
        if len == 0 {
            return Scan::Exhausted;
        }

        let mut wrapped = false;
        for _ in 0..len {
            let index = self.order[self.cursor];
            self.cursor = (self.cursor + 1) % len;
            if self.cursor == 0 {
                wrapped = true;
            }
            if accept(index) {
                return Scan::Found { index, wrapped };
            }
        }
        Scan::Exhausted
    }
}
