//! Identifier pool with round-based candidate selection.
//!
//! Admitted identifiers are retained until a full reset; only their
//! availability toggles. Selection walks rounds over a permutation of the
//! entries and hands out whatever is not currently in use.

mod identifier_pool;
mod round;

pub use identifier_pool::{Admission, IdentifierPool, PoolEntry};
pub use round::SelectionPolicy;
