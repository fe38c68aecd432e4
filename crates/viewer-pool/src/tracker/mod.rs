//! Entity-to-identifier assignments.
//!
//! The tracker owns every live binding and the pending-handoff slot. It pulls
//! identifiers from the pool and gives them back on release or sweep.

mod assignment;
mod pending;

pub use assignment::{Assignment, AssignmentTracker, pick_uniform};
pub use pending::{PendingOutcome, PendingReservation};
