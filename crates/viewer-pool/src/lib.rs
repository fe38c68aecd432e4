//! viewer-pool: hands chat participants out to live simulation entities.

mod clock;
mod cooldown;
mod directory;
mod error;
mod identity;
mod names;

pub mod config;
pub mod ingest;
pub mod lifecycle;
pub mod pool;
pub mod service;
pub mod telemetry;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cooldown::CooldownLedger;
pub use directory::{EntityDirectory, EntityState};
pub use error::{ConfigError, NamesError};
pub use identity::{EntityId, Identifier};
pub use names::PredefinedNames;

pub use config::{NamesConfig, PoolConfig, SharedConfig, ValidationReport};
pub use ingest::{ChatCommand, ChatIngest, ChatMessage, IngestOutcome, PermissionLevel, role_of};
pub use lifecycle::{LifecycleHandler, MIN_SPAWN_INTERVAL, Simulation, TickReport};
pub use pool::{Admission, IdentifierPool, PoolEntry, SelectionPolicy};
pub use service::{PoolSnapshot, ViewerPoolService};
pub use tracker::{Assignment, AssignmentTracker, PendingOutcome, PendingReservation, pick_uniform};
