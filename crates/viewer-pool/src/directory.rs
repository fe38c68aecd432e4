//! Read-only view of the simulation's entities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::EntityId;

/// Lifecycle state token reported by the simulation (e.g. `leaving`).
///
/// Compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct EntityState(String);

impl EntityState {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for EntityState {
    fn from(token: String) -> Self {
        Self::new(token)
    }
}

impl From<&str> for EntityState {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

impl From<EntityState> for String {
    fn from(state: EntityState) -> Self {
        state.0
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Liveness and state queries answered by the simulation.
///
/// A destroyed or unknown handle must read as not live with no state; the
/// core treats that exactly like "not found".
pub trait EntityDirectory: Send + Sync {
    fn live_entities(&self) -> Vec<EntityId>;

    fn is_live(&self, entity: EntityId) -> bool;

    fn current_state(&self, entity: EntityId) -> Option<EntityState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tokens_are_normalized() {
        assert_eq!(EntityState::new(" Leaving "), EntityState::new("leaving"));
        assert_eq!(EntityState::from("IDLE").as_str(), "idle");
    }

    #[test]
    fn state_serde_round_trips_as_string() {
        let state: EntityState = serde_json::from_str("\"Incapacitated\"").unwrap();
        assert_eq!(state.as_str(), "incapacitated");
        assert_eq!(serde_json::to_string(&state).unwrap(), "\"incapacitated\"");
    }
}
