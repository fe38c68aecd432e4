//! Identifier and entity handle types.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

/// A normalized participant name.
///
/// Keeps the display form exactly as first submitted; equality and hashing
/// use the lowercased key only, so `Bob` and `bob` are the same identifier.
#[derive(Debug, Clone)]
pub struct Identifier {
    display: String,
    key: String,
}

impl Identifier {
    /// Parse raw text into an identifier. Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            display: trimmed.to_string(),
            key: normalize(trimmed),
        })
    }

    /// Display form (original casing).
    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Case-folded lookup key.
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Case-fold a name into its lookup key.
pub(crate) fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

/// Opaque handle to a live object in the external simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(u64);

impl EntityId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity-{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_blank() {
        assert!(Identifier::parse("").is_none());
        assert!(Identifier::parse("   \t").is_none());
    }

    #[test]
    fn parse_trims_and_keeps_display_casing() {
        let id = Identifier::parse("  BobTheBuilder ").unwrap();
        assert_eq!(id.as_str(), "BobTheBuilder");
        assert_eq!(id.key(), "bobthebuilder");
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a = Identifier::parse("Alice").unwrap();
        let b = Identifier::parse("ALICE").unwrap();
        assert_eq!(a, b);

        let mut set = std::collections::HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn entity_display() {
        assert_eq!(EntityId::new(42).to_string(), "entity-42");
    }
}
