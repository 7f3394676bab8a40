//! Key identifiers for the factored state.
//!
//! A [`Key`] is an opaque string naming one entry of a [`KeyedVector`](crate::value::Domain)
//! (the actual vector type lives in `decisim-core`, which depends on this crate). Keys are
//! decorated by convention -- turn counters, model slots, and binary relations all share the
//! same underlying newtype, distinguished only by the constructors used to build them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The reserved bias key. Always present and always `1.0`, which lets affine maps be expressed
/// as pure linear maps.
pub const CONSTANT: &str = "CONSTANT";

/// The reserved termination flag key.
pub const TERMINATED: &str = "TERMINATED";

/// An opaque, string-keyed identifier into the factored state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    /// Build a key from a raw name, with no decoration.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reserved bias key.
    pub fn constant() -> Self {
        Self(CONSTANT.to_string())
    }

    /// The reserved termination key.
    pub fn terminated() -> Self {
        Self(TERMINATED.to_string())
    }

    /// A turn-counter key for the named agent.
    pub fn turn(agent: &str) -> Self {
        Self(format!("turn({agent})"))
    }

    /// A mental-model-slot key for the named agent.
    pub fn model(agent: &str) -> Self {
        Self(format!("model({agent})"))
    }

    /// A binary-relation key between two named agents.
    pub fn relation(relation: &str, from: &str, to: &str) -> Self {
        Self(format!("{relation}({from},{to})"))
    }

    /// A state-feature key for a named entity.
    pub fn feature(entity: &str, feature: &str) -> Self {
        Self(format!("{entity}'s {feature}"))
    }

    /// Borrow the underlying string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the reserved bias key.
    pub fn is_constant(&self) -> bool {
        self.0 == CONSTANT
    }

    /// Whether this is the reserved termination key.
    pub fn is_terminated(&self) -> bool {
        self.0 == TERMINATED
    }

    /// Whether this key names a turn counter, and if so, the agent it belongs to.
    pub fn as_turn_agent(&self) -> Option<&str> {
        self.0
            .strip_prefix("turn(")
            .and_then(|rest| rest.strip_suffix(')'))
    }

    /// Whether this key names a model slot, and if so, the agent it belongs to.
    pub fn as_model_agent(&self) -> Option<&str> {
        self.0
            .strip_prefix("model(")
            .and_then(|rest| rest.strip_suffix(')'))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn turn_key_round_trips_agent_name() {
        let k = Key::turn("alice");
        assert_eq!(k.as_turn_agent(), Some("alice"));
        assert_eq!(k.as_model_agent(), None);
    }

    #[test]
    fn model_key_round_trips_agent_name() {
        let k = Key::model("bob");
        assert_eq!(k.as_model_agent(), Some("bob"));
    }

    #[test]
    fn constant_and_terminated_are_recognized() {
        assert!(Key::constant().is_constant());
        assert!(Key::terminated().is_terminated());
        assert!(!Key::new("score").is_constant());
    }

    #[test]
    fn relation_key_formats_both_agents() {
        let k = Key::relation("trusts", "alice", "bob");
        assert_eq!(k.as_str(), "trusts(alice,bob)");
    }
}
