//! Actions and the patterns dynamics are registered against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// One atomic action: a verb performed by `subject`, with free parameters.
///
/// Parameters are kept in a `BTreeMap` so that two actions with the same subject, verb, and
/// parameter set compare equal and hash identically regardless of construction order --
/// required for [`ActionSet`] to be usable as a lookup key in the dynamics registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Action {
    /// The agent performing this action.
    pub subject: String,
    /// The action's verb, e.g. `"eat"` or `"set"`.
    pub verb: String,
    /// Free parameters, compared and hashed via their `Display` form so the map stays
    /// `Eq`/`Hash`/`Ord`-able without requiring `Value` to implement those traits.
    pub parameters: BTreeMap<String, String>,
}

impl Action {
    /// Build an action with no parameters.
    pub fn new(subject: impl Into<String>, verb: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            verb: verb.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Attach one parameter, rendering `value` via its domain-appropriate string form.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// This action with all parameters stripped, i.e. its "root" for pattern fallback lookup.
    pub fn root(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            verb: self.verb.clone(),
            parameters: BTreeMap::new(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.subject, self.verb)?;
        for (k, v) in &self.parameters {
            write!(f, "-{k}={v}")?;
        }
        Ok(())
    }
}

/// An unordered multiset of actions performed simultaneously, one per acting agent.
///
/// Stored sorted by [`Action`]'s `Ord` so that two action sets with the same members compare
/// equal regardless of insertion order; this is what lets [`ActionSet`] serve as an exact-match
/// dynamics-registry key (spec \"dynamics lookup\" step 1).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct ActionSet(Vec<Action>);

impl ActionSet {
    /// The empty action set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from the given actions, canonicalizing their order.
    pub fn from_actions(mut actions: Vec<Action>) -> Self {
        actions.sort();
        actions.dedup();
        Self(actions)
    }

    /// A set containing exactly one action.
    pub fn single(action: Action) -> Self {
        Self(vec![action])
    }

    /// Iterate the member actions in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.0.iter()
    }

    /// The number of member actions.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this set has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All actions in this set whose subject is `agent`.
    pub fn by_subject<'a>(&'a self, agent: &'a str) -> impl Iterator<Item = &'a Action> {
        self.0.iter().filter(move |a| a.subject == agent)
    }
}

impl fmt::Display for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        Self::from_actions(iter.into_iter().collect())
    }
}

/// A dynamics-registry pattern: either the wildcard `true`, matching any action set, or an
/// exact [`ActionSet`] to compare against.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionPattern {
    /// Matches any action set.
    True,
    /// Matches only action sets equal to this one.
    Exact(ActionSet),
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "true"),
            Self::Exact(set) => write!(f, "{set}"),
        }
    }
}

/// A fully resolved domain-level value bound to a parameter name, used when substituting
/// action parameters into a symbolic dynamics leaf at lookup time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterBinding {
    /// The parameter name as it appears in the PLT's symbolic leaves.
    pub name: String,
    /// The value to substitute.
    pub value: Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn action_sets_with_same_members_compare_equal_regardless_of_order() {
        let a = Action::new("alice", "give").with_param("to", "bob");
        let b = Action::new("bob", "accept");
        let set1 = ActionSet::from_actions(vec![a.clone(), b.clone()]);
        let set2 = ActionSet::from_actions(vec![b, a]);
        assert_eq!(set1, set2);
    }

    #[test]
    fn root_strips_parameters() {
        let a = Action::new("alice", "give").with_param("to", "bob");
        assert!(a.root().parameters.is_empty());
        assert_eq!(a.root().verb, "give");
    }

    #[test]
    fn by_subject_filters_correctly() {
        let set = ActionSet::from_actions(vec![
            Action::new("alice", "eat"),
            Action::new("bob", "sleep"),
        ]);
        let alice_actions: Vec<_> = set.by_subject("alice").collect();
        assert_eq!(alice_actions.len(), 1);
        assert_eq!(alice_actions[0].verb, "eat");
    }
}
