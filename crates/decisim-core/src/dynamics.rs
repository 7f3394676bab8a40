//! The dynamics registry: per-key tables of action patterns to piecewise-linear trees, and the
//! lookup algorithm that resolves which trees apply to a given action set.

use std::collections::BTreeMap;

use decisim_types::{Action, ActionPattern, ActionSet, Combinator, Key};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::plt::Plt;

/// Per-key dynamics: which [`Plt`] applies for which [`ActionPattern`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicsRegistry {
    table: BTreeMap<Key, BTreeMap<ActionPattern, Plt>>,
}

impl DynamicsRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plt` as the dynamics for `key` when `pattern` matches.
    pub fn set_dynamics(&mut self, key: Key, pattern: ActionPattern, plt: Plt) {
        self.table.entry(key).or_default().insert(pattern, plt);
    }

    /// Resolve the ordered list of PLTs that apply to `key` given `actions`, per the lookup
    /// algorithm:
    ///
    /// 1. An exact-match entry for the whole `actions` set, if present, is returned alone.
    /// 2. Otherwise, every atomic action in `actions` that has its own entry contributes a PLT;
    ///    parameterized actions fall back to their root verb's PLT with parameters substituted
    ///    in via [`Plt::desymbolize`].
    /// 3. If nothing matched, the wildcard `true` pattern is used if registered.
    /// 4. Otherwise the key is unaffected by this action set (empty result).
    pub fn get_dynamics(&self, key: &Key, actions: &ActionSet) -> Vec<Plt> {
        let Some(patterns) = self.table.get(key) else {
            return Vec::new();
        };

        if let Some(exact) = patterns.get(&ActionPattern::Exact(actions.clone())) {
            trace!(%key, "exact action-set match for dynamics");
            return vec![exact.clone()];
        }

        let mut matched = Vec::new();
        for action in actions.iter() {
            if let Some(resolved) = self.resolve_atomic(patterns, action) {
                matched.push(resolved);
            }
        }
        if !matched.is_empty() {
            return matched;
        }

        patterns
            .get(&ActionPattern::True)
            .map_or_else(Vec::new, |wildcard| {
                trace!(%key, "falling back to wildcard dynamics");
                vec![wildcard.clone()]
            })
    }

    fn resolve_atomic(&self, patterns: &BTreeMap<ActionPattern, Plt>, action: &Action) -> Option<Plt> {
        let singleton = ActionSet::single(action.clone());
        if let Some(plt) = patterns.get(&ActionPattern::Exact(singleton)) {
            return Some(plt.clone());
        }

        if action.parameters.is_empty() {
            return None;
        }

        let root_singleton = ActionSet::single(action.root());
        let template = patterns.get(&ActionPattern::Exact(root_singleton))?;
        let mut resolved = template.clone();
        for (name, value) in &action.parameters {
            let placeholder = Key::new(format!("${name}"));
            if let Ok(numeric) = value.parse::<f64>() {
                resolved = resolved.desymbolize(&placeholder, numeric);
            }
        }
        Some(resolved)
    }

    /// Whether any dynamics are registered at all.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The combinator a key's descriptor would need for its current registered PLTs to be
    /// consistent: [`Combinator::Compose`] if more than one pattern could simultaneously match
    /// an observed action set, [`Combinator::Single`] otherwise. Advisory only; authoring code
    /// should still declare the combinator explicitly on the variable descriptor.
    pub fn implied_combinator(&self, key: &Key) -> Combinator {
        match self.table.get(key) {
            Some(patterns) if patterns.len() > 1 => Combinator::Compose,
            _ => Combinator::Single,
        }
    }

    /// Every key with at least one registered dynamics entry.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.table.keys()
    }

    /// All PLTs registered anywhere for `key`, for dependency analysis.
    pub fn plts_for(&self, key: &Key) -> impl Iterator<Item = &Plt> {
        self.table.get(key).into_iter().flat_map(BTreeMap::values)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::matrix::KeyedMatrix;
    use crate::vector::KeyedVector;

    fn set_ready_plt() -> Plt {
        let mut m = KeyedMatrix::new();
        let mut row = KeyedVector::new();
        row.set(Key::constant(), 1.0);
        m.set_row(Key::new("ready"), row);
        Plt::leaf(m)
    }

    #[test]
    fn exact_match_wins_over_atomic_and_wildcard() {
        let mut reg = DynamicsRegistry::new();
        let action = Action::new("alice", "set");
        let set = ActionSet::single(action.clone());
        reg.set_dynamics(Key::new("ready"), ActionPattern::Exact(set.clone()), set_ready_plt());
        reg.set_dynamics(Key::new("ready"), ActionPattern::True, set_ready_plt());

        let result = reg.get_dynamics(&Key::new("ready"), &set);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn falls_back_to_wildcard_when_no_action_specific_entry() {
        let mut reg = DynamicsRegistry::new();
        reg.set_dynamics(Key::new("ready"), ActionPattern::True, set_ready_plt());

        let other_action = ActionSet::single(Action::new("bob", "noop"));
        let result = reg.get_dynamics(&Key::new("ready"), &other_action);
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn unregistered_key_yields_empty_dynamics() {
        let reg = DynamicsRegistry::new();
        let actions = ActionSet::single(Action::new("alice", "noop"));
        assert!(reg.get_dynamics(&Key::new("ghost"), &actions).is_empty());
    }

    #[test]
    fn parameterized_action_falls_back_to_root_with_substitution() {
        let mut reg = DynamicsRegistry::new();
        let root = ActionSet::single(Action::new("alice", "give"));

        let mut weights = KeyedVector::new();
        weights.set(Key::new("$amount"), 1.0);
        let plt = Plt::branch(weights, 5.0, set_ready_plt(), set_ready_plt());
        reg.set_dynamics(Key::new("ready"), ActionPattern::Exact(root), plt);

        let parameterized = ActionSet::single(Action::new("alice", "give").with_param("amount", "10"));
        let result = reg.get_dynamics(&Key::new("ready"), &parameterized);
        assert_eq!(result.len(), 1);
    }
}
