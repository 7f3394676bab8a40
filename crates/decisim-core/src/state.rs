//! The factored state: a distribution set composed of independent marginal substates.

use std::collections::BTreeMap;

use decisim_types::Key;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::distribution::{Distribution, VectorDistribution};
use crate::error::CoreError;
use crate::vector::KeyedVector;

/// The label identifying one substate within a [`DistributionSet`]. Opaque beyond equality and
/// ordering; callers generally let [`DistributionSet::join`] assign one rather than choosing
/// their own.
pub type SubstateLabel = String;

/// A factored probability distribution over world states.
///
/// Invariants maintained by this type (see `SPEC_FULL.md` \u{a7}3):
/// - every key belongs to exactly one substate
/// - all support vectors within one substate's distribution share the same key domain
/// - `CONSTANT` is `1.0` in every support vector of every substate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistributionSet {
    substates: BTreeMap<SubstateLabel, VectorDistribution>,
    key_index: BTreeMap<Key, SubstateLabel>,
    next_label: u64,
}

impl DistributionSet {
    /// An empty distribution set.
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_label(&mut self) -> SubstateLabel {
        let label = format!("substate-{}", self.next_label);
        self.next_label += 1;
        label
    }

    /// The substate label that owns `key`, if any.
    pub fn substate_of(&self, key: &Key) -> Option<&SubstateLabel> {
        self.key_index.get(key)
    }

    /// The marginal [`VectorDistribution`] for the substate owning `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if `key` has never been joined into this set.
    pub fn marginal(&self, key: &Key) -> Result<&VectorDistribution, CoreError> {
        let label = self
            .substate_of(key)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))?;
        self.substates
            .get(label)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))
    }

    /// Join `key = value` into the state, creating a fresh independent substate containing
    /// only `key` and `CONSTANT` if `key` has not been seen before, or merging into
    /// `into_substate` if given and already present.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateDefinition`] if `key` is already owned by a different
    /// substate than `into_substate` names.
    pub fn join(
        &mut self,
        key: Key,
        value: f64,
        into_substate: Option<&SubstateLabel>,
    ) -> Result<(), CoreError> {
        if let Some(existing) = self.key_index.get(&key) {
            if let Some(target) = into_substate
                && target != existing
            {
                return Err(CoreError::DuplicateDefinition(format!(
                    "key {key} already belongs to substate {existing}, cannot rejoin into {target}"
                )));
            }
            let dist = self
                .substates
                .get(existing)
                .ok_or_else(|| CoreError::UnknownKey(key.clone()))?;
            let moved = dist.map(|v| {
                let mut nv = v.clone();
                nv.set(key.clone(), value);
                nv
            });
            self.substates.insert(existing.clone(), moved);
            return Ok(());
        }

        let label = match into_substate {
            Some(label) if self.substates.contains_key(label) => label.clone(),
            _ => self.fresh_label(),
        };

        self.substates
            .entry(label.clone())
            .or_insert_with(|| Distribution::point(KeyedVector::with_constant()));

        let dist = self
            .substates
            .get(&label)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))?;
        let moved = dist.map(|v| {
            let mut nv = v.clone();
            nv.set(key.clone(), value);
            nv
        });
        self.substates.insert(label.clone(), moved);
        self.key_index.insert(key, label);
        Ok(())
    }

    /// Replace the entire distribution owning `key`'s substate with `replacement`.
    ///
    /// Used by the world stepper to commit a freshly computed SCC's joint distribution.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if no substate currently owns `key`.
    pub fn replace_substate(
        &mut self,
        key: &Key,
        replacement: VectorDistribution,
    ) -> Result<(), CoreError> {
        let label = self
            .substate_of(key)
            .ok_or_else(|| CoreError::UnknownKey(key.clone()))?
            .clone();
        self.substates.insert(label, replacement);
        Ok(())
    }

    /// The marginal distribution of a single key's value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if `key` has never been joined.
    pub fn get_feature(&self, key: &Key) -> Result<Distribution<u64>, CoreError> {
        let marg = self.marginal(key)?;
        Ok(marg.map(|v| v.get(key).to_bits()))
    }

    /// Set `key` to `value` in every support vector of its owning substate, preserving the
    /// probability of each branch. Creates a new singleton substate if `key` is unseen.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from the underlying [`Self::join`].
    pub fn set_feature(&mut self, key: Key, value: f64) -> Result<(), CoreError> {
        if self.key_index.contains_key(&key) {
            self.join(key, value, None)
        } else {
            debug!(key = %key, "defining new substate for previously unseen key");
            self.join(key, value, None)
        }
    }

    /// A point value for `key`, failing if the owning substate's marginal is not a single
    /// support vector.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Ambiguous`] if more than one value has nonzero mass.
    pub fn get_value(&self, key: &Key) -> Result<f64, CoreError> {
        let marg = self.marginal(key)?;
        let point = marg.as_point().ok_or_else(|| CoreError::Ambiguous {
            key: key.clone(),
            support_size: marg.len(),
        })?;
        Ok(point.get(key))
    }

    /// Every key currently defined in this set.
    pub fn domain(&self) -> impl Iterator<Item = &Key> {
        self.key_index.keys()
    }

    /// Iterate all substates by label.
    pub fn substates(&self) -> impl Iterator<Item = (&SubstateLabel, &VectorDistribution)> {
        self.substates.iter()
    }

    /// Whether `TERMINATED` is set and truthy in every support vector across every substate
    /// that mentions it (termination, once reached, applies to the whole distribution set).
    pub fn terminated(&self) -> bool {
        use decisim_types::TERMINATED;
        let key = Key::new(TERMINATED);
        self.marginal(&key)
            .ok()
            .is_some_and(|d| d.iter().all(|(v, _)| v.is_terminated()))
    }

    /// Remove every key and substate, resetting to empty.
    pub fn clear(&mut self) {
        self.substates.clear();
        self.key_index.clear();
    }

    /// Whether every substate's distribution sums to `1.0` within tolerance (the
    /// normalization invariant checked after every step).
    pub fn is_normalized(&self) -> bool {
        self.substates.values().all(Distribution::is_normalized)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn join_creates_independent_substate_per_unrelated_key() {
        let mut ds = DistributionSet::new();
        ds.join(Key::new("a"), 1.0, None).unwrap();
        ds.join(Key::new("b"), 2.0, None).unwrap();
        assert_ne!(ds.substate_of(&Key::new("a")), ds.substate_of(&Key::new("b")));
    }

    #[test]
    fn get_value_succeeds_for_point_distribution() {
        let mut ds = DistributionSet::new();
        ds.join(Key::new("a"), 1.0, None).unwrap();
        assert_eq!(ds.get_value(&Key::new("a")).unwrap(), 1.0);
    }

    #[test]
    fn get_value_fails_on_ambiguous_marginal() {
        let mut ds = DistributionSet::new();
        ds.join(Key::new("coin"), 0.0, None).unwrap();
        let label = ds.substate_of(&Key::new("coin")).unwrap().clone();
        let mut dist = VectorDistribution::new();
        let mut heads = KeyedVector::with_constant();
        heads.set(Key::new("coin"), 0.0);
        let mut tails = KeyedVector::with_constant();
        tails.set(Key::new("coin"), 1.0);
        dist.insert(heads, 0.5);
        dist.insert(tails, 0.5);
        ds.replace_substate(&Key::new("coin"), dist).unwrap();
        assert!(ds.get_value(&Key::new("coin")).is_err());
        assert!(matches!(ds.get_value(&Key::new("coin")), Err(CoreError::Ambiguous { .. })));
        let _ = label;
    }

    #[test]
    fn unknown_key_queries_fail() {
        let ds = DistributionSet::new();
        assert!(ds.get_value(&Key::new("ghost")).is_err());
    }
}
