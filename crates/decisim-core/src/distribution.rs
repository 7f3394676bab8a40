//! A generic probability distribution over a discrete support, used for both vector
//! distributions and matrix distributions.

use std::collections::HashMap;
use std::hash::Hash;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::matrix::KeyedMatrix;
use crate::vector::KeyedVector;

/// A probability distribution over keyed vectors -- the support of one substate.
pub type VectorDistribution = Distribution<KeyedVector>;

/// A probability distribution over keyed matrices -- a stochastic dynamics leaf.
pub type MatrixDistribution = Distribution<KeyedMatrix>;

/// Probability tolerance below which mass is treated as zero and above which a normalization
/// drift is an [`CoreError::InvariantViolation`] rather than something silently absorbed.
pub const NORMALIZATION_TOLERANCE: f64 = 1e-6;

/// A probability distribution over values of type `T`. Inserting a value already present
/// combines probability mass rather than overwriting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution<T: Eq + Hash> {
    support: HashMap<T, f64>,
}

impl<T: Eq + Hash + Clone> Default for Distribution<T> {
    fn default() -> Self {
        Self {
            support: HashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> Distribution<T> {
    /// The empty distribution (no support, no mass).
    pub fn new() -> Self {
        Self::default()
    }

    /// A distribution with all mass on a single value.
    pub fn point(value: T) -> Self {
        let mut d = Self::new();
        d.insert(value, 1.0);
        d
    }

    /// Add `probability` of mass on `value`, combining with any existing mass on an equal
    /// value rather than overwriting it.
    pub fn insert(&mut self, value: T, probability: f64) {
        *self.support.entry(value).or_insert(0.0) += probability;
    }

    /// Total probability mass across the support.
    pub fn total_mass(&self) -> f64 {
        self.support.values().sum()
    }

    /// Iterate `(value, probability)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&T, &f64)> {
        self.support.iter()
    }

    /// The number of distinct values in the support.
    pub fn len(&self) -> usize {
        self.support.len()
    }

    /// Whether the support is empty.
    pub fn is_empty(&self) -> bool {
        self.support.is_empty()
    }

    /// The probability assigned to `value`, or `0.0` if absent.
    pub fn probability(&self, value: &T) -> f64 {
        self.support.get(value).copied().unwrap_or(0.0)
    }

    /// Rescale every mass by `factor`. Used internally by [`Self::normalize`] and by callers
    /// combining partial distributions.
    pub fn scale(&mut self, factor: f64) {
        for p in self.support.values_mut() {
            *p *= factor;
        }
    }

    /// Rescale the distribution so its total mass is `1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if the total mass is zero (nothing to
    /// renormalize onto) or if it drifted beyond [`NORMALIZATION_TOLERANCE`] from `1.0` by more
    /// than would be expected from accumulated floating-point error.
    pub fn normalize(&mut self) -> Result<(), CoreError> {
        let total = self.total_mass();
        if total <= 0.0 {
            return Err(CoreError::InvariantViolation {
                message: "cannot normalize a distribution with zero total mass".to_string(),
            });
        }
        if (total - 1.0).abs() > NORMALIZATION_TOLERANCE {
            self.scale(1.0 / total);
        }
        Ok(())
    }

    /// Whether the total mass is within [`NORMALIZATION_TOLERANCE`] of `1.0`.
    pub fn is_normalized(&self) -> bool {
        (self.total_mass() - 1.0).abs() <= NORMALIZATION_TOLERANCE
    }

    /// If the support has exactly one value with nonzero mass, return it; otherwise `None`.
    /// Used to implement point-query operations that must fail on genuinely ambiguous state.
    pub fn as_point(&self) -> Option<&T> {
        let mut iter = self.support.iter().filter(|(_, &p)| p > 0.0);
        let first = iter.next()?;
        if iter.next().is_some() {
            None
        } else {
            Some(first.0)
        }
    }

    /// Sample one value according to its probability mass, using `rng`. Assumes the
    /// distribution is normalized; callers should [`Self::normalize`] first if unsure.
    pub fn sample(&self, rng: &mut impl Rng) -> Option<&T> {
        if self.support.is_empty() {
            return None;
        }
        let threshold: f64 = rng.random_range(0.0..self.total_mass().max(f64::MIN_POSITIVE));
        let mut cumulative = 0.0;
        for (value, &p) in &self.support {
            cumulative += p;
            if cumulative >= threshold {
                return Some(value);
            }
        }
        self.support.keys().next()
    }

    /// Map each value through `f`, combining mass for values that collide under the mapping.
    pub fn map<U: Eq + Hash + Clone>(&self, mut f: impl FnMut(&T) -> U) -> Distribution<U> {
        let mut out = Distribution::new();
        for (value, &p) in &self.support {
            out.insert(f(value), p);
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn insert_combines_mass_for_equal_values() {
        let mut d: Distribution<i32> = Distribution::new();
        d.insert(1, 0.3);
        d.insert(1, 0.2);
        assert!((d.probability(&1) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn normalize_rescales_to_one() {
        let mut d: Distribution<i32> = Distribution::new();
        d.insert(1, 2.0);
        d.insert(2, 2.0);
        d.normalize().unwrap();
        assert!((d.total_mass() - 1.0).abs() < NORMALIZATION_TOLERANCE);
    }

    #[test]
    fn normalize_of_empty_distribution_errors() {
        let mut d: Distribution<i32> = Distribution::new();
        assert!(d.normalize().is_err());
    }

    #[test]
    fn as_point_requires_single_support_value() {
        let mut d: Distribution<i32> = Distribution::new();
        d.insert(1, 1.0);
        assert_eq!(d.as_point(), Some(&1));
        d.insert(2, 1.0);
        assert_eq!(d.as_point(), None);
    }
}
