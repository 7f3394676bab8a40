//! Keyed vectors: the dense-sparse numeric building block of the factored state.

use std::collections::BTreeMap;
use std::collections::btree_map::Iter;
use std::hash::{Hash, Hasher};

use decisim_types::{CONSTANT, Key};
use serde::{Deserialize, Serialize};

/// A sparse mapping from [`Key`] to `f64`, implicitly zero everywhere else.
///
/// Equality and hashing compare the underlying bit patterns of the floats (`f64::to_bits`)
/// rather than `==`, so that two vectors are equal exactly when they are bitwise identical --
/// the determinism requirement that lets a `KeyedVector` serve as the support of a
/// [`crate::distribution::Distribution`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyedVector(BTreeMap<Key, f64>);

impl KeyedVector {
    /// An empty vector, with `CONSTANT` not yet set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A vector with `CONSTANT` set to `1.0`, as every live state vector must be.
    pub fn with_constant() -> Self {
        let mut v = Self::default();
        v.0.insert(Key::constant(), 1.0);
        v
    }

    /// Read the value at `key`, or `0.0` if absent.
    pub fn get(&self, key: &Key) -> f64 {
        self.0.get(key).copied().unwrap_or(0.0)
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: Key, value: f64) {
        self.0.insert(key, value);
    }

    /// Remove `key`, returning its prior value if present.
    pub fn remove(&mut self, key: &Key) -> Option<f64> {
        self.0.remove(key)
    }

    /// Whether `key` has an explicit entry (as opposed to an implicit zero).
    pub fn contains_key(&self, key: &Key) -> bool {
        self.0.contains_key(key)
    }

    /// Iterate the explicit `(key, value)` entries.
    pub fn iter(&self) -> Iter<'_, Key, f64> {
        self.0.iter()
    }

    /// The number of explicit entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no explicit entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The dot product of `self` with `other`, over the union of their keys (implicit zeros
    /// contribute nothing).
    pub fn dot(&self, other: &Self) -> f64 {
        let (small, big) = if self.0.len() <= other.0.len() {
            (self, other)
        } else {
            (other, self)
        };
        small
            .0
            .iter()
            .map(|(k, v)| v * big.get(k))
            .fold(0.0, |acc, term| acc + term)
    }

    /// Elementwise addition, union of keys.
    pub fn add(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            let entry = out.0.entry(k.clone()).or_insert(0.0);
            *entry += v;
        }
        out
    }

    /// Elementwise subtraction, union of keys.
    pub fn sub(&self, other: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            let entry = out.0.entry(k.clone()).or_insert(0.0);
            *entry -= v;
        }
        out
    }

    /// Scale every explicit entry by `factor`.
    pub fn scale(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|(k, v)| (k.clone(), v * factor)).collect())
    }

    /// Whether `CONSTANT` is present and equal to `1.0`, the invariant every live state vector
    /// must satisfy.
    pub fn has_valid_constant(&self) -> bool {
        self.0
            .get(&Key::new(CONSTANT))
            .is_some_and(|&v| (v - 1.0).abs() < f64::EPSILON)
    }

    /// Whether `TERMINATED` is set to a truthy (`>= 0.5`) value.
    pub fn is_terminated(&self) -> bool {
        self.0
            .get(&Key::terminated())
            .is_some_and(|&v| v >= 0.5)
    }

    /// All keys present in this vector.
    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }
}

impl PartialEq for KeyedVector {
    fn eq(&self, other: &Self) -> bool {
        if self.0.len() != other.0.len() {
            return false;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|((k1, v1), (k2, v2))| k1 == k2 && v1.to_bits() == v2.to_bits())
    }
}

impl Eq for KeyedVector {}

impl Hash for KeyedVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (k, v) in &self.0 {
            k.hash(state);
            v.to_bits().hash(state);
        }
    }
}

impl FromIterator<(Key, f64)> for KeyedVector {
    fn from_iter<I: IntoIterator<Item = (Key, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn get_of_absent_key_is_zero() {
        let v = KeyedVector::new();
        assert_eq!(v.get(&Key::new("x")), 0.0);
    }

    #[test]
    fn dot_product_ignores_implicit_zeros() {
        let mut a = KeyedVector::new();
        a.set(Key::new("x"), 2.0);
        a.set(Key::new("y"), 3.0);
        let mut b = KeyedVector::new();
        b.set(Key::new("x"), 5.0);
        assert_eq!(a.dot(&b), 10.0);
    }

    #[test]
    fn bitwise_equal_vectors_are_equal() {
        let mut a = KeyedVector::new();
        a.set(Key::new("x"), 0.1 + 0.2);
        let mut b = KeyedVector::new();
        b.set(Key::new("x"), 0.3);
        // 0.1 + 0.2 != 0.3 in f64, so these must NOT compare equal.
        assert_ne!(a, b);
        b.set(Key::new("x"), 0.1 + 0.2);
        assert_eq!(a, b);
    }

    #[test]
    fn with_constant_satisfies_constant_invariant() {
        assert!(KeyedVector::with_constant().has_valid_constant());
        assert!(!KeyedVector::new().has_valid_constant());
    }

    #[test]
    fn add_and_sub_are_inverses() {
        let mut a = KeyedVector::new();
        a.set(Key::new("x"), 1.0);
        let mut b = KeyedVector::new();
        b.set(Key::new("x"), 4.0);
        let summed = a.add(&b);
        assert_eq!(summed.get(&Key::new("x")), 5.0);
        let back = summed.sub(&b);
        assert_eq!(back.get(&Key::new("x")), 1.0);
    }
}
