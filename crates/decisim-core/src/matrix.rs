//! Keyed matrices: linear transformations from a state vector to a set of output keys.

use std::collections::BTreeMap;

use decisim_types::Key;
use serde::{Deserialize, Serialize};

use crate::vector::KeyedVector;

/// A linear transformation: each output key is set to the dot product of its associated row
/// vector with the vector the matrix is applied to. Keys not mentioned are left unchanged
/// (an implicit identity row), matching the "identity for unmentioned keys" rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyedMatrix(BTreeMap<Key, KeyedVector>);

impl KeyedMatrix {
    /// An empty matrix (identity everywhere).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the row for `output_key` to `row`.
    pub fn set_row(&mut self, output_key: Key, row: KeyedVector) {
        self.0.insert(output_key, row);
    }

    /// The row for `output_key`, if this matrix assigns one.
    pub fn row(&self, output_key: &Key) -> Option<&KeyedVector> {
        self.0.get(output_key)
    }

    /// The set of output keys this matrix assigns.
    pub fn output_keys(&self) -> impl Iterator<Item = &Key> {
        self.0.keys()
    }

    /// Apply this matrix to `x`, producing the output vector. Keys this matrix does not
    /// mention are carried over unchanged from `x` (the implicit identity row).
    pub fn apply(&self, x: &KeyedVector) -> KeyedVector {
        let mut out = x.clone();
        for (output_key, row) in &self.0 {
            out.set(output_key.clone(), row.dot(x));
        }
        out
    }

    /// Overlay `other`'s rows onto `self`, with `other` taking precedence on shared output
    /// keys. Used to compose dynamics applied to disjoint or overlapping key sets.
    pub fn update(&self, other: &Self) -> Self {
        let mut merged = self.0.clone();
        for (k, row) in &other.0 {
            merged.insert(k.clone(), row.clone());
        }
        Self(merged)
    }

    /// All input keys read by any row (for dependency analysis).
    pub fn keys_in(&self) -> impl Iterator<Item = &Key> {
        self.0.values().flat_map(KeyedVector::keys)
    }

    /// All output keys written by this matrix (for dependency analysis).
    pub fn keys_out(&self) -> impl Iterator<Item = &Key> {
        self.output_keys()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn apply_leaves_unmentioned_keys_unchanged() {
        let mut x = KeyedVector::new();
        x.set(Key::new("a"), 1.0);
        x.set(Key::new("b"), 2.0);

        let mut m = KeyedMatrix::new();
        let mut row = KeyedVector::new();
        row.set(Key::new("a"), 1.0);
        m.set_row(Key::new("a"), row);

        let out = m.apply(&x);
        assert_eq!(out.get(&Key::new("a")), 1.0);
        assert_eq!(out.get(&Key::new("b")), 2.0);
    }

    #[test]
    fn update_lets_other_take_precedence() {
        let mut base = KeyedMatrix::new();
        let mut row_a = KeyedVector::new();
        row_a.set(Key::new("a"), 1.0);
        base.set_row(Key::new("a"), row_a);

        let mut overlay = KeyedMatrix::new();
        let mut row_a2 = KeyedVector::new();
        row_a2.set(Key::new("a"), 2.0);
        overlay.set_row(Key::new("a"), row_a2);

        let merged = base.update(&overlay);
        assert_eq!(merged.row(&Key::new("a")).unwrap().get(&Key::new("a")), 2.0);
    }
}
