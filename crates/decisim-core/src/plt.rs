//! Piecewise-linear trees: the representation dynamics PLTs use to express both deterministic
//! and stochastic action effects.

use std::collections::BTreeSet;

use decisim_types::Key;
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, MatrixDistribution, VectorDistribution};
use crate::matrix::KeyedMatrix;
use crate::vector::KeyedVector;

/// A piecewise-linear tree: a decision tree whose branches are linear thresholds and whose
/// leaves are keyed matrices (deterministic) or distributions over keyed matrices (stochastic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Plt {
    /// A deterministic leaf: apply this matrix.
    Leaf(KeyedMatrix),
    /// A stochastic leaf: sample a matrix from this distribution.
    StochasticLeaf(MatrixDistribution),
    /// Branch on `weights \u{b7} x >= threshold`.
    Branch {
        /// The linear form evaluated against the input vector.
        weights: KeyedVector,
        /// The threshold the dot product is compared against.
        threshold: f64,
        /// Subtree taken when the threshold test passes.
        if_true: Box<Plt>,
        /// Subtree taken when the threshold test fails.
        if_false: Box<Plt>,
    },
    /// Clamp `key`'s value in the result of `inner` to `[lo, hi]`.
    Clamp {
        /// The key whose output value is clamped.
        key: Key,
        /// Inclusive lower bound, if any.
        lo: Option<f64>,
        /// Inclusive upper bound, if any.
        hi: Option<f64>,
        /// The subtree whose output is clamped.
        inner: Box<Plt>,
    },
}

impl Plt {
    /// Build a deterministic leaf.
    pub fn leaf(matrix: KeyedMatrix) -> Self {
        Self::Leaf(matrix)
    }

    /// Build a stochastic leaf.
    pub fn stochastic_leaf(distribution: MatrixDistribution) -> Self {
        Self::StochasticLeaf(distribution)
    }

    /// Build a threshold branch.
    pub fn branch(weights: KeyedVector, threshold: f64, if_true: Self, if_false: Self) -> Self {
        Self::Branch {
            weights,
            threshold,
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Wrap `self` so that `key`'s output value is floored at `lo`.
    pub fn floor(self, key: Key, lo: f64) -> Self {
        match self {
            Self::Clamp { key: k, lo: existing_lo, hi, inner } if k == key => Self::Clamp {
                key: k,
                lo: Some(existing_lo.map_or(lo, |l| l.max(lo))),
                hi,
                inner,
            },
            other => Self::Clamp {
                key,
                lo: Some(lo),
                hi: None,
                inner: Box::new(other),
            },
        }
    }

    /// Wrap `self` so that `key`'s output value is ceilinged at `hi`.
    pub fn ceil(self, key: Key, hi: f64) -> Self {
        match self {
            Self::Clamp { key: k, lo, hi: existing_hi, inner } if k == key => Self::Clamp {
                key: k,
                lo,
                hi: Some(existing_hi.map_or(hi, |h| h.min(hi))),
                inner,
            },
            other => Self::Clamp {
                key,
                lo: None,
                hi: Some(hi),
                inner: Box::new(other),
            },
        }
    }

    /// Whether this tree contains no stochastic leaves anywhere. Turn dynamics must be
    /// deterministic; the engine refuses otherwise.
    pub fn is_deterministic(&self) -> bool {
        match self {
            Self::Leaf(_) => true,
            Self::StochasticLeaf(_) => false,
            Self::Branch { if_true, if_false, .. } => {
                if_true.is_deterministic() && if_false.is_deterministic()
            }
            Self::Clamp { inner, .. } => inner.is_deterministic(),
        }
    }

    /// Apply this tree to `x`, producing a distribution over output vectors (a point
    /// distribution if every leaf reached is deterministic).
    pub fn apply_to_vector(&self, x: &KeyedVector) -> VectorDistribution {
        match self {
            Self::Leaf(matrix) => Distribution::point(matrix.apply(x)),
            Self::StochasticLeaf(matrices) => {
                let mut out = VectorDistribution::new();
                for (matrix, &p) in matrices.iter() {
                    out.insert(matrix.apply(x), p);
                }
                out
            }
            Self::Branch {
                weights,
                threshold,
                if_true,
                if_false,
            } => {
                if weights.dot(x) >= *threshold {
                    if_true.apply_to_vector(x)
                } else {
                    if_false.apply_to_vector(x)
                }
            }
            Self::Clamp { key, lo, hi, inner } => {
                let inner_result = inner.apply_to_vector(x);
                inner_result.map(|v| {
                    let mut clamped = v.clone();
                    let mut value = v.get(key);
                    if let Some(lo) = lo {
                        value = value.max(*lo);
                    }
                    if let Some(hi) = hi {
                        value = value.min(*hi);
                    }
                    clamped.set(key.clone(), value);
                    clamped
                })
            }
        }
    }

    /// Apply this tree to every support vector of `d`, folding the results into one combined
    /// distribution weighted by both the input and output probabilities.
    pub fn apply_to_distribution(&self, d: &VectorDistribution) -> VectorDistribution {
        let mut out = VectorDistribution::new();
        for (x, &p) in d.iter() {
            let branch_out = self.apply_to_vector(x);
            for (y, &q) in branch_out.iter() {
                out.insert(y.clone(), p * q);
            }
        }
        out
    }

    /// Partially evaluate this tree given that the free parameter bound to `placeholder` takes
    /// the concrete value `value`, eliminating `placeholder` from every threshold and matrix
    /// row it appears in. This is the "substitute through desymbolize" step of the dynamics
    /// lookup algorithm: a PLT registered for an action's root verb may reference the action's
    /// free parameters symbolically via a placeholder key, and looking it up for a specific
    /// parameterized action resolves those placeholders to the action's actual argument values.
    pub fn desymbolize(&self, placeholder: &Key, value: f64) -> Self {
        match self {
            Self::Leaf(matrix) => Self::Leaf(substitute_matrix(matrix, placeholder, value)),
            Self::StochasticLeaf(dist) => {
                let mut out = MatrixDistribution::new();
                for (matrix, &p) in dist.iter() {
                    out.insert(substitute_matrix(matrix, placeholder, value), p);
                }
                Self::StochasticLeaf(out)
            }
            Self::Branch {
                weights,
                threshold,
                if_true,
                if_false,
            } => {
                let coeff = weights.get(placeholder);
                let mut new_weights = weights.clone();
                new_weights.remove(placeholder);
                Self::Branch {
                    weights: new_weights,
                    threshold: threshold - coeff * value,
                    if_true: Box::new(if_true.desymbolize(placeholder, value)),
                    if_false: Box::new(if_false.desymbolize(placeholder, value)),
                }
            }
            Self::Clamp { key, lo, hi, inner } => Self::Clamp {
                key: key.clone(),
                lo: *lo,
                hi: *hi,
                inner: Box::new(inner.desymbolize(placeholder, value)),
            },
        }
    }

    /// All keys this tree's branches or leaves read, for dependency analysis.
    pub fn keys_in(&self) -> BTreeSet<Key> {
        let mut keys = BTreeSet::new();
        self.collect_keys_in(&mut keys);
        keys
    }

    fn collect_keys_in(&self, keys: &mut BTreeSet<Key>) {
        match self {
            Self::Leaf(matrix) => keys.extend(matrix.keys_in().cloned()),
            Self::StochasticLeaf(dist) => {
                for (matrix, _) in dist.iter() {
                    keys.extend(matrix.keys_in().cloned());
                }
            }
            Self::Branch {
                weights,
                if_true,
                if_false,
                ..
            } => {
                keys.extend(weights.keys().cloned());
                if_true.collect_keys_in(keys);
                if_false.collect_keys_in(keys);
            }
            Self::Clamp { inner, .. } => inner.collect_keys_in(keys),
        }
    }

    /// All keys this tree writes (leaf output keys), for dependency analysis.
    pub fn keys_out(&self) -> BTreeSet<Key> {
        let mut keys = BTreeSet::new();
        self.collect_keys_out(&mut keys);
        keys
    }

    fn collect_keys_out(&self, keys: &mut BTreeSet<Key>) {
        match self {
            Self::Leaf(matrix) => keys.extend(matrix.keys_out().cloned()),
            Self::StochasticLeaf(dist) => {
                for (matrix, _) in dist.iter() {
                    keys.extend(matrix.keys_out().cloned());
                }
            }
            Self::Branch {
                if_true, if_false, ..
            } => {
                if_true.collect_keys_out(keys);
                if_false.collect_keys_out(keys);
            }
            Self::Clamp { key, inner, .. } => {
                keys.insert(key.clone());
                inner.collect_keys_out(keys);
            }
        }
    }
}

fn substitute_matrix(matrix: &KeyedMatrix, placeholder: &Key, value: f64) -> KeyedMatrix {
    let mut out = KeyedMatrix::new();
    for key in matrix.output_keys() {
        let row = matrix.row(key).expect("key came from output_keys iterator");
        let coeff = row.get(placeholder);
        let mut new_row = row.clone();
        new_row.remove(placeholder);
        let bias = new_row.get(&Key::constant()) + coeff * value;
        new_row.set(Key::constant(), bias);
        out.set_row(key.clone(), new_row);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn identity_matrix() -> KeyedMatrix {
        KeyedMatrix::new()
    }

    #[test]
    fn deterministic_leaf_produces_point_distribution() {
        let mut m = identity_matrix();
        let mut row = KeyedVector::new();
        row.set(Key::new("ready"), 0.0);
        row.set(Key::constant(), 1.0);
        m.set_row(Key::new("ready"), row);
        let plt = Plt::leaf(m);

        let x = KeyedVector::with_constant();
        let out = plt.apply_to_vector(&x);
        assert_eq!(out.len(), 1);
        assert_eq!(out.as_point().unwrap().get(&Key::new("ready")), 1.0);
    }

    #[test]
    fn stochastic_leaf_preserves_branch_probabilities() {
        let mut heads = identity_matrix();
        let mut heads_row = KeyedVector::new();
        heads_row.set(Key::constant(), 0.0);
        heads.set_row(Key::new("coin"), heads_row);

        let mut tails = identity_matrix();
        let mut tails_row = KeyedVector::new();
        tails_row.set(Key::constant(), 1.0);
        tails.set_row(Key::new("coin"), tails_row);

        let mut dist = MatrixDistribution::new();
        dist.insert(heads, 0.5);
        dist.insert(tails, 0.5);
        let plt = Plt::stochastic_leaf(dist);
        assert!(!plt.is_deterministic());

        let x = KeyedVector::with_constant();
        let out = plt.apply_to_vector(&x);
        assert_eq!(out.len(), 2);
        assert!((out.total_mass() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn branch_selects_subtree_by_threshold() {
        let mut weights = KeyedVector::new();
        weights.set(Key::new("score"), 1.0);

        let mut high = identity_matrix();
        let mut high_row = KeyedVector::new();
        high_row.set(Key::constant(), 100.0);
        high.set_row(Key::new("tier"), high_row);

        let mut low = identity_matrix();
        let mut low_row = KeyedVector::new();
        low_row.set(Key::constant(), 0.0);
        low.set_row(Key::new("tier"), low_row);

        let plt = Plt::branch(weights, 1.0, Plt::leaf(high), Plt::leaf(low));

        let mut x = KeyedVector::with_constant();
        x.set(Key::new("score"), 2.0);
        let out = plt.apply_to_vector(&x);
        assert_eq!(out.as_point().unwrap().get(&Key::new("tier")), 100.0);

        x.set(Key::new("score"), 0.0);
        let out = plt.apply_to_vector(&x);
        assert_eq!(out.as_point().unwrap().get(&Key::new("tier")), 0.0);
    }

    #[test]
    fn clamp_floors_and_ceilings_output() {
        let mut m = identity_matrix();
        let mut row = KeyedVector::new();
        row.set(Key::new("energy"), 1.0);
        m.set_row(Key::new("energy"), row);
        let plt = Plt::leaf(m).floor(Key::new("energy"), 0.0).ceil(Key::new("energy"), 100.0);

        let mut x = KeyedVector::with_constant();
        x.set(Key::new("energy"), -5.0);
        assert_eq!(plt.apply_to_vector(&x).as_point().unwrap().get(&Key::new("energy")), 0.0);

        x.set(Key::new("energy"), 500.0);
        assert_eq!(plt.apply_to_vector(&x).as_point().unwrap().get(&Key::new("energy")), 100.0);
    }

    #[test]
    fn desymbolize_eliminates_placeholder_from_branch() {
        let mut weights = KeyedVector::new();
        weights.set(Key::new("$amount"), 1.0);
        let plt = Plt::branch(
            weights,
            5.0,
            Plt::leaf(identity_matrix()),
            Plt::leaf(identity_matrix()),
        );
        let resolved = plt.desymbolize(&Key::new("$amount"), 10.0);
        if let Plt::Branch { weights, threshold, .. } = resolved {
            assert_eq!(weights.get(&Key::new("$amount")), 0.0);
            assert!((threshold - (-5.0)).abs() < f64::EPSILON);
        } else {
            panic!("expected a branch");
        }
    }
}
