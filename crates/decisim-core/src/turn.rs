//! Turn scheduling: whose turn it is, and how turn counters advance between steps.

use std::collections::BTreeSet;

use decisim_types::Key;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::distribution::VectorDistribution;
use crate::error::CoreError;
use crate::plt::Plt;
use crate::state::DistributionSet;
use crate::vector::KeyedVector;

/// One slot in the turn order: a single agent acting alone, or a set of agents acting in
/// parallel at the same index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnSlot {
    /// One agent acts alone at this index.
    Single(String),
    /// These agents act simultaneously at this index.
    Parallel(Vec<String>),
}

impl TurnSlot {
    fn agents(&self) -> Vec<&str> {
        match self {
            Self::Single(name) => vec![name.as_str()],
            Self::Parallel(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Assigns and advances integer turn counters, one key per agent, all sharing one substate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnScheduler {
    order: Vec<TurnSlot>,
}

impl TurnScheduler {
    /// An empty scheduler (no agents yet assigned an order).
    pub fn new() -> Self {
        Self::default()
    }

    /// The highest turn-key value any agent may hold, `len(order) - 1`. Turn counters wrap to
    /// this value on decrementing past zero.
    pub fn max_turn(&self) -> u32 {
        self.order.len().saturating_sub(1) as u32
    }

    /// Set the turn order and initialize each agent's turn-key value to its index, joining the
    /// turn keys into `state` as one shared substate.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from the underlying [`DistributionSet::join`].
    #[allow(clippy::cast_precision_loss)]
    pub fn set_order(&mut self, order: Vec<TurnSlot>, state: &mut DistributionSet) -> Result<(), CoreError> {
        self.order = order;
        let mut shared_substate: Option<String> = None;
        for (index, slot) in self.order.iter().enumerate() {
            for agent in slot.agents() {
                let key = Key::turn(agent);
                let label = shared_substate.clone();
                state.join(key.clone(), index as f64, label.as_ref())?;
                if shared_substate.is_none() {
                    shared_substate = state.substate_of(&key).cloned();
                }
            }
        }
        Ok(())
    }

    /// The agents whose turn-key value is minimal in `vector` -- whose turn it is next.
    pub fn next(&self, vector: &KeyedVector) -> BTreeSet<String> {
        let mut best: Option<f64> = None;
        let mut winners = BTreeSet::new();
        for slot in &self.order {
            for agent in slot.agents() {
                let value = vector.get(&Key::turn(agent));
                match best {
                    None => {
                        best = Some(value);
                        winners.clear();
                        winners.insert(agent.to_string());
                    }
                    Some(b) if value < b => {
                        best = Some(value);
                        winners.clear();
                        winners.insert(agent.to_string());
                    }
                    Some(b) if (value - b).abs() < f64::EPSILON => {
                        winners.insert(agent.to_string());
                    }
                    _ => {}
                }
            }
        }
        winners
    }

    /// The agents whose turn it is next across a whole distribution set. If support vectors in
    /// the owning substate disagree on whose turn it is, logs at error level and falls back to
    /// the plurality choice by probability mass.
    pub fn next_in_state(&self, state: &DistributionSet) -> Result<BTreeSet<String>, CoreError> {
        let Some(first_agent) = self.order.first().and_then(|s| s.agents().into_iter().next()) else {
            return Ok(BTreeSet::new());
        };
        let marginal = state.marginal(&Key::turn(first_agent))?;

        let mut by_choice: std::collections::BTreeMap<BTreeSet<String>, f64> = std::collections::BTreeMap::new();
        for (vector, &p) in marginal.iter() {
            let choice = self.next(vector);
            *by_choice.entry(choice).or_insert(0.0) += p;
        }

        if by_choice.len() > 1 {
            error!(
                candidates = by_choice.len(),
                "support vectors disagree on whose turn it is; falling back to plurality choice"
            );
        }

        by_choice
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(choice, _)| choice)
            .ok_or_else(|| CoreError::InvariantViolation {
                message: "turn marginal had no support".to_string(),
            })
    }

    /// The default turn dynamics PLT for `agent`: decrement by 1, wrapping to `max_turn()` when
    /// already at 0. This PLT is always deterministic, satisfying the determinism requirement
    /// on turn dynamics.
    pub fn default_turn_plt(&self, agent: &str) -> Plt {
        let key = Key::turn(agent);
        let max_turn = f64::from(self.max_turn());

        let mut is_zero_weights = KeyedVector::new();
        is_zero_weights.set(key.clone(), -1.0);

        let mut wrap_matrix = crate::matrix::KeyedMatrix::new();
        let mut wrap_row = KeyedVector::new();
        wrap_row.set(Key::constant(), max_turn);
        wrap_matrix.set_row(key.clone(), wrap_row);

        let mut decrement_matrix = crate::matrix::KeyedMatrix::new();
        let mut decrement_row = KeyedVector::new();
        decrement_row.set(key.clone(), 1.0);
        decrement_row.set(Key::constant(), -1.0);
        decrement_matrix.set_row(key, decrement_row);

        // weights . x >= 0  <=>  -turn >= 0  <=>  turn <= 0, i.e. turn == 0 (turns never go negative).
        Plt::branch(is_zero_weights, 0.0, Plt::leaf(wrap_matrix), Plt::leaf(decrement_matrix))
    }

    /// Apply every agent's default turn dynamics to `dist`, advancing turn counters for one
    /// step. Returns the updated distribution; callers commit it via
    /// [`DistributionSet::replace_substate`].
    pub fn advance(&self, dist: &VectorDistribution) -> VectorDistribution {
        let mut current = dist.clone();
        for slot in &self.order {
            for agent in slot.agents() {
                let plt = self.default_turn_plt(agent);
                current = plt.apply_to_distribution(&current);
            }
        }
        current
    }
}
