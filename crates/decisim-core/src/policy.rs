//! The bounded-horizon lookahead policy: the default action-chooser every agent is driven by.

use std::collections::BTreeMap;

use decisim_types::ActionSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{Beliefs, Decision};
use crate::distribution::Distribution;
use crate::error::CoreError;
use crate::state::DistributionSet;
use crate::vector::KeyedVector;
use crate::world::World;

/// Bound on how many `Beliefs::Pointer` hops [`projected_state_for`] follows before giving up
/// and falling back to the true state, guarding against a cyclic model definition.
const MAX_POINTER_DEPTH: usize = 16;

/// A bounded-horizon expectimax action chooser.
///
/// Other agents whose turn coincides with the active agent's projected turns are modeled via
/// their own one-step lookahead (a fixed, shallow nested policy) rather than a full recursive
/// copy of this policy's own horizon -- this keeps worst-case projection cost polynomial rather
/// than exponential in `agent_count \u{d7} horizon` while still genuinely simulating their choice
/// instead of assuming a static default action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookaheadPolicy {
    /// How many steps forward to project.
    pub horizon: u32,
    /// Break ties by ascending string representation of the action.
    pub consistent_tie_breaking: bool,
    /// Return one action (`true`) or a uniform distribution over tied actions (`false`).
    pub single_choice: bool,
}

impl Default for LookaheadPolicy {
    fn default() -> Self {
        Self {
            horizon: 1,
            consistent_tie_breaking: true,
            single_choice: true,
        }
    }
}

impl LookaheadPolicy {
    /// Build a policy with the given horizon and the spec's default tie-breaking settings.
    pub fn with_horizon(horizon: u32) -> Self {
        Self {
            horizon,
            ..Self::default()
        }
    }

    /// Evaluate every legal action for `agent` at `state`, returning each action's projected
    /// value under this policy's horizon.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoLegalActions`] if `agent` has no legal actions at `state`, or
    /// propagates errors from dynamics application during projection.
    pub fn evaluate_choices(
        &self,
        world: &World,
        agent: &str,
        state: &KeyedVector,
    ) -> Result<BTreeMap<ActionSet, f64>, CoreError> {
        let runtime = world.agent_runtime(agent)?;
        let legal = runtime.agent.legal_actions(state);
        if legal.is_empty() {
            return Err(CoreError::NoLegalActions {
                agent: agent.to_string(),
            });
        }

        let mut values = BTreeMap::new();
        for action in legal {
            let value = self.action_value(world, agent, &action, state, self.horizon)?;
            values.insert(action, value);
        }
        Ok(values)
    }

    /// Choose the best action for `agent` at `state`, per [`Self::evaluate_choices`] and this
    /// policy's tie-breaking settings.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::evaluate_choices`].
    pub fn find_best(&self, world: &World, agent: &str, state: &KeyedVector) -> Result<Decision, CoreError> {
        let values = self.evaluate_choices(world, agent, state)?;
        let max_value = values
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        let mut tied: Vec<ActionSet> = values
            .into_iter()
            .filter(|(_, v)| (*v - max_value).abs() < 1e-9)
            .map(|(action, _)| action)
            .collect();

        if self.consistent_tie_breaking {
            tied.sort_by_key(ToString::to_string);
        }

        debug!(%agent, tied = tied.len(), value = max_value, "resolved lookahead choice");

        if self.single_choice {
            let chosen = tied.into_iter().next().ok_or_else(|| CoreError::NoLegalActions {
                agent: agent.to_string(),
            })?;
            Ok(Decision::Single(chosen))
        } else {
            let mut dist = Distribution::new();
            #[allow(clippy::cast_precision_loss)]
            let share = 1.0 / tied.len() as f64;
            for action in tied {
                dist.insert(action, share);
            }
            Ok(Decision::Distribution(dist))
        }
    }

    /// The expected cumulative reward of performing `action` at `state` and then acting
    /// optimally for the remaining horizon: `reward(state) + E[best future value]`, with the
    /// base case `horizon == 0` returning just `reward(state)` and any branch reaching
    /// `TERMINATED` contributing no further reward.
    fn action_value(
        &self,
        world: &World,
        agent: &str,
        action: &ActionSet,
        state: &KeyedVector,
        horizon: u32,
    ) -> Result<f64, CoreError> {
        let runtime = world.agent_runtime(agent)?;
        let immediate = runtime.agent.reward(state);

        if horizon == 0 || state.is_terminated() {
            return Ok(immediate);
        }

        let joint_actions = self.joint_actions_for(world, agent, action, state)?;
        let next_dist = world.step_from_state(state, &joint_actions)?;

        let mut future = 0.0;
        for (next_vec, &probability) in next_dist.iter() {
            if next_vec.is_terminated() {
                continue;
            }
            let best_next = self.best_value_at(world, agent, next_vec, horizon - 1)?;
            future += probability * best_next;
        }
        Ok(immediate + future)
    }

    /// The best achievable value for `agent` at `state` over `horizon` further steps, maximizing
    /// over `agent`'s own legal actions. Returns the instantaneous reward if there are no legal
    /// actions (the agent is forced to pass).
    fn best_value_at(&self, world: &World, agent: &str, state: &KeyedVector, horizon: u32) -> Result<f64, CoreError> {
        let runtime = world.agent_runtime(agent)?;
        if horizon == 0 || state.is_terminated() {
            return Ok(runtime.agent.reward(state));
        }
        let legal = runtime.agent.legal_actions(state);
        if legal.is_empty() {
            return Ok(runtime.agent.reward(state));
        }
        let mut best = f64::NEG_INFINITY;
        for action in legal {
            let value = self.action_value(world, agent, &action, state, horizon)?;
            best = best.max(value);
        }
        Ok(best)
    }

    /// Build the full joint action set for one projected step: `action` for `agent`, plus a
    /// projected action for every other agent whose turn coincides at `state`, each obtained
    /// from a bounded one-step nested policy over that agent's own legal actions. Per
    /// `SPEC_FULL.md` \u{a7}4.8, every other agent acts according to the *active policy's model of
    /// them* rather than their true `Agent` implementation against the literal true state: the
    /// nested lookahead projects from [`projected_state_for`], which resolves `agent`'s subjective
    /// beliefs about `other` when the active policy's model of `other` is not [`Beliefs::True`].
    fn joint_actions_for(
        &self,
        world: &World,
        agent: &str,
        action: &ActionSet,
        state: &KeyedVector,
    ) -> Result<ActionSet, CoreError> {
        let mut combined: Vec<decisim_types::Action> = action.iter().cloned().collect();
        let co_actors = world.turn_candidates(state);
        let nested = Self {
            horizon: 1,
            consistent_tie_breaking: self.consistent_tie_breaking,
            single_choice: true,
        };
        for other in &co_actors {
            if other == agent {
                continue;
            }
            let projection = projected_state_for(world, other, state);
            let decision = nested.find_best(world, other, &projection)?;
            match decision {
                Decision::Single(other_action) => combined.extend(other_action.iter().cloned()),
                Decision::Distribution(dist) => {
                    if let Some((chosen, _)) = dist
                        .iter()
                        .max_by(|a, b| a.1.total_cmp(b.1))
                    {
                        combined.extend(chosen.iter().cloned());
                    }
                }
            }
        }
        Ok(ActionSet::from_actions(combined))
    }
}

/// The state `other` is actually projected from when a different agent's policy models them:
/// `other`'s own active model's beliefs, rather than unconditionally the literal true state.
/// `Beliefs::Pointer` chains are followed up to [`MAX_POINTER_DEPTH`] hops; an unresolvable or
/// cyclic chain falls back to `true_state`, matching the `Beliefs::True` case.
fn projected_state_for(world: &World, other: &str, true_state: &KeyedVector) -> KeyedVector {
    let Ok(runtime) = world.agent_runtime(other) else {
        return true_state.clone();
    };

    let mut model_name = runtime.active_model.clone();
    for _ in 0..MAX_POINTER_DEPTH {
        let Some(model) = runtime.models.get(&model_name) else {
            return true_state.clone();
        };
        match &model.beliefs {
            Beliefs::True => return true_state.clone(),
            Beliefs::Subjective(beliefs) => return representative_of(beliefs),
            Beliefs::Pointer(target) => model_name = target.clone(),
        }
    }
    true_state.clone()
}

/// The highest-probability vector in a subjective [`DistributionSet`]'s own joint support,
/// mirroring `World`'s own representative-vector projection but over an agent's belief state
/// instead of the true world state.
fn representative_of(beliefs: &DistributionSet) -> KeyedVector {
    let mut combos: Vec<(KeyedVector, f64)> = vec![(KeyedVector::with_constant(), 1.0)];
    for (_, dist) in beliefs.substates() {
        let mut next = Vec::with_capacity(combos.len() * dist.len().max(1));
        for (vector, probability) in &combos {
            for (support_vector, &support_probability) in dist.iter() {
                let mut merged = vector.clone();
                for (k, v) in support_vector.iter() {
                    merged.set(k.clone(), *v);
                }
                next.push((merged, probability * support_probability));
            }
        }
        combos = next;
    }
    combos
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(vector, _)| vector)
        .unwrap_or_else(KeyedVector::with_constant)
}
