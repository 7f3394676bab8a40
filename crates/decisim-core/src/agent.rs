//! Agent mental models and the collaborator trait agents implement to plug into the engine.

use decisim_types::ActionSet;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::state::DistributionSet;
use crate::vector::KeyedVector;

/// An agent's subjective beliefs, as stored in one of its mental models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Beliefs {
    /// The agent's model of the world is exactly the true state (omniscient).
    True,
    /// The agent's beliefs are the same as another named model's.
    Pointer(String),
    /// The agent's own subjective distribution over world states.
    Subjective(Box<DistributionSet>),
}

/// One named hypothesis about an agent: its beliefs, how rationally it is assumed to act, and
/// whether it ever updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentModel {
    /// This model's beliefs about the world.
    pub beliefs: Beliefs,
    /// Softmax rationality parameter used both when this model drives lookahead and when it is
    /// the hypothesis being scored by a Bayesian state estimator.
    pub rationality: f64,
    /// The model this one was derived from, if any (used by garbage collection reachability).
    pub parent: Option<String>,
    /// If set, this model is never touched by the belief-update pass.
    pub is_static: bool,
}

impl AgentModel {
    /// An omniscient, non-static model with rationality `1.0`.
    pub fn omniscient() -> Self {
        Self {
            beliefs: Beliefs::True,
            rationality: 1.0,
            parent: None,
            is_static: false,
        }
    }

    /// A model with the given subjective beliefs and rationality.
    pub fn subjective(beliefs: DistributionSet, rationality: f64) -> Self {
        Self {
            beliefs: Beliefs::Subjective(Box::new(beliefs)),
            rationality,
            parent: None,
            is_static: false,
        }
    }
}

/// What an agent's `observe` function returns: either the deterministic true observation, or a
/// named partial observation. Only [`Observation::True`] is currently supported by the belief
/// updater; anything else surfaces as `CoreError::NotYetImplemented`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Observation {
    /// The agent observes the true post-step state exactly.
    True,
    /// The agent observes a named partial signal. Not yet supported end-to-end.
    Symbol(String),
}

/// The result of a policy choosing among legal actions: either one action (when
/// `single_choice` is set) or a distribution over tied actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decision {
    /// A single chosen action set.
    Single(ActionSet),
    /// A uniform distribution over tied action sets.
    Distribution(Distribution<ActionSet>),
}

/// The external collaborator every simulated agent implements.
///
/// Grounded on the engine's decision-source pattern: the world calls into this trait once per
/// turn to learn what actions are legal and, after a step, to update the agent's belief state.
/// Action *selection* itself is the engine's job (see [`crate::policy::LookaheadPolicy`]); this
/// trait supplies the ingredients a policy needs rather than the chosen action directly.
pub trait Agent {
    /// This agent's name, matching the subject field of the actions it proposes.
    fn name(&self) -> &str;

    /// The action sets this agent could legally perform from `state`.
    fn legal_actions(&self, state: &KeyedVector) -> Vec<ActionSet>;

    /// This agent's instantaneous reward for being in `state`, used by the lookahead policy to
    /// score projected futures.
    fn reward(&self, state: &KeyedVector) -> f64;

    /// What this agent observes about a post-step vector, given the actions that produced it.
    fn observe(&self, new_vector: &KeyedVector, actions: &ActionSet) -> Distribution<Observation>;

    /// Update `old_model`'s name to a new model name given an observation and the pre/post
    /// vectors, or `None` if no model is consistent with what was observed.
    fn state_estimator(
        &self,
        old_vector: &KeyedVector,
        new_vector: &KeyedVector,
        observation: &Observation,
        old_model: &str,
    ) -> Option<String>;
}
