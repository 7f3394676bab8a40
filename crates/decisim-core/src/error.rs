//! Engine-wide error taxonomy.
//!
//! Each module that needs its own error variants defines them here rather than scattering
//! small per-module enums, because nearly every operation in this crate can fail for reasons
//! that originate in a sibling module (e.g. a step failure is usually a dynamics failure). This
//! mirrors how the teacher composes `ClockError`/`DecisionError` into `TickError` via `#[from]`,
//! just flattened into one enum since the failure modes here are more tightly interdependent.

use decisim_types::{Action, ActionSet, Key, TypesError};

/// The top-level error type for every fallible operation in `decisim-core`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A reference to a key that was never declared via `World::define_variable` or similar.
    #[error("unknown key: {0}")]
    UnknownKey(Key),

    /// A reference to an agent that was never declared.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    /// A reference to a model that was never declared for its owning agent.
    #[error("unknown model {model} for agent {agent}")]
    UnknownModel {
        /// The agent the model was expected to belong to.
        agent: String,
        /// The model name that was not found.
        model: String,
    },

    /// An action verb or pattern that the dynamics registry has no entry for and no wildcard
    /// fallback resolves.
    #[error("unknown action: {0}")]
    UnknownAction(Action),

    /// A variable, agent, or model was defined twice.
    #[error("duplicate definition of {0}")]
    DuplicateDefinition(String),

    /// An action was supplied for an agent whose turn it is not.
    #[error("action supplied for {agent}, but it is {actual_turn}'s turn")]
    OutOfTurn {
        /// The agent the action was supplied for.
        agent: String,
        /// The agent whose turn it actually is.
        actual_turn: String,
    },

    /// Applying dynamics to `actions` from `starting_support` produced an empty distribution.
    #[error("no consistent transition for actions {actions} from {starting_support} starting vectors")]
    NoConsistentTransition {
        /// The action set that was attempted.
        actions: ActionSet,
        /// How many support vectors the starting state distribution had.
        starting_support: usize,
    },

    /// More than one agent returned a stochastic decision in the same step.
    #[error("stochastic fanout: {0} agents returned a stochastic decision in one step, at most 1 is supported")]
    StochasticFanout(usize),

    /// A point query was issued against a distribution with more than one support value.
    #[error("ambiguous query: distribution over {key} has {support_size} support values")]
    Ambiguous {
        /// The key the query was issued for.
        key: Key,
        /// How many distinct values the distribution actually has.
        support_size: usize,
    },

    /// A structural invariant of the engine was violated.
    #[error("invariant violation: {message}")]
    InvariantViolation {
        /// Description of which invariant failed and why.
        message: String,
    },

    /// A code path that requires functionality not yet supported by this engine.
    #[error("not yet implemented: {context}")]
    NotYetImplemented {
        /// What triggered the unsupported path.
        context: String,
    },

    /// Policy evaluation was asked to choose among zero legal actions.
    #[error("agent {agent} has no legal actions to choose among")]
    NoLegalActions {
        /// The agent whose choice set was empty.
        agent: String,
    },

    /// The subjective belief state a policy is using does not cover a key it needs to read.
    #[error("inconsistent beliefs: {message}")]
    InconsistentBeliefs {
        /// Description of the missing coverage.
        message: String,
    },

    /// A failure in the shared key/value/action vocabulary layer.
    #[error(transparent)]
    Types(#[from] TypesError),

    /// A failure loading or parsing [`crate::config::EngineConfig`].
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn out_of_turn_message_names_both_agents() {
        let err = CoreError::OutOfTurn {
            agent: "bob".to_string(),
            actual_turn: "alice".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("bob"));
        assert!(msg.contains("alice"));
    }
}
