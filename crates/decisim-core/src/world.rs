//! The world: owns every declared variable, the dynamics and dependency graph built from them,
//! the turn scheduler, the factored state, and every agent's mental models. This is the single
//! orchestration point the rest of the crate exists to serve.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use decisim_types::{Action, ActionSet, Key, Value, VariableDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::{Agent, AgentModel, Decision, Observation};
use crate::config::EngineConfig;
use crate::dependency::DependencyGraph;
use crate::distribution::{Distribution, VectorDistribution};
use crate::dynamics::DynamicsRegistry;
use crate::error::CoreError;
use crate::estimator::softmax_update;
use crate::plt::Plt;
use crate::policy::LookaheadPolicy;
use crate::state::DistributionSet;
use crate::symbol::SymbolTable;
use crate::turn::{TurnScheduler, TurnSlot};
use crate::vector::KeyedVector;

/// One agent's runtime registration: its collaborator implementation, its named mental models,
/// and the policy driving its default action selection.
pub struct AgentRuntime {
    /// The agent's collaborator implementation.
    pub agent: Box<dyn Agent + Send + Sync>,
    /// Named mental-model hypotheses, including this agent's own (usually omniscient) model.
    pub models: BTreeMap<String, AgentModel>,
    /// Which named model currently drives this agent's own decisions.
    pub active_model: String,
    /// The lookahead policy used when no preset action is supplied for this agent's turn.
    pub policy: LookaheadPolicy,
}

/// The record of one resolved action set applied during a step, kept for explanation and
/// history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// The joint action set actually applied.
    pub actions: ActionSet,
    /// This outcome's probability among the branches considered for the step (`1.0` unless an
    /// agent returned a stochastic decision).
    pub probability: f64,
    /// Human-readable narration of what dynamics fired, for the explain surface.
    pub effect_log: Vec<String>,
}

/// The top-level simulation and decision engine.
pub struct World {
    variables: crate::variables::VariableRegistry,
    symbols: SymbolTable,
    dynamics: DynamicsRegistry,
    dependency_graph: DependencyGraph,
    turns: TurnScheduler,
    state: DistributionSet,
    agents: BTreeMap<String, AgentRuntime>,
    /// Posterior belief over which named model hypothesis truly describes each agent, shared
    /// across every observer. A simplification of the per-observer subjective beliefs the
    /// specification allows, documented in `DESIGN.md`.
    model_beliefs: BTreeMap<String, Distribution<String>>,
    history: Vec<Vec<StepOutcome>>,
    config: EngineConfig,
}

impl World {
    /// Build an empty world with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            variables: crate::variables::VariableRegistry::new(),
            symbols: SymbolTable::new(),
            dynamics: DynamicsRegistry::new(),
            dependency_graph: DependencyGraph::default(),
            turns: TurnScheduler::new(),
            state: DistributionSet::new(),
            agents: BTreeMap::new(),
            model_beliefs: BTreeMap::new(),
            history: Vec::new(),
            config,
        }
    }

    /// This world's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Declare a new variable.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateDefinition`] if the key is already declared.
    pub fn define_variable(&mut self, descriptor: VariableDescriptor) -> Result<(), CoreError> {
        self.variables.define(descriptor)
    }

    /// Set `key = value` in the current state, interning any new symbol.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from value conversion or state mutation.
    pub fn define_state(&mut self, key: Key, value: &Value) -> Result<(), CoreError> {
        let code = self.variables.value_to_float(&key, value, &mut self.symbols)?;
        self.state.join(key, code, None)
    }

    /// Declare a binary relation `relation(from, to) = value`.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from the underlying [`Self::define_state`].
    pub fn define_relation(&mut self, relation: &str, from: &str, to: &str, value: &Value) -> Result<(), CoreError> {
        self.define_state(Key::relation(relation, from, to), value)
    }

    /// Register `plt` as the dynamics for `key` under `pattern`, rebuilding the cached
    /// dependency graph.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if `key` is a turn key and `plt` is not
    /// deterministic (turn dynamics must never be stochastic).
    pub fn add_dynamics(
        &mut self,
        key: Key,
        pattern: decisim_types::ActionPattern,
        plt: Plt,
    ) -> Result<(), CoreError> {
        if key.as_turn_agent().is_some() && !plt.is_deterministic() {
            return Err(CoreError::InvariantViolation {
                message: format!("turn dynamics for {key} must be deterministic"),
            });
        }
        self.dynamics.set_dynamics(key, pattern, plt);
        self.dependency_graph = DependencyGraph::build(&self.dynamics);
        Ok(())
    }

    /// Set the turn order, joining turn-counter keys into the state.
    ///
    /// # Errors
    ///
    /// Propagates [`CoreError`] from the turn scheduler.
    pub fn set_order(&mut self, order: Vec<TurnSlot>) -> Result<(), CoreError> {
        self.turns.set_order(order, &mut self.state)
    }

    /// Register an agent with its mental models and starting active model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateDefinition`] if the agent name is already registered.
    pub fn add_agent(
        &mut self,
        agent: Box<dyn Agent + Send + Sync>,
        models: BTreeMap<String, AgentModel>,
        active_model: String,
        policy: LookaheadPolicy,
    ) -> Result<(), CoreError> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(CoreError::DuplicateDefinition(name));
        }
        let model_code = self.symbols.intern(&active_model);
        self.agents.insert(
            name.clone(),
            AgentRuntime {
                agent,
                models,
                active_model,
                policy,
            },
        );
        self.state.join(Key::model(&name), model_code, None)
    }

    /// Add or overwrite a named model for `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `agent` is not registered.
    pub fn set_model(&mut self, agent: &str, model_name: &str, model: AgentModel) -> Result<(), CoreError> {
        let runtime = self
            .agents
            .get_mut(agent)
            .ok_or_else(|| CoreError::UnknownAgent(agent.to_string()))?;
        runtime.models.insert(model_name.to_string(), model);
        Ok(())
    }

    /// Switch `agent`'s active model, updating both its runtime record and the model-key state
    /// entry every observer (and [`crate::gc::collect`]) reads.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `agent` is not registered, or
    /// [`CoreError::UnknownModel`] if `model_name` is not one of its registered models.
    pub fn set_active_model(&mut self, agent: &str, model_name: &str) -> Result<(), CoreError> {
        let known = self
            .agents
            .get(agent)
            .ok_or_else(|| CoreError::UnknownAgent(agent.to_string()))?
            .models
            .contains_key(model_name);
        if !known {
            return Err(CoreError::UnknownModel {
                agent: agent.to_string(),
                model: model_name.to_string(),
            });
        }
        let code = self.symbols.intern(model_name);
        let Some(runtime) = self.agents.get_mut(agent) else {
            return Err(CoreError::UnknownAgent(agent.to_string()));
        };
        runtime.active_model = model_name.to_string();
        self.state.join(Key::model(agent), code, None)
    }

    /// Read access to one agent's runtime registration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownAgent`] if `name` is not registered.
    pub fn agent_runtime(&self, name: &str) -> Result<&AgentRuntime, CoreError> {
        self.agents
            .get(name)
            .ok_or_else(|| CoreError::UnknownAgent(name.to_string()))
    }

    /// Every registered agent's name.
    pub fn agent_names(&self) -> impl Iterator<Item = &String> {
        self.agents.keys()
    }

    /// The marginal distribution over `key`'s value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownKey`] if `key` was never joined into the state.
    pub fn get_feature(&self, key: &Key) -> Result<Distribution<u64>, CoreError> {
        self.state.get_feature(key)
    }

    /// Whether the state is currently terminated.
    pub fn terminated(&self) -> bool {
        self.state.terminated()
    }

    /// This world's full step history, one entry per completed [`Self::step`] call.
    pub fn history(&self) -> &[Vec<StepOutcome>] {
        &self.history
    }

    /// The symbol table backing enum and action-set domains.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The declared variable registry.
    pub fn variables(&self) -> &crate::variables::VariableRegistry {
        &self.variables
    }

    /// The current belief about which model hypothesis describes `agent`, if any update has
    /// run.
    pub fn model_belief(&self, agent: &str) -> Option<&Distribution<String>> {
        self.model_beliefs.get(agent)
    }

    /// Seed (or overwrite) the prior belief over `agent`'s model hypotheses.
    pub fn set_model_belief(&mut self, agent: &str, prior: Distribution<String>) {
        self.model_beliefs.insert(agent.to_string(), prior);
    }

    /// Cross-product every substate's support into one joint `(vector, probability)` list. Only
    /// tractable because the scenarios this engine targets keep substate support small; see
    /// `DESIGN.md` for the scaling caveat.
    fn joint_support(&self) -> Vec<(KeyedVector, f64)> {
        let mut combos: Vec<(KeyedVector, f64)> = vec![(KeyedVector::with_constant(), 1.0)];
        for (_, dist) in self.state.substates() {
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
    }

    /// Re-derive each substate's independent marginal from a flattened joint distribution,
    /// normalizing each one.
    fn refactor_into_state(&mut self, joint: &VectorDistribution) -> Result<(), CoreError> {
        let labels: Vec<String> = self.state.substates().map(|(label, _)| label.clone()).collect();
        for label in labels {
            let keys: Vec<Key> = self
                .state
                .domain()
                .filter(|k| self.state.substate_of(k) == Some(&label))
                .cloned()
                .collect();
            let Some(first_key) = keys.first() else {
                continue;
            };
            let mut projected = VectorDistribution::new();
            for (vector, &probability) in joint.iter() {
                let mut sub_vector = KeyedVector::with_constant();
                for key in &keys {
                    sub_vector.set(key.clone(), vector.get(key));
                }
                projected.insert(sub_vector, probability);
            }
            projected.normalize()?;
            self.state.replace_substate(first_key, projected)?;
        }
        Ok(())
    }

    /// Which agents' turn it is next, given a single representative world vector.
    pub fn turn_candidates(&self, state: &KeyedVector) -> BTreeSet<String> {
        self.turns.next(state)
    }

    /// Apply `actions` to the single vector `x`, returning the resulting distribution over
    /// successor vectors. Pure: does not touch `self`'s committed state, model beliefs, or
    /// history, which is what lets the lookahead policy use it for hypothetical projection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoConsistentTransition`] if dynamics application empties the
    /// resulting distribution.
    pub fn step_from_state(&self, x: &KeyedVector, actions: &ActionSet) -> Result<VectorDistribution, CoreError> {
        if x.is_terminated() {
            return Ok(Distribution::point(x.clone()));
        }

        let mut current = VectorDistribution::point(x.clone());
        for scc in self.dependency_graph.evaluation_order() {
            for key in scc {
                let plts = self.dynamics.get_dynamics(key, actions);
                for plt in &plts {
                    current = plt.apply_to_distribution(&current);
                }
            }
        }

        current = self.turns.advance(&current);

        if current.is_empty() {
            return Err(CoreError::NoConsistentTransition {
                actions: actions.clone(),
                starting_support: 1,
            });
        }
        current.normalize()?;
        Ok(current)
    }

    /// Ask `agent`'s policy for a decision at `state`, defaulting to its registered policy if
    /// none is supplied.
    fn decide_for(&self, agent: &str, state: &KeyedVector) -> Result<Decision, CoreError> {
        let runtime = self.agent_runtime(agent)?;
        runtime.policy.find_best(self, agent, state)
    }

    /// The highest-probability vector in the current joint support, used as the single
    /// representative world the lookahead policy projects from. Ties broken by insertion order
    /// of the underlying hash map (arbitrary but stable within one process run).
    fn representative_vector(&self) -> Option<KeyedVector> {
        self.joint_support()
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(vector, _)| vector)
    }

    /// Advance the simulation by one step.
    ///
    /// `actions`, if given, presets the action for some or all of the agents whose turn it is;
    /// any agent not named there has its action chosen by its registered policy. Per
    /// `SPEC_FULL.md` \u{a7}4.5, this splits into one `step_from_state` per support vector of the
    /// current joint distribution: each possible world gets its own agent decisions, since an
    /// agent's `legal_actions`/`reward` may read a feature the support vectors disagree on.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OutOfTurn`] if `actions` names an agent whose turn it is not,
    /// [`CoreError::StochasticFanout`] if more than one acting agent returns a stochastic
    /// decision for the same support vector, or propagates errors from dynamics application.
    pub fn step(&mut self, actions: Option<BTreeMap<String, ActionSet>>) -> Result<Vec<StepOutcome>, CoreError> {
        if self.state.terminated() {
            return Ok(vec![StepOutcome {
                actions: ActionSet::new(),
                probability: 1.0,
                effect_log: vec!["state already terminated, step is a no-op".to_string()],
            }]);
        }

        let actors = self.turns.next_in_state(&self.state)?;
        if let Some(presets) = actions.as_ref() {
            for agent_name in presets.keys() {
                if !actors.contains(agent_name) {
                    return Err(CoreError::OutOfTurn {
                        agent: agent_name.clone(),
                        actual_turn: actors.iter().cloned().collect::<Vec<_>>().join(", "),
                    });
                }
            }
        }

        let joint_support = self.joint_support();
        let mut aggregated = VectorDistribution::new();
        let mut outcome_mass: BTreeMap<ActionSet, f64> = BTreeMap::new();
        let mut chosen_vector: Option<KeyedVector> = None;
        let mut chosen_branches: Vec<(ActionSet, f64)> = Vec::new();
        let mut chosen_probability = f64::NEG_INFINITY;

        for (x, xp) in &joint_support {
            let mut decisions: BTreeMap<String, Decision> = BTreeMap::new();
            for agent_name in &actors {
                if let Some(preset) = actions.as_ref().and_then(|m| m.get(agent_name)) {
                    decisions.insert(agent_name.clone(), Decision::Single(preset.clone()));
                } else {
                    let decision = self.decide_for(agent_name, x)?;
                    decisions.insert(agent_name.clone(), decision);
                }
            }

            let stochastic_count = decisions
                .values()
                .filter(|d| matches!(d, Decision::Distribution(_)))
                .count();
            if stochastic_count > 1 {
                return Err(CoreError::StochasticFanout(stochastic_count));
            }

            let branches = self.build_branches(&decisions)?;
            for (joint_actions, branch_probability) in &branches {
                let stepped = self.step_from_state(x, joint_actions)?;
                let combined_probability = xp * branch_probability;
                for (y, yp) in stepped.iter() {
                    aggregated.insert(y.clone(), combined_probability * yp);
                }
                *outcome_mass.entry(joint_actions.clone()).or_insert(0.0) += combined_probability;
            }

            if *xp > chosen_probability {
                chosen_probability = *xp;
                chosen_vector = Some(x.clone());
                chosen_branches = branches;
            }
        }

        let Some(pre_state) = chosen_vector else {
            return Err(CoreError::InvariantViolation {
                message: "cannot step a world with no state".to_string(),
            });
        };

        if aggregated.is_empty() {
            return Err(CoreError::NoConsistentTransition {
                actions: chosen_branches.first().map(|(a, _)| a.clone()).unwrap_or_default(),
                starting_support: joint_support.len(),
            });
        }
        aggregated.normalize()?;

        let outcomes: Vec<StepOutcome> = outcome_mass
            .into_iter()
            .map(|(joint_actions, probability)| {
                info!(actions = %joint_actions, probability, "applied step branch");
                StepOutcome {
                    effect_log: vec![format!("applied dynamics for {joint_actions}")],
                    actions: joint_actions,
                    probability,
                }
            })
            .collect();

        self.refactor_into_state(&aggregated)?;
        self.update_models(&chosen_branches, &pre_state)?;
        self.history.push(outcomes.clone());
        Ok(outcomes)
    }

    /// Combine each acting agent's decision into the set of joint action-set branches (with at
    /// most one stochastic actor already validated by the caller).
    fn build_branches(&self, decisions: &BTreeMap<String, Decision>) -> Result<Vec<(ActionSet, f64)>, CoreError> {
        let stochastic_agent = decisions
            .iter()
            .find(|(_, d)| matches!(d, Decision::Distribution(_)))
            .map(|(name, _)| name.clone());

        let Some(stochastic_agent) = stochastic_agent else {
            let mut combined: Vec<Action> = Vec::new();
            for decision in decisions.values() {
                if let Decision::Single(set) = decision {
                    combined.extend(set.iter().cloned());
                }
            }
            return Ok(vec![(ActionSet::from_actions(combined), 1.0)]);
        };

        let Decision::Distribution(dist) = &decisions[&stochastic_agent] else {
            return Err(CoreError::InvariantViolation {
                message: "expected a stochastic decision".to_string(),
            });
        };

        let mut branches = Vec::new();
        for (candidate, &probability) in dist.iter() {
            let mut combined: Vec<Action> = candidate.iter().cloned().collect();
            for (name, decision) in decisions {
                if *name == stochastic_agent {
                    continue;
                }
                if let Decision::Single(set) = decision {
                    combined.extend(set.iter().cloned());
                }
            }
            branches.push((ActionSet::from_actions(combined), probability));
        }
        Ok(branches)
    }

    /// Run the default softmax belief update for every agent with more than one registered
    /// model, comparing each hypothesis's rationality against the action it actually took this
    /// step (if any).
    fn update_models(&mut self, branches: &[(ActionSet, f64)], pre_state: &KeyedVector) -> Result<(), CoreError> {
        let Some((actions, _)) = branches.first() else {
            return Ok(());
        };

        for (agent_name, runtime) in &self.agents {
            if runtime.models.len() <= 1 {
                continue;
            }
            let Some(observed) = actions.by_subject(agent_name).next() else {
                continue;
            };

            let observation = runtime.agent.observe(pre_state, actions);
            let Some(observation_point) = observation.as_point() else {
                return Err(CoreError::NotYetImplemented {
                    context: format!("ambiguous observation for agent {agent_name}"),
                });
            };
            if !matches!(observation_point, Observation::True) {
                return Err(CoreError::NotYetImplemented {
                    context: format!("partial observation for agent {agent_name}"),
                });
            }

            if let Some(post_state) = self.representative_vector()
                && let Some(overridden) = runtime.agent.state_estimator(pre_state, &post_state, observation_point, &runtime.active_model)
            {
                write_model_belief(
                    &mut self.state,
                    &mut self.symbols,
                    &mut self.model_beliefs,
                    agent_name,
                    Distribution::point(overridden),
                )?;
                continue;
            }

            let legal_sets = runtime.agent.legal_actions(pre_state);
            let legal: Vec<Action> = legal_sets
                .iter()
                .filter_map(|set| set.by_subject(agent_name).next().cloned())
                .collect();
            if legal.is_empty() {
                continue;
            }

            let rationalities: BTreeMap<String, f64> = runtime
                .models
                .iter()
                .map(|(name, model)| (name.clone(), model.rationality))
                .collect();

            let prior = self
                .model_beliefs
                .get(agent_name)
                .cloned()
                .unwrap_or_else(|| uniform_over(runtime.models.keys()));

            let action_scores = self.reward_based_scores(runtime, &legal_sets, agent_name, pre_state);

            match softmax_update(&prior, &rationalities, &action_scores, observed, &legal) {
                Ok(posterior) => {
                    write_model_belief(
                        &mut self.state,
                        &mut self.symbols,
                        &mut self.model_beliefs,
                        agent_name,
                        posterior,
                    )?;
                }
                Err(err) => {
                    warn!(agent = %agent_name, error = %err, "belief update failed, keeping prior");
                }
            }
        }
        Ok(())
    }

    /// Per-model action preference scores used by the default softmax estimator: every model
    /// scores an action by this world's one-step lookahead value for that action under the
    /// agent's default policy, which is a reasonable stand-in for a per-hypothesis value
    /// function absent a more specific one from the collaborator.
    fn reward_based_scores(
        &self,
        runtime: &AgentRuntime,
        legal_sets: &[ActionSet],
        agent_name: &str,
        state: &KeyedVector,
    ) -> BTreeMap<String, BTreeMap<Action, f64>> {
        let mut out = BTreeMap::new();
        for model_name in runtime.models.keys() {
            let mut scores = BTreeMap::new();
            for action_set in legal_sets {
                let Some(atomic) = action_set.by_subject(agent_name).next() else {
                    continue;
                };
                let next = self
                    .step_from_state(state, action_set)
                    .map(|dist| {
                        dist.iter()
                            .map(|(v, &p)| p * runtime.agent.reward(v))
                            .fold(0.0, |acc, v| acc + v)
                    })
                    .unwrap_or_else(|_| runtime.agent.reward(state));
                scores.insert(atomic.clone(), next);
            }
            out.insert(model_name.clone(), scores);
        }
        out
    }

    /// Reachability-based model garbage collection. See [`crate::gc`].
    ///
    /// # Errors
    ///
    /// Never errors today; returns a `Result` for forward compatibility with a future
    /// cross-agent reachability pass that can fail on a detected cycle.
    pub fn collect_models(&mut self) -> Result<usize, CoreError> {
        crate::gc::collect(self)
    }

    /// Every joint action set some acting agent in `actors` could legally perform at `vector`,
    /// the Cartesian product of each actor's own `legal_actions`. An actor with no legal actions
    /// contributes nothing (it is treated as forced to pass).
    fn joint_action_space(&self, actors: &BTreeSet<String>, vector: &KeyedVector) -> Result<Vec<ActionSet>, CoreError> {
        let mut combos: Vec<Vec<Action>> = vec![Vec::new()];
        for agent_name in actors {
            let runtime = self.agent_runtime(agent_name)?;
            let legal = runtime.agent.legal_actions(vector);
            if legal.is_empty() {
                continue;
            }
            let mut next = Vec::with_capacity(combos.len() * legal.len());
            for prefix in &combos {
                for action_set in &legal {
                    let mut combined = prefix.clone();
                    combined.extend(action_set.iter().cloned());
                    next.push(combined);
                }
            }
            combos = next;
        }
        Ok(combos.into_iter().map(ActionSet::from_actions).collect())
    }

    /// Build the reachability envelope from `from` (or this world's current highest-probability
    /// vector if `None`): a BFS over [`Self::step_from_state`] across every joint action any
    /// acting agent could take, bounded by `horizon` steps (unbounded if `None`). Every vector
    /// visited maps to every joint action tried from it and the successor distribution it
    /// produced.
    ///
    /// # Errors
    ///
    /// Propagates errors from dynamics application.
    pub fn reachable(
        &self,
        from: Option<&KeyedVector>,
        horizon: Option<u32>,
    ) -> Result<HashMap<KeyedVector, BTreeMap<ActionSet, VectorDistribution>>, CoreError> {
        let start = match from {
            Some(vector) => vector.clone(),
            None => self.representative_vector().unwrap_or_else(KeyedVector::with_constant),
        };

        let mut transition: HashMap<KeyedVector, BTreeMap<ActionSet, VectorDistribution>> = HashMap::new();
        let mut visited: HashSet<KeyedVector> = HashSet::new();
        let mut frontier = vec![(start, 0u32)];

        while let Some((vector, depth)) = frontier.pop() {
            if !visited.insert(vector.clone()) {
                continue;
            }
            if vector.is_terminated() {
                continue;
            }
            if let Some(limit) = horizon
                && depth >= limit
            {
                continue;
            }

            let actors = self.turns.next(&vector);
            let action_sets = self.joint_action_space(&actors, &vector)?;
            let mut by_action = BTreeMap::new();
            for action_set in action_sets {
                let outcome = self.step_from_state(&vector, &action_set)?;
                for (next_vector, _) in outcome.iter() {
                    if !visited.contains(next_vector) {
                        frontier.push((next_vector.clone(), depth + 1));
                    }
                }
                by_action.insert(action_set, outcome);
            }
            transition.insert(vector, by_action);
        }

        Ok(transition)
    }

    pub(crate) fn agents_mut(&mut self) -> &mut BTreeMap<String, AgentRuntime> {
        &mut self.agents
    }
}

/// Commit `posterior` as `agent_name`'s model belief in two places: the convenience side map
/// every caller reads via [`World::model_belief`], and the model-key substate so
/// [`crate::gc::collect`] can read which model names stay reachable from the live state.
fn write_model_belief(
    state: &mut DistributionSet,
    symbols: &mut SymbolTable,
    model_beliefs: &mut BTreeMap<String, Distribution<String>>,
    agent_name: &str,
    posterior: Distribution<String>,
) -> Result<(), CoreError> {
    let mut dist = VectorDistribution::new();
    for (name, &probability) in posterior.iter() {
        let code = symbols.intern(name);
        let mut vector = KeyedVector::with_constant();
        vector.set(Key::model(agent_name), code);
        dist.insert(vector, probability);
    }
    state.replace_substate(&Key::model(agent_name), dist)?;
    model_beliefs.insert(agent_name.to_string(), posterior);
    Ok(())
}

fn uniform_over<'a>(names: impl Iterator<Item = &'a String>) -> Distribution<String> {
    let names: Vec<String> = names.cloned().collect();
    let mut dist = Distribution::new();
    #[allow(clippy::cast_precision_loss)]
    let share = 1.0 / names.len().max(1) as f64;
    for name in names {
        dist.insert(name, share);
    }
    dist
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use decisim_types::{ActionPattern, Combinator, Domain};

    use crate::matrix::KeyedMatrix;

    struct ReadyAgent {
        name: String,
    }

    impl Agent for ReadyAgent {
        fn name(&self) -> &str {
            &self.name
        }

        fn legal_actions(&self, _state: &KeyedVector) -> Vec<ActionSet> {
            vec![ActionSet::single(Action::new(&self.name, "set"))]
        }

        fn reward(&self, state: &KeyedVector) -> f64 {
            state.get(&Key::new("ready"))
        }

        fn observe(&self, _new_vector: &KeyedVector, _actions: &ActionSet) -> Distribution<Observation> {
            Distribution::point(Observation::True)
        }

        fn state_estimator(
            &self,
            _old_vector: &KeyedVector,
            _new_vector: &KeyedVector,
            _observation: &Observation,
            old_model: &str,
        ) -> Option<String> {
            Some(old_model.to_string())
        }
    }

    fn build_world() -> World {
        let mut world = World::new(EngineConfig::default());
        world
            .define_variable(VariableDescriptor::new(Key::new("ready"), Domain::Bool).with_combinator(Combinator::Single))
            .unwrap();
        world.define_state(Key::new("ready"), &Value::Bool(false)).unwrap();

        let mut set_matrix = KeyedMatrix::new();
        let mut row = KeyedVector::new();
        row.set(Key::constant(), 1.0);
        set_matrix.set_row(Key::new("ready"), row);
        let plt = Plt::leaf(set_matrix);
        let action = ActionSet::single(Action::new("alice", "set"));
        world
            .add_dynamics(Key::new("ready"), ActionPattern::Exact(action), plt)
            .unwrap();

        world
            .set_order(vec![TurnSlot::Single("alice".to_string())])
            .unwrap();

        let mut models = BTreeMap::new();
        models.insert("default".to_string(), AgentModel::omniscient());
        world
            .add_agent(
                Box::new(ReadyAgent { name: "alice".to_string() }),
                models,
                "default".to_string(),
                LookaheadPolicy::with_horizon(1),
            )
            .unwrap();
        world
    }

    #[test]
    fn step_applies_chosen_agent_action() {
        let mut world = build_world();
        world.step(None).unwrap();
        let value = world.get_feature(&Key::new("ready")).unwrap();
        let point = value.as_point().copied().unwrap();
        assert_eq!(f64::from_bits(point), 1.0);
    }

    #[test]
    fn terminated_state_makes_step_a_no_op() {
        let mut world = build_world();
        world
            .define_state(decisim_types::Key::terminated(), &Value::Bool(true))
            .unwrap();
        let outcomes = world.step(None).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].effect_log[0].contains("no-op"));
    }
}
