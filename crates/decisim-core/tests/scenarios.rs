//! End-to-end scenarios exercising a fully wired `World`: turn alternation, stochastic dynamics,
//! termination, tie-breaking, horizon-dependent choices, and belief revision.

#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use decisim_core::{
    Agent, AgentModel, CoreError, Decision, Distribution, EngineConfig, KeyedMatrix, KeyedVector,
    LookaheadPolicy, Observation, TurnSlot, World,
};
use decisim_types::{Action, ActionPattern, ActionSet, Domain, Key, Value, VariableDescriptor};

struct SingleActionAgent {
    name: &'static str,
    verb: &'static str,
}

impl Agent for SingleActionAgent {
    fn name(&self) -> &str {
        self.name
    }

    fn legal_actions(&self, _state: &KeyedVector) -> Vec<ActionSet> {
        vec![ActionSet::single(Action::new(self.name, self.verb))]
    }

    fn reward(&self, _state: &KeyedVector) -> f64 {
        0.0
    }

    fn observe(&self, _new_vector: &KeyedVector, _actions: &ActionSet) -> Distribution<Observation> {
        Distribution::point(Observation::True)
    }

    fn state_estimator(
        &self,
        _old_vector: &KeyedVector,
        _new_vector: &KeyedVector,
        _observation: &Observation,
        _old_model: &str,
    ) -> Option<String> {
        None
    }
}

fn constant_row(value: f64) -> KeyedVector {
    let mut row = KeyedVector::new();
    row.set(Key::constant(), value);
    row
}

#[test]
fn two_agents_alternate_turns_in_order() {
    let mut world = World::new(EngineConfig::default());
    world
        .define_variable(VariableDescriptor::new(Key::new("count"), Domain::Int { lo: None, hi: None }))
        .unwrap();
    world.define_state(Key::new("count"), &Value::Int(0)).unwrap();

    let mut increment = KeyedMatrix::new();
    let mut row = KeyedVector::new();
    row.set(Key::new("count"), 1.0);
    row.set(Key::constant(), 1.0);
    increment.set_row(Key::new("count"), row);
    world
        .add_dynamics(Key::new("count"), ActionPattern::True, decisim_core::Plt::leaf(increment))
        .unwrap();

    world
        .set_order(vec![TurnSlot::Single("alice".to_string()), TurnSlot::Single("bob".to_string())])
        .unwrap();

    world
        .add_agent(
            Box::new(SingleActionAgent { name: "alice", verb: "act" }),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();
    world
        .add_agent(
            Box::new(SingleActionAgent { name: "bob", verb: "act" }),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();

    let first = world.step(None).unwrap();
    assert_eq!(first.len(), 1);
    assert!(first[0].actions.by_subject("alice").next().is_some());
    assert!(first[0].actions.by_subject("bob").next().is_none());
    assert_eq!(
        f64::from_bits(*world.get_feature(&Key::new("count")).unwrap().iter().next().unwrap().0),
        1.0
    );

    let second = world.step(None).unwrap();
    assert!(second[0].actions.by_subject("bob").next().is_some());
    assert!(second[0].actions.by_subject("alice").next().is_none());
    assert_eq!(
        f64::from_bits(*world.get_feature(&Key::new("count")).unwrap().iter().next().unwrap().0),
        2.0
    );

    let third = world.step(None).unwrap();
    assert!(third[0].actions.by_subject("alice").next().is_some());
}

#[test]
fn stochastic_dynamics_keep_both_branches_in_the_marginal() {
    let mut world = World::new(EngineConfig::default());
    world
        .define_variable(VariableDescriptor::new(
            Key::new("coin"),
            Domain::EnumList(vec!["H".to_string(), "T".to_string()]),
        ))
        .unwrap();
    world.define_state(Key::new("coin"), &Value::Enum("H".to_string())).unwrap();

    let mut heads = KeyedMatrix::new();
    heads.set_row(Key::new("coin"), constant_row(0.0));
    let mut tails = KeyedMatrix::new();
    tails.set_row(Key::new("coin"), constant_row(1.0));
    let mut flips = Distribution::new();
    flips.insert(heads, 0.5);
    flips.insert(tails, 0.5);

    world
        .add_dynamics(
            Key::new("coin"),
            ActionPattern::Exact(ActionSet::single(Action::new("flipper", "flip"))),
            decisim_core::Plt::stochastic_leaf(flips),
        )
        .unwrap();

    world.set_order(vec![TurnSlot::Single("flipper".to_string())]).unwrap();
    world
        .add_agent(
            Box::new(SingleActionAgent { name: "flipper", verb: "flip" }),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();

    world.step(None).unwrap();

    let coin = world.get_feature(&Key::new("coin")).unwrap();
    assert_eq!(coin.len(), 2);
    for (&bits, &p) in coin.iter() {
        let value = f64::from_bits(bits);
        assert!(value == 0.0 || value == 1.0);
        assert!((p - 0.5).abs() < 1e-9);
    }
}

#[test]
fn reaching_zero_terminates_and_further_steps_are_no_ops() {
    let mut world = World::new(EngineConfig::default());
    world
        .define_variable(VariableDescriptor::new(Key::new("counter"), Domain::Int { lo: None, hi: None }))
        .unwrap();
    world.define_state(Key::new("counter"), &Value::Int(1)).unwrap();
    world
        .define_variable(VariableDescriptor::new(Key::terminated(), Domain::Bool))
        .unwrap();
    world.define_state(Key::terminated(), &Value::Bool(false)).unwrap();

    let mut decrement = KeyedMatrix::new();
    let mut row = KeyedVector::new();
    row.set(Key::new("counter"), 1.0);
    row.set(Key::constant(), -1.0);
    decrement.set_row(Key::new("counter"), row);
    world
        .add_dynamics(Key::new("counter"), ActionPattern::True, decisim_core::Plt::leaf(decrement))
        .unwrap();

    let mut weights = KeyedVector::new();
    weights.set(Key::new("counter"), -1.0);
    let terminate = decisim_core::Plt::leaf({
        let mut m = KeyedMatrix::new();
        m.set_row(Key::terminated(), constant_row(1.0));
        m
    });
    let stay_alive = decisim_core::Plt::leaf({
        let mut m = KeyedMatrix::new();
        m.set_row(Key::terminated(), constant_row(0.0));
        m
    });
    world
        .add_dynamics(
            Key::terminated(),
            ActionPattern::True,
            decisim_core::Plt::branch(weights, 0.0, terminate, stay_alive),
        )
        .unwrap();

    world.set_order(vec![TurnSlot::Single("actor".to_string())]).unwrap();
    world
        .add_agent(
            Box::new(SingleActionAgent { name: "actor", verb: "tick" }),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();

    world.step(None).unwrap();
    assert!(world.terminated());

    let outcomes = world.step(None).unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].actions.is_empty());
    assert!(outcomes[0].effect_log[0].contains("no-op"));
}

struct TieAgent;

impl Agent for TieAgent {
    fn name(&self) -> &str {
        "aria"
    }

    fn legal_actions(&self, _state: &KeyedVector) -> Vec<ActionSet> {
        vec![
            ActionSet::single(Action::new("aria", "banana")),
            ActionSet::single(Action::new("aria", "apple")),
        ]
    }

    fn reward(&self, _state: &KeyedVector) -> f64 {
        1.0
    }

    fn observe(&self, _new_vector: &KeyedVector, _actions: &ActionSet) -> Distribution<Observation> {
        Distribution::point(Observation::True)
    }

    fn state_estimator(
        &self,
        _old_vector: &KeyedVector,
        _new_vector: &KeyedVector,
        _observation: &Observation,
        _old_model: &str,
    ) -> Option<String> {
        None
    }
}

#[test]
fn tied_actions_break_alphabetically_by_display_string() {
    let mut world = World::new(EngineConfig::default());
    world
        .add_agent(
            Box::new(TieAgent),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();

    let policy = LookaheadPolicy::with_horizon(0);
    let state = KeyedVector::with_constant();
    let decision = policy.find_best(&world, "aria", &state).unwrap();
    match decision {
        Decision::Single(chosen) => {
            assert_eq!(chosen.iter().next().unwrap().verb, "apple");
        }
        Decision::Distribution(_) => panic!("expected a single tie-broken choice"),
    }
}

struct PrimeAgent;

impl Agent for PrimeAgent {
    fn name(&self) -> &str {
        "aria"
    }

    fn legal_actions(&self, state: &KeyedVector) -> Vec<ActionSet> {
        if state.get(&Key::new("primed")) >= 0.5 {
            vec![
                ActionSet::single(Action::new("aria", "grab")),
                ActionSet::single(Action::new("aria", "idle")),
            ]
        } else {
            vec![
                ActionSet::single(Action::new("aria", "prime")),
                ActionSet::single(Action::new("aria", "idle")),
            ]
        }
    }

    fn reward(&self, state: &KeyedVector) -> f64 {
        state.get(&Key::new("score"))
    }

    fn observe(&self, _new_vector: &KeyedVector, _actions: &ActionSet) -> Distribution<Observation> {
        Distribution::point(Observation::True)
    }

    fn state_estimator(
        &self,
        _old_vector: &KeyedVector,
        _new_vector: &KeyedVector,
        _observation: &Observation,
        _old_model: &str,
    ) -> Option<String> {
        None
    }
}

fn build_priming_world() -> World {
    let mut world = World::new(EngineConfig::default());

    let mut gain = KeyedMatrix::new();
    let mut gain_row = KeyedVector::new();
    gain_row.set(Key::new("score"), 1.0);
    gain_row.set(Key::constant(), 10.0);
    gain.set_row(Key::new("score"), gain_row);
    world
        .add_dynamics(
            Key::new("score"),
            ActionPattern::Exact(ActionSet::single(Action::new("aria", "grab"))),
            decisim_core::Plt::leaf(gain),
        )
        .unwrap();

    let mut set_primed = KeyedMatrix::new();
    set_primed.set_row(Key::new("primed"), constant_row(1.0));
    world
        .add_dynamics(
            Key::new("primed"),
            ActionPattern::Exact(ActionSet::single(Action::new("aria", "prime"))),
            decisim_core::Plt::leaf(set_primed),
        )
        .unwrap();

    world
        .add_agent(
            Box::new(PrimeAgent),
            BTreeMap::from([("default".to_string(), AgentModel::omniscient())]),
            "default".to_string(),
            LookaheadPolicy::default(),
        )
        .unwrap();
    world
}

#[test]
fn deeper_horizon_prefers_priming_before_grabbing() {
    let world = build_priming_world();
    let state = KeyedVector::with_constant();

    let shallow = LookaheadPolicy::with_horizon(1);
    let shallow_values = shallow.evaluate_choices(&world, "aria", &state).unwrap();
    let prime_action = ActionSet::single(Action::new("aria", "prime"));
    let idle_action = ActionSet::single(Action::new("aria", "idle"));
    assert!((shallow_values[&prime_action] - shallow_values[&idle_action]).abs() < 1e-9);

    let deep = LookaheadPolicy::with_horizon(2);
    let deep_values = deep.evaluate_choices(&world, "aria", &state).unwrap();
    assert!(deep_values[&prime_action] > deep_values[&idle_action]);

    match shallow.find_best(&world, "aria", &state).unwrap() {
        Decision::Single(chosen) => assert_eq!(chosen, idle_action),
        Decision::Distribution(_) => panic!("expected a single choice"),
    }
    match deep.find_best(&world, "aria", &state).unwrap() {
        Decision::Single(chosen) => assert_eq!(chosen, prime_action),
        Decision::Distribution(_) => panic!("expected a single choice"),
    }
}

struct ObservableAgent;

impl Agent for ObservableAgent {
    fn name(&self) -> &str {
        "actor"
    }

    fn legal_actions(&self, _state: &KeyedVector) -> Vec<ActionSet> {
        vec![
            ActionSet::single(Action::new("actor", "good")),
            ActionSet::single(Action::new("actor", "bad")),
        ]
    }

    fn reward(&self, state: &KeyedVector) -> f64 {
        state.get(&Key::new("score"))
    }

    fn observe(&self, _new_vector: &KeyedVector, _actions: &ActionSet) -> Distribution<Observation> {
        Distribution::point(Observation::True)
    }

    fn state_estimator(
        &self,
        _old_vector: &KeyedVector,
        _new_vector: &KeyedVector,
        _observation: &Observation,
        _old_model: &str,
    ) -> Option<String> {
        None
    }
}

#[test]
fn belief_update_converges_toward_the_rational_model() {
    let mut world = World::new(EngineConfig::default());
    world
        .define_variable(VariableDescriptor::new(Key::new("score"), Domain::Int { lo: None, hi: None }))
        .unwrap();
    world.define_state(Key::new("score"), &Value::Int(0)).unwrap();

    let mut gain = KeyedMatrix::new();
    let mut gain_row = KeyedVector::new();
    gain_row.set(Key::new("score"), 1.0);
    gain_row.set(Key::constant(), 1.0);
    gain.set_row(Key::new("score"), gain_row);
    world
        .add_dynamics(
            Key::new("score"),
            ActionPattern::Exact(ActionSet::single(Action::new("actor", "good"))),
            decisim_core::Plt::leaf(gain),
        )
        .unwrap();

    world.set_order(vec![TurnSlot::Single("actor".to_string())]).unwrap();

    let mut models = BTreeMap::new();
    models.insert("rational".to_string(), {
        let mut m = AgentModel::omniscient();
        m.rationality = 5.0;
        m
    });
    models.insert("random".to_string(), {
        let mut m = AgentModel::omniscient();
        m.rationality = 0.0;
        m
    });
    world
        .add_agent(Box::new(ObservableAgent), models, "rational".to_string(), LookaheadPolicy::default())
        .unwrap();

    assert!(world.model_belief("actor").is_none());
    world.step(None).unwrap();

    let belief = world.model_belief("actor").expect("belief update should have run");
    assert!(belief.probability(&"rational".to_string()) > 0.5);
    assert!(belief.probability(&"rational".to_string()) > belief.probability(&"random".to_string()));
}

#[test]
fn querying_an_undeclared_key_is_an_error() {
    let world = World::new(EngineConfig::default());
    let result = world.get_feature(&Key::new("ghost"));
    assert!(matches!(result, Err(CoreError::UnknownKey(_))));
}
