//! Optional reachability-based garbage collection over agent mental models.
//!
//! Never invoked automatically from `World::step`; a caller that wants to bound memory growth
//! from accumulating named models calls `World::collect_models` explicitly between steps.

use std::collections::{BTreeMap, BTreeSet};

use decisim_types::Key;
use tracing::debug;

use crate::agent::Beliefs;
use crate::error::CoreError;
use crate::state::DistributionSet;
use crate::symbol::SymbolTable;
use crate::world::World;

/// Remove every named model, for every agent, not reachable by two traversal sources: (a) the
/// model named in a model-key (`Key::model`) of any state vector in the top-level state or in
/// any subjective belief reachable so far, and (b) `parent` links and `Beliefs::Pointer`
/// references from a reachable model. Returns the number of models removed across all agents.
///
/// # Errors
///
/// Never errors today; reserved for a future cross-agent reachability pass over subjective
/// belief pointers that could detect a genuinely inconsistent cycle.
pub fn collect(world: &mut World) -> Result<usize, CoreError> {
    let agent_names: Vec<String> = world.agent_names().cloned().collect();

    let mut reachable: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for agent in &agent_names {
        reachable.insert(agent.clone(), local_reachable(world, agent));
    }

    // Source (a), recursive case: a reachable model's own subjective beliefs may name a model
    // for some *other* agent, extending that agent's reachable set in turn.
    for agent in &agent_names {
        let Ok(runtime) = world.agent_runtime(agent) else {
            continue;
        };
        let names = reachable.get(agent).cloned().unwrap_or_default();
        for name in &names {
            let Some(model) = runtime.models.get(name) else {
                continue;
            };
            if let Beliefs::Subjective(beliefs) = &model.beliefs {
                for (other, extra) in model_keys_in(beliefs, world.symbols()) {
                    reachable.entry(other).or_default().extend(extra);
                }
            }
        }
    }

    let mut removed = 0;
    for agent in &agent_names {
        let keep = reachable.get(agent).cloned().unwrap_or_default();
        removed += prune(world, agent, &keep);
    }
    Ok(removed)
}

/// Seed a frontier from `agent`'s active model plus every model name found in the top-level
/// state's `Key::model(agent)` marginal, then walk `parent`/`Beliefs::Pointer` to a fixed point.
fn local_reachable(world: &World, agent: &str) -> BTreeSet<String> {
    let Ok(runtime) = world.agent_runtime(agent) else {
        return BTreeSet::new();
    };

    let mut reachable = BTreeSet::new();
    let mut frontier = vec![runtime.active_model.clone()];
    if let Ok(marginal) = world.get_feature(&Key::model(agent)) {
        for (&bits, _) in marginal.iter() {
            if let Some(name) = world.symbols().resolve(f64::from_bits(bits)) {
                frontier.push(name.to_string());
            }
        }
    }

    while let Some(name) = frontier.pop() {
        if !reachable.insert(name.clone()) {
            continue;
        }
        let Some(model) = runtime.models.get(&name) else {
            continue;
        };
        if let Some(parent) = &model.parent {
            frontier.push(parent.clone());
        }
        if let Beliefs::Pointer(target) = &model.beliefs {
            frontier.push(target.clone());
        }
    }
    reachable
}

/// Every `(agent, model names)` pair named by a model-key found in `beliefs`'s own domain,
/// resolved back to strings through `symbols`.
fn model_keys_in(beliefs: &DistributionSet, symbols: &SymbolTable) -> Vec<(String, BTreeSet<String>)> {
    let mut found = Vec::new();
    for key in beliefs.domain() {
        let Some(other) = key.as_model_agent() else {
            continue;
        };
        let Ok(marginal) = beliefs.marginal(key) else {
            continue;
        };
        let mut names = BTreeSet::new();
        for (vector, _) in marginal.iter() {
            if let Some(name) = symbols.resolve(vector.get(key)) {
                names.insert(name.to_string());
            }
        }
        if !names.is_empty() {
            found.push((other.to_string(), names));
        }
    }
    found
}

fn prune(world: &mut World, agent: &str, reachable: &BTreeSet<String>) -> usize {
    let Some(runtime_mut) = world.agents_mut().get_mut(agent) else {
        return 0;
    };
    let before = runtime_mut.models.len();
    runtime_mut.models.retain(|name, _| reachable.contains(name));
    let dropped = before - runtime_mut.models.len();
    if dropped > 0 {
        debug!(%agent, dropped, "collected unreachable agent models");
    }
    dropped
}
