//! Dependency graph over keys, derived from registered dynamics, condensed into strongly
//! connected components and ordered topologically.

use std::collections::{BTreeMap, BTreeSet};

use decisim_types::Key;
use serde::{Deserialize, Serialize};

use crate::dynamics::DynamicsRegistry;

/// A dependency graph over keys with an edge `u -> v` whenever some PLT for `v` reads `u`.
///
/// The condensation (SCCs collapsed to single nodes) is topologically ordered; each SCC's keys
/// must be evaluated together, from the pre-step snapshot, before the next SCC may read their
/// results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Each entry is one strongly connected component, in an order such that no component
    /// depends on a component that appears later in this list.
    sccs: Vec<Vec<Key>>,
}

impl DependencyGraph {
    /// Build the dependency graph over every key with registered dynamics in `registry`.
    pub fn build(registry: &DynamicsRegistry) -> Self {
        let mut edges: BTreeMap<Key, BTreeSet<Key>> = BTreeMap::new();
        let mut nodes: BTreeSet<Key> = BTreeSet::new();

        for key in registry.keys() {
            nodes.insert(key.clone());
            for plt in registry.plts_for(key) {
                for input in plt.keys_in() {
                    if &input != key {
                        nodes.insert(input.clone());
                        edges.entry(input.clone()).or_default().insert(key.clone());
                    }
                }
            }
        }

        let sccs = tarjan_scc(&nodes, &edges);
        Self { sccs }
    }

    /// Iterate strongly connected components in dependency order; each yielded slice must be
    /// evaluated as one atomic unit from the pre-step state.
    pub fn evaluation_order(&self) -> impl Iterator<Item = &[Key]> {
        self.sccs.iter().map(Vec::as_slice)
    }

    /// The number of components.
    pub fn len(&self) -> usize {
        self.sccs.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.sccs.is_empty()
    }
}

/// Tarjan's strongly-connected-components algorithm, returning components in reverse
/// postorder -- which is already a valid topological order of the condensation.
fn tarjan_scc(nodes: &BTreeSet<Key>, edges: &BTreeMap<Key, BTreeSet<Key>>) -> Vec<Vec<Key>> {
    struct State<'a> {
        edges: &'a BTreeMap<Key, BTreeSet<Key>>,
        index: BTreeMap<Key, usize>,
        lowlink: BTreeMap<Key, usize>,
        on_stack: BTreeSet<Key>,
        stack: Vec<Key>,
        counter: usize,
        output: Vec<Vec<Key>>,
    }

    fn strongconnect(node: &Key, state: &mut State<'_>) {
        state.index.insert(node.clone(), state.counter);
        state.lowlink.insert(node.clone(), state.counter);
        state.counter += 1;
        state.stack.push(node.clone());
        state.on_stack.insert(node.clone());

        if let Some(successors) = state.edges.get(node) {
            for successor in successors.clone() {
                if !state.index.contains_key(&successor) {
                    strongconnect(&successor, state);
                    let succ_low = state.lowlink[&successor];
                    let entry = state.lowlink.get_mut(node).expect("node pushed above");
                    *entry = (*entry).min(succ_low);
                } else if state.on_stack.contains(&successor) {
                    let succ_index = state.index[&successor];
                    let entry = state.lowlink.get_mut(node).expect("node pushed above");
                    *entry = (*entry).min(succ_index);
                }
            }
        }

        if state.lowlink[node] == state.index[node] {
            let mut component = Vec::new();
            loop {
                let Some(w) = state.stack.pop() else { break };
                state.on_stack.remove(&w);
                let done = w == *node;
                component.push(w);
                if done {
                    break;
                }
            }
            component.sort();
            state.output.push(component);
        }
    }

    let mut state = State {
        edges,
        index: BTreeMap::new(),
        lowlink: BTreeMap::new(),
        on_stack: BTreeSet::new(),
        stack: Vec::new(),
        counter: 0,
        output: Vec::new(),
    };

    for node in nodes {
        if !state.index.contains_key(node) {
            strongconnect(node, &mut state);
        }
    }

    // Tarjan emits components in reverse topological order (a component is finished, and thus
    // pushed, only after everything it depends on); reverse so dependencies come first.
    state.output.reverse();
    state.output
}
