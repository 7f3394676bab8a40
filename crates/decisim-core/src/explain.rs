//! Diagnostic narration surface: explain levels `0` (silent) through `5` (full per-step
//! subjective-world dump), each level additionally mirrored through `tracing` at a matching
//! verbosity so the same narration is available both as a returned string and in structured
//! logs.

use tracing::{debug, info, trace};

use crate::agent::Beliefs;
use crate::state::DistributionSet;
use crate::world::{StepOutcome, World};

/// Render a narration string for one step's outcomes at `level`, emitting the same content
/// through `tracing` as it is built.
///
/// - `0`: no narration, nothing logged.
/// - `1`: one line per branch naming the actions taken (`info!`).
/// - `2` (and above): adds each branch's probability to the same line.
/// - `3`: adds the dynamics narration already collected in `effect_log` (`debug!`).
/// - `4`: adds the current belief-over-models snapshot for every agent with more than one model
///   (`debug!`).
/// - `5`: adds a subjective-world summary for every agent model with its own beliefs (`trace!`).
pub fn narrate(world: &World, outcomes: &[StepOutcome], level: u8) -> String {
    if level == 0 {
        return String::new();
    }

    let mut lines = Vec::new();
    for outcome in outcomes {
        if level >= 2 {
            lines.push(format!("applied {} (p={:.4})", outcome.actions, outcome.probability));
        } else {
            lines.push(format!("applied {}", outcome.actions));
        }
        info!(actions = %outcome.actions, probability = outcome.probability, "step narration");

        if level >= 3 {
            for entry in &outcome.effect_log {
                lines.push(format!("  {entry}"));
                debug!(%entry, "effect narration");
            }
        }
    }

    if level >= 4 {
        for agent in world.agent_names() {
            if let Some(belief) = world.model_belief(agent) {
                let rendered: Vec<String> = belief
                    .iter()
                    .map(|(model, &p)| format!("{model}={p:.3}"))
                    .collect();
                let line = format!("{agent}'s model belief: [{}]", rendered.join(", "));
                debug!(%agent, belief = %line, "model belief narration");
                lines.push(line);
            }
        }
    }

    if level >= 5 {
        for agent in world.agent_names() {
            let Ok(runtime) = world.agent_runtime(agent) else {
                continue;
            };
            for (model_name, model) in &runtime.models {
                if let Beliefs::Subjective(beliefs) = &model.beliefs {
                    let line = format!(
                        "{agent}'s model {model_name} tracks {} subjective substates",
                        substate_count(beliefs)
                    );
                    trace!(%agent, %model_name, belief = %line, "subjective world dump");
                    lines.push(line);
                }
            }
        }
    }

    lines.join("\n")
}

fn substate_count(beliefs: &DistributionSet) -> usize {
    beliefs.substates().count()
}
