//! The default Bayesian state estimator: softmax belief revision over a discrete set of
//! rationality hypotheses for an observed agent.

use std::collections::BTreeMap;

use decisim_types::Action;
use serde::{Deserialize, Serialize};

use crate::distribution::Distribution;
use crate::error::CoreError;

/// Revise `prior` (a distribution over model names) given that `observed` was the action
/// actually taken among `legal_actions`, where each model name's behavior is characterized by
/// a softmax rationality in `rationalities` and a scalar preference for each legal action
/// provided by `action_scores`.
///
/// The posterior over model `m` is proportional to `prior[m] * softmax_likelihood(observed |
/// m)`, where the softmax likelihood under hypothesis `m` is
/// `exp(rationality[m] * score[m][observed]) / sum_a exp(rationality[m] * score[m][a])`.
/// This is the default estimator described for agents that only need Bayesian revision over a
/// small set of rationality hypotheses (e.g. "rational" vs. "random"), per the worked example
/// of an observer growing confident that an actor is behaving rationally.
///
/// # Errors
///
/// Returns [`CoreError::InconsistentBeliefs`] if `legal_actions` is empty, or
/// [`CoreError::InvariantViolation`] if the resulting posterior has zero total mass (every
/// hypothesis assigned the observed action zero likelihood).
pub fn softmax_update(
    prior: &Distribution<String>,
    rationalities: &BTreeMap<String, f64>,
    action_scores: &BTreeMap<String, BTreeMap<Action, f64>>,
    observed: &Action,
    legal_actions: &[Action],
) -> Result<Distribution<String>, CoreError> {
    if legal_actions.is_empty() {
        return Err(CoreError::InconsistentBeliefs {
            message: "cannot update beliefs with an empty legal-action set".to_string(),
        });
    }

    let mut posterior = Distribution::new();
    for (model, &prior_mass) in prior.iter() {
        if prior_mass <= 0.0 {
            continue;
        }
        let rationality = rationalities.get(model).copied().unwrap_or(1.0);
        let scores = action_scores.get(model);
        let observed_score = scores.and_then(|s| s.get(observed)).copied().unwrap_or(0.0);

        let normalizer: f64 = legal_actions
            .iter()
            .map(|a| {
                let score = scores.and_then(|s| s.get(a)).copied().unwrap_or(0.0);
                (rationality * score).exp()
            })
            .sum();

        let likelihood = if normalizer > 0.0 {
            (rationality * observed_score).exp() / normalizer
        } else {
            0.0
        };

        posterior.insert(model.clone(), prior_mass * likelihood);
    }

    if posterior.total_mass() <= 0.0 {
        return Err(CoreError::InvariantViolation {
            message: "softmax update produced zero total posterior mass".to_string(),
        });
    }
    posterior.normalize()?;
    Ok(posterior)
}
