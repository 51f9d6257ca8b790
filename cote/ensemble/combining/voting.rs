use serde::{Deserialize, Serialize};

use crate::errors::{EnsembleError, EnsembleResult};

use super::{
    func::{argmax, normalize_or_uniform},
    weighting::ModuleWeight,
};

/// One module's contribution to a combined prediction.
#[derive(Debug, Clone, Copy)]
pub struct ModuleVote<'a> {
    /// Module name, reported when the vote is rejected.
    pub module: &'a str,
    /// Weight assigned at build time.
    pub weight: &'a ModuleWeight,
    /// The module's class distribution for the instance.
    pub distribution: &'a [f64],
}

/// How weighted module distributions are folded into one distribution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingScheme {
    /// Sums `weight[c] * p[c]` over modules.
    #[default]
    MajorityConfidence,
    /// Each module adds `weight[argmax]` to its predicted class.
    MajorityVote,
}

impl VotingScheme {
    /// Combines `votes` into a distribution over `num_classes` that sums to one.
    /// When no module contributes any mass the result is uniform.
    pub fn combine(&self, num_classes: usize, votes: &[ModuleVote<'_>]) -> EnsembleResult<Vec<f64>> {
        let mut combined = vec![0.0; num_classes];
        for vote in votes {
            if vote.distribution.len() != num_classes {
                return Err(EnsembleError::Prediction(format!(
                    "module {} returned {} probabilities for {num_classes} classes",
                    vote.module,
                    vote.distribution.len()
                )));
            }
            if vote
                .distribution
                .iter()
                .any(|p| !p.is_finite() || *p < 0.0)
            {
                return Err(EnsembleError::Prediction(format!(
                    "module {} returned an invalid distribution",
                    vote.module
                )));
            }
            match self {
                Self::MajorityConfidence => {
                    for (class, probability) in vote.distribution.iter().enumerate() {
                        combined[class] += vote.weight.for_class(class) * probability;
                    }
                }
                Self::MajorityVote => {
                    let predicted = argmax(vote.distribution);
                    combined[predicted] += vote.weight.for_class(predicted);
                }
            }
        }
        normalize_or_uniform(&mut combined);
        Ok(combined)
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MajorityConfidence => "majority_confidence",
            Self::MajorityVote => "majority_vote",
        }
    }
}
