//! The contract every ensemble member satisfies.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    dataset::{Dataset, Instance},
    errors::{EstimatorError, EstimatorResult},
    evaluation::TrainEstimate,
    telemetry::EnsembleTelemetry,
};

/// Optional behaviours an estimator supports, queried once at registration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Honors [`Estimator::set_time_limit`].
    pub contractable: bool,
    /// Produces its own out-of-sample train posteriors.
    pub self_estimating: bool,
    /// Honors [`Estimator::enable_parallelism`].
    pub multi_threadable: bool,
    /// Supports [`Estimator::save_state`] / [`Estimator::load_state`].
    pub checkpointable: bool,
}

impl Capabilities {
    /// No optional behaviour.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            contractable: false,
            self_estimating: false,
            multi_threadable: false,
            checkpointable: false,
        }
    }

    /// Sets the contractable flag.
    #[must_use]
    pub const fn contractable(mut self, value: bool) -> Self {
        self.contractable = value;
        self
    }

    /// Sets the self-estimating flag.
    #[must_use]
    pub const fn self_estimating(mut self, value: bool) -> Self {
        self.self_estimating = value;
        self
    }

    /// Sets the multi-threadable flag.
    #[must_use]
    pub const fn multi_threadable(mut self, value: bool) -> Self {
        self.multi_threadable = value;
        self
    }

    /// Sets the checkpointable flag.
    #[must_use]
    pub const fn checkpointable(mut self, value: bool) -> Self {
        self.checkpointable = value;
        self
    }
}

/// A trainable probabilistic classifier treated as a black box by the ensemble.
pub trait Estimator: Send + Sync {
    /// Short descriptive name.
    fn name(&self) -> &str;

    /// Capability flags. Must not change after construction.
    fn capabilities(&self) -> Capabilities;

    /// Fits the model on `data`.
    fn train(&mut self, data: &Dataset) -> EstimatorResult<()>;

    /// Class probabilities for one instance, summing to one.
    fn predict_distribution(&self, instance: &Instance<'_>) -> EstimatorResult<Vec<f64>>;

    /// Wall-clock training budget in nanoseconds. Ignored unless contractable.
    fn set_time_limit(&mut self, _nanos: i64) {}

    /// Worker threads to use while training. Ignored unless multi-threadable.
    fn enable_parallelism(&mut self, _threads: usize) {}

    /// Directory for internal progress snapshots. Ignored unless checkpointable.
    fn set_checkpoint_dir(&mut self, _dir: &Path) {}

    /// Telemetry handle for progress records.
    fn set_telemetry(&mut self, _telemetry: EnsembleTelemetry) {}

    /// Out-of-sample train posteriors from the last `train` call.
    fn train_estimate(&self) -> Option<TrainEstimate> {
        None
    }

    /// Identically configured, untrained copy.
    fn spawn_untrained(&self) -> Box<dyn Estimator>;

    /// Serializes trained state. `Ok(None)` means the estimator cannot be restored.
    fn save_state(&self) -> EstimatorResult<Option<serde_json::Value>> {
        Ok(None)
    }

    /// Restores state produced by [`Estimator::save_state`].
    fn load_state(&mut self, _state: serde_json::Value) -> EstimatorResult<()> {
        Err(EstimatorError::State(format!(
            "{} does not support state restoration",
            self.name()
        )))
    }
}

/// Uniform distribution over `num_classes`.
#[must_use]
pub fn uniform_distribution(num_classes: usize) -> Vec<f64> {
    if num_classes == 0 {
        return Vec::new();
    }
    vec![1.0 / num_classes as f64; num_classes]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_builders_compose() {
        let caps = Capabilities::none()
            .contractable(true)
            .checkpointable(true);
        assert!(caps.contractable && caps.checkpointable);
        assert!(!caps.self_estimating && !caps.multi_threadable);
    }

    #[test]
    fn uniform_sums_to_one() {
        let dist = uniform_distribution(3);
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(uniform_distribution(0).is_empty());
    }
}
