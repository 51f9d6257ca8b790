//! Out-of-sample train estimates for ensemble members.

/// Stratified k-fold evaluation.
pub mod cross_validation;
/// Estimate container.
pub mod estimate;
/// Single-bootstrap out-of-bag evaluation.
pub mod out_of_bag;

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

pub use cross_validation::CrossValidationEvaluator;
pub use estimate::TrainEstimate;
pub use out_of_bag::OutOfBagEvaluator;

use crate::{
    dataset::Dataset,
    errors::{EstimatorError, EstimatorResult},
    estimator::Estimator,
};

/// How a module's train estimate is obtained when it cannot supply one itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EstimateMethod {
    /// Stratified cross-validation on fresh copies.
    #[default]
    Cv,
    /// Out-of-bag predictions from a bootstrap replica.
    Oob,
    /// Predictions of the trained model on its own training data.
    Train,
    /// No estimate; every module receives the floor weight.
    None,
}

impl fmt::Display for EstimateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cv => write!(f, "CV"),
            Self::Oob => write!(f, "OOB"),
            Self::Train => write!(f, "TRAIN"),
            Self::None => write!(f, "NONE"),
        }
    }
}

/// Produces a [`TrainEstimate`] for an estimator on its training data.
pub trait TrainEstimateEvaluator: Send + Sync {
    /// Method reported on produced estimates.
    fn method(&self) -> EstimateMethod;

    /// Runs the evaluation. `trained` is the module's main instance; evaluators
    /// that retrain work on [`Estimator::spawn_untrained`] copies and never touch it.
    fn estimate(&self, trained: &dyn Estimator, data: &Dataset) -> EstimatorResult<TrainEstimate>;
}

/// Predicts the training data with the already-trained model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResubstitutionEvaluator;

impl TrainEstimateEvaluator for ResubstitutionEvaluator {
    fn method(&self) -> EstimateMethod {
        EstimateMethod::Train
    }

    fn estimate(&self, trained: &dyn Estimator, data: &Dataset) -> EstimatorResult<TrainEstimate> {
        let mut posteriors = Array2::zeros((data.len(), data.num_classes()));
        for (row, instance) in data.instances().enumerate() {
            let dist = checked_distribution(trained, &instance, data.num_classes())?;
            for (class, probability) in dist.into_iter().enumerate() {
                posteriors[[row, class]] = probability;
            }
        }
        TrainEstimate::fully_evaluated(EstimateMethod::Train, posteriors, data.labels().to_vec())
    }
}

/// Builds the evaluator for `method`; `None` yields no evaluator.
#[must_use]
pub fn evaluator_for(method: EstimateMethod, seed: u64) -> Option<Box<dyn TrainEstimateEvaluator>> {
    match method {
        EstimateMethod::Cv => Some(Box::new(CrossValidationEvaluator::new(seed))),
        EstimateMethod::Oob => Some(Box::new(OutOfBagEvaluator::new(seed))),
        EstimateMethod::Train => Some(Box::new(ResubstitutionEvaluator)),
        EstimateMethod::None => None,
    }
}

pub(crate) fn checked_distribution(
    estimator: &dyn Estimator,
    instance: &crate::dataset::Instance<'_>,
    num_classes: usize,
) -> EstimatorResult<Vec<f64>> {
    let dist = estimator.predict_distribution(instance)?;
    if dist.len() != num_classes {
        return Err(EstimatorError::Predict(format!(
            "{} returned {} probabilities for {num_classes} classes",
            estimator.name(),
            dist.len()
        )));
    }
    Ok(dist)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        dataset::{Dataset, Instance},
        errors::EstimatorResult,
        estimator::{Capabilities, Estimator},
    };

    /// Predicts the majority class of whatever it was last trained on.
    #[derive(Debug, Clone, Default)]
    pub struct MajorityClass {
        pub dist: Vec<f64>,
        pub trained_on: usize,
    }

    impl Estimator for MajorityClass {
        fn name(&self) -> &str {
            "majority"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::none()
        }

        fn train(&mut self, data: &Dataset) -> EstimatorResult<()> {
            let counts = data.class_counts();
            let best = crate::combining::func::argmax(
                &counts.iter().map(|count| *count as f64).collect::<Vec<_>>(),
            );
            self.dist = vec![0.0; data.num_classes()];
            self.dist[best] = 1.0;
            self.trained_on = data.len();
            Ok(())
        }

        fn predict_distribution(&self, _instance: &Instance<'_>) -> EstimatorResult<Vec<f64>> {
            Ok(self.dist.clone())
        }

        fn spawn_untrained(&self) -> Box<dyn Estimator> {
            Box::new(Self::default())
        }
    }

    pub fn balanced(n_per_class: usize) -> Dataset {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for class in 0..2 {
            for i in 0..n_per_class {
                rows.push(vec![class as f64 * 10.0 + i as f64 * 0.01; 4]);
                labels.push(class);
            }
        }
        Dataset::from_rows("balanced", &rows, labels, 2).unwrap()
    }
}
