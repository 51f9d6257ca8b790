use ndarray::Array2;
use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    bagging::task::{bootstrap_sample, derive_task_seed, in_bag_mask},
    dataset::Dataset,
    errors::EstimatorResult,
    estimator::{uniform_distribution, Estimator},
};

use super::{checked_distribution, EstimateMethod, TrainEstimate, TrainEstimateEvaluator};

const OOB_SEED_SALT: u64 = 11;

/// Trains one fresh copy on a bootstrap sample and predicts the rows it never saw.
/// In-bag rows receive a uniform distribution and are flagged unevaluated.
#[derive(Debug, Clone)]
pub struct OutOfBagEvaluator {
    seed: u64,
}

impl OutOfBagEvaluator {
    /// Evaluator drawing its bootstrap from `seed`.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { seed }
    }
}

impl TrainEstimateEvaluator for OutOfBagEvaluator {
    fn method(&self) -> EstimateMethod {
        EstimateMethod::Oob
    }

    fn estimate(&self, trained: &dyn Estimator, data: &Dataset) -> EstimatorResult<TrainEstimate> {
        let n = data.len();
        let classes = data.num_classes();
        let mut rng = SmallRng::seed_from_u64(derive_task_seed(self.seed, OOB_SEED_SALT));
        let sample = bootstrap_sample(n, &mut rng);
        let in_bag = in_bag_mask(n, &sample);

        let mut model = trained.spawn_untrained();
        model.train(&data.subset(&sample)?)?;

        let uniform = uniform_distribution(classes);
        let mut posteriors = Array2::zeros((n, classes));
        let mut evaluated = vec![false; n];
        for index in 0..n {
            let dist = if in_bag[index] {
                uniform.clone()
            } else {
                evaluated[index] = true;
                checked_distribution(model.as_ref(), &data.instance(index), classes)?
            };
            for (class, probability) in dist.into_iter().enumerate() {
                posteriors[[index, class]] = probability;
            }
        }
        TrainEstimate::new(
            EstimateMethod::Oob,
            posteriors,
            data.labels().to_vec(),
            evaluated,
        )
    }
}
