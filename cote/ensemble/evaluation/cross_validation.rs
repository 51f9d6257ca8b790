use ndarray::Array2;
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use crate::{
    bagging::task::derive_task_seed,
    dataset::Dataset,
    errors::EstimatorResult,
    estimator::{uniform_distribution, Estimator},
};

use super::{checked_distribution, EstimateMethod, TrainEstimate, TrainEstimateEvaluator};

/// Upper bound on folds; smaller datasets use one fold per instance.
pub const MAX_FOLDS: usize = 10;

const CV_SEED_SALT: u64 = 5;

/// Stratified k-fold cross-validation. Every fold trains a fresh
/// [`Estimator::spawn_untrained`] copy, so no state leaks from the main model.
#[derive(Debug, Clone)]
pub struct CrossValidationEvaluator {
    seed: u64,
    max_folds: usize,
}

impl CrossValidationEvaluator {
    /// Evaluator with `min(10, n)` folds.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            max_folds: MAX_FOLDS,
        }
    }

    /// Overrides the fold cap.
    #[must_use]
    pub fn with_max_folds(mut self, folds: usize) -> Self {
        self.max_folds = folds.max(1);
        self
    }

    /// Folds used for `n` instances.
    #[must_use]
    pub fn folds_for(&self, n: usize) -> usize {
        self.max_folds.min(n)
    }

    /// Fold index per instance. Classes are shuffled independently and dealt
    /// round-robin so every fold sees each class in proportion.
    #[must_use]
    pub fn assign_folds(&self, data: &Dataset) -> Vec<usize> {
        let folds = self.folds_for(data.len()).max(1);
        let mut rng = SmallRng::seed_from_u64(derive_task_seed(self.seed, CV_SEED_SALT));
        let mut assignment = vec![0; data.len()];
        let mut dealt = 0usize;
        for class in 0..data.num_classes() {
            let mut members: Vec<usize> = data
                .labels()
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == class)
                .map(|(index, _)| index)
                .collect();
            members.shuffle(&mut rng);
            for index in members {
                assignment[index] = dealt % folds;
                dealt += 1;
            }
        }
        assignment
    }
}

impl TrainEstimateEvaluator for CrossValidationEvaluator {
    fn method(&self) -> EstimateMethod {
        EstimateMethod::Cv
    }

    fn estimate(&self, trained: &dyn Estimator, data: &Dataset) -> EstimatorResult<TrainEstimate> {
        let n = data.len();
        let classes = data.num_classes();
        let folds = self.folds_for(n);
        let mut posteriors = Array2::zeros((n, classes));
        // One instance cannot be split; report it unevaluated so weighting floors it.
        if folds < 2 {
            let uniform = uniform_distribution(classes);
            for mut row in posteriors.rows_mut() {
                for (cell, value) in row.iter_mut().zip(&uniform) {
                    *cell = *value;
                }
            }
            return TrainEstimate::new(
                EstimateMethod::Cv,
                posteriors,
                data.labels().to_vec(),
                vec![false; n],
            );
        }

        let assignment = self.assign_folds(data);
        for fold in 0..folds {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..n).partition(|index| assignment[*index] == fold);
            if test.is_empty() || train.is_empty() {
                continue;
            }
            let mut model = trained.spawn_untrained();
            model.train(&data.subset(&train)?)?;
            for index in test {
                let dist = checked_distribution(model.as_ref(), &data.instance(index), classes)?;
                for (class, probability) in dist.into_iter().enumerate() {
                    posteriors[[index, class]] = probability;
                }
            }
        }
        TrainEstimate::fully_evaluated(EstimateMethod::Cv, posteriors, data.labels().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::test_support::{balanced, MajorityClass};

    #[test]
    fn folds_are_capped_by_instances() {
        let cv = CrossValidationEvaluator::new(0);
        assert_eq!(cv.folds_for(4), 4);
        assert_eq!(cv.folds_for(40), 10);
    }

    #[test]
    fn stratified_assignment_balances_classes() {
        let data = balanced(10);
        let cv = CrossValidationEvaluator::new(7).with_max_folds(5);
        let assignment = cv.assign_folds(&data);
        for fold in 0..5 {
            for class in 0..2 {
                let count = assignment
                    .iter()
                    .zip(data.labels())
                    .filter(|(f, label)| **f == fold && **label == class)
                    .count();
                assert_eq!(count, 2);
            }
        }
    }

    #[test]
    fn assignment_is_seed_reproducible() {
        let data = balanced(10);
        let a = CrossValidationEvaluator::new(3).assign_folds(&data);
        let b = CrossValidationEvaluator::new(3).assign_folds(&data);
        assert_eq!(a, b);
    }

    #[test]
    fn main_model_is_left_untouched() {
        let data = balanced(5);
        let mut main = MajorityClass::default();
        main.train(&data.subset(&[0]).unwrap()).unwrap();
        let estimate = CrossValidationEvaluator::new(1).estimate(&main, &data).unwrap();
        assert_eq!(main.trained_on, 1);
        assert_eq!(estimate.method, EstimateMethod::Cv);
        assert!(estimate.evaluated.iter().all(|flag| *flag));
    }

    #[test]
    fn single_instance_is_left_unevaluated() {
        let data = balanced(1).subset(&[0]).unwrap();
        let estimate = CrossValidationEvaluator::new(1)
            .estimate(&MajorityClass::default(), &data)
            .unwrap();
        assert_eq!(estimate.evaluated, vec![false]);
        assert!((estimate.posteriors[[0, 0]] - 0.5).abs() < 1e-12);
    }
}
