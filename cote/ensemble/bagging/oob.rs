use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    errors::{EstimatorError, EstimatorResult},
    estimator::uniform_distribution,
    evaluation::{EstimateMethod, TrainEstimate},
};

/// Votes one weak learner cast on its own out-of-bag instances.
///
/// Built privately by the worker that trained the learner and folded into an
/// [`OobAccumulator`] by the orchestrating thread after the batch joins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OobContribution {
    /// Vote weight of the learner.
    pub weight: f64,
    /// `(instance, distribution)` for every out-of-bag instance.
    pub votes: Vec<(usize, Vec<f64>)>,
}

/// Running out-of-bag sums and participation weights per training instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OobAccumulator {
    sums: Array2<f64>,
    weights: Vec<f64>,
}

impl OobAccumulator {
    /// Empty accumulator for `n` instances over `num_classes`.
    #[must_use]
    pub fn new(n: usize, num_classes: usize) -> Self {
        Self {
            sums: Array2::zeros((n, num_classes)),
            weights: vec![0.0; n],
        }
    }

    /// Instances tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether no instance is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Summed participation weight of instance `index`.
    #[must_use]
    pub fn participation(&self, index: usize) -> f64 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    /// Adds one learner's votes. Sums are commutative, so fold order is free.
    pub fn fold(&mut self, contribution: &OobContribution) -> EstimatorResult<()> {
        for (index, dist) in &contribution.votes {
            if *index >= self.len() || dist.len() != self.sums.ncols() {
                return Err(EstimatorError::State(format!(
                    "out-of-bag vote for instance {index} with {} classes does not fit {}x{}",
                    dist.len(),
                    self.len(),
                    self.sums.ncols()
                )));
            }
            for (class, probability) in dist.iter().enumerate() {
                self.sums[[*index, class]] += contribution.weight * probability;
            }
            self.weights[*index] += contribution.weight;
        }
        Ok(())
    }

    /// Final posteriors: sum over weight, uniform and unevaluated for instances
    /// that were never out of bag.
    pub fn estimate(&self, labels: &[usize]) -> EstimatorResult<TrainEstimate> {
        let classes = self.sums.ncols();
        let uniform = uniform_distribution(classes);
        let mut posteriors = Array2::zeros(self.sums.raw_dim());
        let mut evaluated = vec![false; self.len()];
        for (index, weight) in self.weights.iter().enumerate() {
            if *weight > 0.0 {
                evaluated[index] = true;
                for class in 0..classes {
                    posteriors[[index, class]] = self.sums[[index, class]] / weight;
                }
            } else {
                for (class, probability) in uniform.iter().enumerate() {
                    posteriors[[index, class]] = *probability;
                }
            }
        }
        TrainEstimate::new(EstimateMethod::Oob, posteriors, labels.to_vec(), evaluated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averages_weighted_votes() {
        let mut acc = OobAccumulator::new(2, 2);
        acc.fold(&OobContribution {
            weight: 1.0,
            votes: vec![(0, vec![1.0, 0.0])],
        })
        .unwrap();
        acc.fold(&OobContribution {
            weight: 3.0,
            votes: vec![(0, vec![0.0, 1.0])],
        })
        .unwrap();
        let estimate = acc.estimate(&[1, 0]).unwrap();
        assert!((estimate.posteriors[[0, 1]] - 0.75).abs() < 1e-12);
        assert_eq!(estimate.evaluated, vec![true, false]);
    }

    #[test]
    fn never_out_of_bag_is_uniform() {
        let acc = OobAccumulator::new(1, 4);
        let estimate = acc.estimate(&[2]).unwrap();
        assert_eq!(estimate.posteriors.row(0).to_vec(), vec![0.25; 4]);
        assert!(estimate.accuracy().abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_misshapen_votes() {
        let mut acc = OobAccumulator::new(1, 2);
        let err = acc.fold(&OobContribution {
            weight: 1.0,
            votes: vec![(3, vec![0.5, 0.5])],
        });
        assert!(err.is_err());
    }
}
