use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    combining::func::argmax,
    errors::{EstimatorError, EstimatorResult},
};

use super::EstimateMethod;

/// Out-of-sample class posteriors for every training instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainEstimate {
    /// How the posteriors were produced.
    pub method: EstimateMethod,
    /// One row per training instance, one column per class.
    pub posteriors: Array2<f64>,
    /// True labels in instance order.
    pub labels: Vec<usize>,
    /// Rows that received a genuine out-of-sample prediction.
    pub evaluated: Vec<bool>,
}

impl TrainEstimate {
    /// Validates and assembles an estimate.
    pub fn new(
        method: EstimateMethod,
        posteriors: Array2<f64>,
        labels: Vec<usize>,
        evaluated: Vec<bool>,
    ) -> EstimatorResult<Self> {
        if posteriors.nrows() != labels.len() || evaluated.len() != labels.len() {
            return Err(EstimatorError::InvalidData(format!(
                "estimate shape mismatch: {} rows, {} labels, {} flags",
                posteriors.nrows(),
                labels.len(),
                evaluated.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|label| **label >= posteriors.ncols()) {
            return Err(EstimatorError::InvalidData(format!(
                "label {bad} has no posterior column"
            )));
        }
        Ok(Self {
            method,
            posteriors,
            labels,
            evaluated,
        })
    }

    /// Estimate where every row was predicted out of sample.
    pub fn fully_evaluated(
        method: EstimateMethod,
        posteriors: Array2<f64>,
        labels: Vec<usize>,
    ) -> EstimatorResult<Self> {
        let evaluated = vec![true; labels.len()];
        Self::new(method, posteriors, labels, evaluated)
    }

    /// Number of classes (posterior columns).
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.posteriors.ncols()
    }

    /// Arg-max class per row, ties to the lowest index.
    #[must_use]
    pub fn predictions(&self) -> Vec<usize> {
        self.posteriors
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect()
    }

    /// Fraction of evaluated rows predicted correctly; zero when nothing was evaluated.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let predictions = self.predictions();
        let mut seen = 0usize;
        let mut correct = 0usize;
        for ((prediction, label), evaluated) in predictions
            .iter()
            .zip(&self.labels)
            .zip(&self.evaluated)
        {
            if *evaluated {
                seen += 1;
                if prediction == label {
                    correct += 1;
                }
            }
        }
        if seen == 0 {
            return 0.0;
        }
        correct as f64 / seen as f64
    }

    /// Per-class recall over evaluated rows; zero for classes never evaluated.
    #[must_use]
    pub fn class_accuracies(&self) -> Vec<f64> {
        let classes = self.num_classes();
        let predictions = self.predictions();
        let mut seen = vec![0usize; classes];
        let mut correct = vec![0usize; classes];
        for ((prediction, label), evaluated) in predictions
            .iter()
            .zip(&self.labels)
            .zip(&self.evaluated)
        {
            if *evaluated {
                seen[*label] += 1;
                if prediction == label {
                    correct[*label] += 1;
                }
            }
        }
        seen.iter()
            .zip(&correct)
            .map(|(seen, correct)| {
                if *seen == 0 {
                    0.0
                } else {
                    *correct as f64 / *seen as f64
                }
            })
            .collect()
    }
}
