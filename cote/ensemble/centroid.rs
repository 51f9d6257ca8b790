//! Nearest class-mean classification, standalone or on derived features.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    combining::func::one_hot,
    dataset::{Dataset, Instance},
    errors::{EstimatorError, EstimatorResult},
    estimator::{uniform_distribution, Capabilities, Estimator},
};

/// Class means in some feature space. Classes absent from the training rows
/// have no centroid and are never predicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidModel {
    centroids: Vec<Option<Array1<f64>>>,
}

impl CentroidModel {
    /// Fits one mean per class over the rows of `features`.
    pub fn fit(
        features: ArrayView2<'_, f64>,
        labels: &[usize],
        num_classes: usize,
    ) -> EstimatorResult<Self> {
        if features.nrows() != labels.len() {
            return Err(EstimatorError::InvalidData(format!(
                "{} feature rows for {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        let mut sums = Array2::<f64>::zeros((num_classes, features.ncols()));
        let mut counts = vec![0usize; num_classes];
        for (row, label) in features.axis_iter(Axis(0)).zip(labels) {
            if *label >= num_classes {
                return Err(EstimatorError::InvalidData(format!(
                    "label {label} out of range"
                )));
            }
            let mut sum = sums.row_mut(*label);
            sum += &row;
            counts[*label] += 1;
        }
        let centroids = sums
            .axis_iter(Axis(0))
            .zip(&counts)
            .map(|(sum, count)| (*count > 0).then(|| &sum / *count as f64))
            .collect();
        Ok(Self { centroids })
    }

    /// Number of classes the model was fitted for.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.centroids.len()
    }

    /// One-hot on the closest centroid; ties resolve to the lowest class.
    pub fn predict(&self, features: ArrayView1<'_, f64>) -> EstimatorResult<Vec<f64>> {
        let mut best: Option<(usize, f64)> = None;
        for (class, centroid) in self.centroids.iter().enumerate() {
            let Some(centroid) = centroid else { continue };
            if centroid.len() != features.len() {
                return Err(EstimatorError::Predict(format!(
                    "expected {} features, got {}",
                    centroid.len(),
                    features.len()
                )));
            }
            let distance: f64 = centroid
                .iter()
                .zip(features.iter())
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            if best.map_or(true, |(_, closest)| distance < closest) {
                best = Some((class, distance));
            }
        }
        Ok(best.map_or_else(
            || uniform_distribution(self.num_classes()),
            |(class, _)| one_hot(class, self.num_classes()),
        ))
    }
}

/// Whole-series nearest centroid. Cheap, deterministic, and neither
/// contractable nor self-estimating.
#[derive(Debug, Clone, Default)]
pub struct NearestCentroid {
    model: Option<CentroidModel>,
}

impl NearestCentroid {
    /// Untrained classifier.
    #[must_use]
    pub const fn new() -> Self {
        Self { model: None }
    }
}

impl Estimator for NearestCentroid {
    fn name(&self) -> &str {
        "NearestCentroid"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().checkpointable(true)
    }

    fn train(&mut self, data: &Dataset) -> EstimatorResult<()> {
        self.model = Some(CentroidModel::fit(
            data.values().view(),
            data.labels(),
            data.num_classes(),
        )?);
        Ok(())
    }

    fn predict_distribution(&self, instance: &Instance<'_>) -> EstimatorResult<Vec<f64>> {
        self.model
            .as_ref()
            .ok_or_else(|| EstimatorError::Predict("NearestCentroid is not trained".into()))?
            .predict(instance.values)
    }

    fn spawn_untrained(&self) -> Box<dyn Estimator> {
        Box::new(Self::new())
    }

    fn save_state(&self) -> EstimatorResult<Option<serde_json::Value>> {
        self.model
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|err| EstimatorError::State(err.to_string()))
    }

    fn load_state(&mut self, state: serde_json::Value) -> EstimatorResult<()> {
        self.model =
            Some(serde_json::from_value(state).map_err(|err| EstimatorError::State(err.to_string()))?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> Dataset {
        Dataset::from_rows(
            "blobs",
            &[
                vec![0.0, 0.1, 0.0],
                vec![0.2, 0.0, 0.1],
                vec![5.0, 5.1, 4.9],
                vec![5.2, 4.8, 5.0],
            ],
            vec![0, 0, 1, 1],
            2,
        )
        .unwrap()
    }

    #[test]
    fn predicts_nearest_class_mean() {
        let mut model = NearestCentroid::new();
        model.train(&two_blobs()).unwrap();
        let far = ndarray::array![4.0, 4.0, 4.0];
        let dist = model.predict_distribution(&Instance::detached(far.view())).unwrap();
        assert_eq!(dist, vec![0.0, 1.0]);
    }

    #[test]
    fn missing_class_is_never_predicted() {
        let features = ndarray::array![[1.0], [2.0]];
        let model = CentroidModel::fit(features.view(), &[1, 1], 3).unwrap();
        let dist = model.predict(ndarray::array![-10.0].view()).unwrap();
        assert_eq!(dist, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn state_round_trips() {
        let mut model = NearestCentroid::new();
        model.train(&two_blobs()).unwrap();
        let state = model.save_state().unwrap().unwrap();
        let mut restored = NearestCentroid::new();
        restored.load_state(state).unwrap();
        let probe = ndarray::array![0.0, 0.0, 0.0];
        assert_eq!(
            restored.predict_distribution(&Instance::detached(probe.view())).unwrap(),
            vec![1.0, 0.0]
        );
    }

    #[test]
    fn untrained_prediction_fails() {
        let probe = ndarray::array![0.0];
        assert!(NearestCentroid::new()
            .predict_distribution(&Instance::detached(probe.view()))
            .is_err());
    }
}
