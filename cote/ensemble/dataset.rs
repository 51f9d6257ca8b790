use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{EstimatorError, EstimatorResult};

/// Equal-length univariate series with integer class labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    name: String,
    values: Array2<f64>,
    labels: Vec<usize>,
    num_classes: usize,
}

impl Dataset {
    /// Builds a dataset, validating shape and labels.
    pub fn new(
        name: impl Into<String>,
        values: Array2<f64>,
        labels: Vec<usize>,
        num_classes: usize,
    ) -> EstimatorResult<Self> {
        if values.nrows() == 0 {
            return Err(EstimatorError::InvalidData(
                "dataset needs at least one instance".into(),
            ));
        }
        if values.nrows() != labels.len() {
            return Err(EstimatorError::InvalidData(format!(
                "{} series but {} labels",
                values.nrows(),
                labels.len()
            )));
        }
        if num_classes == 0 {
            return Err(EstimatorError::InvalidData(
                "num_classes must be positive".into(),
            ));
        }
        if let Some(bad) = labels.iter().find(|label| **label >= num_classes) {
            return Err(EstimatorError::InvalidData(format!(
                "label {bad} out of range for {num_classes} classes"
            )));
        }
        Ok(Self {
            name: name.into(),
            values,
            labels,
            num_classes,
        })
    }

    /// Builds a dataset from row vectors. Rows must share one length.
    pub fn from_rows(
        name: impl Into<String>,
        rows: &[Vec<f64>],
        labels: Vec<usize>,
        num_classes: usize,
    ) -> EstimatorResult<Self> {
        let length = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != length) {
            return Err(EstimatorError::InvalidData(
                "series must have equal length".into(),
            ));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let values = Array2::from_shape_vec((rows.len(), length), flat)
            .map_err(|err| EstimatorError::InvalidData(err.to_string()))?;
        Self::new(name, values, labels, num_classes)
    }

    /// Problem name, used to locate results files and name checkpoints.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a validated dataset; kept for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Length of every series.
    #[must_use]
    pub fn series_length(&self) -> usize {
        self.values.ncols()
    }

    /// Number of classes.
    #[must_use]
    pub const fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Class labels in instance order.
    #[must_use]
    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Raw values, one row per instance.
    #[must_use]
    pub const fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Borrowed view of instance `index`, tagged with its position.
    ///
    /// # Panics
    /// Panics when `index` is out of bounds.
    #[must_use]
    pub fn instance(&self, index: usize) -> Instance<'_> {
        Instance {
            values: self.values.row(index),
            position: Some(index),
        }
    }

    /// Iterates every instance in order.
    pub fn instances(&self) -> impl Iterator<Item = Instance<'_>> + '_ {
        (0..self.len()).map(move |index| self.instance(index))
    }

    /// Copies the listed rows (repeats allowed) into a new dataset.
    pub fn subset(&self, indices: &[usize]) -> EstimatorResult<Self> {
        if let Some(bad) = indices.iter().find(|index| **index >= self.len()) {
            return Err(EstimatorError::InvalidData(format!(
                "subset index {bad} out of range for {} instances",
                self.len()
            )));
        }
        let values = self.values.select(Axis(0), indices);
        let labels = indices.iter().map(|index| self.labels[*index]).collect();
        Self::new(self.name.clone(), values, labels, self.num_classes)
    }

    /// Instance count per class.
    #[must_use]
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.num_classes];
        for label in &self.labels {
            counts[*label] += 1;
        }
        counts
    }
}

/// One series handed to `predict_distribution`.
#[derive(Debug, Clone, Copy)]
pub struct Instance<'a> {
    /// Series values.
    pub values: ArrayView1<'a, f64>,
    /// Row index in the dataset it came from, when known.
    pub position: Option<usize>,
}

impl<'a> Instance<'a> {
    /// Wraps a free-standing series with no known position.
    #[must_use]
    pub const fn detached(values: ArrayView1<'a, f64>) -> Self {
        Self {
            values,
            position: None,
        }
    }
}
