use ndarray::{Array2, ArrayView1};
use rand::{rngs::SmallRng, seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};

use crate::{
    centroid::CentroidModel,
    dataset::Dataset,
    errors::{EstimatorError, EstimatorResult},
};

use super::{WeakLearner, WeakLearnerFactory};

/// Shortest interval drawn unless the series itself is shorter.
pub const MIN_INTERVAL_FLOOR: usize = 3;

/// Summary statistic computed over one interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalFeature {
    /// Arithmetic mean.
    Mean,
    /// Population standard deviation.
    StdDev,
    /// Least-squares slope against the time index.
    Slope,
    /// Minimum.
    Min,
    /// Maximum.
    Max,
}

impl IntervalFeature {
    /// Every supported statistic.
    pub const ALL: [Self; 5] = [Self::Mean, Self::StdDev, Self::Slope, Self::Min, Self::Max];

    /// Value of the statistic over `values`.
    #[must_use]
    pub fn compute(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        match self {
            Self::Mean => mean,
            Self::StdDev => (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt(),
            Self::Slope => {
                let t_mean = (n - 1.0) / 2.0;
                let mut cov = 0.0;
                let mut var = 0.0;
                for (t, v) in values.iter().enumerate() {
                    let dt = t as f64 - t_mean;
                    cov += dt * (v - mean);
                    var += dt * dt;
                }
                if var > 0.0 {
                    cov / var
                } else {
                    0.0
                }
            }
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Contiguous window `[start, start + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// First index.
    pub start: usize,
    /// Number of points.
    pub length: usize,
}

/// Randomized parameters of one interval learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalParams {
    /// Windows the features are computed over.
    pub intervals: Vec<Interval>,
    /// Statistics computed per window.
    pub features: Vec<IntervalFeature>,
}

impl IntervalParams {
    /// Feature vector of one series.
    #[must_use]
    pub fn transform(&self, series: ArrayView1<'_, f64>) -> Vec<f64> {
        let values = series.to_vec();
        let mut out = Vec::with_capacity(self.intervals.len() * self.features.len());
        for interval in &self.intervals {
            let end = (interval.start + interval.length).min(values.len());
            let window = values.get(interval.start..end).unwrap_or(&[]);
            for feature in &self.features {
                out.push(feature.compute(window));
            }
        }
        out
    }
}

/// Interval lengths resolved for one series length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalBounds {
    /// Intervals per learner.
    pub count: usize,
    /// Shortest length drawn.
    pub min_length: usize,
    /// Longest length drawn.
    pub max_length: usize,
}

/// Draws random intervals and statistic subsets and fits a nearest-centroid
/// learner on the resulting features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalFeatureFactory {
    /// Intervals per learner; `floor(sqrt(series length))` when unset.
    pub num_intervals: Option<usize>,
    /// Requested shortest interval.
    pub min_interval_length: usize,
    /// Requested longest interval; half the series when unset.
    pub max_interval_length: Option<usize>,
    /// Statistics sampled per learner.
    pub feature_subset: usize,
}

impl Default for IntervalFeatureFactory {
    fn default() -> Self {
        Self {
            num_intervals: None,
            min_interval_length: MIN_INTERVAL_FLOOR,
            max_interval_length: None,
            feature_subset: 3,
        }
    }
}

impl IntervalFeatureFactory {
    /// Lengths and count for series of `series_length` points. Degenerate
    /// ranges collapse to the minimum instead of failing.
    #[must_use]
    pub fn bounds(&self, series_length: usize) -> IntervalBounds {
        let mut min_length = self.min_interval_length.max(MIN_INTERVAL_FLOOR);
        if series_length <= min_length {
            min_length = series_length / 2;
        }
        let min_length = min_length.max(1);
        let max_length = self
            .max_interval_length
            .unwrap_or(series_length / 2)
            .min(series_length)
            .max(min_length);
        let count = self
            .num_intervals
            .unwrap_or_else(|| (series_length as f64).sqrt() as usize)
            .max(1);
        IntervalBounds {
            count,
            min_length,
            max_length,
        }
    }

    fn draw_interval(bounds: IntervalBounds, series_length: usize, rng: &mut SmallRng) -> Interval {
        let min = bounds.min_length.min(series_length);
        let start = if series_length > min {
            rng.gen_range(0..series_length - min)
        } else {
            0
        };
        let range = (series_length - start).min(bounds.max_length);
        let length = if range > min {
            rng.gen_range(min..range)
        } else {
            min
        };
        Interval { start, length }
    }
}

impl WeakLearnerFactory for IntervalFeatureFactory {
    type Params = IntervalParams;
    type Learner = IntervalLearner;

    fn unit(&self) -> &'static str {
        "interval learner"
    }

    fn draw(&self, rng: &mut SmallRng, series_length: usize) -> IntervalParams {
        let bounds = self.bounds(series_length);
        let intervals = (0..bounds.count)
            .map(|_| Self::draw_interval(bounds, series_length, rng))
            .collect();
        let take = self.feature_subset.clamp(1, IntervalFeature::ALL.len());
        let mut features: Vec<IntervalFeature> = IntervalFeature::ALL
            .choose_multiple(rng, take)
            .copied()
            .collect();
        features.sort_by_key(|feature| IntervalFeature::ALL.iter().position(|f| f == feature));
        IntervalParams {
            intervals,
            features,
        }
    }

    fn fit(&self, params: &IntervalParams, data: &Dataset) -> EstimatorResult<IntervalLearner> {
        let width = params.intervals.len() * params.features.len();
        let flat: Vec<f64> = data
            .values()
            .rows()
            .into_iter()
            .flat_map(|row| params.transform(row))
            .collect();
        let features = Array2::from_shape_vec((data.len(), width), flat)
            .map_err(|err| EstimatorError::Train(err.to_string()))?;
        Ok(IntervalLearner {
            params: params.clone(),
            model: CentroidModel::fit(features.view(), data.labels(), data.num_classes())?,
        })
    }
}

/// Nearest-centroid classifier over interval statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalLearner {
    params: IntervalParams,
    model: CentroidModel,
}

impl WeakLearner for IntervalLearner {
    fn predict(&self, series: ArrayView1<'_, f64>) -> EstimatorResult<Vec<f64>> {
        let features = self.params.transform(series);
        self.model.predict(ArrayView1::from(&features[..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn bounds_follow_series_length() {
        let factory = IntervalFeatureFactory::default();
        assert_eq!(
            factory.bounds(100),
            IntervalBounds {
                count: 10,
                min_length: 3,
                max_length: 50
            }
        );
        let short = factory.bounds(3);
        assert_eq!((short.min_length, short.max_length), (1, 1));
        let tiny = factory.bounds(5);
        assert_eq!((tiny.min_length, tiny.max_length), (3, 3));
    }

    #[test]
    fn drawn_intervals_fit_the_series() {
        let factory = IntervalFeatureFactory::default();
        let mut rng = SmallRng::seed_from_u64(1);
        for length in [1, 2, 3, 4, 7, 30, 128] {
            let params = factory.draw(&mut rng, length);
            let bounds = factory.bounds(length);
            for interval in &params.intervals {
                assert!(interval.length >= 1);
                assert!(interval.length <= bounds.max_length.max(bounds.min_length));
                assert!(interval.start + interval.length <= length);
            }
            assert_eq!(params.features.len(), 3);
        }
    }

    #[test]
    fn statistics_are_exact_on_a_line() {
        let line = [1.0, 3.0, 5.0, 7.0];
        assert!((IntervalFeature::Slope.compute(&line) - 2.0).abs() < 1e-12);
        assert!((IntervalFeature::Mean.compute(&line) - 4.0).abs() < 1e-12);
        assert!((IntervalFeature::Max.compute(&line) - 7.0).abs() < 1e-12);
        assert!((IntervalFeature::StdDev.compute(&[2.0, 2.0]) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn learner_separates_levels() {
        let rows: Vec<Vec<f64>> = (0..8)
            .map(|i| vec![if i < 4 { 0.0 } else { 10.0 }; 16])
            .collect();
        let labels = (0..8).map(|i| usize::from(i >= 4)).collect();
        let data = Dataset::from_rows("levels", &rows, labels, 2).unwrap();
        let factory = IntervalFeatureFactory {
            feature_subset: 5,
            ..IntervalFeatureFactory::default()
        };
        let params = factory.draw(&mut SmallRng::seed_from_u64(3), 16);
        let learner = factory.fit(&params, &data).unwrap();
        assert_eq!(learner.predict(data.instance(6).values).unwrap(), vec![0.0, 1.0]);
    }
}
