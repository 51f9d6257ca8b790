use serde::{Deserialize, Serialize};

use crate::evaluation::TrainEstimate;

/// Weight substituted for a zero weight so no module is starved of votes.
pub const WEIGHT_FLOOR: f64 = 1.0;

/// Default exponent of [`WeightingScheme::TrainAcc`].
pub const DEFAULT_ALPHA: f64 = 1.0;

const fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

/// Vote weight of one module, either shared by every class or per class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModuleWeight {
    /// One weight broadcast to every class.
    Scalar(f64),
    /// One weight per class.
    PerClass(Vec<f64>),
}

impl ModuleWeight {
    /// Weight applied to votes for `class`.
    #[must_use]
    pub fn for_class(&self, class: usize) -> f64 {
        match self {
            Self::Scalar(weight) => *weight,
            Self::PerClass(weights) => weights.get(class).copied().unwrap_or(WEIGHT_FLOOR),
        }
    }

    /// Replaces a zero scalar, or an all-zero per-class vector, with the floor.
    #[must_use]
    pub fn floored(self) -> Self {
        match self {
            Self::Scalar(weight) if weight == 0.0 || !weight.is_finite() => {
                Self::Scalar(WEIGHT_FLOOR)
            }
            Self::PerClass(weights) if weights.iter().all(|weight| *weight == 0.0) => {
                Self::PerClass(vec![WEIGHT_FLOOR; weights.len()])
            }
            other => other,
        }
    }
}

/// Maps a module's train estimate to its vote weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum WeightingScheme {
    /// Every module weighs the same.
    Equal,
    /// Out-of-sample accuracy raised to `alpha`.
    TrainAcc {
        /// Exponent sharpening the gap between strong and weak modules.
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
    /// Per-class out-of-sample recall.
    TrainAccByClass,
}

impl Default for WeightingScheme {
    fn default() -> Self {
        Self::TrainAcc {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl WeightingScheme {
    /// Weight for a module. A missing estimate is treated as unknown accuracy and
    /// receives the floor.
    #[must_use]
    pub fn weight(&self, estimate: Option<&TrainEstimate>) -> ModuleWeight {
        let weight = match (self, estimate) {
            (Self::Equal, _) | (_, None) => ModuleWeight::Scalar(WEIGHT_FLOOR),
            (Self::TrainAcc { alpha }, Some(estimate)) => {
                ModuleWeight::Scalar(estimate.accuracy().powf(*alpha))
            }
            (Self::TrainAccByClass, Some(estimate)) => {
                ModuleWeight::PerClass(estimate.class_accuracies())
            }
        };
        weight.floored()
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Equal => "equal",
            Self::TrainAcc { .. } => "train_acc",
            Self::TrainAccByClass => "train_acc_by_class",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::EstimateMethod;
    use ndarray::array;

    fn estimate(posteriors: ndarray::Array2<f64>, labels: Vec<usize>) -> TrainEstimate {
        TrainEstimate::fully_evaluated(EstimateMethod::Cv, posteriors, labels).unwrap()
    }

    #[test]
    fn train_acc_raises_accuracy_to_alpha() {
        let est = estimate(array![[0.9, 0.1], [0.3, 0.7]], vec![0, 0]);
        let weight = WeightingScheme::TrainAcc { alpha: 4.0 }.weight(Some(&est));
        assert_eq!(weight, ModuleWeight::Scalar(0.0625));
    }

    #[test]
    fn zero_accuracy_is_floored() {
        let est = estimate(array![[0.1, 0.9], [0.2, 0.8]], vec![0, 0]);
        let weight = WeightingScheme::default().weight(Some(&est));
        assert_eq!(weight, ModuleWeight::Scalar(WEIGHT_FLOOR));
    }

    #[test]
    fn per_class_floor_applies_only_to_all_zero() {
        let partial = estimate(array![[0.9, 0.1], [0.9, 0.1]], vec![0, 1]);
        assert_eq!(
            WeightingScheme::TrainAccByClass.weight(Some(&partial)),
            ModuleWeight::PerClass(vec![1.0, 0.0])
        );
        let none = estimate(array![[0.1, 0.9], [0.9, 0.1]], vec![0, 1]);
        assert_eq!(
            WeightingScheme::TrainAccByClass.weight(Some(&none)),
            ModuleWeight::PerClass(vec![1.0, 1.0])
        );
    }

    #[test]
    fn missing_estimate_gets_floor() {
        assert_eq!(
            WeightingScheme::TrainAccByClass.weight(None),
            ModuleWeight::Scalar(WEIGHT_FLOOR)
        );
    }

    #[test]
    fn scheme_parses_from_config_table() {
        let scheme: WeightingScheme = toml::from_str("scheme = \"train_acc\"\nalpha = 4.0").unwrap();
        assert_eq!(scheme, WeightingScheme::TrainAcc { alpha: 4.0 });
        let scheme: WeightingScheme = toml::from_str("scheme = \"train_acc\"").unwrap();
        assert_eq!(scheme, WeightingScheme::default());
    }
}
