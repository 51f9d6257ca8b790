use serde::{Deserialize, Serialize};

use crate::{
    combining::ModuleWeight,
    estimator::{Capabilities, Estimator},
    evaluation::TrainEstimate,
};

/// Declares one ensemble member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    /// Module name, unique within the ensemble.
    pub name: String,
    /// Registry key; the module name when unset.
    #[serde(default)]
    pub estimator: Option<String>,
    /// Read predictions from results files instead of training.
    #[serde(default)]
    pub from_results_file: bool,
}

impl ModuleSpec {
    /// Module trained in process from registry key `estimator`.
    #[must_use]
    pub fn registered(name: impl Into<String>, estimator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            estimator: Some(estimator.into()),
            from_results_file: false,
        }
    }

    /// Module loaded from results files stored under its own name.
    #[must_use]
    pub fn from_results(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            estimator: None,
            from_results_file: true,
        }
    }

    /// Registry key used to build the module.
    #[must_use]
    pub fn estimator_key(&self) -> &str {
        self.estimator.as_deref().unwrap_or(&self.name)
    }
}

/// Build outcome of one module, kept for prediction and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// Module name.
    pub name: String,
    /// Capabilities queried once at configuration.
    pub capabilities: Capabilities,
    /// Vote weight; the floor until the module is built.
    pub weight: ModuleWeight,
    /// Out-of-sample train posteriors, when an estimate was produced.
    pub train_estimate: Option<TrainEstimate>,
    /// Wall-clock nanoseconds spent training.
    pub build_nanos: i64,
    /// Wall-clock nanoseconds spent on the train estimate.
    pub estimate_nanos: i64,
}

impl ModuleRecord {
    /// Record of a module that has not been built.
    #[must_use]
    pub fn unbuilt(name: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            capabilities,
            weight: ModuleWeight::Scalar(crate::combining::WEIGHT_FLOOR),
            train_estimate: None,
            build_nanos: 0,
            estimate_nanos: 0,
        }
    }
}

/// A configured member: its estimator plus its record. Owned by one ensemble.
pub(crate) struct Module {
    pub(crate) spec: ModuleSpec,
    pub(crate) estimator: Box<dyn Estimator>,
    pub(crate) record: ModuleRecord,
    pub(crate) seed: u64,
    pub(crate) built: bool,
}

impl Module {
    pub(crate) fn new(spec: ModuleSpec, estimator: Box<dyn Estimator>, seed: u64) -> Self {
        let record = ModuleRecord::unbuilt(spec.name.clone(), estimator.capabilities());
        Self {
            spec,
            estimator,
            record,
            seed,
            built: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_defaults_to_name() {
        assert_eq!(ModuleSpec::from_results("TDE").estimator_key(), "TDE");
        assert_eq!(
            ModuleSpec::registered("forest", "IntervalForest").estimator_key(),
            "IntervalForest"
        );
    }

    #[test]
    fn specs_parse_from_toml() {
        #[derive(Deserialize)]
        struct Doc {
            modules: Vec<ModuleSpec>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[modules]]
            name = "forest"
            estimator = "IntervalForest"

            [[modules]]
            name = "TDE"
            from_results_file = true
            "#,
        )
        .unwrap();
        assert_eq!(doc.modules[0], ModuleSpec::registered("forest", "IntervalForest"));
        assert_eq!(doc.modules[1], ModuleSpec::from_results("TDE"));
    }

    #[test]
    fn unbuilt_records_carry_the_floor() {
        let record = ModuleRecord::unbuilt("m", Capabilities::none());
        assert_eq!(record.weight, ModuleWeight::Scalar(1.0));
        assert!(record.train_estimate.is_none());
    }
}
