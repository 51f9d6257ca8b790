use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    combining::{VotingScheme, WeightingScheme},
    contract::{ContractBudget, ContractUnit},
    evaluation::EstimateMethod,
    modules::ModuleSpec,
    results_file::ResultsFileSource,
};

/// Wall-clock budget for a whole build.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContractSettings {
    /// Amount in `unit`.
    pub amount: f64,
    /// Unit of `amount`.
    #[serde(default)]
    pub unit: ContractUnit,
}

impl ContractSettings {
    /// Budget in nanoseconds.
    #[must_use]
    pub fn budget(&self) -> ContractBudget {
        ContractBudget::from_unit(self.amount, self.unit)
    }
}

/// Where and how often build progress is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSettings {
    /// Snapshot directory.
    pub dir: PathBuf,
    /// Minimum seconds between snapshots; every module when unset.
    #[serde(default)]
    pub interval_secs: Option<u64>,
}

/// Shared location of stored predictions for file-backed modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsFileSettings {
    /// Results root directory.
    pub root: PathBuf,
    /// Dataset directory name; the training data's name when unset.
    #[serde(default)]
    pub dataset: Option<String>,
    /// Resample index.
    #[serde(default)]
    pub fold: usize,
    /// Fill empty or short distributions with a one-hot of the prediction.
    #[serde(default)]
    pub fill_missing_distributions: bool,
}

impl ResultsFileSettings {
    /// Source for module `estimator`.
    #[must_use]
    pub fn source_for(&self, estimator: &str) -> ResultsFileSource {
        ResultsFileSource {
            root: self.root.clone(),
            estimator: estimator.to_string(),
            dataset: self.dataset.clone(),
            fold: self.fold,
            fill_missing_distributions: self.fill_missing_distributions,
        }
    }
}

/// Everything an ensemble build consumes from its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Ensemble identity; names its checkpoint.
    pub name: String,
    /// Global seed.
    pub seed: u64,
    /// Worker threads; modules are built concurrently above one.
    pub threads: usize,
    /// Optional build contract.
    pub contract: Option<ContractSettings>,
    /// Optional checkpointing.
    pub checkpoint: Option<CheckpointSettings>,
    /// Module weighting.
    pub weighting: WeightingScheme,
    /// Vote combination.
    pub voting: VotingScheme,
    /// Train-estimate fallback for modules that do not self-estimate.
    pub estimate_method: EstimateMethod,
    /// Stored predictions for file-backed modules.
    pub results_file: Option<ResultsFileSettings>,
    /// Members in build order.
    pub modules: Vec<ModuleSpec>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            name: "ensemble".into(),
            seed: 0,
            threads: 1,
            contract: None,
            checkpoint: None,
            weighting: WeightingScheme::default(),
            voting: VotingScheme::default(),
            estimate_method: EstimateMethod::default(),
            results_file: None,
            modules: Vec::new(),
        }
    }
}

impl EnsembleConfig {
    /// HIVE-COTE style defaults: accuracy to the fourth power, confidence
    /// voting, cross-validated estimates for modules that cannot self-estimate.
    #[must_use]
    pub fn hive_cote(seed: u64) -> Self {
        Self {
            name: "HIVE-COTE".into(),
            seed,
            weighting: WeightingScheme::TrainAcc { alpha: 4.0 },
            voting: VotingScheme::MajorityConfidence,
            estimate_method: EstimateMethod::Cv,
            modules: vec![
                ModuleSpec::registered("IntervalForest", "IntervalForest"),
                ModuleSpec::registered("IntervalBagging", "IntervalBagging"),
                ModuleSpec::registered("NearestCentroid", "NearestCentroid"),
            ],
            ..Self::default()
        }
    }

    /// Loads configuration from a TOML file. Relative checkpoint and results
    /// paths resolve against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading ensemble config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        if let Some(checkpoint) = config.checkpoint.as_mut() {
            if checkpoint.dir.is_relative() {
                checkpoint.dir = source_dir.join(&checkpoint.dir);
            }
        }
        if let Some(results) = config.results_file.as_mut() {
            if results.root.is_relative() {
                results.root = source_dir.join(&results.root);
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks settings that need no registry.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("ensemble name must be non-empty");
        }
        if let Some(contract) = &self.contract {
            if !(contract.amount.is_finite() && contract.amount >= 0.0) {
                bail!("contract amount must be a non-negative number");
            }
        }
        if let WeightingScheme::TrainAcc { alpha } = self.weighting {
            if !(alpha.is_finite() && alpha > 0.0) {
                bail!("weighting alpha must be positive, got {alpha}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn loads_document_and_resolves_paths() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ensemble.toml");
        fs::write(
            &path,
            r#"
            name = "hc"
            seed = 3
            threads = 2
            estimate_method = "OOB"
            voting = "majority_vote"

            [contract]
            amount = 2
            unit = "hours"

            [checkpoint]
            dir = "checkpoints"

            [weighting]
            scheme = "train_acc"
            alpha = 4.0

            [results_file]
            root = "/results"
            fold = 4
            fill_missing_distributions = true

            [[modules]]
            name = "forest"
            estimator = "IntervalForest"

            [[modules]]
            name = "TDE"
            from_results_file = true
            "#,
        )
        .unwrap();
        let config = EnsembleConfig::load(&path).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.estimate_method, EstimateMethod::Oob);
        assert_eq!(config.voting, VotingScheme::MajorityVote);
        assert_eq!(config.contract.unwrap().budget().total_nanos, 7_200_000_000_000);
        assert_eq!(config.checkpoint.unwrap().dir, tmp.path().join("checkpoints"));
        assert_eq!(config.results_file.unwrap().root, PathBuf::from("/results"));
        assert_eq!(config.modules.len(), 2);
    }

    #[test]
    fn rejects_bad_alpha() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        fs::write(&path, "[weighting]\nscheme = \"train_acc\"\nalpha = -1.0\n").unwrap();
        assert!(EnsembleConfig::load(&path).is_err());
    }

    #[test]
    fn hive_cote_preset() {
        let config = EnsembleConfig::hive_cote(9);
        assert_eq!(config.weighting, WeightingScheme::TrainAcc { alpha: 4.0 });
        assert_eq!(config.estimate_method, EstimateMethod::Cv);
        assert_eq!(config.modules.len(), 3);
        assert!(config.validate().is_ok());
    }
}
