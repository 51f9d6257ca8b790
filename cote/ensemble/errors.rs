use std::path::PathBuf;

use thiserror::Error;

/// Result alias for estimator-level operations.
pub type EstimatorResult<T> = Result<T, EstimatorError>;

/// Result alias for ensemble-level operations.
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Failures raised by a single estimator.
#[derive(Debug, Error)]
pub enum EstimatorError {
    /// Training could not complete.
    #[error("training failed: {0}")]
    Train(String),
    /// Prediction was requested from an unusable model.
    #[error("prediction failed: {0}")]
    Predict(String),
    /// Input data does not satisfy the estimator's requirements.
    #[error("invalid data: {0}")]
    InvalidData(String),
    /// The time budget expired before one unit of work was finished.
    #[error("contract of {contract_nanos}ns too small: no {unit} built")]
    ContractTooSmall {
        /// Budget handed to the estimator.
        contract_nanos: i64,
        /// Name of the unit of work (tree, kernel set, ...).
        unit: &'static str,
    },
    /// Saving or restoring internal state failed.
    #[error("state error: {0}")]
    State(String),
    /// Persisted predictions could not be loaded.
    #[error("results file {path}: {message}")]
    ResultsFile {
        /// File that failed to load.
        path: PathBuf,
        /// Parse or validation failure.
        message: String,
    },
    /// Inner checkpoint failure.
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Failures raised by the checkpoint store.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The snapshot was written by an incompatible schema or configuration.
    #[error("checkpoint {path} is incompatible: {message}")]
    Incompatible {
        /// Offending file.
        path: PathBuf,
        /// Which check failed.
        message: String,
    },
    /// Filesystem failure while writing a snapshot.
    #[error("checkpoint io on {path}: {source}")]
    Io {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Snapshot could not be encoded.
    #[error("checkpoint encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failures raised by the ensemble orchestrator.
#[derive(Debug, Error)]
pub enum EnsembleError {
    /// Invalid module list or settings; raised before any training starts.
    #[error("configuration error: {0}")]
    Config(String),
    /// No unit of work completed inside the contract.
    #[error("contract too small for module {module}: {source}")]
    ContractTooSmall {
        /// Module that produced nothing.
        module: String,
        /// Estimator-level detail.
        #[source]
        source: EstimatorError,
    },
    /// A module failed to train; the whole build is aborted.
    #[error("module {module} failed to train: {source}")]
    EstimatorTrain {
        /// Module that failed.
        module: String,
        /// Estimator-level detail.
        #[source]
        source: EstimatorError,
    },
    /// A file-backed module could not load its stored predictions.
    #[error("module {module} could not load results: {source}")]
    ResultsFile {
        /// Module reading the files.
        module: String,
        /// Load failure.
        #[source]
        source: EstimatorError,
    },
    /// The checkpoint on disk cannot be resumed from.
    #[error("checkpoint corrupt: {0}")]
    CheckpointCorrupt(String),
    /// Writing a checkpoint failed.
    #[error(transparent)]
    Checkpoint(CheckpointError),
    /// Prediction was requested before a build or produced unusable output.
    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl EnsembleError {
    /// Wraps a training failure, lifting budget, results-file and checkpoint failures to their own variants.
    #[must_use]
    pub fn from_training(module: impl Into<String>, source: EstimatorError) -> Self {
        let module = module.into();
        match source {
            EstimatorError::ContractTooSmall { .. } => Self::ContractTooSmall { module, source },
            EstimatorError::ResultsFile { .. } => Self::ResultsFile { module, source },
            EstimatorError::Checkpoint(CheckpointError::Incompatible { path, message }) => {
                Self::CheckpointCorrupt(format!("{} ({module}): {message}", path.display()))
            }
            source => Self::EstimatorTrain { module, source },
        }
    }
}

impl From<CheckpointError> for EnsembleError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Incompatible { path, message } => {
                Self::CheckpointCorrupt(format!("{}: {message}", path.display()))
            }
            other => Self::Checkpoint(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_failures_surface_as_contract_errors() {
        let err = EnsembleError::from_training(
            "forest",
            EstimatorError::ContractTooSmall {
                contract_nanos: 0,
                unit: "tree",
            },
        );
        assert!(matches!(err, EnsembleError::ContractTooSmall { ref module, .. } if module == "forest"));
    }

    #[test]
    fn unreadable_results_are_reported_per_module() {
        let err = EnsembleError::from_training(
            "TDE",
            EstimatorError::ResultsFile {
                path: PathBuf::from("TDE/Predictions/Toy/trainFold0.csv"),
                message: "missing".into(),
            },
        );
        assert!(matches!(err, EnsembleError::ResultsFile { ref module, .. } if module == "TDE"));
    }

    #[test]
    fn incompatible_checkpoints_are_corrupt() {
        let err: EnsembleError = CheckpointError::Incompatible {
            path: PathBuf::from("a.checkpoint.json"),
            message: "schema 9".into(),
        }
        .into();
        assert!(matches!(err, EnsembleError::CheckpointCorrupt(_)));
    }
}
