#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Cote ensemble stack: contracted, checkpointable, multi-threaded weighted
//! ensembles of black-box time series classifiers.

/// Error taxonomy for estimators, checkpoints and the orchestrator.
#[path = "../errors.rs"]
pub mod errors;

/// Labelled training data and single instances.
#[path = "../dataset.rs"]
pub mod dataset;

/// The estimator contract and capability flags.
#[path = "../estimator.rs"]
pub mod estimator;

/// Train-estimate evaluators.
#[path = "../evaluation/main.rs"]
pub mod evaluation;

/// Module weighting and vote combination.
#[path = "../combining/main.rs"]
pub mod combining;

/// Wall-clock contracts.
#[path = "../contract.rs"]
pub mod contract;

/// Versioned build snapshots.
#[path = "../checkpoint.rs"]
pub mod checkpoint;

/// Fork-join build executor.
#[path = "../parallel.rs"]
pub mod parallel;

/// Bagged ensembles of randomized weak learners.
#[path = "../bagging/main.rs"]
pub mod bagging;

/// Nearest-centroid classifier.
#[path = "../centroid.rs"]
pub mod centroid;

/// Stored predictions read back as modules.
#[path = "../results_file.rs"]
pub mod results_file;

/// Estimator factory registry.
#[path = "../registry.rs"]
pub mod registry;

/// Module specs and build records.
#[path = "../modules.rs"]
pub mod modules;

/// Ensemble configuration and TOML loading.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for structured logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// High-level orchestration entry point.
#[path = "../main.rs"]
pub mod orchestrator;

pub use bagging::{BaggedEnsemble, BaggingConfig, IntervalFeatureFactory};
pub use centroid::NearestCentroid;
pub use checkpoint::{CheckpointLoad, CheckpointStore};
pub use combining::{ModuleWeight, VotingScheme, WeightingScheme};
pub use config::EnsembleConfig;
pub use contract::{ContractBudget, ContractManager, ContractUnit};
pub use dataset::{Dataset, Instance};
pub use errors::{EnsembleError, EnsembleResult, EstimatorError, EstimatorResult};
pub use estimator::{Capabilities, Estimator};
pub use evaluation::{EstimateMethod, TrainEstimate, TrainEstimateEvaluator};
pub use modules::{ModuleRecord, ModuleSpec};
pub use orchestrator::{BuildReport, EnsembleOrchestrator};
pub use parallel::ParallelBuildExecutor;
pub use registry::{EstimatorRegistry, ModuleContext};
pub use results_file::{FileLoadedEstimator, ResultsFileSource};
pub use telemetry::{EnsembleTelemetry, EnsembleTelemetryBuilder};
