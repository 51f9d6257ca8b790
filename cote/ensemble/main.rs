//! HIVE-COTE style orchestration: configure modules, build them under an
//! optional contract with checkpointed progress, weight them from their train
//! estimates and combine their votes.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use uuid::Uuid;

use crate::{
    bagging::derive_task_seed,
    checkpoint::{fingerprint_of, CheckpointLoad, CheckpointStore},
    combining::{func::argmax, ModuleVote, ModuleWeight, WeightingScheme},
    config::EnsembleConfig,
    contract::ContractManager,
    dataset::{Dataset, Instance},
    errors::{EnsembleError, EnsembleResult, EstimatorError},
    estimator::Estimator,
    evaluation::{evaluator_for, EstimateMethod, TrainEstimate},
    modules::{Module, ModuleRecord, ModuleSpec},
    parallel::ParallelBuildExecutor,
    registry::{EstimatorRegistry, ModuleContext},
    results_file::FileLoadedEstimator,
    telemetry::{emit, EnsembleTelemetry},
};

/// Outcome of one [`EnsembleOrchestrator::build`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Identifier stamped on every record of this build.
    pub build_id: Uuid,
    /// Modules trained by this call.
    pub built: usize,
    /// Modules restored from a checkpoint instead of trained.
    pub resumed: usize,
    /// Module batches dispatched.
    pub batches: usize,
    /// Checkpoints written.
    pub checkpoints: usize,
    /// Per-module contract share, when contracted.
    pub allocation: Option<i64>,
    /// Non-fatal conditions met while building.
    pub warnings: Vec<String>,
    /// Build time including time restored from a checkpoint.
    pub elapsed_nanos: i64,
}

#[derive(Serialize)]
struct BuildFingerprint<'a> {
    name: &'a str,
    seed: u64,
    modules: Vec<&'a ModuleSpec>,
    weighting: WeightingScheme,
    estimate_method: EstimateMethod,
    dataset: &'a str,
    instances: usize,
    series_length: usize,
    num_classes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SavedModule {
    record: ModuleRecord,
    state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EnsembleSnapshot {
    modules: Vec<SavedModule>,
    elapsed_nanos: i64,
}

/// Everything a worker needs to build one module.
struct ModuleJob<'a> {
    data: &'a Dataset,
    share: Option<i64>,
    threads: usize,
    store: Option<&'a CheckpointStore>,
    telemetry: Option<EnsembleTelemetry>,
    weighting: WeightingScheme,
    method: EstimateMethod,
}

/// Weighted ensemble of heterogeneous modules.
pub struct EnsembleOrchestrator {
    config: EnsembleConfig,
    registry: EstimatorRegistry,
    modules: Vec<Module>,
    num_classes: Option<usize>,
    telemetry: Option<EnsembleTelemetry>,
    last_report: Option<BuildReport>,
}

impl EnsembleOrchestrator {
    /// Orchestrator with no modules; call [`Self::configure`] before building.
    #[must_use]
    pub const fn new(config: EnsembleConfig, registry: EstimatorRegistry) -> Self {
        Self {
            config,
            registry,
            modules: Vec::new(),
            num_classes: None,
            telemetry: None,
            last_report: None,
        }
    }

    /// Orchestrator configured with the modules listed in `config`.
    pub fn from_config(config: EnsembleConfig, registry: EstimatorRegistry) -> EnsembleResult<Self> {
        let specs = config.modules.clone();
        let mut orchestrator = Self::new(config, registry);
        orchestrator.configure(specs)?;
        Ok(orchestrator)
    }

    /// Attaches telemetry; modules receive a handle when they are built.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: EnsembleTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Sets telemetry after construction.
    pub fn set_telemetry(&mut self, telemetry: EnsembleTelemetry) {
        self.telemetry = Some(telemetry);
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    /// Replaces the module list. Every spec is resolved here, so a bad name or
    /// missing results-file settings fail before anything trains.
    pub fn configure(&mut self, specs: Vec<ModuleSpec>) -> EnsembleResult<()> {
        self.config
            .validate()
            .map_err(|err| EnsembleError::Config(format!("{err:#}")))?;
        if specs.is_empty() {
            return Err(EnsembleError::Config("an ensemble needs at least one module".into()));
        }
        let mut names = HashSet::new();
        let mut modules = Vec::with_capacity(specs.len());
        for (index, spec) in specs.iter().enumerate() {
            if spec.name.trim().is_empty() {
                return Err(EnsembleError::Config(format!("module {index} has no name")));
            }
            if !names.insert(spec.name.as_str()) {
                return Err(EnsembleError::Config(format!(
                    "module name '{}' is used twice",
                    spec.name
                )));
            }
            let seed = derive_task_seed(self.config.seed, index as u64);
            let estimator: Box<dyn Estimator> = if spec.from_results_file {
                let settings = self.config.results_file.as_ref().ok_or_else(|| {
                    EnsembleError::Config(format!(
                        "module '{}' reads results files but no results_file settings were given",
                        spec.name
                    ))
                })?;
                Box::new(FileLoadedEstimator::new(
                    settings.source_for(spec.estimator_key()),
                ))
            } else {
                self.registry.create(
                    spec.estimator_key(),
                    ModuleContext {
                        module: &spec.name,
                        seed,
                    },
                )?
            };
            modules.push(Module::new(spec.clone(), estimator, seed));
        }
        self.config.modules = specs;
        self.modules = modules;
        self.num_classes = None;
        self.last_report = None;
        self.log(
            LogLevel::Info,
            "ensemble.configured",
            json!({
                "ensemble": self.config.name,
                "modules": self.config.modules.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>(),
            }),
        );
        Ok(())
    }

    /// Trains every module, resuming from a checkpoint when one matches this
    /// configuration and seed. A module failure aborts the build.
    pub fn build(&mut self, data: &Dataset) -> EnsembleResult<BuildReport> {
        if self.modules.is_empty() {
            return Err(EnsembleError::Config("no modules configured".into()));
        }
        if data.is_empty() {
            return Err(EnsembleError::Config(format!(
                "training data {} is empty",
                data.name()
            )));
        }
        let started = Instant::now();
        let build_id = Uuid::new_v4();
        let threads = self.config.threads.max(1);
        self.num_classes = None;
        self.last_report = None;
        for module in &mut self.modules {
            module.record = ModuleRecord::unbuilt(module.spec.name.clone(), module.record.capabilities);
            module.built = false;
        }
        self.log(
            LogLevel::Info,
            "ensemble.build.start",
            json!({
                "build_id": build_id,
                "ensemble": self.config.name,
                "modules": self.modules.len(),
                "instances": data.len(),
                "classes": data.num_classes(),
                "threads": threads,
            }),
        );

        let mut warnings = Vec::new();
        let fingerprint = self.fingerprint(data)?;
        let store = self
            .config
            .checkpoint
            .as_ref()
            .map(|settings| CheckpointStore::new(&settings.dir));
        let (resumed, prior_elapsed) = self.restore(store.as_ref(), &fingerprint, &mut warnings)?;

        let mut contract = self
            .config
            .contract
            .map(|settings| ContractManager::start(settings.budget()));
        let allocation = match contract.as_mut() {
            Some(contract) => {
                contract.credit(prior_elapsed);
                let contractable = self
                    .modules
                    .iter()
                    .filter(|module| module.record.capabilities.contractable)
                    .count();
                let share = contract.allocate(contractable, threads > 1);
                self.log(
                    LogLevel::Info,
                    "ensemble.contract.allocated",
                    json!({
                        "build_id": build_id,
                        "total_nanos": contract.total_nanos(),
                        "contractable": contractable,
                        "concurrent": threads > 1,
                        "share_nanos": share,
                    }),
                );
                share
            }
            None => None,
        };
        self.capability_warnings(contract.is_some(), allocation, &mut warnings);

        let executor = ParallelBuildExecutor::new(threads)
            .map_err(|err| EnsembleError::Config(err.to_string()))?;
        let job = ModuleJob {
            data,
            share: allocation,
            threads,
            store: store.as_ref(),
            telemetry: self.telemetry.clone(),
            weighting: self.config.weighting,
            method: self.config.estimate_method,
        };
        let interval = self
            .config
            .checkpoint
            .as_ref()
            .and_then(|settings| settings.interval_secs)
            .map(Duration::from_secs);
        let mut last_checkpoint = Instant::now();
        let (mut built, mut batches, mut checkpoints) = (0usize, 0usize, 0usize);

        loop {
            let pending = self.modules.iter().filter(|module| !module.built).count();
            if pending == 0 {
                break;
            }
            let batch_started = Instant::now();
            let batch: Vec<&mut Module> = self
                .modules
                .iter_mut()
                .filter(|module| !module.built)
                .take(executor.batch_size(pending))
                .collect();
            let size = batch.len();
            for outcome in executor.run_batch(batch, |module| build_module(module, &job)) {
                outcome?;
            }
            built += size;
            batches += 1;
            if let Some(contract) = contract.as_mut() {
                contract.record(nanos_since(batch_started));
            }
            if let Some(store) = store.as_ref() {
                let remaining = self.modules.iter().any(|module| !module.built);
                let due = interval.map_or(true, |every| last_checkpoint.elapsed() >= every);
                if remaining && due {
                    self.save_checkpoint(store, &fingerprint, prior_elapsed + nanos_since(started))?;
                    checkpoints += 1;
                    last_checkpoint = Instant::now();
                }
            }
        }

        let elapsed_nanos = prior_elapsed + nanos_since(started);
        if let Some(store) = store.as_ref() {
            self.save_checkpoint(store, &fingerprint, elapsed_nanos)?;
            checkpoints += 1;
        }
        self.num_classes = Some(data.num_classes());
        let report = BuildReport {
            build_id,
            built,
            resumed,
            batches,
            checkpoints,
            allocation,
            warnings,
            elapsed_nanos,
        };
        self.log(
            LogLevel::Info,
            "ensemble.build.complete",
            json!({
                "build_id": build_id,
                "built": built,
                "resumed": resumed,
                "batches": batches,
                "checkpoints": checkpoints,
                "warnings": report.warnings.len(),
                "elapsed_nanos": elapsed_nanos,
                "weighting": self.config.weighting.label(),
                "voting": self.config.voting.label(),
            }),
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }

    /// Weighted vote of every module, normalized to sum to one.
    pub fn predict_distribution(&self, instance: &Instance<'_>) -> EnsembleResult<Vec<f64>> {
        let num_classes = self.built_classes()?;
        let distributions = self
            .modules
            .iter()
            .map(|module| {
                module
                    .estimator
                    .predict_distribution(instance)
                    .map_err(|err| EnsembleError::Prediction(format!("module {}: {err}", module.spec.name)))
            })
            .collect::<EnsembleResult<Vec<_>>>()?;
        let votes: Vec<ModuleVote<'_>> = self
            .modules
            .iter()
            .zip(&distributions)
            .map(|(module, distribution)| ModuleVote {
                module: &module.spec.name,
                weight: &module.record.weight,
                distribution,
            })
            .collect();
        self.config.voting.combine(num_classes, &votes)
    }

    /// Most probable class, ties to the lowest index.
    pub fn predict(&self, instance: &Instance<'_>) -> EnsembleResult<usize> {
        self.predict_distribution(instance).map(|dist| argmax(&dist))
    }

    /// Distributions for every instance of `data`, in order.
    pub fn predict_dataset(&self, data: &Dataset) -> EnsembleResult<Vec<Vec<f64>>> {
        data.instances()
            .map(|instance| self.predict_distribution(&instance))
            .collect()
    }

    /// Weight of each module by name, in configured order.
    #[must_use]
    pub fn module_weights(&self) -> IndexMap<String, ModuleWeight> {
        self.modules
            .iter()
            .map(|module| (module.spec.name.clone(), module.record.weight.clone()))
            .collect()
    }

    /// Per-module build records, in configured order.
    #[must_use]
    pub fn modules(&self) -> Vec<&ModuleRecord> {
        self.modules.iter().map(|module| &module.record).collect()
    }

    /// Report of the last successful build.
    #[must_use]
    pub const fn last_report(&self) -> Option<&BuildReport> {
        self.last_report.as_ref()
    }

    /// Whether the last build completed.
    #[must_use]
    pub const fn is_built(&self) -> bool {
        self.num_classes.is_some()
    }

    /// The ensemble's own train estimate: module train posteriors combined
    /// row by row with the module weights. `None` when any module has no
    /// estimate.
    pub fn train_estimate(&self) -> EnsembleResult<Option<TrainEstimate>> {
        let num_classes = self.built_classes()?;
        let Some(estimates) = self
            .modules
            .iter()
            .map(|module| module.record.train_estimate.as_ref())
            .collect::<Option<Vec<_>>>()
        else {
            return Ok(None);
        };
        let Some(first) = estimates.first() else {
            return Ok(None);
        };
        let rows = first.labels.len();
        if let Some(module) = self
            .modules
            .iter()
            .zip(&estimates)
            .find(|(_, estimate)| estimate.labels.len() != rows)
            .map(|(module, _)| module)
        {
            return Err(EnsembleError::Prediction(format!(
                "module {} estimated a different number of training rows",
                module.spec.name
            )));
        }

        let mut posteriors = Array2::zeros((rows, num_classes));
        let mut evaluated = vec![true; rows];
        for row in 0..rows {
            let distributions: Vec<Vec<f64>> = estimates
                .iter()
                .map(|estimate| estimate.posteriors.row(row).to_vec())
                .collect();
            let votes: Vec<ModuleVote<'_>> = self
                .modules
                .iter()
                .zip(&distributions)
                .map(|(module, distribution)| ModuleVote {
                    module: &module.spec.name,
                    weight: &module.record.weight,
                    distribution,
                })
                .collect();
            let combined = self.config.voting.combine(num_classes, &votes)?;
            for (class, probability) in combined.into_iter().enumerate() {
                posteriors[[row, class]] = probability;
            }
            evaluated[row] = estimates.iter().all(|estimate| estimate.evaluated[row]);
        }
        TrainEstimate::new(self.config.estimate_method, posteriors, first.labels.clone(), evaluated)
            .map(Some)
            .map_err(|err| EnsembleError::Prediction(err.to_string()))
    }

    fn built_classes(&self) -> EnsembleResult<usize> {
        self.num_classes
            .ok_or_else(|| EnsembleError::Prediction(format!("{} has not been built", self.config.name)))
    }

    fn fingerprint(&self, data: &Dataset) -> EnsembleResult<String> {
        let fingerprint = BuildFingerprint {
            name: &self.config.name,
            seed: self.config.seed,
            modules: self.modules.iter().map(|module| &module.spec).collect(),
            weighting: self.config.weighting,
            estimate_method: self.config.estimate_method,
            dataset: data.name(),
            instances: data.len(),
            series_length: data.series_length(),
            num_classes: data.num_classes(),
        };
        Ok(fingerprint_of(&fingerprint)?)
    }

    /// Restores the checkpointed module prefix. Returns how many modules were
    /// restored and the build time they had consumed.
    fn restore(
        &mut self,
        store: Option<&CheckpointStore>,
        fingerprint: &str,
        warnings: &mut Vec<String>,
    ) -> EnsembleResult<(usize, i64)> {
        let Some(store) = store else {
            return Ok((0, 0));
        };
        let snapshot: EnsembleSnapshot =
            match store.load(&self.config.name, self.config.seed, fingerprint)? {
                CheckpointLoad::Missing => return Ok((0, 0)),
                CheckpointLoad::Discarded { reason } => {
                    self.warn(warnings, format!("checkpoint ignored, starting fresh: {reason}"));
                    return Ok((0, 0));
                }
                CheckpointLoad::Restored(snapshot) => snapshot,
            };
        if snapshot.modules.len() > self.modules.len() {
            return Err(EnsembleError::CheckpointCorrupt(format!(
                "checkpoint holds {} modules, ensemble has {}",
                snapshot.modules.len(),
                self.modules.len()
            )));
        }
        let restored = snapshot.modules.len();
        for (module, saved) in self.modules.iter_mut().zip(snapshot.modules) {
            if saved.record.name != module.spec.name {
                return Err(EnsembleError::CheckpointCorrupt(format!(
                    "checkpoint module {} does not match configured module {}",
                    saved.record.name, module.spec.name
                )));
            }
            module.estimator.load_state(saved.state).map_err(|err| {
                EnsembleError::CheckpointCorrupt(format!("module {}: {err}", module.spec.name))
            })?;
            module.record = saved.record;
            module.built = true;
        }
        self.log(
            LogLevel::Info,
            "ensemble.checkpoint.restored",
            json!({
                "path": store.path_for(&self.config.name, self.config.seed),
                "modules": restored,
                "elapsed_nanos": snapshot.elapsed_nanos,
            }),
        );
        Ok((restored, snapshot.elapsed_nanos))
    }

    /// Saves the longest prefix of built modules whose state can be restored.
    fn save_checkpoint(
        &self,
        store: &CheckpointStore,
        fingerprint: &str,
        elapsed_nanos: i64,
    ) -> EnsembleResult<()> {
        let mut modules = Vec::new();
        for module in &self.modules {
            if !module.built || !module.record.capabilities.checkpointable {
                break;
            }
            let state = module
                .estimator
                .save_state()
                .map_err(|err| EnsembleError::from_training(module.spec.name.as_str(), err))?;
            let Some(state) = state else {
                break;
            };
            modules.push(SavedModule {
                record: module.record.clone(),
                state,
            });
        }
        let saved = modules.len();
        let snapshot = EnsembleSnapshot {
            modules,
            elapsed_nanos,
        };
        let path = store.save(&self.config.name, self.config.seed, fingerprint, &snapshot)?;
        self.log(
            LogLevel::Debug,
            "ensemble.checkpoint.saved",
            json!({ "path": path, "modules": saved, "elapsed_nanos": elapsed_nanos }),
        );
        Ok(())
    }

    fn capability_warnings(&self, contracted: bool, allocation: Option<i64>, warnings: &mut Vec<String>) {
        if contracted && allocation.is_none() {
            self.warn(
                warnings,
                format!("{} is contracted but none of its modules are contractable", self.config.name),
            );
        }
        let method = self.config.estimate_method;
        for module in self.modules.iter().filter(|module| !module.built) {
            let caps = module.record.capabilities;
            if contracted && !caps.contractable {
                self.warn(
                    warnings,
                    format!(
                        "module {} is not contractable and is built without a time limit",
                        module.spec.name
                    ),
                );
            }
            if contracted && !caps.self_estimating && method != EstimateMethod::None {
                self.warn(
                    warnings,
                    format!(
                        "module {} does not estimate itself; its {method} estimate is not covered by the contract",
                        module.spec.name
                    ),
                );
            }
            if method == EstimateMethod::Oob && !caps.self_estimating {
                self.warn(
                    warnings,
                    format!(
                        "module {} has no out-of-bag estimate; a single bootstrap replica is evaluated instead",
                        module.spec.name
                    ),
                );
            }
        }
    }

    fn warn(&self, warnings: &mut Vec<String>, message: String) {
        self.log(LogLevel::Warn, "ensemble.warning", json!({ "message": message }));
        warnings.push(message);
    }

    fn log(&self, level: LogLevel, message: &str, metadata: Value) {
        emit(self.telemetry.as_ref(), level, message, metadata);
    }
}

/// Trains one module, obtains its train estimate and fixes its weight.
fn build_module(module: &mut Module, job: &ModuleJob<'_>) -> EnsembleResult<()> {
    let caps = module.record.capabilities;
    let name = module.spec.name.clone();
    if caps.contractable {
        if let Some(share) = job.share {
            module.estimator.set_time_limit(share);
        }
    }
    if caps.multi_threadable {
        module.estimator.enable_parallelism(job.threads);
    }
    if caps.checkpointable {
        if let Some(store) = job.store {
            module.estimator.set_checkpoint_dir(&store.member_dir(&name));
        }
    }
    if let Some(telemetry) = job.telemetry.as_ref() {
        module.estimator.set_telemetry(telemetry.clone());
    }

    let started = Instant::now();
    module
        .estimator
        .train(job.data)
        .map_err(|err| EnsembleError::from_training(name.as_str(), err))?;
    let build_nanos = nanos_since(started);

    let started = Instant::now();
    let estimate = module_estimate(module, job)?;
    let estimate_nanos = nanos_since(started);
    let weight = job.weighting.weight(estimate.as_ref());

    emit(
        job.telemetry.as_ref(),
        LogLevel::Info,
        "ensemble.module.built",
        json!({
            "module": name,
            "build_nanos": build_nanos,
            "estimate_nanos": estimate_nanos,
            "estimate": estimate.as_ref().map(|estimate| estimate.method.to_string()),
            "accuracy": estimate.as_ref().map(TrainEstimate::accuracy),
            "weight": weight,
        }),
    );
    module.record.weight = weight;
    module.record.train_estimate = estimate;
    module.record.build_nanos = build_nanos;
    module.record.estimate_nanos = estimate_nanos;
    module.built = true;
    Ok(())
}

/// The module's own estimate when it has one, otherwise the configured
/// evaluator run on fresh copies.
fn module_estimate(module: &Module, job: &ModuleJob<'_>) -> EnsembleResult<Option<TrainEstimate>> {
    if job.method == EstimateMethod::None {
        return Ok(None);
    }
    let name = module.spec.name.as_str();
    let own = if module.record.capabilities.self_estimating {
        module.estimator.train_estimate()
    } else {
        None
    };
    let estimate = match own {
        Some(estimate) => estimate,
        None => match evaluator_for(job.method, module.seed) {
            Some(evaluator) => evaluator
                .estimate(module.estimator.as_ref(), job.data)
                .map_err(|err| EnsembleError::from_training(name, err))?,
            None => return Ok(None),
        },
    };
    if estimate.labels.len() != job.data.len() || estimate.num_classes() != job.data.num_classes() {
        return Err(EnsembleError::EstimatorTrain {
            module: name.to_string(),
            source: EstimatorError::InvalidData(format!(
                "train estimate is {}x{}, data is {}x{}",
                estimate.labels.len(),
                estimate.num_classes(),
                job.data.len(),
                job.data.num_classes()
            )),
        });
    }
    Ok(Some(estimate))
}

fn nanos_since(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX)
}
