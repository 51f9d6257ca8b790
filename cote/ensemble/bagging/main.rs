//! Bagged ensembles of randomized weak learners, built task by task under an
//! optional contract with out-of-bag self-estimation.

/// Interval-statistic weak learners.
pub mod interval;
/// Out-of-bag vote accumulation.
pub mod oob;
/// Task seeds and bootstrap sampling.
pub mod task;

use std::{
    fmt,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use ndarray::ArrayView1;
use rand::rngs::SmallRng;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    checkpoint::{fingerprint_of, CheckpointLoad, CheckpointStore},
    combining::func::normalize_or_uniform,
    contract::ContractManager,
    dataset::{Dataset, Instance},
    errors::{EstimatorError, EstimatorResult},
    estimator::{Capabilities, Estimator},
    evaluation::TrainEstimate,
    parallel::ParallelBuildExecutor,
    telemetry::{emit, EnsembleTelemetry},
};

pub use interval::{IntervalFeature, IntervalFeatureFactory, IntervalLearner, IntervalParams};
pub use oob::{OobAccumulator, OobContribution};
pub use task::{bootstrap_sample, derive_task_seed, BuildTask};

/// A fitted member of a bagged ensemble.
pub trait WeakLearner: Send + Sync {
    /// Class distribution for one series.
    fn predict(&self, series: ArrayView1<'_, f64>) -> EstimatorResult<Vec<f64>>;

    /// Weight of this learner's votes, both at prediction and in out-of-bag sums.
    fn vote_weight(&self) -> f64 {
        1.0
    }
}

/// Draws randomized task parameters and fits weak learners from them.
pub trait WeakLearnerFactory: Clone + Send + Sync + Serialize + 'static {
    /// Parameters drawn from a task's own stream.
    type Params: Clone + fmt::Debug + PartialEq + Send + Sync + Serialize + DeserializeOwned;
    /// Fitted learner.
    type Learner: WeakLearner + Clone + fmt::Debug + Serialize + DeserializeOwned;

    /// Name of one unit of work, used in errors.
    fn unit(&self) -> &'static str;

    /// Draws parameters for series of `series_length` points.
    fn draw(&self, rng: &mut SmallRng, series_length: usize) -> Self::Params;

    /// Fits a learner on `data` with fixed `params`.
    fn fit(&self, params: &Self::Params, data: &Dataset) -> EstimatorResult<Self::Learner>;
}

/// One built unit of work. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeRecord<P, L> {
    /// Position in the build sequence.
    pub task_index: usize,
    /// Seed of the task-local stream.
    pub seed: u64,
    /// Bootstrap sample, or every instance when bagging is off.
    pub sampled_indices: Vec<usize>,
    /// Randomized parameters.
    pub params: P,
    /// Fitted learner.
    pub learner: L,
}

/// Everything needed to continue an interrupted build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaggedSnapshot<P, L> {
    /// Built units in task order.
    pub trees: Vec<TreeRecord<P, L>>,
    /// Out-of-bag sums, when self-estimating.
    pub oob: Option<OobAccumulator>,
    /// Index of the next task to build.
    pub next_task: usize,
    /// Build time already spent.
    pub elapsed_nanos: i64,
    /// Classes of the training data.
    pub num_classes: usize,
}

/// Settings of a [`BaggedEnsemble`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaggingConfig {
    /// Estimator name; also the checkpoint identity.
    pub name: String,
    /// Base seed every task seed is derived from.
    pub seed: u64,
    /// Units built without a contract.
    pub n_estimators: usize,
    /// Upper bound on units under a contract.
    pub max_estimators: usize,
    /// Fit each unit on a bootstrap sample.
    pub bagging: bool,
    /// Accumulate out-of-bag votes as the train estimate; needs bagging.
    pub estimate_oob: bool,
    /// Units between checkpoints.
    pub checkpoint_every: usize,
    /// Seconds between checkpoints, checked alongside `checkpoint_every`.
    pub checkpoint_interval_secs: Option<u64>,
}

impl Default for BaggingConfig {
    fn default() -> Self {
        Self {
            name: "BaggedEnsemble".into(),
            seed: 0,
            n_estimators: 200,
            max_estimators: 500,
            bagging: true,
            estimate_oob: true,
            checkpoint_every: 100,
            checkpoint_interval_secs: None,
        }
    }
}

/// Statistics of the last `train` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BagBuildSummary {
    /// Units present after the build.
    pub built: usize,
    /// Units restored from a checkpoint.
    pub resumed_from: usize,
    /// Batches dispatched.
    pub batches: usize,
    /// Checkpoints written.
    pub checkpoints: usize,
}

#[derive(Serialize)]
struct Fingerprint<'a, F> {
    name: &'a str,
    seed: u64,
    bagging: bool,
    estimate_oob: bool,
    factory: &'a F,
    dataset: &'a str,
    instances: usize,
    series_length: usize,
    num_classes: usize,
}

#[derive(Serialize, Deserialize)]
struct SavedBag<P, L> {
    snapshot: BaggedSnapshot<P, L>,
    train_estimate: Option<TrainEstimate>,
}

struct TaskOutput<P, L> {
    record: TreeRecord<P, L>,
    contribution: Option<OobContribution>,
}

/// Ensemble of weak learners from `F`, each built from its own seeded stream.
pub struct BaggedEnsemble<F: WeakLearnerFactory> {
    factory: F,
    config: BaggingConfig,
    time_limit: Option<i64>,
    threads: usize,
    checkpoint_dir: Option<PathBuf>,
    telemetry: Option<EnsembleTelemetry>,
    state: Option<BaggedSnapshot<F::Params, F::Learner>>,
    train_estimate: Option<TrainEstimate>,
    last_build: BagBuildSummary,
}

impl<F: WeakLearnerFactory + fmt::Debug> fmt::Debug for BaggedEnsemble<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaggedEnsemble")
            .field("factory", &self.factory)
            .field("config", &self.config)
            .field("built", &self.len())
            .finish()
    }
}

impl<F: WeakLearnerFactory> BaggedEnsemble<F> {
    /// Untrained ensemble.
    #[must_use]
    pub const fn new(factory: F, config: BaggingConfig) -> Self {
        Self {
            factory,
            config,
            time_limit: None,
            threads: 1,
            checkpoint_dir: None,
            telemetry: None,
            state: None,
            train_estimate: None,
            last_build: BagBuildSummary {
                built: 0,
                resumed_from: 0,
                batches: 0,
                checkpoints: 0,
            },
        }
    }

    /// Settings.
    #[must_use]
    pub const fn config(&self) -> &BaggingConfig {
        &self.config
    }

    /// Built units in task order.
    #[must_use]
    pub fn trees(&self) -> &[TreeRecord<F::Params, F::Learner>] {
        self.state.as_ref().map_or(&[], |state| &state.trees)
    }

    /// Number of built units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trees().len()
    }

    /// Whether nothing has been built.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trees().is_empty()
    }

    /// Statistics of the last build.
    #[must_use]
    pub const fn last_build(&self) -> BagBuildSummary {
        self.last_build
    }

    /// Current state as a snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<&BaggedSnapshot<F::Params, F::Learner>> {
        self.state.as_ref()
    }

    fn self_estimating(&self) -> bool {
        self.config.bagging && self.config.estimate_oob
    }

    fn fingerprint(&self, data: &Dataset) -> EstimatorResult<String> {
        Ok(fingerprint_of(&Fingerprint {
            name: &self.config.name,
            seed: self.config.seed,
            bagging: self.config.bagging,
            estimate_oob: self.config.estimate_oob,
            factory: &self.factory,
            dataset: data.name(),
            instances: data.len(),
            series_length: data.series_length(),
            num_classes: data.num_classes(),
        })?)
    }

    fn fresh_state(&self, data: &Dataset) -> BaggedSnapshot<F::Params, F::Learner> {
        BaggedSnapshot {
            trees: Vec::new(),
            oob: self
                .self_estimating()
                .then(|| OobAccumulator::new(data.len(), data.num_classes())),
            next_task: 0,
            elapsed_nanos: 0,
            num_classes: data.num_classes(),
        }
    }

    fn restore_or_fresh(
        &self,
        store: Option<&CheckpointStore>,
        fingerprint: &str,
        data: &Dataset,
    ) -> EstimatorResult<BaggedSnapshot<F::Params, F::Learner>> {
        let Some(store) = store else {
            return Ok(self.fresh_state(data));
        };
        match store.load::<BaggedSnapshot<F::Params, F::Learner>>(
            &self.config.name,
            self.config.seed,
            fingerprint,
        )? {
            CheckpointLoad::Restored(snapshot) => {
                emit(
                    self.telemetry.as_ref(),
                    LogLevel::Info,
                    "bagging.checkpoint.restored",
                    json!({ "estimator": self.config.name, "built": snapshot.trees.len() }),
                );
                Ok(snapshot)
            }
            CheckpointLoad::Discarded { reason } => {
                emit(
                    self.telemetry.as_ref(),
                    LogLevel::Warn,
                    "bagging.checkpoint.discarded",
                    json!({ "estimator": self.config.name, "reason": reason }),
                );
                Ok(self.fresh_state(data))
            }
            CheckpointLoad::Missing => Ok(self.fresh_state(data)),
        }
    }

    fn build_task(
        factory: &F,
        data: &Dataset,
        task: BuildTask,
        bagging: bool,
        estimate_oob: bool,
    ) -> EstimatorResult<TaskOutput<F::Params, F::Learner>> {
        let n = data.len();
        let mut rng = task.rng();
        let params = factory.draw(&mut rng, data.series_length());
        let (sampled_indices, learner) = if bagging {
            let sample = bootstrap_sample(n, &mut rng);
            let learner = factory.fit(&params, &data.subset(&sample)?)?;
            (sample, learner)
        } else {
            ((0..n).collect(), factory.fit(&params, data)?)
        };
        let contribution = if bagging && estimate_oob {
            let votes = task::out_of_bag(n, &sampled_indices)
                .into_iter()
                .map(|index| Ok((index, learner.predict(data.instance(index).values)?)))
                .collect::<EstimatorResult<Vec<_>>>()?;
            Some(OobContribution {
                weight: learner.vote_weight(),
                votes,
            })
        } else {
            None
        };
        Ok(TaskOutput {
            record: TreeRecord {
                task_index: task.task_index,
                seed: task.seed,
                sampled_indices,
                params,
                learner,
            },
            contribution,
        })
    }

    fn save_checkpoint(
        &self,
        store: &CheckpointStore,
        fingerprint: &str,
        state: &BaggedSnapshot<F::Params, F::Learner>,
    ) -> EstimatorResult<()> {
        let path = store.save(&self.config.name, self.config.seed, fingerprint, state)?;
        emit(
            self.telemetry.as_ref(),
            LogLevel::Debug,
            "bagging.checkpoint.saved",
            json!({
                "estimator": self.config.name,
                "built": state.trees.len(),
                "path": path.display().to_string(),
            }),
        );
        Ok(())
    }
}

impl<F: WeakLearnerFactory> Estimator for BaggedEnsemble<F> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .contractable(true)
            .multi_threadable(true)
            .checkpointable(true)
            .self_estimating(self.self_estimating())
    }

    fn train(&mut self, data: &Dataset) -> EstimatorResult<()> {
        let started = Instant::now();
        let fingerprint = self.fingerprint(data)?;
        let store = self.checkpoint_dir.as_deref().map(CheckpointStore::new);
        let mut state = self.restore_or_fresh(store.as_ref(), &fingerprint, data)?;
        let prior_elapsed = state.elapsed_nanos;

        let mut contract = self.time_limit.map(ContractManager::with_nanos);
        if let Some(contract) = contract.as_mut() {
            contract.credit(prior_elapsed);
        }
        let target = if contract.is_some() {
            self.config.max_estimators
        } else {
            self.config.n_estimators
        };
        let executor = ParallelBuildExecutor::new(self.threads)?;
        let interval = self.config.checkpoint_interval_secs.map(Duration::from_secs);
        let mut summary = BagBuildSummary {
            resumed_from: state.trees.len(),
            ..BagBuildSummary::default()
        };
        let mut since_checkpoint = 0usize;
        let mut last_checkpoint = Instant::now();

        while state.trees.len() < target
            && contract.as_ref().map_or(true, ContractManager::within_budget)
        {
            let batch_started = Instant::now();
            let batch = executor.batch_size(target - state.trees.len());
            let tasks: Vec<BuildTask> = (state.next_task..state.next_task + batch)
                .map(|index| BuildTask::new(self.config.seed, index))
                .collect();
            let factory = &self.factory;
            let (bagging, estimate_oob) = (self.config.bagging, self.config.estimate_oob);
            let outputs = executor.run_batch(tasks, |task| {
                Self::build_task(factory, data, task, bagging, estimate_oob)
            });
            for output in outputs {
                let output = output?;
                if let (Some(oob), Some(contribution)) = (state.oob.as_mut(), &output.contribution) {
                    oob.fold(contribution)?;
                }
                state.trees.push(output.record);
            }
            state.next_task += batch;
            summary.batches += 1;
            since_checkpoint += batch;
            if let Some(contract) = contract.as_mut() {
                contract.record(i64::try_from(batch_started.elapsed().as_nanos()).unwrap_or(i64::MAX));
            }

            if let Some(store) = store.as_ref() {
                let due = since_checkpoint >= self.config.checkpoint_every.max(1)
                    || interval.is_some_and(|every| last_checkpoint.elapsed() >= every);
                if due && state.trees.len() < target {
                    state.elapsed_nanos = prior_elapsed
                        + i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
                    self.save_checkpoint(store, &fingerprint, &state)?;
                    summary.checkpoints += 1;
                    since_checkpoint = 0;
                    last_checkpoint = Instant::now();
                }
            }
        }

        if state.trees.is_empty() {
            return Err(EstimatorError::ContractTooSmall {
                contract_nanos: self.time_limit.unwrap_or(0),
                unit: self.factory.unit(),
            });
        }

        state.elapsed_nanos =
            prior_elapsed + i64::try_from(started.elapsed().as_nanos()).unwrap_or(i64::MAX);
        if let Some(store) = store.as_ref() {
            self.save_checkpoint(store, &fingerprint, &state)?;
            summary.checkpoints += 1;
        }
        summary.built = state.trees.len();
        self.train_estimate = match state.oob.as_ref() {
            Some(oob) => Some(oob.estimate(data.labels())?),
            None => None,
        };
        emit(
            self.telemetry.as_ref(),
            LogLevel::Info,
            "bagging.build.complete",
            json!({
                "estimator": self.config.name,
                "built": summary.built,
                "resumed_from": summary.resumed_from,
                "batches": summary.batches,
                "threads": executor.threads(),
                "elapsed_nanos": state.elapsed_nanos,
            }),
        );
        self.last_build = summary;
        self.state = Some(state);
        Ok(())
    }

    fn predict_distribution(&self, instance: &Instance<'_>) -> EstimatorResult<Vec<f64>> {
        let state = self
            .state
            .as_ref()
            .filter(|state| !state.trees.is_empty())
            .ok_or_else(|| EstimatorError::Predict(format!("{} is not trained", self.config.name)))?;
        let mut votes = vec![0.0; state.num_classes];
        for tree in &state.trees {
            let dist = tree.learner.predict(instance.values)?;
            if dist.len() != state.num_classes {
                return Err(EstimatorError::Predict(format!(
                    "{} {} returned {} classes",
                    self.factory.unit(),
                    tree.task_index,
                    dist.len()
                )));
            }
            let weight = tree.learner.vote_weight();
            for (vote, probability) in votes.iter_mut().zip(dist) {
                *vote += weight * probability;
            }
        }
        normalize_or_uniform(&mut votes);
        Ok(votes)
    }

    fn set_time_limit(&mut self, nanos: i64) {
        self.time_limit = Some(nanos.max(0));
    }

    fn enable_parallelism(&mut self, threads: usize) {
        self.threads = threads.max(1);
    }

    fn set_checkpoint_dir(&mut self, dir: &Path) {
        self.checkpoint_dir = Some(dir.to_path_buf());
    }

    fn set_telemetry(&mut self, telemetry: EnsembleTelemetry) {
        self.telemetry = Some(telemetry);
    }

    fn train_estimate(&self) -> Option<TrainEstimate> {
        self.train_estimate.clone()
    }

    fn spawn_untrained(&self) -> Box<dyn Estimator> {
        let mut copy = Self::new(self.factory.clone(), self.config.clone());
        copy.time_limit = self.time_limit;
        copy.threads = self.threads;
        copy.telemetry = self.telemetry.clone();
        Box::new(copy)
    }

    fn save_state(&self) -> EstimatorResult<Option<serde_json::Value>> {
        let Some(snapshot) = self.state.clone() else {
            return Ok(None);
        };
        serde_json::to_value(SavedBag {
            snapshot,
            train_estimate: self.train_estimate.clone(),
        })
        .map(Some)
        .map_err(|err| EstimatorError::State(err.to_string()))
    }

    fn load_state(&mut self, state: serde_json::Value) -> EstimatorResult<()> {
        let saved: SavedBag<F::Params, F::Learner> =
            serde_json::from_value(state).map_err(|err| EstimatorError::State(err.to_string()))?;
        self.last_build = BagBuildSummary {
            built: saved.snapshot.trees.len(),
            resumed_from: saved.snapshot.trees.len(),
            ..BagBuildSummary::default()
        };
        self.state = Some(saved.snapshot);
        self.train_estimate = saved.train_estimate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combining::func::one_hot;
    use rand::Rng;
    use tempfile::tempdir;

    /// Votes for one fixed class; class 1 voters count three times.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct FixedVoter {
        class: usize,
        num_classes: usize,
    }

    impl WeakLearner for FixedVoter {
        fn predict(&self, _series: ArrayView1<'_, f64>) -> EstimatorResult<Vec<f64>> {
            Ok(one_hot(self.class, self.num_classes))
        }

        fn vote_weight(&self) -> f64 {
            if self.class == 1 {
                3.0
            } else {
                1.0
            }
        }
    }

    #[derive(Debug, Clone, Serialize)]
    struct FixedVoterFactory;

    impl WeakLearnerFactory for FixedVoterFactory {
        type Params = usize;
        type Learner = FixedVoter;

        fn unit(&self) -> &'static str {
            "voter"
        }

        fn draw(&self, rng: &mut SmallRng, _series_length: usize) -> usize {
            rng.gen_range(0..2)
        }

        fn fit(&self, params: &usize, data: &Dataset) -> EstimatorResult<FixedVoter> {
            Ok(FixedVoter {
                class: *params,
                num_classes: data.num_classes(),
            })
        }
    }

    fn levels(n_per_class: usize) -> Dataset {
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_per_class * 2 {
            let class = i % 2;
            let base = class as f64 * 4.0;
            rows.push((0..12).map(|t| base + ((t + i) % 3) as f64 * 0.5).collect());
            labels.push(class);
        }
        Dataset::from_rows("levels", &rows, labels, 2).unwrap()
    }

    fn forest(n: usize) -> BaggedEnsemble<IntervalFeatureFactory> {
        BaggedEnsemble::new(
            IntervalFeatureFactory::default(),
            BaggingConfig {
                name: "forest".into(),
                seed: 11,
                n_estimators: n,
                checkpoint_every: 4,
                ..BaggingConfig::default()
            },
        )
    }

    #[test]
    fn builds_target_and_self_estimates() {
        let data = levels(6);
        let mut model = forest(12);
        model.train(&data).unwrap();
        assert_eq!(model.len(), 12);
        let estimate = model.train_estimate().unwrap();
        assert_eq!(estimate.posteriors.nrows(), data.len());
        assert!(estimate.accuracy() > 0.5);
        let dist = model.predict_distribution(&data.instance(1)).unwrap();
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn learner_vote_weights_scale_predictions() {
        let data = levels(4);
        let mut model = BaggedEnsemble::new(
            FixedVoterFactory,
            BaggingConfig {
                name: "voters".into(),
                seed: 5,
                n_estimators: 24,
                ..BaggingConfig::default()
            },
        );
        model.train(&data).unwrap();
        let ones = model.trees().iter().filter(|tree| tree.params == 1).count() as f64;
        let zeros = model.len() as f64 - ones;
        assert!(ones > 0.0 && zeros > 0.0);

        let dist = model.predict_distribution(&data.instance(0)).unwrap();
        let expected = 3.0 * ones / (zeros + 3.0 * ones);
        assert!((dist[1] - expected).abs() < 1e-12);
        assert!((dist[1] - ones / model.len() as f64).abs() > 1e-6);

        // Out-of-bag rows are weighted the same way.
        let estimate = model.train_estimate().unwrap();
        for row in 0..data.len() {
            let (mut weight, mut class_one) = (0.0, 0.0);
            for tree in model.trees().iter().filter(|tree| !tree.sampled_indices.contains(&row)) {
                let w = tree.learner.vote_weight();
                weight += w;
                if tree.params == 1 {
                    class_one += w;
                }
            }
            assert_eq!(estimate.evaluated[row], weight > 0.0);
            if weight > 0.0 {
                assert!((estimate.posteriors[[row, 1]] - class_one / weight).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn zero_contract_is_too_small() {
        let mut model = forest(12);
        model.set_time_limit(0);
        let err = model.train(&levels(3)).unwrap_err();
        assert!(matches!(err, EstimatorError::ContractTooSmall { contract_nanos: 0, .. }));
        assert!(model.is_empty());
    }

    #[test]
    fn thread_count_does_not_change_learners() {
        let data = levels(5);
        let mut single = forest(9);
        single.train(&data).unwrap();
        let mut multi = forest(9);
        multi.enable_parallelism(4);
        multi.train(&data).unwrap();
        assert_eq!(single.trees(), multi.trees());
        assert_eq!(single.train_estimate(), multi.train_estimate());
    }

    #[test]
    fn resume_matches_uninterrupted_build() {
        let data = levels(5);
        let tmp = tempdir().unwrap();

        let mut partial = forest(6);
        partial.set_checkpoint_dir(tmp.path());
        partial.train(&data).unwrap();

        let mut resumed = forest(10);
        resumed.set_checkpoint_dir(tmp.path());
        resumed.train(&data).unwrap();
        assert_eq!(resumed.last_build().resumed_from, 6);
        assert_eq!(resumed.len(), 10);

        let mut straight = forest(10);
        straight.train(&data).unwrap();
        assert_eq!(resumed.trees(), straight.trees());
        assert_eq!(resumed.train_estimate(), straight.train_estimate());
    }

    #[test]
    fn unbagged_build_is_not_self_estimating() {
        let mut model = BaggedEnsemble::new(
            IntervalFeatureFactory::default(),
            BaggingConfig {
                bagging: false,
                n_estimators: 3,
                ..BaggingConfig::default()
            },
        );
        assert!(!model.capabilities().self_estimating);
        model.train(&levels(3)).unwrap();
        assert!(model.train_estimate().is_none());
        assert!(model.trees().iter().all(|tree| tree.sampled_indices.len() == 6));
    }

    #[test]
    fn state_restores_predictions() {
        let data = levels(4);
        let mut model = forest(5);
        model.train(&data).unwrap();
        let state = model.save_state().unwrap().unwrap();
        let mut restored = forest(5);
        restored.load_state(state).unwrap();
        assert_eq!(restored.trees(), model.trees());
        assert_eq!(
            restored.predict_distribution(&data.instance(0)).unwrap(),
            model.predict_distribution(&data.instance(0)).unwrap()
        );
    }

    #[test]
    fn snapshot_survives_serialization() {
        let data = levels(3);
        let mut model = forest(4);
        model.train(&data).unwrap();
        let snapshot = model.snapshot().unwrap();
        let encoded = serde_json::to_string(snapshot).unwrap();
        let decoded: BaggedSnapshot<IntervalParams, IntervalLearner> =
            serde_json::from_str(&encoded).unwrap();
        assert_eq!(&decoded, snapshot);
    }
}
