use std::{fmt, sync::Arc};

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::{
    bagging::{BaggedEnsemble, BaggingConfig, IntervalFeatureFactory},
    centroid::NearestCentroid,
    errors::{EnsembleError, EnsembleResult},
    estimator::Estimator,
};

/// What a constructor learns about the module it builds for.
#[derive(Debug, Clone, Copy)]
pub struct ModuleContext<'a> {
    /// Module name, unique within the ensemble.
    pub module: &'a str,
    /// Seed derived for this module.
    pub seed: u64,
}

/// Builds a fresh estimator for a module.
pub type EstimatorConstructor =
    Arc<dyn Fn(ModuleContext<'_>) -> Box<dyn Estimator> + Send + Sync>;

/// Maps estimator keys to constructors. Keys are fixed at registration, so an
/// unknown key is rejected before any training starts.
#[derive(Clone, Default)]
pub struct EstimatorRegistry {
    inner: Arc<RwLock<IndexMap<String, EstimatorConstructor>>>,
}

impl fmt::Debug for EstimatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EstimatorRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}

impl EstimatorRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in estimators.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        {
            let mut map = registry.inner.write();
            map.insert(
                "IntervalForest".into(),
                constructor(|ctx| Box::new(interval_ensemble(ctx, false))),
            );
            map.insert(
                "IntervalBagging".into(),
                constructor(|ctx| Box::new(interval_ensemble(ctx, true))),
            );
            map.insert(
                "NearestCentroid".into(),
                constructor(|_| Box::new(NearestCentroid::new())),
            );
        }
        registry
    }

    /// Adds `key`. Re-registering an existing key is a configuration error.
    pub fn register<C>(&self, key: impl Into<String>, constructor: C) -> EnsembleResult<()>
    where
        C: Fn(ModuleContext<'_>) -> Box<dyn Estimator> + Send + Sync + 'static,
    {
        let key = key.into();
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return Err(EnsembleError::Config(format!(
                "estimator '{key}' is already registered"
            )));
        }
        map.insert(key, Arc::new(constructor));
        Ok(())
    }

    /// Whether `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.read().contains_key(key)
    }

    /// Registered keys in registration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// Builds the estimator registered under `key`.
    pub fn create(&self, key: &str, ctx: ModuleContext<'_>) -> EnsembleResult<Box<dyn Estimator>> {
        let constructor = self
            .inner
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EnsembleError::Config(format!("unknown estimator '{key}'")))?;
        Ok(constructor(ctx))
    }
}

fn constructor<C>(build: C) -> EstimatorConstructor
where
    C: Fn(ModuleContext<'_>) -> Box<dyn Estimator> + Send + Sync + 'static,
{
    Arc::new(build)
}

fn interval_ensemble(ctx: ModuleContext<'_>, bagging: bool) -> BaggedEnsemble<IntervalFeatureFactory> {
    BaggedEnsemble::new(
        IntervalFeatureFactory::default(),
        BaggingConfig {
            name: ctx.module.to_string(),
            seed: ctx.seed,
            bagging,
            estimate_oob: bagging,
            ..BaggingConfig::default()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ModuleContext<'static> {
        ModuleContext {
            module: "m",
            seed: 1,
        }
    }

    #[test]
    fn defaults_cover_builtins() {
        let registry = EstimatorRegistry::with_defaults();
        assert_eq!(
            registry.keys(),
            vec!["IntervalForest", "IntervalBagging", "NearestCentroid"]
        );
        let bagged = registry.create("IntervalBagging", ctx()).unwrap();
        assert!(bagged.capabilities().self_estimating);
        assert_eq!(bagged.name(), "m");
        let forest = registry.create("IntervalForest", ctx()).unwrap();
        assert!(!forest.capabilities().self_estimating);
        assert!(forest.capabilities().contractable);
    }

    #[test]
    fn unknown_and_duplicate_keys_are_config_errors() {
        let registry = EstimatorRegistry::with_defaults();
        assert!(matches!(
            registry.create("Rocket", ctx()),
            Err(EnsembleError::Config(_))
        ));
        let err = registry
            .register("NearestCentroid", |_| Box::new(NearestCentroid::new()))
            .unwrap_err();
        assert!(matches!(err, EnsembleError::Config(_)));
        registry
            .register("Centroid2", |_| Box::new(NearestCentroid::new()))
            .unwrap();
        assert!(registry.contains("Centroid2"));
    }
}
