//! Object-detection search task
//!
//! [`DetectionTask`] is the facade over the whole pipeline: construction
//! validates the configuration, clamps resources, and assembles the search
//! space and scheduler options; [`DetectionTask::fit`] drives the
//! scheduler and reconstructs the winning estimator; [`DetectionTask::load`]
//! is the sole read path for persisted models.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{to_nested, ConfigMap, ConfigValue, TaskConfig};
use crate::error::TaskError;
use crate::estimator::{Estimator, EstimatorKind, ParamSnapshot};
use crate::resource::ResourceBudgeter;
use crate::search::{
    LocalScheduler, Parameter, Reporter, Scheduler, SchedulerOptions, SearchSpace,
    SearchSpaceBuilder,
};

/// A fully-parameterized, weight-populated detection model
///
/// The persisted form carries architecture identity, the winning nested
/// configuration, and the parameter snapshot;
/// [`TrainedDetector::into_estimator`] rebuilds a live estimator from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedDetector {
    kind: EstimatorKind,
    config: ConfigMap,
    params: ParamSnapshot,
}

impl TrainedDetector {
    /// Architecture of this model
    pub fn kind(&self) -> EstimatorKind {
        self.kind
    }

    /// The nested configuration the model was trained with
    pub fn config(&self) -> &ConfigMap {
        &self.config
    }

    /// The trained parameters
    pub fn params(&self) -> &ParamSnapshot {
        &self.params
    }

    /// Persist to a JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing model to {}", path.display()))?;
        Ok(())
    }

    /// Load from a JSON file, rejecting anything that is not a detection
    /// estimator
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading model from {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("parsing model from {}", path.display()))?;

        // A classification model saved through the same mechanism would
        // carry a foreign kind tag; refuse it here instead of failing
        // somewhere downstream.
        let kind_name = value
            .get("kind")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TaskError::TypeMismatch("no `kind` tag in file".to_string()))?;
        EstimatorKind::parse(kind_name)
            .map_err(|_| TaskError::TypeMismatch(format!("kind `{kind_name}`")))?;

        Ok(serde_json::from_value(value)?)
    }

    /// Rebuild a live estimator with these parameters loaded
    pub fn into_estimator(self) -> Result<Box<dyn Estimator>> {
        let mut estimator = self.kind.build(&self.config, Reporter::sink())?;
        estimator.put_params(&self.params)?;
        Ok(estimator)
    }
}

/// Hyperparameter search over detection estimators
pub struct DetectionTask {
    config: TaskConfig,
    space: SearchSpace,
    options: SchedulerOptions,
    scheduler: Box<dyn Scheduler>,
}

impl DetectionTask {
    /// Create a task from a validated configuration
    ///
    /// Resource clamping, estimator selection, search-space assembly, and
    /// scheduler-option derivation all happen here; configuration problems
    /// surface before any trial runs.
    pub fn new(config: TaskConfig) -> Result<Self> {
        Self::with_parameters(config, Vec::new())
    }

    /// Create a task with extra sampleable hyperparameters
    pub fn with_parameters(config: TaskConfig, parameters: Vec<Parameter>) -> Result<Self> {
        Self::assemble(config, parameters, ResourceBudgeter::detect())
    }

    /// Create a task against an explicit machine capacity (tests, mostly)
    pub fn with_budgeter(config: TaskConfig, budgeter: ResourceBudgeter) -> Result<Self> {
        Self::assemble(config, Vec::new(), budgeter)
    }

    fn assemble(
        config: TaskConfig,
        parameters: Vec<Parameter>,
        budgeter: ResourceBudgeter,
    ) -> Result<Self> {
        let budget = budgeter.clamp(config.num_workers, config.gpus.len());
        let options = SchedulerOptions::from_task(&config, &budget);

        let mut builder = SearchSpaceBuilder::new(config.clone(), budget);
        for parameter in parameters {
            builder = builder.add_parameter(parameter);
        }
        let space = builder.build()?;

        Ok(Self {
            config,
            space,
            options,
            scheduler: Box::new(LocalScheduler),
        })
    }

    /// Replace the built-in scheduler
    pub fn with_scheduler(mut self, scheduler: Box<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// The task configuration
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// The assembled search space
    pub fn search_space(&self) -> &SearchSpace {
        &self.space
    }

    /// The options that will be handed to the scheduler
    pub fn scheduler_options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Run the search and return the best trained model
    ///
    /// Blocks until the scheduler terminates by trial count or time limit.
    /// The winning configuration is resolved to concrete values, converted
    /// to nested form, and used to reconstruct the estimator without
    /// retraining; the final-fit parameter snapshot is loaded into it.
    pub fn fit(&self) -> Result<TrainedDetector> {
        let results = self.scheduler.run(&self.space, &self.options)?;
        info!("finished model fitting");

        let best = results.best.ok_or(TaskError::SearchExhausted)?;
        let resolved = self.space.resolve(&best.config);
        let nested = to_nested(&resolved);

        let name = nested
            .get("estimator")
            .and_then(ConfigValue::as_str)
            .ok_or_else(|| {
                TaskError::InvalidConfig("best configuration has no estimator".to_string())
            })?;
        let kind = EstimatorKind::parse(name)?;
        info!(estimator = %kind, reward = best.reward, "best configuration selected");
        tracing::debug!(config = ?nested, "winning configuration");

        let mut estimator = kind.build(&nested, Reporter::sink())?;
        estimator.put_params(&best.params)?;

        Ok(TrainedDetector {
            kind,
            config: nested,
            params: best.params,
        })
    }

    /// Load a persisted detection model
    ///
    /// Fails with [`TaskError::TypeMismatch`] when the file holds anything
    /// outside the detection capability set.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<TrainedDetector> {
        TrainedDetector::load(path)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn task_config(dir: &Path) -> TaskConfig {
        TaskConfig::new("voc_tiny")
            .estimator(EstimatorKind::Ssd)
            .epochs(1)
            .num_trials(1)
            .checkpoint(dir.join("exp1.ag").to_str().unwrap())
    }

    #[test]
    fn test_construction_validates_before_running() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("estimator".into(), "not_a_detector".into());
        let err = TaskConfig::from_map(&map).unwrap_err();
        assert!(matches!(err, TaskError::InvalidEstimator(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let config = task_config(dir.path());
        let task =
            DetectionTask::with_budgeter(config, ResourceBudgeter::new(1, 0)).unwrap();

        let model = task.fit().unwrap();
        assert_eq!(model.kind(), EstimatorKind::Ssd);
        assert!(!model.params().is_empty());

        let path = dir.path().join("model.json");
        model.save(&path).unwrap();
        let loaded = DetectionTask::load(&path).unwrap();
        assert_eq!(loaded.kind(), EstimatorKind::Ssd);
        assert_eq!(loaded.params(), model.params());
    }

    #[test]
    fn test_load_rejects_foreign_kind() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classifier.json");
        fs::write(
            &path,
            r#"{"kind": "resnet_classifier", "config": {}, "params": {"layers": {}}}"#,
        )
        .unwrap();

        let err = DetectionTask::load(&path).unwrap_err();
        let task_err = err.downcast_ref::<TaskError>().expect("typed error");
        assert!(matches!(task_err, TaskError::TypeMismatch(_)));
    }

    #[test]
    fn test_load_rejects_untagged_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blob.json");
        fs::write(&path, r#"{"weights": [1, 2, 3]}"#).unwrap();

        let err = DetectionTask::load(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskError>(),
            Some(TaskError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_into_estimator_restores_params() {
        let dir = tempdir().unwrap();
        let config = task_config(dir.path());
        let task =
            DetectionTask::with_budgeter(config, ResourceBudgeter::new(1, 0)).unwrap();

        let model = task.fit().unwrap();
        let params = model.params().clone();
        let estimator = model.into_estimator().unwrap();
        assert_eq!(estimator.kind(), EstimatorKind::Ssd);
        assert_eq!(estimator.collect_params(), params);
    }
}
