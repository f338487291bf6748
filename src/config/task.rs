//! Typed task configuration
//!
//! The user-facing configuration for one detection search, with documented
//! defaults and builder setters. `from_map` accepts the loose mapping form
//! (flat or nested) and validates it up front, so malformed input fails at
//! construction rather than inside a trial.

use crate::config::{to_nested, ConfigMap, ConfigValue};
use crate::error::TaskError;
use crate::estimator::EstimatorKind;

/// Default random seed used when the caller does not provide one
pub const DEFAULT_SEED: u64 = 233;

/// Default number of trials when neither count nor time limit is given
pub const DEFAULT_NUM_TRIALS: usize = 2;

/// Default wall-clock limit for the whole search, in seconds
pub const DEFAULT_TIME_LIMITS: u64 = 60 * 60;

/// Default checkpoint path for scheduler state
pub const DEFAULT_CHECKPOINT: &str = "checkpoint/exp1.ag";

/// Configuration for a detection search task
#[derive(Debug, Clone)]
pub struct TaskConfig {
    /// Dataset identifier
    pub dataset: String,

    /// Explicit estimator candidates; `None` requests auto-suggestion
    pub estimators: Option<Vec<EstimatorKind>>,

    /// Random seed for sampling and trial training
    pub seed: u64,

    /// Training epochs per trial (`None` lets the estimator default apply)
    pub epochs: Option<usize>,

    /// Requested worker threads per trial (`None` = all available)
    pub num_workers: Option<usize>,

    /// Requested GPU indices (empty = CPU-only)
    pub gpus: Vec<usize>,

    /// Search strategy name ("random", "hyperband", ...)
    pub search_strategy: String,

    /// Number of trials to run
    pub num_trials: usize,

    /// Wall-clock limit for the whole search, in seconds
    pub time_limits: u64,

    /// Checkpoint path for scheduler state
    pub checkpoint: String,

    /// Resume path; empty string means no resume
    pub resume: String,

    /// Visualizer backend name
    pub visualizer: String,

    /// Remote worker addresses for distributed scheduling
    pub dist_ip_addrs: Vec<String>,

    /// Strategy-specific searcher overrides
    pub search_options: ConfigMap,

    /// Hyperband grace period override
    pub grace_period: Option<usize>,

    /// Whether to auto-suggest estimator candidates from dataset statistics
    pub auto_suggest: bool,

    /// Unrecognized keys, carried into the search space verbatim
    pub extra: ConfigMap,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            dataset: String::new(),
            estimators: None,
            seed: DEFAULT_SEED,
            epochs: None,
            num_workers: None,
            gpus: Vec::new(),
            search_strategy: "random".to_string(),
            num_trials: DEFAULT_NUM_TRIALS,
            time_limits: DEFAULT_TIME_LIMITS,
            checkpoint: DEFAULT_CHECKPOINT.to_string(),
            resume: String::new(),
            visualizer: "none".to_string(),
            dist_ip_addrs: Vec::new(),
            search_options: ConfigMap::new(),
            grace_period: None,
            auto_suggest: true,
            extra: ConfigMap::new(),
        }
    }
}

impl TaskConfig {
    /// Create a configuration for the given dataset with default settings
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            ..Self::default()
        }
    }

    /// Set explicit estimator candidates (disables auto-suggestion)
    pub fn estimators(mut self, estimators: Vec<EstimatorKind>) -> Self {
        self.estimators = Some(estimators);
        self.auto_suggest = false;
        self
    }

    /// Set a single explicit estimator (disables auto-suggestion)
    pub fn estimator(self, estimator: EstimatorKind) -> Self {
        self.estimators(vec![estimator])
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set training epochs per trial
    pub fn epochs(mut self, epochs: usize) -> Self {
        self.epochs = Some(epochs);
        self
    }

    /// Set requested worker threads per trial
    pub fn num_workers(mut self, workers: usize) -> Self {
        self.num_workers = Some(workers);
        self
    }

    /// Set requested GPU indices
    pub fn gpus(mut self, gpus: Vec<usize>) -> Self {
        self.gpus = gpus;
        self
    }

    /// Set the search strategy
    pub fn search_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.search_strategy = strategy.into();
        self
    }

    /// Set the number of trials
    pub fn num_trials(mut self, trials: usize) -> Self {
        self.num_trials = trials;
        self
    }

    /// Set the search wall-clock limit in seconds
    pub fn time_limits(mut self, seconds: u64) -> Self {
        self.time_limits = seconds;
        self
    }

    /// Set the checkpoint path
    pub fn checkpoint(mut self, path: impl Into<String>) -> Self {
        self.checkpoint = path.into();
        self
    }

    /// Set the resume path (empty disables resume)
    pub fn resume(mut self, path: impl Into<String>) -> Self {
        self.resume = path.into();
        self
    }

    /// Parse from a loose configuration mapping (flat or nested)
    ///
    /// Recognized keys are lifted into typed fields; anything else lands in
    /// `extra` and flows through to the search space untouched. Type
    /// mismatches on recognized keys are rejected here.
    pub fn from_map(map: &ConfigMap) -> Result<Self, TaskError> {
        let nested = to_nested(map);
        let mut config = Self::default();

        for (key, value) in &nested {
            match key.as_str() {
                "dataset" => {
                    config.dataset = require_str(key, value)?.to_string();
                }
                "estimator" => {
                    config.estimators = Some(parse_estimators(value)?);
                    config.auto_suggest = false;
                }
                "train" => {
                    let train = require_map(key, value)?;
                    if let Some(v) = train.get("seed") {
                        config.seed = require_u64("train.seed", v)?;
                    }
                    if let Some(v) = train.get("epochs") {
                        let epochs = require_u64("train.epochs", v)? as usize;
                        if epochs == 0 {
                            return Err(TaskError::InvalidConfig(
                                "`train.epochs` must be at least 1".into(),
                            ));
                        }
                        config.epochs = Some(epochs);
                    }
                }
                "num_workers" => {
                    config.num_workers = Some(require_u64(key, value)? as usize);
                }
                "gpus" => {
                    let list = require_list(key, value)?;
                    config.gpus = list
                        .iter()
                        .map(|v| require_u64(key, v).map(|n| n as usize))
                        .collect::<Result<_, _>>()?;
                }
                "search_strategy" => {
                    config.search_strategy = require_str(key, value)?.to_string();
                }
                "num_trials" => {
                    config.num_trials = require_u64(key, value)? as usize;
                }
                "time_limits" => {
                    config.time_limits = require_u64(key, value)?;
                }
                "checkpoint" => {
                    config.checkpoint = require_str(key, value)?.to_string();
                }
                "resume" => {
                    config.resume = require_str(key, value)?.to_string();
                }
                "visualizer" => {
                    config.visualizer = require_str(key, value)?.to_string();
                }
                "dist_ip_addrs" => {
                    let list = require_list(key, value)?;
                    config.dist_ip_addrs = list
                        .iter()
                        .map(|v| require_str(key, v).map(str::to_string))
                        .collect::<Result<_, _>>()?;
                }
                "search_options" => {
                    config.search_options = require_map(key, value)?.clone();
                }
                "grace_period" => {
                    config.grace_period = Some(require_u64(key, value)? as usize);
                }
                "auto_suggest" => {
                    config.auto_suggest = value.as_bool().ok_or_else(|| {
                        TaskError::InvalidConfig(format!("`{}` must be a boolean", key))
                    })?;
                }
                _ => {
                    config.extra.insert(key.clone(), value.clone());
                }
            }
        }

        if config.dataset.is_empty() {
            return Err(TaskError::InvalidConfig("`dataset` is required".into()));
        }
        Ok(config)
    }
}

fn require_str<'a>(key: &str, value: &'a ConfigValue) -> Result<&'a str, TaskError> {
    value
        .as_str()
        .ok_or_else(|| TaskError::InvalidConfig(format!("`{}` must be a string", key)))
}

fn require_u64(key: &str, value: &ConfigValue) -> Result<u64, TaskError> {
    value
        .as_i64()
        .filter(|v| *v >= 0)
        .map(|v| v as u64)
        .ok_or_else(|| {
            TaskError::InvalidConfig(format!("`{}` must be a non-negative integer", key))
        })
}

fn require_list<'a>(key: &str, value: &'a ConfigValue) -> Result<&'a [ConfigValue], TaskError> {
    value
        .as_list()
        .ok_or_else(|| TaskError::InvalidConfig(format!("`{}` must be a list", key)))
}

fn require_map<'a>(key: &str, value: &'a ConfigValue) -> Result<&'a ConfigMap, TaskError> {
    value
        .as_map()
        .ok_or_else(|| TaskError::InvalidConfig(format!("`{}` must be a mapping", key)))
}

fn parse_estimators(value: &ConfigValue) -> Result<Vec<EstimatorKind>, TaskError> {
    match value {
        ConfigValue::Str(name) => Ok(vec![EstimatorKind::parse(name)?]),
        ConfigValue::List(items) => items
            .iter()
            .map(|v| {
                let name = v.as_str().ok_or_else(|| {
                    TaskError::InvalidConfig("`estimator` list entries must be strings".into())
                })?;
                EstimatorKind::parse(name)
            })
            .collect(),
        _ => Err(TaskError::InvalidConfig(
            "`estimator` must be a name or list of names".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TaskConfig::new("voc_tiny");
        assert_eq!(config.seed, 233);
        assert_eq!(config.num_trials, 2);
        assert_eq!(config.time_limits, 3600);
        assert_eq!(config.checkpoint, "checkpoint/exp1.ag");
        assert!(config.auto_suggest);
        assert!(config.estimators.is_none());
    }

    #[test]
    fn test_from_map_flat_keys() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("train.epochs".into(), ConfigValue::Int(1));
        map.insert("train.seed".into(), ConfigValue::Int(42));
        map.insert("estimator".into(), "ssd".into());
        map.insert(
            "gpus".into(),
            ConfigValue::List(vec![ConfigValue::Int(0), ConfigValue::Int(1)]),
        );

        let config = TaskConfig::from_map(&map).unwrap();
        assert_eq!(config.dataset, "voc_tiny");
        assert_eq!(config.epochs, Some(1));
        assert_eq!(config.seed, 42);
        assert_eq!(config.estimators, Some(vec![EstimatorKind::Ssd]));
        assert!(!config.auto_suggest);
        assert_eq!(config.gpus, vec![0, 1]);
    }

    #[test]
    fn test_from_map_missing_dataset() {
        let map = ConfigMap::new();
        assert!(matches!(
            TaskConfig::from_map(&map),
            Err(TaskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_map_bad_estimator() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("estimator".into(), "resnet_classifier".into());
        assert!(matches!(
            TaskConfig::from_map(&map),
            Err(TaskError::InvalidEstimator(_))
        ));
    }

    #[test]
    fn test_from_map_type_mismatch() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("num_trials".into(), "three".into());
        assert!(matches!(
            TaskConfig::from_map(&map),
            Err(TaskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_map_zero_epochs_rejected() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("train.epochs".into(), ConfigValue::Int(0));
        assert!(matches!(
            TaskConfig::from_map(&map),
            Err(TaskError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unknown_keys_go_to_extra() {
        let mut map = ConfigMap::new();
        map.insert("dataset".into(), "voc_tiny".into());
        map.insert("my_flag".into(), ConfigValue::Bool(true));
        let config = TaskConfig::from_map(&map).unwrap();
        assert_eq!(config.extra["my_flag"].as_bool(), Some(true));
    }
}
