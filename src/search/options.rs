//! Scheduler options
//!
//! The configuration object handed to the scheduler alongside the search
//! space: resource spec, trial/time limits, checkpointing, and the
//! searcher selection with its strategy-specific overrides.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigMap, TaskConfig};
use crate::resource::ResourceBudget;

/// Time attribute reported by trials (epoch counter)
pub const TIME_ATTR: &str = "epoch";

/// Reward attribute reported by trials (mean average precision)
pub const REWARD_ATTR: &str = "map_reward";

/// Hyperband default budget ceiling when `train.epochs` is unset
pub const HYPERBAND_DEFAULT_MAX_T: usize = 50;

/// Per-trial resource specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Worker threads per trial
    pub num_cpus: usize,

    /// GPUs per trial
    pub num_gpus: usize,
}

/// Options consumed by the scheduler driving the search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerOptions {
    /// Per-trial resource budget
    pub resource: ResourceSpec,

    /// Path for persisted scheduler state
    pub checkpoint: String,

    /// Number of trials to run
    pub num_trials: usize,

    /// Wall-clock limit for the whole search, in seconds
    pub time_out: u64,

    /// Whether to reload prior state from the checkpoint path
    pub resume: bool,

    /// Visualizer backend name
    pub visualizer: String,

    /// Name of the time attribute in trial reports
    pub time_attr: String,

    /// Name of the reward attribute in trial reports
    pub reward_attr: String,

    /// Remote worker addresses for distributed scheduling
    pub dist_ip_addrs: Vec<String>,

    /// Searcher algorithm the scheduler should sample with
    pub searcher: String,

    /// Searcher-specific overrides, passed through opaquely
    pub search_options: ConfigMap,

    /// Hyperband: maximum per-trial budget in epochs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_t: Option<usize>,

    /// Hyperband: minimum epochs before a trial can be stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<usize>,
}

impl SchedulerOptions {
    /// Derive scheduler options from the task configuration and the
    /// clamped resource budget
    ///
    /// For `search_strategy = "hyperband"` the underlying sampler is
    /// forced to `"random"` and `max_t`/`grace_period` are filled in; the
    /// hyperband scheduler requires a random sampler underneath, so the
    /// override is intentional.
    pub fn from_task(config: &TaskConfig, budget: &ResourceBudget) -> Self {
        let mut options = Self {
            resource: ResourceSpec {
                num_cpus: budget.num_workers,
                num_gpus: budget.gpus.len(),
            },
            checkpoint: config.checkpoint.clone(),
            num_trials: config.num_trials,
            time_out: config.time_limits,
            resume: !config.resume.is_empty(),
            visualizer: config.visualizer.clone(),
            time_attr: TIME_ATTR.to_string(),
            reward_attr: REWARD_ATTR.to_string(),
            dist_ip_addrs: config.dist_ip_addrs.clone(),
            searcher: config.search_strategy.clone(),
            search_options: config.search_options.clone(),
            max_t: None,
            grace_period: None,
        };

        if config.search_strategy == "hyperband" {
            let max_t = config.epochs.unwrap_or(HYPERBAND_DEFAULT_MAX_T);
            options.searcher = "random".to_string();
            options.max_t = Some(max_t);
            options.grace_period = Some(config.grace_period.unwrap_or(max_t / 4));
        }

        options
    }
}
