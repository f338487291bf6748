//! Trial scheduling
//!
//! The task controller drives the search through the narrow [`Scheduler`]
//! trait: hand over a search space and options, get back per-trial records
//! and the best trial's config plus parameter snapshot. [`LocalScheduler`]
//! is the built-in implementation: a bounded pool of worker threads fed
//! through channels, random sampling, JSON checkpointing of trial history.
//! Distributed or early-stopping schedulers plug in behind the same trait.

use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::unbounded;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ConfigMap, ConfigValue};
use crate::estimator::ParamSnapshot;
use crate::search::options::SchedulerOptions;
use crate::search::space::SearchSpace;
use crate::search::trial::{run_trial, Reporter, TrialOutcome};

/// One finished (or failed) trial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Trial id, unique within one checkpoint history
    pub id: usize,

    /// The sampled flat configuration this trial ran with
    pub config: ConfigMap,

    /// Last reported reward, if any report arrived
    pub reward: Option<f64>,

    /// Failure reason, if the trial did not complete
    pub error: Option<String>,
}

impl TrialRecord {
    /// True when the trial completed and produced a reward
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.reward.is_some()
    }
}

/// The winning trial, ready for estimator reconstruction
#[derive(Debug, Clone)]
pub struct BestTrial {
    /// The winning sampled configuration (possibly partial)
    pub config: ConfigMap,

    /// The winning reward
    pub reward: f64,

    /// Parameter snapshot captured by the final-fit run of this config
    pub params: ParamSnapshot,
}

/// Everything a finished search produced
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// All trial records, resumed history included
    pub trials: Vec<TrialRecord>,

    /// The best trial, absent when no trial succeeded
    pub best: Option<BestTrial>,
}

/// The external-scheduler boundary
pub trait Scheduler {
    /// Run the whole search, blocking until it terminates
    fn run(&self, space: &SearchSpace, options: &SchedulerOptions) -> Result<SearchResults>;
}

/// Persisted scheduler state at the checkpoint path
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointState {
    trials: Vec<TrialRecord>,
}

impl CheckpointState {
    fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading scheduler checkpoint {path}"))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing scheduler checkpoint {path}"))
    }

    fn save(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing scheduler checkpoint {path}"))?;
        Ok(())
    }
}

/// In-process scheduler running trials on a bounded worker pool
#[derive(Debug, Default)]
pub struct LocalScheduler;

impl LocalScheduler {
    /// Per-trial sampling seed: the configured seed, decorrelated by id
    fn sampling_seed(space: &SearchSpace, trial_id: usize) -> u64 {
        let base = space
            .base()
            .get("train.seed")
            .and_then(ConfigValue::as_i64)
            .unwrap_or(0) as u64;
        base.wrapping_add((trial_id as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }

    /// Re-run the winning configuration once with `final_fit` set, to
    /// capture its parameter snapshot
    fn final_fit(space: &SearchSpace, config: &ConfigMap) -> Option<ParamSnapshot> {
        let mut resolved = space.resolve(config);
        resolved.insert("final_fit".to_string(), ConfigValue::Bool(true));
        match run_trial(&resolved, &Reporter::sink()) {
            TrialOutcome::Success {
                params: Some(params),
            } => Some(params),
            TrialOutcome::Success { params: None } => {
                warn!("final fit returned no parameters");
                None
            }
            TrialOutcome::Failure { reason } => {
                warn!("final fit of best configuration failed: {reason}");
                None
            }
        }
    }
}

impl Scheduler for LocalScheduler {
    fn run(&self, space: &SearchSpace, options: &SchedulerOptions) -> Result<SearchResults> {
        let mut state = if options.resume {
            match CheckpointState::load(&options.checkpoint) {
                Ok(state) => {
                    info!(
                        trials = state.trials.len(),
                        "resumed scheduler state from {}", options.checkpoint
                    );
                    state
                }
                Err(err) => {
                    warn!("could not resume from {}: {err:#}", options.checkpoint);
                    CheckpointState::default()
                }
            }
        } else {
            CheckpointState::default()
        };

        let start_id = state.trials.len();
        let deadline = Instant::now() + Duration::from_secs(options.time_out);
        let workers = options.resource.num_cpus.max(1).min(options.num_trials.max(1));

        let (job_tx, job_rx) = unbounded::<usize>();
        let (result_tx, result_rx) = unbounded::<(usize, ConfigMap, TrialOutcome)>();
        let (report_tx, report_rx) = unbounded();

        for id in start_id..start_id + options.num_trials {
            // Channel is unbounded and both ends are alive here.
            job_tx.send(id).expect("job channel open");
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let report_tx = report_tx.clone();
                scope.spawn(move || {
                    while let Ok(id) = job_rx.recv() {
                        if Instant::now() >= deadline {
                            warn!(trial = id, "time limit reached, skipping trial");
                            continue;
                        }
                        let mut rng = StdRng::seed_from_u64(Self::sampling_seed(space, id));
                        let sampled = space.sample(&mut rng);
                        let reporter = Reporter::new(id, report_tx.clone());
                        let outcome = run_trial(&sampled, &reporter);
                        let _ = result_tx.send((id, sampled, outcome));
                    }
                });
            }
        });
        drop(result_tx);
        drop(report_tx);

        // Last report per trial is the trial's final reward.
        let mut rewards = std::collections::BTreeMap::new();
        for report in report_rx.try_iter() {
            rewards.insert(report.trial_id, report.map_reward);
        }

        let mut finished: Vec<_> = result_rx.try_iter().collect();
        finished.sort_by_key(|(id, _, _)| *id);
        for (id, config, outcome) in finished {
            let record = match outcome {
                TrialOutcome::Success { .. } => TrialRecord {
                    id,
                    config,
                    reward: rewards.get(&id).copied(),
                    error: None,
                },
                TrialOutcome::Failure { reason } => {
                    warn!(trial = id, "trial failed: {reason}");
                    TrialRecord {
                        id,
                        config,
                        reward: None,
                        error: Some(reason),
                    }
                }
            };
            state.trials.push(record);
        }

        if let Err(err) = state.save(&options.checkpoint) {
            warn!("could not save scheduler checkpoint: {err:#}");
        }

        let best = state
            .trials
            .iter()
            .filter(|record| record.succeeded())
            .max_by(|a, b| {
                a.reward
                    .partial_cmp(&b.reward)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .and_then(|record| {
                let reward = record.reward.unwrap_or_default();
                info!(trial = record.id, reward, "best trial selected");
                Self::final_fit(space, &record.config).map(|params| BestTrial {
                    config: record.config.clone(),
                    reward,
                    params,
                })
            });

        Ok(SearchResults {
            trials: state.trials,
            best,
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::config::TaskConfig;
    use crate::estimator::EstimatorKind;
    use crate::resource::ResourceBudgeter;
    use crate::search::space::SearchSpaceBuilder;

    fn options(checkpoint: &str, num_trials: usize) -> SchedulerOptions {
        let config = TaskConfig::new("voc_tiny")
            .num_trials(num_trials)
            .checkpoint(checkpoint);
        let budget = ResourceBudgeter::new(2, 0).clamp(Some(2), 0);
        SchedulerOptions::from_task(&config, &budget)
    }

    fn ssd_space(epochs: usize) -> SearchSpace {
        let config = TaskConfig::new("voc_tiny")
            .estimator(EstimatorKind::Ssd)
            .epochs(epochs);
        let budget = ResourceBudgeter::new(2, 0).clamp(Some(2), 0);
        SearchSpaceBuilder::new(config, budget).build().unwrap()
    }

    #[test]
    fn test_run_produces_best_with_params() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.ag");
        let options = options(checkpoint.to_str().unwrap(), 2);

        let results = LocalScheduler.run(&ssd_space(2), &options).unwrap();
        assert_eq!(results.trials.len(), 2);
        let best = results.best.expect("a trial should succeed");
        assert!(best.reward > 0.0);
        assert!(!best.params.is_empty());
    }

    #[test]
    fn test_checkpoint_written_and_resumable() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.ag");
        let path = checkpoint.to_str().unwrap();

        LocalScheduler.run(&ssd_space(1), &options(path, 2)).unwrap();

        let mut resume_options = options(path, 1);
        resume_options.resume = true;
        let results = LocalScheduler.run(&ssd_space(1), &resume_options).unwrap();

        // Two resumed trials plus one new one, ids continuing
        assert_eq!(results.trials.len(), 3);
        assert_eq!(results.trials.last().unwrap().id, 2);
    }

    #[test]
    fn test_all_failures_yield_no_best() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.ag");

        let mut config = TaskConfig::new("voc_tiny")
            .estimator(EstimatorKind::Ssd)
            .epochs(1);
        // Poison the estimator group so every trial fails validation.
        config.extra.insert(
            "ssd.lr".to_string(),
            crate::config::ConfigValue::Float(-1.0),
        );
        let budget = ResourceBudgeter::new(1, 0).clamp(Some(1), 0);
        let space = SearchSpaceBuilder::new(config, budget).build().unwrap();

        let results = LocalScheduler
            .run(&space, &options(checkpoint.to_str().unwrap(), 2))
            .unwrap();
        assert!(results.best.is_none());
        assert!(results.trials.iter().all(|t| t.error.is_some()));
    }

    #[test]
    fn test_zero_time_budget_skips_trials() {
        let dir = tempdir().unwrap();
        let checkpoint = dir.path().join("state.ag");
        let mut options = options(checkpoint.to_str().unwrap(), 3);
        options.time_out = 0;

        let results = LocalScheduler.run(&ssd_space(1), &options).unwrap();
        assert!(results.trials.is_empty());
        assert!(results.best.is_none());
    }
}
