//! Trial execution and failure isolation
//!
//! [`run_trial`] is the unit of work handed to the scheduler: one sampled
//! configuration, trained to completion, with every failure mode converted
//! into a [`TrialOutcome`] value. Nothing escapes the call, neither errors
//! nor panics, so a bad configuration cannot take down sibling trials or
//! the search loop.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::Sender;

use crate::config::{task::DEFAULT_SEED, to_nested, ConfigMap, ConfigValue};
use crate::estimator::{EstimatorKind, ParamSnapshot};

/// One reward report from a running trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    /// Which trial this report belongs to
    pub trial_id: usize,

    /// Value of the time attribute (epoch number, 1-based)
    pub epoch: usize,

    /// Mean-average-precision reward at this epoch
    pub map_reward: f64,
}

/// Write-only reward channel from a trial back to the scheduler
///
/// A trial may report any number of times (typically once per epoch) and
/// never reads back. Reports are ordered within one trial; no ordering is
/// guaranteed across trials.
#[derive(Debug, Clone)]
pub struct Reporter {
    trial_id: usize,
    sender: Sender<TrialReport>,
}

impl Reporter {
    /// Create a reporter for the given trial
    pub fn new(trial_id: usize, sender: Sender<TrialReport>) -> Self {
        Self { trial_id, sender }
    }

    /// A reporter whose reports go nowhere
    ///
    /// Used when reconstructing the winning estimator, which is never
    /// trained again.
    pub fn sink() -> Self {
        let (sender, _) = crossbeam_channel::unbounded();
        Self { trial_id: 0, sender }
    }

    /// Which trial this reporter belongs to
    pub fn trial_id(&self) -> usize {
        self.trial_id
    }

    /// Publish a reward for one epoch
    ///
    /// Delivery is best-effort: a scheduler that has stopped listening
    /// simply drops the report.
    pub fn report(&self, epoch: usize, map_reward: f64) {
        let _ = self.sender.send(TrialReport {
            trial_id: self.trial_id,
            epoch,
            map_reward,
        });
    }
}

/// The result of a single trial, propagated by value
#[derive(Debug, Clone)]
pub enum TrialOutcome {
    /// Training completed; parameters are present only for final-fit trials
    Success {
        /// Snapshot of the trained parameters, if this was a final fit
        params: Option<ParamSnapshot>,
    },
    /// Training failed; the search continues without this trial
    Failure {
        /// Human-readable failure description
        reason: String,
    },
}

impl TrialOutcome {
    fn failure(reason: impl Into<String>) -> Self {
        TrialOutcome::Failure {
            reason: reason.into(),
        }
    }

    /// True when training completed
    pub fn is_success(&self) -> bool {
        matches!(self, TrialOutcome::Success { .. })
    }
}

/// Train one sampled configuration
///
/// Steps: normalize to nested form, pin the seed, disable mid-search
/// auto-resume, construct the chosen estimator with the reporter, and run
/// training. The `final_fit` marker in the sampled configuration decides
/// whether the trained parameters are snapshotted into the outcome.
pub fn run_trial(sampled: &ConfigMap, reporter: &Reporter) -> TrialOutcome {
    let mut nested = to_nested(sampled);

    // Seed every random source from train.seed; resuming a partial
    // checkpoint mid-search is unsupported, so auto_resume is forced off.
    let train = nested
        .entry("train".to_string())
        .or_insert_with(|| ConfigValue::Map(ConfigMap::new()));
    if let ConfigValue::Map(train) = train {
        train
            .entry("seed".to_string())
            .or_insert(ConfigValue::Int(DEFAULT_SEED as i64));
        train.insert("auto_resume".to_string(), ConfigValue::Bool(false));
    }

    let name = match nested.get("estimator").and_then(ConfigValue::as_str) {
        Some(name) => name,
        None => return TrialOutcome::failure("sampled configuration has no estimator"),
    };
    let kind = match EstimatorKind::parse(name) {
        Ok(kind) => kind,
        Err(err) => return TrialOutcome::failure(err.to_string()),
    };
    let final_fit = nested
        .get("final_fit")
        .and_then(ConfigValue::as_bool)
        .unwrap_or(false);

    // Estimator internals are foreign code as far as the search loop is
    // concerned: contain panics as well as errors.
    let trained = catch_unwind(AssertUnwindSafe(|| {
        let mut estimator = kind.build(&nested, reporter.clone())?;
        estimator.fit()?;
        anyhow::Ok(estimator)
    }));

    match trained {
        Ok(Ok(estimator)) => TrialOutcome::Success {
            params: final_fit.then(|| estimator.collect_params()),
        },
        Ok(Err(err)) => TrialOutcome::failure(format!("{err:#}")),
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "trial panicked".to_string());
            TrialOutcome::failure(format!("trial panicked: {reason}"))
        }
    }
}
