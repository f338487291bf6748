//! Error types for the search controller
//!
//! Configuration problems fail fast at task construction, before any trial
//! runs. Trial-level failures never appear here: they are carried by value
//! in [`TrialOutcome`](crate::search::trial::TrialOutcome) so one bad trial
//! cannot abort its siblings.

use thiserror::Error;

/// Errors surfaced by task construction, `fit()`, and `load()`
#[derive(Debug, Error)]
pub enum TaskError {
    /// An estimator name outside the known detection set
    #[error("unknown estimator `{0}` (expected one of: ssd, faster_rcnn, yolo, center_net)")]
    InvalidEstimator(String),

    /// The search finished without a single usable trial
    #[error("search exhausted: no trial produced a usable result")]
    SearchExhausted,

    /// A persisted file holds something other than a detection estimator
    #[error("loaded object is not a detection estimator: {0}")]
    TypeMismatch(String),

    /// A malformed configuration value or key
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
