//! # detsearch
//!
//! Hyperparameter search controller for object-detection model selection.
//!
//! Given a dataset, search ranges, and a resource budget, `detsearch`
//! searches over a closed set of detector architectures (SSD, Faster
//! R-CNN, YOLO, CenterNet) and their hyperparameters, trains each trial
//! through a scheduler, and returns the best trained model.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use detsearch::config::TaskConfig;
//! use detsearch::estimator::EstimatorKind;
//! use detsearch::task::DetectionTask;
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TaskConfig::new("voc_tiny")
//!     .estimator(EstimatorKind::Ssd)
//!     .epochs(1)
//!     .num_trials(4);
//!
//! let task = DetectionTask::new(config)?;
//! let model = task.fit()?;
//! model.save("checkpoint/best.json")?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Configuration values, flat/nested normalization, typed task config
pub mod config;

/// Detection estimator variants and the estimator trait
pub mod estimator;

/// Resource budgeting for trial execution
pub mod resource;

/// Search-space construction and trial scheduling
pub mod search;

/// The task controller facade
pub mod task;

/// Error types
pub mod error;

pub use error::TaskError;
pub use task::{DetectionTask, TrainedDetector};

/// Current version of detsearch
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
