//! Search-space construction and trial scheduling
//!
//! The pieces the task controller wires together:
//!
//! - [`space`]: the search space value object and its builder
//! - [`options`]: the options handed to the scheduler
//! - [`trial`]: single-trial execution with failure isolation
//! - [`scheduler`]: the scheduler boundary and the built-in local pool

pub mod options;
pub mod scheduler;
pub mod space;
pub mod trial;

pub use options::{ResourceSpec, SchedulerOptions, REWARD_ATTR, TIME_ATTR};
pub use scheduler::{BestTrial, LocalScheduler, Scheduler, SearchResults, TrialRecord};
pub use space::{Parameter, SearchSpace, SearchSpaceBuilder};
pub use trial::{run_trial, Reporter, TrialOutcome, TrialReport};
