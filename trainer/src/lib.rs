//! The training control loop of the matcher: the stop, save and rate decay
//! policies, parameter restores from parent models, and the orchestrator
//! that drives the epochs.

pub mod bootstrap;
pub mod config;
mod error;
pub mod metrics;
pub mod model_saver;
pub mod orchestrator;
pub mod restore;
pub mod schedule;
pub mod source;
pub mod stop_condition;

pub use config::Args;
pub use error::{Result, TrainErr};
pub use orchestrator::{Orchestrator, Policies, Summary};
