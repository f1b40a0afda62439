//! The pipeline orchestrator: a persisted step machine.
//!
//! Each run moves through a fixed step order with persistence after every
//! step, lease-based claiming for parallel workers, bounded retries for
//! repository failures, and cooperative cancellation between steps.

pub mod error;
pub mod orchestrator;
pub mod types;


pub use error::PipelineError;
pub use orchestrator::{Orchestrator, StartRunInput};
pub use types::{ErrorKind, PipelineRun, PipelineStep, RunError, RunPayload, RunState};
