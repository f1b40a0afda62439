//! API-level pipeline errors.
//!
//! These cover misuse of the orchestrator interface. Errors that belong to
//! a run (engine rejections, config errors, timeouts) are recorded on the
//! run itself as [`super::types::RunError`] instead.

use thiserror::Error;

use bokpilot_shared::types::PipelineRunId;

use crate::repository::RepositoryError;

use super::types::RunState;

/// Errors returned by orchestrator entry points.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No run with the given id.
    #[error("Pipeline run not found: {0}")]
    RunNotFound(PipelineRunId),

    /// The run is already claimed or not in a claimable state.
    #[error("Pipeline run {0} cannot be claimed")]
    NotClaimable(PipelineRunId),

    /// The operation requires a different run state.
    #[error("Pipeline run {run} is {state}, expected {expected}")]
    InvalidState {
        /// The run.
        run: PipelineRunId,
        /// Its actual state.
        state: RunState,
        /// The state the operation requires.
        expected: &'static str,
    },

    /// Persistence failure after retries.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}
