//! Error taxonomy for the pipeline core.

use thiserror::Error;

use crate::adapters::CollaboratorError;
use crate::domain::PipelineStatus;

/// Errors surfaced by the orchestrator's public operations
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Malformed or missing input to `start`; no pipeline is created
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A stage's external call failed
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Operation not allowed in the pipeline's current status
    #[error("Cannot {operation} a pipeline that is {status}")]
    InvalidState {
        operation: &'static str,
        status: PipelineStatus,
    },

    /// Snapshot read/write failure
    #[error("Snapshot persistence failed: {0}")]
    Persistence(String),

    /// The background task driving the stages ended abnormally
    #[error("Pipeline task ended abnormally: {0}")]
    Interrupted(String),
}

impl PipelineError {
    pub fn invalid_state(operation: &'static str, status: PipelineStatus) -> Self {
        Self::InvalidState { operation, status }
    }
}
