//! Runtime error types.

use canopy_workflow::WorkflowError;

/// Errors that end a runtime session.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
  /// The props stream ended before producing a value.
  #[error("props stream ended before producing a value")]
  NoProps,

  /// Rendering or ticking the tree failed.
  #[error(transparent)]
  Workflow(#[from] WorkflowError),

  /// The session task panicked or was aborted.
  #[error("runtime task failed: {message}")]
  Join { message: String },

  /// The runtime configuration could not be read.
  #[error("invalid runtime config: {message}")]
  Config { message: String },
}

impl RuntimeError {
  /// Whether the session ended because it was cancelled.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Workflow(WorkflowError::Cancelled))
  }
}
