//! Workflow error types.

use canopy_snapshot::SnapshotError;

/// Errors raised while rendering or ticking a workflow tree.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
  /// `tick` was called on a node that has not been rendered since it was
  /// created or since its last tick.
  #[error("tick called on '{workflow}' without a render since its creation or its last tick")]
  TickBeforeRender { workflow: String },

  /// A sink fired after another sink of the same rendering already did.
  #[error("event for action '{action}' arrived after this rendering already handled one; is an old rendering still in use?")]
  DuplicateEvent { action: String },

  /// A sink fired after its rendering was replaced by a newer one.
  #[error("event for action '{action}' was sent to a rendering that is no longer current")]
  StaleRendering { action: String },

  /// Two children of the same type were declared with the same key.
  #[error("child '{workflow_type}' with key '{key}' was declared twice in one render")]
  DuplicateChild { workflow_type: String, key: String },

  /// A child id was reused for a different workflow type.
  #[error("child '{id}' was declared with a different workflow type than before")]
  ChildTypeMismatch { id: String },

  /// Two equivalent workers were declared with the same key.
  #[error("worker '{worker}' with key '{key}' was declared twice in one render")]
  DuplicateWorker { worker: String, key: String },

  /// Restoring a workflow from its snapshot failed.
  #[error("failed to restore '{workflow}' from snapshot: {source}")]
  Snapshot {
    workflow: String,
    #[source]
    source: SnapshotError,
  },

  /// A worker panicked while producing output.
  #[error("worker '{worker}' (key '{key}') failed: {message}")]
  WorkerFailed {
    worker: String,
    key: String,
    message: String,
  },

  /// The node was cancelled.
  #[error("workflow cancelled")]
  Cancelled,
}

impl WorkflowError {
  /// Whether this error reports misuse of the render API rather than a
  /// runtime failure.
  pub fn is_usage_error(&self) -> bool {
    matches!(
      self,
      Self::TickBeforeRender { .. }
        | Self::DuplicateEvent { .. }
        | Self::StaleRendering { .. }
        | Self::DuplicateChild { .. }
        | Self::ChildTypeMismatch { .. }
        | Self::DuplicateWorker { .. }
    )
  }
}
