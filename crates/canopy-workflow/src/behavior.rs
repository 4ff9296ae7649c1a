//! What a workflow declared during one render.

use tokio::sync::oneshot;

use crate::{WorkflowAction, WorkflowError, WorkflowId};

/// The declarations captured by a single render call.
///
/// Children and workers are listed in declaration order. The event receiver
/// resolves at most once: with the action from the first sink that fires.
pub(crate) struct Behavior<S, O> {
  pub(crate) children: Vec<WorkflowId>,
  pub(crate) workers: Vec<String>,
  pub(crate) next_action_from_event: oneshot::Receiver<WorkflowAction<S, O>>,
  /// The first usage error detected while rendering, if any.
  pub(crate) error: Option<WorkflowError>,
}
