//! A running workflow tree.

use canopy_snapshot::Snapshot;
use canopy_workflow::StatefulWorkflow;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::RuntimeError;

/// The result of one render pass: the root's rendering and a lazy snapshot
/// of the tree as it was rendered.
#[derive(Debug)]
pub struct RenderingAndSnapshot<R> {
  pub rendering: R,
  pub snapshot: Snapshot,
}

type Outcome<O> = Result<Option<O>, RuntimeError>;

/// Handle to a launched workflow tree.
///
/// Renderings arrive in order, one per render pass. Dropping the session does
/// not stop the tree; call [`WorkflowSession::cancel`] or cancel the token the
/// session was launched with.
pub struct WorkflowSession<W: StatefulWorkflow> {
  session_id: String,
  renderings: mpsc::UnboundedReceiver<RenderingAndSnapshot<W::Rendering>>,
  outputs: mpsc::UnboundedReceiver<W::Output>,
  handle: JoinHandle<Outcome<W::Output>>,
  cancel: CancellationToken,
}

impl<W: StatefulWorkflow> WorkflowSession<W> {
  pub(crate) fn new(
    session_id: String,
    renderings: mpsc::UnboundedReceiver<RenderingAndSnapshot<W::Rendering>>,
    outputs: mpsc::UnboundedReceiver<W::Output>,
    handle: JoinHandle<Outcome<W::Output>>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      session_id,
      renderings,
      outputs,
      handle,
      cancel,
    }
  }

  pub fn session_id(&self) -> &str {
    &self.session_id
  }

  /// Wait for the next render pass. `None` once the session has ended and
  /// every rendering has been received.
  pub async fn next_rendering(&mut self) -> Option<RenderingAndSnapshot<W::Rendering>> {
    self.renderings.recv().await
  }

  /// The next rendering if one is already waiting.
  pub fn try_next_rendering(&mut self) -> Option<RenderingAndSnapshot<W::Rendering>> {
    self.renderings.try_recv().ok()
  }

  /// Wait for the next root output. Only
  /// [`OutputMode::Continuous`](crate::OutputMode::Continuous) sessions
  /// produce outputs here.
  pub async fn next_output(&mut self) -> Option<W::Output> {
    self.outputs.recv().await
  }

  /// Stop the tree. Every node and worker is cancelled before the session
  /// task ends.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_finished(&self) -> bool {
    self.handle.is_finished()
  }

  /// Wait for the session to end.
  ///
  /// `Ok(Some(output))` is the root's output in
  /// [`OutputMode::Terminal`](crate::OutputMode::Terminal); `Ok(None)` means
  /// the session was cancelled.
  pub async fn outcome(self) -> Outcome<W::Output> {
    self.handle.await.map_err(|e| RuntimeError::Join {
      message: e.to_string(),
    })?
  }
}
