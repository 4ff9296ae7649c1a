//! A live workflow instance.

use std::collections::VecDeque;
use std::future::poll_fn;
use std::task::{Context, Poll};

use bytes::Bytes;
use canopy_snapshot::{Snapshot, SnapshotError};
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::context::{RenderContext, WorkerTracker};
use crate::select::poll_first;
use crate::sink::EventSlot;
use crate::subtree::SubtreeManager;
use crate::{
  DiagnosticEvent, LifetimeTracker, NodeEnv, RestorePolicy, StatefulWorkflow, TreeSnapshot,
  WorkflowAction, WorkflowError, WorkflowId,
};

/// Where a node is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
  /// Created but never rendered. Ticking is an error.
  Uninitialized,
  /// Rendered since creation or since its last tick; may be ticked.
  Rendered,
  /// A tick resolved. Ticking again is an error until the next render.
  Ticked,
  /// Torn down. Rendering and ticking report [`WorkflowError::Cancelled`].
  Cancelled,
}

/// A rendering plus the first usage error found while producing it.
///
/// Children are rendered inside their parent's render call, which has to
/// hand back a rendering even when something went wrong, so errors travel
/// next to the rendering until the root turns them into a `Result`.
pub(crate) struct RenderPass<R> {
  pub(crate) rendering: R,
  pub(crate) error: Option<WorkflowError>,
}

impl<R> RenderPass<R> {
  pub(crate) fn with_error(mut self, error: WorkflowError) -> Self {
    self.error = Some(error);
    self
  }

  fn into_result(self) -> Result<R, WorkflowError> {
    match self.error {
      Some(error) => Err(error),
      None => Ok(self.rendering),
    }
  }
}

type NodeAction<W> = WorkflowAction<<W as StatefulWorkflow>::State, <W as StatefulWorkflow>::Output>;

/// One live instance of workflow `W`: its props, its state, its children and
/// its running workers.
///
/// The node does not own the workflow value; callers pass it to every
/// operation so a parent can hand a child a fresh workflow value each render.
pub struct WorkflowNode<W: StatefulWorkflow> {
  id: WorkflowId,
  diagnostic_id: u64,
  env: NodeEnv,
  props: W::Props,
  state: W::State,
  subtree: SubtreeManager<W::State, W::Output>,
  workers: WorkerTracker<W::State, W::Output>,
  next_event: Option<oneshot::Receiver<NodeAction<W>>>,
  /// Events accepted by a rendering that was replaced before they were
  /// applied, oldest first.
  carried_events: VecDeque<NodeAction<W>>,
  pending_error: Option<WorkflowError>,
  phase: NodePhase,
}

impl<W: StatefulWorkflow> WorkflowNode<W> {
  /// Create the root node of a tree, restoring it from `snapshot` when one
  /// is given.
  pub fn new_root(workflow: &W, props: W::Props, snapshot: Option<&Snapshot>, env: &NodeEnv) -> Self {
    let snapshot = snapshot.map(|snapshot| snapshot.bytes().clone());
    Self::new(WorkflowId::of::<W>(""), workflow, props, snapshot, env)
  }

  pub(crate) fn new(
    id: WorkflowId,
    workflow: &W,
    props: W::Props,
    snapshot: Option<Bytes>,
    parent: &NodeEnv,
  ) -> Self {
    let diagnostic_id = parent.next_id();
    let env = parent.scope();
    let mut subtree = SubtreeManager::new(env.for_children_of(diagnostic_id));
    let mut pending_error = None;

    let restored = match snapshot.filter(|bytes| !bytes.is_empty()) {
      None => None,
      Some(bytes) => match Self::restore(workflow, &props, bytes, &mut subtree) {
        Ok(state) => state,
        Err(source) => {
          match env.restore_policy() {
            RestorePolicy::Fail => {
              pending_error = Some(WorkflowError::Snapshot {
                workflow: id.to_string(),
                source,
              })
            }
            RestorePolicy::InitialState => {
              warn!(workflow = %id, error = %source, "snapshot_restore_failed")
            }
          }
          None
        }
      },
    };
    let was_restored = restored.is_some();
    let state = match restored {
      Some(state) => state,
      None => workflow.initial_state(&props),
    };

    debug!(workflow_id = diagnostic_id, workflow = %id, restored = was_restored, "workflow_started");
    env.notify(|| DiagnosticEvent::WorkflowStarted {
      workflow_id: diagnostic_id,
      parent_id: parent.parent_id(),
      workflow_type: id.type_name().to_string(),
      key: id.key().to_string(),
      restored: was_restored,
    });

    Self {
      id,
      diagnostic_id,
      env,
      props,
      state,
      subtree,
      workers: LifetimeTracker::new(),
      next_event: None,
      carried_events: VecDeque::new(),
      pending_error,
      phase: NodePhase::Uninitialized,
    }
  }

  fn restore(
    workflow: &W,
    props: &W::Props,
    bytes: Bytes,
    subtree: &mut SubtreeManager<W::State, W::Output>,
  ) -> Result<Option<W::State>, SnapshotError> {
    let tree = TreeSnapshot::parse(bytes)?;
    let state = tree
      .own_state
      .map(|own| workflow.restore_state(props, &Snapshot::of_bytes(own)))
      .transpose()?;
    // Children only come back with their parent's own state.
    subtree.restore_children(tree.children);
    Ok(state)
  }

  pub fn id(&self) -> &WorkflowId {
    &self.id
  }

  pub fn phase(&self) -> NodePhase {
    self.phase
  }

  pub fn props(&self) -> &W::Props {
    &self.props
  }

  pub fn state(&self) -> &W::State {
    &self.state
  }

  /// Live child count, as of the last render.
  pub fn child_count(&self) -> usize {
    self.subtree.len()
  }

  /// Live worker count, including finished workers still declared.
  pub fn worker_count(&self) -> usize {
    self.workers.len()
  }

  pub fn cancellation_token(&self) -> &tokio_util::sync::CancellationToken {
    self.env.token()
  }

  /// Render with `props`, reconciling children and workers against what
  /// this render declares. Never suspends.
  ///
  /// A cancelled node is not rendered at all: its workflow's `render` is not
  /// called and nothing is started.
  pub fn render(&mut self, workflow: &W, props: W::Props) -> Result<W::Rendering, WorkflowError> {
    if self.phase == NodePhase::Cancelled {
      return Err(WorkflowError::Cancelled);
    }
    self.render_pass(workflow, props).into_result()
  }

  pub(crate) fn render_pass(&mut self, workflow: &W, props: W::Props) -> RenderPass<W::Rendering> {
    let workflow_id = self.diagnostic_id;
    let mut error = self.pending_error.take();

    if props != self.props {
      let old = std::mem::replace(&mut self.props, props);
      workflow.on_props_changed(&old, &self.props, &mut self.state);
      self.env.notify(|| DiagnosticEvent::PropsChanged { workflow_id });
    }

    if let Some(mut previous) = self.next_event.take() {
      if let Ok(action) = previous.try_recv() {
        self.carried_events.push_back(action);
      }
    }

    self.env.notify(|| DiagnosticEvent::BeforeWorkflowRendered { workflow_id });
    let (slot, next_event) = EventSlot::channel();
    let mut context = RenderContext::new(&mut self.subtree, &mut self.workers, &self.env, workflow_id, slot);
    let rendering = workflow.render(&self.props, &self.state, &mut context);
    let behavior = context.into_behavior(next_event);

    self.subtree.commit();
    self.workers.commit(|_, mut worker| worker.stop());
    self.next_event = Some(behavior.next_action_from_event);
    error = error.or(behavior.error);
    self.env.notify(|| DiagnosticEvent::AfterWorkflowRendered { workflow_id });
    trace!(
      workflow_id,
      children = ?behavior.children,
      workers = ?behavior.workers,
      "workflow_rendered"
    );

    if self.phase == NodePhase::Cancelled {
      // Live children are never cancelled, so only a misused handle gets
      // here. Tear down whatever the render declared.
      self.subtree.cancel_all();
      self.workers.clear(|_, mut worker| worker.stop());
      self.next_event = None;
      self.carried_events.clear();
      error = error.or(Some(WorkflowError::Cancelled));
    } else {
      self.phase = NodePhase::Rendered;
    }

    RenderPass { rendering, error }
  }

  /// Wait for the next state change.
  ///
  /// Resolves once one source is ready, checked in this order: children
  /// (in declaration order), workers (in declaration order), then events
  /// (ones accepted by replaced renderings first, then the latest
  /// rendering's slot). Exactly one action is applied per tick.
  /// `Ok(None)` means state may have changed without an output. Either way
  /// the caller must render again before ticking again; a second tick
  /// without a render in between fails with
  /// [`WorkflowError::TickBeforeRender`].
  pub async fn tick(&mut self) -> Result<Option<W::Output>, WorkflowError> {
    poll_fn(|cx| self.poll_tick(cx)).await
  }

  pub(crate) fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<W::Output>, WorkflowError>> {
    match self.phase {
      NodePhase::Uninitialized | NodePhase::Ticked => {
        return Poll::Ready(Err(WorkflowError::TickBeforeRender {
          workflow: self.id.to_string(),
        }));
      }
      NodePhase::Cancelled => return Poll::Ready(Err(WorkflowError::Cancelled)),
      NodePhase::Rendered => {}
    }

    let update = self.poll_sources(cx);
    if update.is_ready() {
      self.phase = NodePhase::Ticked;
    }
    update
  }

  fn poll_sources(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<W::Output>, WorkflowError>> {
    if let Poll::Ready(update) = self.subtree.poll_children(cx) {
      return Poll::Ready(self.accept(update));
    }

    if let Poll::Ready(update) = poll_first(self.workers.iter_mut(), cx, |worker, cx| worker.poll_update(cx)) {
      return Poll::Ready(self.accept(update));
    }

    if let Some(action) = self.carried_events.pop_front() {
      return Poll::Ready(Ok(self.receive(action)));
    }

    if let Some(receiver) = self.next_event.as_mut() {
      match receiver.poll_unpin(cx) {
        Poll::Ready(Ok(action)) => {
          self.next_event = None;
          return Poll::Ready(Ok(self.receive(action)));
        }
        // Every sink of the rendering was dropped.
        Poll::Ready(Err(_)) => self.next_event = None,
        Poll::Pending => {}
      }
    }

    Poll::Pending
  }

  fn accept(
    &mut self,
    update: Result<Option<NodeAction<W>>, WorkflowError>,
  ) -> Result<Option<W::Output>, WorkflowError> {
    Ok(update?.and_then(|action| self.apply(action)))
  }

  fn receive(&mut self, action: NodeAction<W>) -> Option<W::Output> {
    let workflow_id = self.diagnostic_id;
    self.env.notify(|| DiagnosticEvent::SinkReceived {
      workflow_id,
      action: action.name().to_string(),
    });
    self.apply(action)
  }

  fn apply(&mut self, action: NodeAction<W>) -> Option<W::Output> {
    let workflow_id = self.diagnostic_id;
    let name = action.name().to_string();
    let output = action.apply(&mut self.state);
    trace!(workflow_id, action = %name, emitted_output = output.is_some(), "action_applied");
    self.env.notify(|| DiagnosticEvent::ActionApplied {
      workflow_id,
      action: name,
      emitted_output: output.is_some(),
    });
    output
  }

  /// A lazy snapshot of this node and every live descendant.
  pub fn snapshot(&self, workflow: &W) -> Snapshot {
    TreeSnapshot::compose(workflow.snapshot_state(&self.state), self.subtree.child_snapshots())
  }

  /// Tear the node down: cancel its token, cancel every child and drop every
  /// worker stream. All of it happens before `cancel` returns. Calling it
  /// again does nothing.
  pub fn cancel(&mut self) {
    if self.phase == NodePhase::Cancelled {
      return;
    }
    self.phase = NodePhase::Cancelled;
    self.subtree.cancel_all();
    self.workers.clear(|_, mut worker| worker.stop());
    self.next_event = None;
    self.carried_events.clear();
    self.env.token().cancel();

    let workflow_id = self.diagnostic_id;
    debug!(workflow_id, workflow = %self.id, "workflow_stopped");
    self.env.notify(|| DiagnosticEvent::WorkflowStopped { workflow_id });
  }
}

impl<W: StatefulWorkflow> Drop for WorkflowNode<W> {
  fn drop(&mut self) {
    self.cancel();
  }
}
