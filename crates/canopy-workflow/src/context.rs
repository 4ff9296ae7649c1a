//! The API a workflow uses during render.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::behavior::Behavior;
use crate::running::{RunningWorker, WorkerKey, WorkerNode};
use crate::sink::EventSlot;
use crate::subtree::SubtreeManager;
use crate::{
  LifetimeTracker, NodeEnv, Sink, StatefulWorkflow, Worker, WorkflowAction, WorkflowError,
  WorkflowId,
};

pub(crate) type WorkerTracker<S, O> = LifetimeTracker<WorkerKey, Box<dyn WorkerNode<S, O>>>;

/// Handed to [`StatefulWorkflow::render`] to declare children, workers and
/// event sinks for this render pass.
///
/// The context borrows the node mutably, so nothing declared through it can
/// outlive the render call except the sinks, which are tied to this
/// rendering's event slot.
pub struct RenderContext<'a, S, O> {
  subtree: &'a mut SubtreeManager<S, O>,
  workers: &'a mut WorkerTracker<S, O>,
  env: &'a NodeEnv,
  workflow_id: u64,
  slot: EventSlot<S, O>,
  children: Vec<WorkflowId>,
  worker_keys: Vec<String>,
  error: Option<WorkflowError>,
}

impl<'a, S: Send + 'static, O: Send + 'static> RenderContext<'a, S, O> {
  pub(crate) fn new(
    subtree: &'a mut SubtreeManager<S, O>,
    workers: &'a mut WorkerTracker<S, O>,
    env: &'a NodeEnv,
    workflow_id: u64,
    slot: EventSlot<S, O>,
  ) -> Self {
    Self {
      subtree,
      workers,
      env,
      workflow_id,
      slot,
      children: Vec::new(),
      worker_keys: Vec::new(),
      error: None,
    }
  }

  /// Render a child workflow and return its rendering.
  ///
  /// The child is started the first time `(C, key)` is declared and kept
  /// alive as long as every following render declares it again. `child`
  /// replaces the workflow value kept for the child, and outputs the child
  /// emits are turned into actions on this workflow by `handler`. Both come
  /// from the latest render.
  pub fn render_child<C: StatefulWorkflow>(
    &mut self,
    child: C,
    props: C::Props,
    key: impl Into<String>,
    handler: impl Fn(C::Output) -> WorkflowAction<S, O> + Send + 'static,
  ) -> C::Rendering {
    let id = WorkflowId::of::<C>(key);
    self.children.push(id.clone());
    let pass = self
      .subtree
      .render_child(id, child, props, Box::new(handler));
    if let Some(error) = pass.error {
      self.record(error);
    }
    pass.rendering
  }

  /// Render a child that never emits output.
  pub fn render_child_without_output<C>(
    &mut self,
    child: C,
    props: C::Props,
    key: impl Into<String>,
  ) -> C::Rendering
  where
    C: StatefulWorkflow<Output = std::convert::Infallible>,
  {
    self.render_child(child, props, key, |never| match never {})
  }

  /// Ensure `worker` is running for as long as renders keep declaring it.
  ///
  /// If an equivalent worker was declared under the same key by the previous
  /// render, that instance keeps running and only its handler is replaced.
  pub fn running_worker<W: Worker>(
    &mut self,
    worker: W,
    key: impl Into<String>,
    handler: impl Fn(W::Output) -> WorkflowAction<S, O> + Send + 'static,
  ) {
    let key = key.into();
    let worker = Arc::new(worker);
    let handler: Box<dyn Fn(W::Output) -> WorkflowAction<S, O> + Send> = Box::new(handler);
    let tracker_key = WorkerKey::new(worker.clone(), key.clone());
    self.worker_keys.push(format!("{}:{}", worker.describe(), key));

    match self.workers.retain(&tracker_key) {
      Ok(Some(running)) => {
        if let Some(running) = running
          .as_any_mut()
          .downcast_mut::<RunningWorker<W, S, O>>()
        {
          running.set_handler(handler);
        }
      }
      Ok(None) => {
        let running = RunningWorker::start(worker.as_ref(), key, handler, self.workflow_id, self.env);
        self.workers.start(tracker_key, Box::new(running));
      }
      Err(_) => self.record(WorkflowError::DuplicateWorker {
        worker: worker.describe(),
        key,
      }),
    }
  }

  /// A sink that turns each event into an action through `handler`.
  pub fn on_event<E: 'static>(
    &mut self,
    handler: impl Fn(E) -> WorkflowAction<S, O> + Send + Sync + 'static,
  ) -> Sink<E> {
    let slot = self.slot.clone();
    Sink::new(move |event| slot.deliver(handler(event)))
  }

  /// A sink that accepts actions directly.
  pub fn action_sink(&mut self) -> Sink<WorkflowAction<S, O>> {
    let slot = self.slot.clone();
    Sink::new(move |action| slot.deliver(action))
  }

  /// The node's cancellation token. It is cancelled when the node is torn
  /// down, so work spawned outside the runtime can stop with it.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.env.token().clone()
  }

  fn record(&mut self, error: WorkflowError) {
    if self.error.is_none() {
      self.error = Some(error);
    }
  }

  pub(crate) fn into_behavior(
    self,
    next_action_from_event: oneshot::Receiver<WorkflowAction<S, O>>,
  ) -> Behavior<S, O> {
    Behavior {
      children: self.children,
      workers: self.worker_keys,
      next_action_from_event,
      error: self.error,
    }
  }
}
