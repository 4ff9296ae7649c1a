//! Running worker instances owned by a node.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::{debug, warn};

use crate::{DiagnosticEvent, NodeEnv, Worker, WorkflowAction, WorkflowError};

pub(crate) type WorkerHandler<W, S, O> =
  Box<dyn Fn(<W as Worker>::Output) -> WorkflowAction<S, O> + Send>;

/// A worker with its concrete type hidden, for equivalence checks.
pub(crate) trait ErasedWorker: Send + Sync {
  fn as_any(&self) -> &dyn Any;
  fn same_work_as(&self, other: &dyn ErasedWorker) -> bool;
}

impl<W: Worker> ErasedWorker for W {
  fn as_any(&self) -> &dyn Any {
    self
  }

  fn same_work_as(&self, other: &dyn ErasedWorker) -> bool {
    other
      .as_any()
      .downcast_ref::<W>()
      .is_some_and(|other| self.does_same_work_as(other))
  }
}

/// Tracker key for a declared worker: equal when both the declaration keys
/// match and the running worker does the same work as the declared one.
pub(crate) struct WorkerKey {
  worker: Arc<dyn ErasedWorker>,
  key: String,
}

impl WorkerKey {
  pub(crate) fn new(worker: Arc<dyn ErasedWorker>, key: String) -> Self {
    Self { worker, key }
  }
}

impl PartialEq for WorkerKey {
  fn eq(&self, other: &Self) -> bool {
    self.key == other.key && self.worker.same_work_as(other.worker.as_ref())
  }
}

/// A live worker as seen by its node.
pub(crate) trait WorkerNode<S, O>: Send {
  fn as_any_mut(&mut self) -> &mut dyn Any;

  /// `Ready(Ok(Some(action)))` for an output, `Ready(Ok(None))` once when
  /// the stream finishes, `Pending` afterwards.
  fn poll_update(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<WorkflowAction<S, O>>, WorkflowError>>;

  /// Drop the stream, cancelling any in-flight work.
  fn stop(&mut self);
}

pub(crate) struct RunningWorker<W: Worker, S, O> {
  key: String,
  description: String,
  worker_id: u64,
  workflow_id: u64,
  stream: Option<BoxStream<'static, W::Output>>,
  handler: WorkerHandler<W, S, O>,
  env: NodeEnv,
}

impl<W: Worker, S, O> RunningWorker<W, S, O> {
  pub(crate) fn start(
    worker: &W,
    key: String,
    handler: WorkerHandler<W, S, O>,
    workflow_id: u64,
    env: &NodeEnv,
  ) -> Self {
    let worker_id = env.next_id();
    let description = worker.describe();
    debug!(worker_id, workflow_id, worker = %description, key = %key, "worker_started");
    env.notify(|| DiagnosticEvent::WorkerStarted {
      worker_id,
      workflow_id,
      key: key.clone(),
      description: description.clone(),
    });
    Self {
      key,
      description,
      worker_id,
      workflow_id,
      stream: Some(worker.run()),
      handler,
      env: env.clone(),
    }
  }

  /// Route future outputs through the handler from the latest render.
  pub(crate) fn set_handler(&mut self, handler: WorkerHandler<W, S, O>) {
    self.handler = handler;
  }

  fn finish(&mut self) {
    if self.stream.take().is_some() {
      let (worker_id, workflow_id) = (self.worker_id, self.workflow_id);
      self.env.notify(|| DiagnosticEvent::WorkerStopped {
        worker_id,
        workflow_id,
      });
    }
  }
}

impl<W, S, O> WorkerNode<S, O> for RunningWorker<W, S, O>
where
  W: Worker,
  S: Send + 'static,
  O: Send + 'static,
{
  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }

  fn poll_update(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<WorkflowAction<S, O>>, WorkflowError>> {
    let Some(stream) = self.stream.as_mut() else {
      return Poll::Pending;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| stream.poll_next_unpin(cx))) {
      Ok(Poll::Pending) => Poll::Pending,
      Ok(Poll::Ready(Some(output))) => {
        let (worker_id, workflow_id) = (self.worker_id, self.workflow_id);
        self.env.notify(|| DiagnosticEvent::WorkerOutput {
          worker_id,
          workflow_id,
        });
        Poll::Ready(Ok(Some((self.handler)(output))))
      }
      Ok(Poll::Ready(None)) => {
        debug!(worker_id = self.worker_id, key = %self.key, "worker_finished");
        self.finish();
        Poll::Ready(Ok(None))
      }
      Err(payload) => {
        let message = panic_message(payload.as_ref());
        warn!(worker_id = self.worker_id, worker = %self.description, error = %message, "worker_failed");
        self.finish();
        Poll::Ready(Err(WorkflowError::WorkerFailed {
          worker: self.description.clone(),
          key: self.key.clone(),
          message,
        }))
      }
    }
  }

  fn stop(&mut self) {
    self.finish();
  }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(message) = payload.downcast_ref::<&str>() {
    (*message).to_string()
  } else if let Some(message) = payload.downcast_ref::<String>() {
    message.clone()
  } else {
    "worker panicked".to_string()
  }
}
