//! A node's live children.

use std::any::Any;
use std::collections::HashMap;
use std::task::{Context, Poll};

use bytes::Bytes;
use canopy_snapshot::Snapshot;
use tracing::warn;

use crate::node::RenderPass;
use crate::select::poll_first;
use crate::{LifetimeTracker, NodeEnv, StatefulWorkflow, WorkflowAction, WorkflowError, WorkflowId, WorkflowNode};

pub(crate) type ChildHandler<C, S, O> =
  Box<dyn Fn(<C as StatefulWorkflow>::Output) -> WorkflowAction<S, O> + Send>;

/// A child node with its workflow type hidden behind its parent's state and
/// output types.
pub(crate) trait ChildNode<S, O>: Send {
  fn as_any_mut(&mut self) -> &mut dyn Any;

  /// Tick the child; its output, if any, comes back as a parent action.
  fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<WorkflowAction<S, O>>, WorkflowError>>;

  fn snapshot(&self) -> Snapshot;

  fn cancel(&mut self);
}

/// A typed child: its node, the workflow value from the latest render and
/// the handler that maps its outputs into the parent.
pub(crate) struct ChildHandle<C: StatefulWorkflow, S, O> {
  node: WorkflowNode<C>,
  workflow: C,
  handler: ChildHandler<C, S, O>,
}

impl<C: StatefulWorkflow, S, O> ChildHandle<C, S, O> {
  fn render(
    &mut self,
    workflow: C,
    props: C::Props,
    handler: ChildHandler<C, S, O>,
  ) -> RenderPass<C::Rendering> {
    self.workflow = workflow;
    self.handler = handler;
    self.node.render_pass(&self.workflow, props)
  }
}

impl<C, S, O> ChildNode<S, O> for ChildHandle<C, S, O>
where
  C: StatefulWorkflow,
  S: Send + 'static,
  O: Send + 'static,
{
  fn as_any_mut(&mut self) -> &mut dyn Any {
    self
  }

  fn poll_tick(&mut self, cx: &mut Context<'_>) -> Poll<Result<Option<WorkflowAction<S, O>>, WorkflowError>> {
    let handler = &self.handler;
    self
      .node
      .poll_tick(cx)
      .map(|result| result.map(|output| output.map(handler)))
  }

  fn snapshot(&self) -> Snapshot {
    self.node.snapshot(&self.workflow)
  }

  fn cancel(&mut self) {
    self.node.cancel();
  }
}

/// Reconciles a node's children across renders and multiplexes their ticks.
///
/// Children restored from a snapshot wait in a cache keyed by id until a
/// render declares them; the first declaration consumes the cached bytes.
pub(crate) struct SubtreeManager<S, O> {
  children: LifetimeTracker<WorkflowId, Box<dyn ChildNode<S, O>>>,
  snapshot_cache: HashMap<WorkflowId, Bytes>,
  env: NodeEnv,
}

impl<S: Send + 'static, O: Send + 'static> SubtreeManager<S, O> {
  pub(crate) fn new(env: NodeEnv) -> Self {
    Self {
      children: LifetimeTracker::new(),
      snapshot_cache: HashMap::new(),
      env,
    }
  }

  /// Keep, or start, the child `id` and render it with `props`.
  pub(crate) fn render_child<C: StatefulWorkflow>(
    &mut self,
    id: WorkflowId,
    workflow: C,
    props: C::Props,
    handler: ChildHandler<C, S, O>,
  ) -> RenderPass<C::Rendering> {
    match self.children.retain(&id) {
      Ok(Some(child)) => match child.as_any_mut().downcast_mut::<ChildHandle<C, S, O>>() {
        Some(handle) => handle.render(workflow, props, handler),
        None => {
          let error = WorkflowError::ChildTypeMismatch { id: id.to_string() };
          Self::render_detached(&self.env, id, &workflow, props).with_error(error)
        }
      },
      Ok(None) => {
        let snapshot = self.snapshot_cache.remove(&id);
        let node = WorkflowNode::new(id.clone(), &workflow, props.clone(), snapshot, &self.env);
        let mut handle = ChildHandle {
          node,
          workflow,
          handler,
        };
        let pass = handle.node.render_pass(&handle.workflow, props);
        self.children.start(id, Box::new(handle));
        pass
      }
      Err(_) => {
        let error = WorkflowError::DuplicateChild {
          workflow_type: id.type_name().to_string(),
          key: id.key().to_string(),
        };
        // The first declaration already owns the node; render it again so
        // this call still has a rendering to return.
        let staged = self
          .children
          .staged_mut(&id)
          .and_then(|child| child.as_any_mut().downcast_mut::<ChildHandle<C, S, O>>());
        match staged {
          Some(handle) => handle.render(workflow, props, handler).with_error(error),
          None => Self::render_detached(&self.env, id, &workflow, props).with_error(error),
        }
      }
    }
  }

  /// Render a throwaway node that is cancelled straight away.
  fn render_detached<C: StatefulWorkflow>(
    env: &NodeEnv,
    id: WorkflowId,
    workflow: &C,
    props: C::Props,
  ) -> RenderPass<C::Rendering> {
    let mut node = WorkflowNode::new(id, workflow, props.clone(), None, env);
    let pass = node.render_pass(workflow, props);
    node.cancel();
    pass
  }

  /// End the render pass: cancel children that were not declared again.
  pub(crate) fn commit(&mut self) {
    let cache = &mut self.snapshot_cache;
    self.children.commit(|id, mut child| {
      child.cancel();
      cache.remove(&id);
    });
    if !self.snapshot_cache.is_empty() {
      warn!(
        unclaimed = self.snapshot_cache.len(),
        "child_snapshots_unclaimed"
      );
      self.snapshot_cache.clear();
    }
  }

  /// Poll live children in declaration order.
  pub(crate) fn poll_children(
    &mut self,
    cx: &mut Context<'_>,
  ) -> Poll<Result<Option<WorkflowAction<S, O>>, WorkflowError>> {
    poll_first(self.children.iter_mut(), cx, |child, cx| child.poll_tick(cx))
  }

  pub(crate) fn child_snapshots(&self) -> Vec<(WorkflowId, Snapshot)> {
    self
      .children
      .iter()
      .map(|(id, child)| (id.clone(), child.snapshot()))
      .collect()
  }

  /// Stash restored child snapshots until their ids are declared.
  pub(crate) fn restore_children(&mut self, children: Vec<(WorkflowId, Bytes)>) {
    self.snapshot_cache.extend(children);
  }

  pub(crate) fn cancel_all(&mut self) {
    self.children.clear(|_, mut child| child.cancel());
    self.snapshot_cache.clear();
  }

  pub(crate) fn len(&self) -> usize {
    self.children.len()
  }
}
