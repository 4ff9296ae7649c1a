//! Diagnostic listeners provided by the runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use canopy_workflow::{DiagnosticEvent, DiagnosticListener};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Writes every diagnostic event as a `tracing` record.
///
/// Lifecycle events (runtime, workflow and worker start/stop) are logged at
/// `debug`, everything else at `trace`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl DiagnosticListener for TracingListener {
  fn notify(&self, event: DiagnosticEvent) {
    match event {
      DiagnosticEvent::RuntimeStarted {
        session_id,
        workflow_type,
      } => debug!(session_id = %session_id, workflow_type = %workflow_type, "diagnostic_runtime_started"),
      DiagnosticEvent::RuntimeStopped { session_id } => {
        debug!(session_id = %session_id, "diagnostic_runtime_stopped")
      }
      DiagnosticEvent::WorkflowStarted {
        workflow_id,
        parent_id,
        workflow_type,
        key,
        restored,
      } => debug!(
        workflow_id,
        parent_id = ?parent_id,
        workflow_type = %workflow_type,
        key = %key,
        restored,
        "diagnostic_workflow_started"
      ),
      DiagnosticEvent::WorkflowStopped { workflow_id } => {
        debug!(workflow_id, "diagnostic_workflow_stopped")
      }
      DiagnosticEvent::WorkerStarted {
        worker_id,
        workflow_id,
        key,
        description,
      } => debug!(
        worker_id,
        workflow_id,
        key = %key,
        description = %description,
        "diagnostic_worker_started"
      ),
      DiagnosticEvent::WorkerStopped {
        worker_id,
        workflow_id,
      } => debug!(worker_id, workflow_id, "diagnostic_worker_stopped"),
      event => trace!(event = ?event, "diagnostic_event"),
    }
  }
}

/// Forwards every event to each listener in order.
#[derive(Clone, Default)]
pub struct ChainedListener {
  listeners: Vec<Arc<dyn DiagnosticListener>>,
}

impl ChainedListener {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, listener: Arc<dyn DiagnosticListener>) -> Self {
    self.listeners.push(listener);
    self
  }

  pub fn len(&self) -> usize {
    self.listeners.len()
  }

  pub fn is_empty(&self) -> bool {
    self.listeners.is_empty()
  }
}

impl DiagnosticListener for ChainedListener {
  fn notify(&self, event: DiagnosticEvent) {
    if let Some((last, rest)) = self.listeners.split_last() {
      for listener in rest {
        listener.notify(event.clone());
      }
      last.notify(event);
    }
  }
}

/// The shape of a workflow tree after one render pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowHierarchy {
  pub workflow_type: String,
  /// Live children, in the order they were started.
  pub children: Vec<ChildWorkflow>,
  /// Running workers, in the order they were started.
  pub workers: Vec<ChildWorker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildWorkflow {
  pub key: String,
  pub workflow: WorkflowHierarchy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildWorker {
  pub key: String,
  pub description: String,
}

/// What made a workflow change, seen from `workflow_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowUpdate {
  pub workflow_type: String,
  #[serde(flatten)]
  pub kind: UpdateKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateKind {
  /// The workflow applied an action.
  Updated { source: UpdateSource },
  /// A descendant under child `key` applied an action that emitted no
  /// output, so this workflow was not told about it.
  Passthrough { key: String, child: Box<WorkflowUpdate> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateSource {
  /// An event sent to one of its rendering's sinks.
  Sink,
  /// An output of the worker declared under `key`.
  Worker { key: String },
  /// An output of the child rendered under `key`.
  Subtree { key: String, child: Box<WorkflowUpdate> },
}

/// One entry per render pass: the tree, and the update that caused the pass
/// (`None` for the first pass and for props changes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSnapshot {
  pub hierarchy: WorkflowHierarchy,
  pub update: Option<WorkflowUpdate>,
}

#[derive(Debug)]
struct WorkflowRecord {
  parent_id: Option<u64>,
  workflow_type: String,
  key: String,
  children: Vec<u64>,
  workers: Vec<u64>,
}

#[derive(Debug)]
struct WorkerRecord {
  key: String,
  description: String,
}

/// Rebuilds the tree from lifecycle events.
#[derive(Debug, Default)]
struct HierarchyRecorder {
  root: Option<u64>,
  workflows: HashMap<u64, WorkflowRecord>,
  workers: HashMap<u64, WorkerRecord>,
  update: Option<WorkflowUpdate>,
}

impl HierarchyRecorder {
  fn record(&mut self, event: DiagnosticEvent) -> Option<DebugSnapshot> {
    match event {
      DiagnosticEvent::RuntimeStarted { .. } | DiagnosticEvent::RuntimeStopped { .. } => {
        *self = Self::default();
      }
      DiagnosticEvent::WorkflowStarted {
        workflow_id,
        parent_id,
        workflow_type,
        key,
        ..
      } => {
        match parent_id {
          Some(parent_id) => {
            if let Some(parent) = self.workflows.get_mut(&parent_id) {
              parent.children.push(workflow_id);
            }
          }
          None => self.root = Some(workflow_id),
        }
        self.workflows.insert(
          workflow_id,
          WorkflowRecord {
            parent_id,
            workflow_type,
            key,
            children: Vec::new(),
            workers: Vec::new(),
          },
        );
      }
      DiagnosticEvent::WorkflowStopped { workflow_id } => {
        let record = self.workflows.remove(&workflow_id)?;
        for worker_id in record.workers {
          self.workers.remove(&worker_id);
        }
        match record.parent_id.and_then(|parent_id| self.workflows.get_mut(&parent_id)) {
          Some(parent) => parent.children.retain(|child| *child != workflow_id),
          None if self.root == Some(workflow_id) => self.root = None,
          None => {}
        }
      }
      DiagnosticEvent::WorkerStarted {
        worker_id,
        workflow_id,
        key,
        description,
      } => {
        let workflow = self.workflows.get_mut(&workflow_id)?;
        workflow.workers.push(worker_id);
        self.workers.insert(worker_id, WorkerRecord { key, description });
      }
      DiagnosticEvent::WorkerStopped {
        worker_id,
        workflow_id,
      } => {
        self.workers.remove(&worker_id);
        let workflow = self.workflows.get_mut(&workflow_id)?;
        workflow.workers.retain(|worker| *worker != worker_id);
      }
      DiagnosticEvent::WorkerOutput {
        worker_id,
        workflow_id,
      } => {
        let key = self.workers.get(&worker_id)?.key.clone();
        self.update = Some(WorkflowUpdate {
          workflow_type: self.workflows.get(&workflow_id)?.workflow_type.clone(),
          kind: UpdateKind::Updated {
            source: UpdateSource::Worker { key },
          },
        });
      }
      DiagnosticEvent::SinkReceived { workflow_id, .. } => {
        self.update = Some(WorkflowUpdate {
          workflow_type: self.workflows.get(&workflow_id)?.workflow_type.clone(),
          kind: UpdateKind::Updated {
            source: UpdateSource::Sink,
          },
        });
      }
      DiagnosticEvent::ActionApplied {
        workflow_id,
        emitted_output,
        ..
      } => {
        // The root's update is already recorded at its own level.
        let record = self.workflows.get(&workflow_id)?;
        let parent = self.workflows.get(&record.parent_id?)?;
        let child = Box::new(self.update.take()?);
        let key = record.key.clone();
        let kind = if emitted_output {
          UpdateKind::Updated {
            source: UpdateSource::Subtree { key, child },
          }
        } else {
          UpdateKind::Passthrough { key, child }
        };
        self.update = Some(WorkflowUpdate {
          workflow_type: parent.workflow_type.clone(),
          kind,
        });
      }
      DiagnosticEvent::AfterRenderPass { .. } => {
        let hierarchy = self.hierarchy(self.root?)?;
        return Some(DebugSnapshot {
          hierarchy,
          update: self.update.take(),
        });
      }
      _ => {}
    }
    None
  }

  fn hierarchy(&self, workflow_id: u64) -> Option<WorkflowHierarchy> {
    let record = self.workflows.get(&workflow_id)?;
    let children = record
      .children
      .iter()
      .filter_map(|child_id| {
        Some(ChildWorkflow {
          key: self.workflows.get(child_id)?.key.clone(),
          workflow: self.hierarchy(*child_id)?,
        })
      })
      .collect();
    let workers = record
      .workers
      .iter()
      .filter_map(|worker_id| self.workers.get(worker_id))
      .map(|worker| ChildWorker {
        key: worker.key.clone(),
        description: worker.description.clone(),
      })
      .collect();

    Some(WorkflowHierarchy {
      workflow_type: record.workflow_type.clone(),
      children,
      workers,
    })
  }
}

/// Records a [`DebugSnapshot`] after every render pass and sends it to an
/// unbounded channel.
///
/// Workflow ids are only unique within one session, so give each session its
/// own listener.
#[derive(Debug)]
pub struct DebugSnapshotListener {
  recorder: Mutex<HierarchyRecorder>,
  sender: mpsc::UnboundedSender<DebugSnapshot>,
}

impl DebugSnapshotListener {
  pub fn new() -> (Self, mpsc::UnboundedReceiver<DebugSnapshot>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let listener = Self {
      recorder: Mutex::new(HierarchyRecorder::default()),
      sender,
    };
    (listener, receiver)
  }
}

impl DiagnosticListener for DebugSnapshotListener {
  fn notify(&self, event: DiagnosticEvent) {
    let snapshot = self
      .recorder
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .record(event);
    if let Some(snapshot) = snapshot {
      let _ = self.sender.send(snapshot);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use canopy_workflow::ChannelListener;

  #[test]
  fn chained_listener_forwards_to_every_listener() {
    let (first, mut first_events) = ChannelListener::new();
    let (second, mut second_events) = ChannelListener::new();
    let chained = ChainedListener::new()
      .with(Arc::new(first))
      .with(Arc::new(TracingListener))
      .with(Arc::new(second));
    assert_eq!(chained.len(), 3);

    let event = DiagnosticEvent::WorkflowStopped { workflow_id: 7 };
    chained.notify(event.clone());

    assert_eq!(first_events.try_recv().unwrap(), event);
    assert_eq!(second_events.try_recv().unwrap(), event);
  }

  #[test]
  fn empty_chain_drops_events() {
    let chained = ChainedListener::new();
    assert!(chained.is_empty());
    chained.notify(DiagnosticEvent::WorkflowStopped { workflow_id: 1 });
  }

  fn started(workflow_id: u64, parent_id: Option<u64>, workflow_type: &str, key: &str) -> DiagnosticEvent {
    DiagnosticEvent::WorkflowStarted {
      workflow_id,
      parent_id,
      workflow_type: workflow_type.to_string(),
      key: key.to_string(),
      restored: false,
    }
  }

  fn render_pass() -> DiagnosticEvent {
    DiagnosticEvent::AfterRenderPass {
      session_id: "s".to_string(),
    }
  }

  #[test]
  fn stopped_workflows_leave_the_hierarchy() {
    let (listener, mut snapshots) = DebugSnapshotListener::new();
    listener.notify(started(0, None, "Root", ""));
    listener.notify(started(1, Some(0), "Leaf", "a"));
    listener.notify(DiagnosticEvent::WorkerStarted {
      worker_id: 2,
      workflow_id: 1,
      key: "poll".to_string(),
      description: "poller".to_string(),
    });
    listener.notify(render_pass());

    let first = snapshots.try_recv().unwrap();
    assert_eq!(first.hierarchy.children.len(), 1);
    assert_eq!(first.hierarchy.children[0].key, "a");
    assert_eq!(
      first.hierarchy.children[0].workflow.workers,
      vec![ChildWorker {
        key: "poll".to_string(),
        description: "poller".to_string(),
      }]
    );

    listener.notify(DiagnosticEvent::WorkerStopped {
      worker_id: 2,
      workflow_id: 1,
    });
    listener.notify(DiagnosticEvent::WorkflowStopped { workflow_id: 1 });
    listener.notify(render_pass());

    let second = snapshots.try_recv().unwrap();
    assert_eq!(
      second.hierarchy,
      WorkflowHierarchy {
        workflow_type: "Root".to_string(),
        children: Vec::new(),
        workers: Vec::new(),
      }
    );
    assert_eq!(second.update, None);
  }

  #[test]
  fn worker_outputs_bubble_up_as_updates() {
    let (listener, mut snapshots) = DebugSnapshotListener::new();
    listener.notify(started(0, None, "Root", ""));
    listener.notify(started(1, Some(0), "Leaf", "a"));
    listener.notify(DiagnosticEvent::WorkerStarted {
      worker_id: 2,
      workflow_id: 1,
      key: "poll".to_string(),
      description: "poller".to_string(),
    });
    listener.notify(DiagnosticEvent::WorkerOutput {
      worker_id: 2,
      workflow_id: 1,
    });
    listener.notify(DiagnosticEvent::ActionApplied {
      workflow_id: 1,
      action: "polled".to_string(),
      emitted_output: false,
    });
    listener.notify(render_pass());

    let update = snapshots.try_recv().unwrap().update.unwrap();
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      serde_json::json!({
        "workflow_type": "Root",
        "kind": "passthrough",
        "key": "a",
        "child": {
          "workflow_type": "Leaf",
          "kind": "updated",
          "source": { "type": "worker", "key": "poll" },
        },
      })
    );
  }
}
