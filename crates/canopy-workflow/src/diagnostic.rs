//! Diagnostic events and listeners for observability.
//!
//! Events are emitted while the runtime renders, snapshots and ticks the
//! workflow tree so consumers can trace what the tree is doing. Listeners
//! only observe: nothing they do changes runtime behavior.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the runtime and by every node in the tree.
///
/// `workflow_id` and `worker_id` are numeric ids unique within one runtime
/// session, assigned in creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticEvent {
  /// The runtime has received its first props and is about to render.
  RuntimeStarted {
    session_id: String,
    workflow_type: String,
  },

  /// The runtime loop ended and the tree was cancelled.
  RuntimeStopped { session_id: String },

  BeforeRenderPass { session_id: String },
  AfterRenderPass { session_id: String },
  BeforeSnapshotPass { session_id: String },
  AfterSnapshotPass { session_id: String },

  /// A node received props unequal to its previous ones.
  PropsChanged { workflow_id: u64 },

  /// A node was created.
  WorkflowStarted {
    workflow_id: u64,
    parent_id: Option<u64>,
    workflow_type: String,
    key: String,
    restored: bool,
  },

  /// A node was cancelled.
  WorkflowStopped { workflow_id: u64 },

  BeforeWorkflowRendered { workflow_id: u64 },
  AfterWorkflowRendered { workflow_id: u64 },

  /// A worker instance was started.
  WorkerStarted {
    worker_id: u64,
    workflow_id: u64,
    key: String,
    description: String,
  },

  /// A worker emitted a value.
  WorkerOutput { worker_id: u64, workflow_id: u64 },

  /// A worker finished or was cancelled.
  WorkerStopped { worker_id: u64, workflow_id: u64 },

  /// A sink delivered an action to its node.
  SinkReceived { workflow_id: u64, action: String },

  /// An action was applied to a node's state.
  ActionApplied {
    workflow_id: u64,
    action: String,
    emitted_output: bool,
  },
}

/// Trait for receiving diagnostic events.
///
/// The runtime calls `notify` synchronously from the task driving the tree,
/// so implementations should return quickly.
pub trait DiagnosticListener: Send + Sync {
  fn notify(&self, event: DiagnosticEvent);
}

/// A listener that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
  sender: mpsc::UnboundedSender<DiagnosticEvent>,
}

impl ChannelListener {
  /// Create a listener and the receiver its events arrive on.
  pub fn new() -> (Self, mpsc::UnboundedReceiver<DiagnosticEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self { sender }, receiver)
  }
}

impl DiagnosticListener for ChannelListener {
  fn notify(&self, event: DiagnosticEvent) {
    // Receiver dropped: nobody is listening anymore.
    let _ = self.sender.send(event);
  }
}
