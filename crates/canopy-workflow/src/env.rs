//! Per-tree settings shared by every node.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{DiagnosticEvent, DiagnosticListener};

/// What a node does when its snapshot cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorePolicy {
  /// Report [`WorkflowError::Snapshot`](crate::WorkflowError::Snapshot) from
  /// the node's first render.
  #[default]
  Fail,
  /// Log a warning and start from `initial_state`.
  InitialState,
}

/// The environment a node is created in.
///
/// The runtime builds one for the root; every node derives the environment
/// of its children from its own, so the listener, id counter and restore
/// policy are shared tree-wide while cancellation tokens nest.
#[derive(Clone)]
pub struct NodeEnv {
  token: CancellationToken,
  listener: Option<Arc<dyn DiagnosticListener>>,
  ids: Arc<AtomicU64>,
  restore_policy: RestorePolicy,
  parent_id: Option<u64>,
}

impl NodeEnv {
  /// An environment whose nodes are cancelled when `token` is.
  pub fn new(token: CancellationToken) -> Self {
    Self {
      token,
      listener: None,
      ids: Arc::new(AtomicU64::new(0)),
      restore_policy: RestorePolicy::default(),
      parent_id: None,
    }
  }

  pub fn with_listener(mut self, listener: Arc<dyn DiagnosticListener>) -> Self {
    self.listener = Some(listener);
    self
  }

  pub fn with_restore_policy(mut self, restore_policy: RestorePolicy) -> Self {
    self.restore_policy = restore_policy;
    self
  }

  pub fn token(&self) -> &CancellationToken {
    &self.token
  }

  pub fn restore_policy(&self) -> RestorePolicy {
    self.restore_policy
  }

  pub(crate) fn parent_id(&self) -> Option<u64> {
    self.parent_id
  }

  pub(crate) fn next_id(&self) -> u64 {
    self.ids.fetch_add(1, Ordering::Relaxed)
  }

  /// Environment for a node created here: same settings, own child token.
  pub(crate) fn scope(&self) -> Self {
    Self {
      token: self.token.child_token(),
      ..self.clone()
    }
  }

  /// Environment handed to the children of node `parent_id`.
  pub(crate) fn for_children_of(&self, parent_id: u64) -> Self {
    Self {
      parent_id: Some(parent_id),
      ..self.clone()
    }
  }

  /// Emit a diagnostic event. The event is only built when someone listens.
  pub(crate) fn notify(&self, event: impl FnOnce() -> DiagnosticEvent) {
    if let Some(listener) = &self.listener {
      listener.notify(event());
    }
  }
}

impl fmt::Debug for NodeEnv {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NodeEnv")
      .field("cancelled", &self.token.is_cancelled())
      .field("listener", &self.listener.is_some())
      .field("restore_policy", &self.restore_policy)
      .field("parent_id", &self.parent_id)
      .finish()
  }
}
