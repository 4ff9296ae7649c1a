//! Hierarchical workflows.
//!
//! A [`StatefulWorkflow`] turns `(props, state)` into a rendering while
//! declaring, through its [`RenderContext`], the child workflows, workers and
//! event sinks it wants active. A [`WorkflowNode`] keeps one instance alive
//! across renders: it reconciles children and workers against each render's
//! declarations and, on [`tick`](WorkflowNode::tick), waits for the next
//! child output, worker output or event and applies it to its state.

mod action;
mod behavior;
mod context;
mod diagnostic;
mod env;
mod error;
mod id;
mod lifetime;
mod node;
mod running;
mod select;
mod sink;
mod subtree;
mod tree_snapshot;
mod worker;
mod workflow;

pub use action::WorkflowAction;
pub use context::RenderContext;
pub use diagnostic::{ChannelListener, DiagnosticEvent, DiagnosticListener};
pub use env::{NodeEnv, RestorePolicy};
pub use error::WorkflowError;
pub use id::WorkflowId;
pub use lifetime::{DuplicateKey, LifetimeTracker};
pub use node::{NodePhase, WorkflowNode};
pub use sink::Sink;
pub use tree_snapshot::TreeSnapshot;
pub use worker::{TimerWorker, TypedWorker, Worker, side_effect};
pub use workflow::{StatefulWorkflow, StatelessWorkflow};

pub use canopy_snapshot::{Snapshot, SnapshotError};
