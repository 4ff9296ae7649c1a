//! Canopy Runtime
//!
//! Drives a workflow tree from the outside. [`WorkflowRuntime`] owns the root
//! workflow and its [`RuntimeConfig`]; [`WorkflowRuntime::launch`] renders the
//! root with the first props, then spawns a task that re-renders after every
//! tick and every props change until the root finishes or is cancelled.
//! Each render pass is published on the [`WorkflowSession`] together with a
//! lazy snapshot of the whole tree.

mod config;
mod error;
mod listener;
mod runtime;
mod session;

pub use config::{OutputMode, RuntimeConfig};
pub use error::RuntimeError;
pub use listener::{
  ChainedListener, ChildWorker, ChildWorkflow, DebugSnapshot, DebugSnapshotListener, TracingListener,
  UpdateKind, UpdateSource, WorkflowHierarchy, WorkflowUpdate,
};
pub use runtime::WorkflowRuntime;
pub use session::{RenderingAndSnapshot, WorkflowSession};
