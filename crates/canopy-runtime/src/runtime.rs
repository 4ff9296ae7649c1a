//! Workflow runtime.
//!
//! The [`WorkflowRuntime`] struct is the entry point for running a workflow
//! tree. It owns the root workflow, the runtime config and an optional
//! diagnostic listener, and provides `launch(props, snapshot, cancel)` to
//! start a [`WorkflowSession`].

use std::any::type_name;
use std::sync::Arc;

use canopy_snapshot::Snapshot;
use canopy_workflow::{
  DiagnosticEvent, DiagnosticListener, NodeEnv, StatefulWorkflow, WorkflowError, WorkflowNode,
};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, instrument};

use crate::session::RenderingAndSnapshot;
use crate::{OutputMode, RuntimeConfig, RuntimeError, WorkflowSession};

/// The workflow runtime.
///
/// One runtime can launch any number of independent sessions of its root
/// workflow.
pub struct WorkflowRuntime<W> {
  workflow: Arc<W>,
  config: RuntimeConfig,
  listener: Option<Arc<dyn DiagnosticListener>>,
}

impl<W: StatefulWorkflow> WorkflowRuntime<W> {
  pub fn new(config: RuntimeConfig, workflow: W) -> Self {
    Self {
      workflow: Arc::new(workflow),
      config,
      listener: None,
    }
  }

  /// Send diagnostic events from every session, and every node in it, to
  /// `listener`.
  pub fn with_listener(mut self, listener: Arc<dyn DiagnosticListener>) -> Self {
    self.listener = Some(listener);
    self
  }

  pub fn workflow(&self) -> &W {
    &self.workflow
  }

  pub fn config(&self) -> &RuntimeConfig {
    &self.config
  }

  /// Launch a session driven by `props`.
  ///
  /// Waits for the first props value, renders the root with it (restoring
  /// the tree from `snapshot` when given) and publishes that render pass
  /// before returning. The session then runs on its own task: every tick and
  /// every props change triggers another render pass. After the props stream
  /// ends the last props are kept.
  ///
  /// Fails with [`RuntimeError::NoProps`] if `props` ends before its first
  /// value, and with the first render's error if that render fails.
  #[instrument(
    name = "runtime_launch",
    skip_all,
    fields(
      workflow_type = %type_name::<W>(),
    )
  )]
  pub async fn launch(
    &self,
    props: impl Stream<Item = W::Props> + Send + 'static,
    snapshot: Option<Snapshot>,
    cancel: CancellationToken,
  ) -> Result<WorkflowSession<W>, RuntimeError> {
    let mut props = props.boxed();
    let session_id = uuid::Uuid::new_v4().to_string();
    let token = cancel.child_token();

    let first = tokio::select! {
      biased;
      _ = token.cancelled() => return Err(WorkflowError::Cancelled.into()),
      first = props.next() => first.ok_or(RuntimeError::NoProps)?,
    };

    info!(
      session_id = %session_id,
      workflow_type = %type_name::<W>(),
      restoring = snapshot.is_some(),
      "runtime_started"
    );

    let mut env = NodeEnv::new(token.clone()).with_restore_policy(self.config.restore_policy);
    if let Some(listener) = &self.listener {
      listener.notify(DiagnosticEvent::RuntimeStarted {
        session_id: session_id.clone(),
        workflow_type: type_name::<W>().to_string(),
      });
      env = env.with_listener(listener.clone());
    }

    let (renderings_tx, renderings) = mpsc::unbounded_channel();
    let (outputs_tx, outputs) = mpsc::unbounded_channel();
    let mut driver = Driver {
      workflow: self.workflow.clone(),
      root: WorkflowNode::new_root(self.workflow.as_ref(), first.clone(), snapshot.as_ref(), &env),
      props: first,
      session_id: session_id.clone(),
      output_mode: self.config.output_mode,
      listener: self.listener.clone(),
      renderings: renderings_tx,
      outputs: outputs_tx,
    };
    if let Err(e) = driver.render_pass() {
      let error = RuntimeError::from(e);
      driver.shutdown(Some(&error));
      return Err(error);
    }

    let span = info_span!("workflow_session", session_id = %session_id);
    let handle = tokio::spawn(driver.run(props, token.clone()).instrument(span));

    Ok(WorkflowSession::new(session_id, renderings, outputs, handle, token))
  }

  /// Launch a session whose props never change.
  pub async fn launch_with_props(
    &self,
    props: W::Props,
    snapshot: Option<Snapshot>,
    cancel: CancellationToken,
  ) -> Result<WorkflowSession<W>, RuntimeError> {
    self.launch(stream::iter([props]), snapshot, cancel).await
  }
}

/// Owns the root node of one session and runs its render/tick loop.
struct Driver<W: StatefulWorkflow> {
  workflow: Arc<W>,
  root: WorkflowNode<W>,
  props: W::Props,
  session_id: String,
  output_mode: OutputMode,
  listener: Option<Arc<dyn DiagnosticListener>>,
  renderings: mpsc::UnboundedSender<RenderingAndSnapshot<W::Rendering>>,
  outputs: mpsc::UnboundedSender<W::Output>,
}

impl<W: StatefulWorkflow> Driver<W> {
  fn notify(&self, event: impl FnOnce(String) -> DiagnosticEvent) {
    if let Some(listener) = &self.listener {
      listener.notify(event(self.session_id.clone()));
    }
  }

  /// Render the root with the current props and publish the result.
  fn render_pass(&mut self) -> Result<(), WorkflowError> {
    self.notify(|session_id| DiagnosticEvent::BeforeRenderPass { session_id });
    let rendering = self.root.render(&self.workflow, self.props.clone())?;
    self.notify(|session_id| DiagnosticEvent::AfterRenderPass { session_id });

    self.notify(|session_id| DiagnosticEvent::BeforeSnapshotPass { session_id });
    let snapshot = self.root.snapshot(&self.workflow);
    self.notify(|session_id| DiagnosticEvent::AfterSnapshotPass { session_id });

    // The session may have been dropped; the tree keeps running regardless.
    let _ = self.renderings.send(RenderingAndSnapshot {
      rendering,
      snapshot,
    });
    Ok(())
  }

  async fn run(
    mut self,
    mut props: BoxStream<'static, W::Props>,
    cancel: CancellationToken,
  ) -> Result<Option<W::Output>, RuntimeError> {
    let result = self.run_loop(&mut props, &cancel).await;
    self.shutdown(result.as_ref().err());
    result
  }

  async fn run_loop(
    &mut self,
    props: &mut BoxStream<'static, W::Props>,
    cancel: &CancellationToken,
  ) -> Result<Option<W::Output>, RuntimeError> {
    let mut props_open = true;

    loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          debug!(session_id = %self.session_id, "runtime_cancelled");
          return Ok(None);
        }
        next = props.next(), if props_open => match next {
          Some(next) if next != self.props => {
            debug!(session_id = %self.session_id, "props_updated");
            self.props = next;
          }
          Some(_) => continue,
          None => {
            debug!(session_id = %self.session_id, "props_stream_ended");
            props_open = false;
            continue;
          }
        },
        output = self.root.tick() => {
          if let Some(output) = output? {
            match self.output_mode {
              OutputMode::Terminal => return Ok(Some(output)),
              OutputMode::Continuous => {
                let _ = self.outputs.send(output);
              }
            }
          }
        }
      }

      self.render_pass()?;
    }
  }

  /// Cancel the whole tree and report how the session ended.
  fn shutdown(&mut self, failure: Option<&RuntimeError>) {
    self.root.cancel();
    match failure {
      None => info!(session_id = %self.session_id, "runtime_stopped"),
      Some(e) => error!(session_id = %self.session_id, error = %e, "runtime_failed"),
    }
    self.notify(|session_id| DiagnosticEvent::RuntimeStopped { session_id });
  }
}
