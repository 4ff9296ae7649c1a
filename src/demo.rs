//! The mission demo: a mission runs one countdown child per stage.

use std::fmt;
use std::time::Duration;

use canopy_snapshot::SnapshotSource;
use canopy_workflow::{
  RenderContext, Sink, Snapshot, SnapshotError, StatefulWorkflow, TimerWorker, WorkflowAction,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct CountdownProps {
  pub from: u32,
  pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
  Finished,
  Aborted,
}

pub struct CountdownScreen {
  pub remaining: u32,
  pub abort: Sink<()>,
}

/// Counts down from `from` to zero, one step per `interval`.
pub struct Countdown;

impl StatefulWorkflow for Countdown {
  type Props = CountdownProps;
  type State = u32;
  type Output = CountdownOutcome;
  type Rendering = CountdownScreen;

  fn initial_state(&self, props: &CountdownProps) -> u32 {
    props.from
  }

  fn restore_state(&self, _props: &CountdownProps, snapshot: &Snapshot) -> Result<u32, SnapshotError> {
    let remaining = snapshot.parse(|src| src.read_i32())?;
    u32::try_from(remaining)
      .map_err(|_| SnapshotError::invalid(format!("negative countdown {remaining}")))
  }

  fn on_props_changed(&self, old: &CountdownProps, new: &CountdownProps, remaining: &mut u32) {
    if old.from != new.from {
      *remaining = new.from;
    }
  }

  fn render(
    &self,
    props: &CountdownProps,
    remaining: &u32,
    context: &mut RenderContext<'_, u32, CountdownOutcome>,
  ) -> CountdownScreen {
    if *remaining > 0 {
      // One timer per value, so each step starts a fresh delay.
      let timer = TimerWorker::new(props.interval, remaining.to_string());
      context.running_worker(timer, "tick", |()| {
        WorkflowAction::new("tick", |remaining: &mut u32| {
          *remaining = remaining.saturating_sub(1);
          (*remaining == 0).then_some(CountdownOutcome::Finished)
        })
      });
    }

    CountdownScreen {
      remaining: *remaining,
      abort: context.on_event(|()| WorkflowAction::emit_output(CountdownOutcome::Aborted)),
    }
  }

  fn snapshot_state(&self, remaining: &u32) -> Snapshot {
    Snapshot::of_i32(*remaining as i32)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissionProps {
  pub stages: Vec<String>,
  pub count_from: u32,
  pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MissionOutput {
  Completed { stages: usize },
  Aborted { stage: String },
}

pub struct MissionScreen {
  pub stage: Option<String>,
  pub completed: usize,
  pub total: usize,
  pub countdown: Option<CountdownScreen>,
}

impl MissionScreen {
  /// Abort the running stage. Returns false when no stage is running or the
  /// rendering is stale.
  pub fn abort(&self) -> bool {
    self
      .countdown
      .as_ref()
      .is_some_and(|countdown| countdown.abort.send(()).is_ok())
  }
}

impl fmt::Display for MissionScreen {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "[{}/{}] ", self.completed, self.total)?;
    match (&self.stage, &self.countdown) {
      (Some(stage), Some(countdown)) => write!(f, "{stage}: {}", countdown.remaining),
      _ => write!(f, "done"),
    }
  }
}

/// Runs its stages in order; each stage is a [`Countdown`] child.
pub struct Mission;

impl StatefulWorkflow for Mission {
  type Props = MissionProps;
  type State = usize;
  type Output = MissionOutput;
  type Rendering = MissionScreen;

  fn initial_state(&self, _props: &MissionProps) -> usize {
    0
  }

  fn restore_state(&self, props: &MissionProps, snapshot: &Snapshot) -> Result<usize, SnapshotError> {
    let completed = snapshot.parse(|src| src.read_i32())?;
    usize::try_from(completed)
      .ok()
      .filter(|completed| *completed <= props.stages.len())
      .ok_or_else(|| SnapshotError::invalid(format!("stage {completed} out of range")))
  }

  fn render(
    &self,
    props: &MissionProps,
    completed: &usize,
    context: &mut RenderContext<'_, usize, MissionOutput>,
  ) -> MissionScreen {
    let total = props.stages.len();
    let Some(stage) = props.stages.get(*completed) else {
      return MissionScreen {
        stage: None,
        completed: *completed,
        total,
        countdown: None,
      };
    };

    let countdown_props = CountdownProps {
      from: props.count_from,
      interval: props.interval,
    };
    let name = stage.clone();
    let countdown = context.render_child(
      Countdown,
      countdown_props,
      format!("{completed}-{stage}"),
      move |outcome| match outcome {
        CountdownOutcome::Finished => WorkflowAction::new("stage_finished", move |completed: &mut usize| {
          *completed += 1;
          (*completed == total).then_some(MissionOutput::Completed { stages: total })
        }),
        CountdownOutcome::Aborted => WorkflowAction::emit_output(MissionOutput::Aborted {
          stage: name.clone(),
        }),
      },
    );

    MissionScreen {
      stage: Some(stage.clone()),
      completed: *completed,
      total,
      countdown: Some(countdown),
    }
  }

  fn snapshot_state(&self, completed: &usize) -> Snapshot {
    Snapshot::of_i32(*completed as i32)
  }
}
