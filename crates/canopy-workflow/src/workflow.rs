//! The workflow traits.

use canopy_snapshot::{Snapshot, SnapshotError};

use crate::RenderContext;

/// A state machine that renders `(props, state)` into a rendering.
///
/// A workflow value is a stateless description: the runtime keeps one state
/// per live node and hands it to `render` by reference. State only changes by
/// applying a [`WorkflowAction`](crate::WorkflowAction) during a tick.
///
/// ```ignore
/// struct Counter;
///
/// impl StatefulWorkflow for Counter {
///   type Props = ();
///   type State = u32;
///   type Output = ();
///   type Rendering = CounterScreen;
///
///   fn initial_state(&self, _props: &()) -> u32 {
///     0
///   }
///
///   fn render(&self, _props: &(), state: &u32, context: &mut RenderContext<'_, u32, ()>) -> CounterScreen {
///     CounterScreen {
///       count: *state,
///       increment: context.on_event(|()| WorkflowAction::new("increment", |count| {
///         *count += 1;
///         None
///       })),
///     }
///   }
/// }
/// ```
pub trait StatefulWorkflow: Send + Sync + 'static {
  type Props: Clone + PartialEq + Send + 'static;
  type State: Send + 'static;
  type Output: Send + 'static;
  type Rendering: Send + 'static;

  /// State for a node that has no snapshot to restore from.
  fn initial_state(&self, props: &Self::Props) -> Self::State;

  /// State for a node restored from a non-empty snapshot previously produced
  /// by [`StatefulWorkflow::snapshot_state`].
  fn restore_state(
    &self,
    props: &Self::Props,
    snapshot: &Snapshot,
  ) -> Result<Self::State, SnapshotError> {
    let _ = snapshot;
    Ok(self.initial_state(props))
  }

  /// Called before render when the parent passes props unequal to the last
  /// ones.
  fn on_props_changed(&self, old: &Self::Props, new: &Self::Props, state: &mut Self::State) {
    let _ = (old, new, state);
  }

  fn render(
    &self,
    props: &Self::Props,
    state: &Self::State,
    context: &mut RenderContext<'_, Self::State, Self::Output>,
  ) -> Self::Rendering;

  fn snapshot_state(&self, state: &Self::State) -> Snapshot {
    let _ = state;
    Snapshot::empty()
  }
}

/// A workflow without state of its own. It can still run workers and
/// children, and emit outputs from their handlers.
pub trait StatelessWorkflow: Send + Sync + 'static {
  type Props: Clone + PartialEq + Send + 'static;
  type Output: Send + 'static;
  type Rendering: Send + 'static;

  fn render(
    &self,
    props: &Self::Props,
    context: &mut RenderContext<'_, (), Self::Output>,
  ) -> Self::Rendering;
}

impl<T: StatelessWorkflow> StatefulWorkflow for T {
  type Props = <T as StatelessWorkflow>::Props;
  type State = ();
  type Output = <T as StatelessWorkflow>::Output;
  type Rendering = <T as StatelessWorkflow>::Rendering;

  fn initial_state(&self, _props: &<T as StatelessWorkflow>::Props) {}

  fn render(
    &self,
    props: &<T as StatelessWorkflow>::Props,
    _state: &(),
    context: &mut RenderContext<'_, (), <T as StatelessWorkflow>::Output>,
  ) -> <T as StatelessWorkflow>::Rendering {
    StatelessWorkflow::render(self, props, context)
  }
}
