//! State transitions.

use std::borrow::Cow;
use std::fmt;

type Apply<S, O> = Box<dyn FnOnce(&mut S) -> Option<O> + Send>;

/// A named state transition that may emit an output to the parent.
///
/// Actions are the only way a workflow's state changes. They are created
/// during render (inside event, worker and child handlers) and applied later,
/// one per tick.
pub struct WorkflowAction<S, O> {
  name: Cow<'static, str>,
  apply: Apply<S, O>,
}

impl<S, O> WorkflowAction<S, O> {
  /// An action that runs `apply` against the current state.
  pub fn new(
    name: impl Into<Cow<'static, str>>,
    apply: impl FnOnce(&mut S) -> Option<O> + Send + 'static,
  ) -> Self {
    Self {
      name: name.into(),
      apply: Box::new(apply),
    }
  }

  /// Leaves state untouched and emits nothing. The node still re-renders.
  pub fn no_action() -> Self {
    Self::new("no_action", |_| None)
  }

  pub fn emit_output(output: O) -> Self
  where
    O: Send + 'static,
  {
    Self::new("emit_output", move |_| Some(output))
  }

  pub fn enter_state(state: S) -> Self
  where
    S: Send + 'static,
  {
    Self::new("enter_state", move |current| {
      *current = state;
      None
    })
  }

  pub fn enter_state_and_emit(state: S, output: O) -> Self
  where
    S: Send + 'static,
    O: Send + 'static,
  {
    Self::new("enter_state_and_emit", move |current| {
      *current = state;
      Some(output)
    })
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Apply in place, returning the emitted output if any.
  pub fn apply(self, state: &mut S) -> Option<O> {
    (self.apply)(state)
  }

  /// Apply to an owned state, returning the new state and the output.
  pub fn apply_to(self, mut state: S) -> (S, Option<O>) {
    let output = self.apply(&mut state);
    (state, output)
  }

  /// Lift an action over a child's state into one over a larger state.
  pub fn map_state<T: 'static>(
    self,
    project: impl FnOnce(&mut T) -> &mut S + Send + 'static,
  ) -> WorkflowAction<T, O>
  where
    S: 'static,
    O: 'static,
  {
    let Self { name, apply } = self;
    WorkflowAction {
      name,
      apply: Box::new(move |state: &mut T| apply(project(state))),
    }
  }
}

impl<S, O> fmt::Debug for WorkflowAction<S, O> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("WorkflowAction").field(&self.name).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn constructors() {
    let (state, output) = WorkflowAction::<u32, &str>::no_action().apply_to(1);
    assert_eq!((state, output), (1, None));

    let (state, output) = WorkflowAction::<u32, &str>::emit_output("done").apply_to(1);
    assert_eq!((state, output), (1, Some("done")));

    let (state, output) = WorkflowAction::<u32, &str>::enter_state(5).apply_to(1);
    assert_eq!((state, output), (5, None));

    let action = WorkflowAction::<u32, &str>::enter_state_and_emit(9, "moved");
    assert_eq!(action.name(), "enter_state_and_emit");
    assert_eq!(action.apply_to(1), (9, Some("moved")));
  }

  #[test]
  fn custom_action_mutates_in_place() {
    let action = WorkflowAction::<Vec<u32>, usize>::new("push", |items| {
      items.push(3);
      Some(items.len())
    });
    let mut items = vec![1, 2];
    assert_eq!(action.apply(&mut items), Some(3));
    assert_eq!(items, vec![1, 2, 3]);
  }

  #[test]
  fn map_state_projects_into_a_field() {
    struct Screen {
      count: u32,
    }

    let action = WorkflowAction::<u32, ()>::new("increment", |count| {
      *count += 1;
      None
    })
    .map_state(|screen: &mut Screen| &mut screen.count);

    let mut screen = Screen { count: 1 };
    assert_eq!(action.name(), "increment");
    assert_eq!(action.apply(&mut screen), None);
    assert_eq!(screen.count, 2);
  }
}
