//! Event sinks handed out in renderings.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use crate::{WorkflowAction, WorkflowError};

type SendFn<E> = Arc<dyn Fn(E) -> Result<(), WorkflowError> + Send + Sync>;

/// A callback embedded in a rendering that turns UI or caller events into
/// workflow actions.
///
/// Only one event per render pass reaches the workflow. Later sends on any
/// sink from the same rendering fail with [`WorkflowError::DuplicateEvent`],
/// and sends on a rendering that has been replaced fail with
/// [`WorkflowError::StaleRendering`].
pub struct Sink<E> {
  send: SendFn<E>,
}

impl<E: 'static> Sink<E> {
  pub fn new(send: impl Fn(E) -> Result<(), WorkflowError> + Send + Sync + 'static) -> Self {
    Self {
      send: Arc::new(send),
    }
  }

  pub fn send(&self, event: E) -> Result<(), WorkflowError> {
    (self.send)(event)
  }

  /// A sink of `T` that converts each value with `convert` before sending.
  pub fn contra_map<T: 'static>(&self, convert: impl Fn(T) -> E + Send + Sync + 'static) -> Sink<T> {
    let send = self.send.clone();
    Sink::new(move |event| send(convert(event)))
  }
}

impl<E> Clone for Sink<E> {
  fn clone(&self) -> Self {
    Self {
      send: self.send.clone(),
    }
  }
}

impl<E> fmt::Debug for Sink<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Sink").finish_non_exhaustive()
  }
}

/// The single-resolution slot shared by every sink of one render pass.
pub(crate) struct EventSlot<S, O> {
  sender: Arc<Mutex<Option<oneshot::Sender<WorkflowAction<S, O>>>>>,
}

impl<S, O> EventSlot<S, O> {
  pub(crate) fn channel() -> (Self, oneshot::Receiver<WorkflowAction<S, O>>) {
    let (sender, receiver) = oneshot::channel();
    let slot = Self {
      sender: Arc::new(Mutex::new(Some(sender))),
    };
    (slot, receiver)
  }

  pub(crate) fn deliver(&self, action: WorkflowAction<S, O>) -> Result<(), WorkflowError> {
    let sender = self
      .sender
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .take();
    match sender {
      Some(sender) => sender
        .send(action)
        .map_err(|action| WorkflowError::StaleRendering {
          action: action.name().to_string(),
        }),
      None => Err(WorkflowError::DuplicateEvent {
        action: action.name().to_string(),
      }),
    }
  }
}

impl<S, O> Clone for EventSlot<S, O> {
  fn clone(&self) -> Self {
    Self {
      sender: self.sender.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn increment() -> WorkflowAction<u32, ()> {
    WorkflowAction::new("increment", |count| {
      *count += 1;
      None
    })
  }

  #[test]
  fn slot_resolves_once() {
    let (slot, mut receiver) = EventSlot::<u32, ()>::channel();
    let other = slot.clone();

    slot.deliver(increment()).unwrap();
    let err = other.deliver(increment()).unwrap_err();
    assert!(matches!(err, WorkflowError::DuplicateEvent { action } if action == "increment"));

    let mut count = 0;
    receiver.try_recv().unwrap().apply(&mut count);
    assert_eq!(count, 1);
  }

  #[test]
  fn dropped_receiver_means_stale_rendering() {
    let (slot, receiver) = EventSlot::<u32, ()>::channel();
    drop(receiver);
    let err = slot.deliver(increment()).unwrap_err();
    assert!(matches!(err, WorkflowError::StaleRendering { .. }));
  }

  #[test]
  fn contra_map_converts_before_sending() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();
    let sink = Sink::new(move |value: u32| {
      recorded.lock().unwrap().push(value);
      Ok(())
    });

    let lengths = sink.contra_map(|text: &'static str| text.len() as u32);
    lengths.send("four").unwrap();
    sink.clone().send(1).unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![4, 1]);
  }
}
