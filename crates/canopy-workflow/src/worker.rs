//! Workers: long-running asynchronous work declared during render.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, BoxStream, Stream, StreamExt};

/// A unit of asynchronous work that emits a stream of outputs.
///
/// A workflow declares the workers it wants running on every render. A worker
/// that [does the same work](Worker::does_same_work_as) as one declared with
/// the same key in the previous render keeps running; otherwise the old one is
/// cancelled and the new one started.
pub trait Worker: Send + Sync + 'static {
  type Output: Send + 'static;

  /// Start the work. Called once per running instance.
  fn run(&self) -> BoxStream<'static, Self::Output>;

  /// Whether `other`, declared by a newer render, can keep this worker's
  /// running instance. Two workers of the same type are equivalent unless
  /// the type says otherwise.
  fn does_same_work_as(&self, other: &Self) -> bool {
    let _ = other;
    true
  }

  /// Human-readable name used in logs and diagnostics.
  fn describe(&self) -> String {
    std::any::type_name::<Self>().to_string()
  }
}

type RunFn<T> = Arc<dyn Fn() -> BoxStream<'static, T> + Send + Sync>;

/// A worker built from a closure. All `TypedWorker`s with the same output
/// type are equivalent, so use the declaration key to tell them apart.
pub struct TypedWorker<T> {
  run: RunFn<T>,
}

impl<T: Send + 'static> TypedWorker<T> {
  /// A worker that runs the stream returned by `start`.
  pub fn from_stream<F, St>(start: F) -> Self
  where
    F: Fn() -> St + Send + Sync + 'static,
    St: Stream<Item = T> + Send + 'static,
  {
    Self {
      run: Arc::new(move || start().boxed()),
    }
  }

  /// A worker that emits the future's value once and finishes.
  pub fn from_future<F, Fut>(start: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
  {
    Self::from_stream(move || stream::once(start()))
  }

  /// A worker that emits the future's value if it is `Some`, then finishes.
  pub fn from_optional_future<F, Fut>(start: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
  {
    Self::from_stream(move || stream::once(start()).filter_map(futures::future::ready))
  }

  /// A worker that finishes immediately without output.
  pub fn finished() -> Self {
    Self::from_stream(stream::empty)
  }
}

impl<T: Send + 'static> Worker for TypedWorker<T> {
  type Output = T;

  fn run(&self) -> BoxStream<'static, T> {
    (self.run)()
  }
}

impl<T> Clone for TypedWorker<T> {
  fn clone(&self) -> Self {
    Self {
      run: self.run.clone(),
    }
  }
}

impl<T> fmt::Debug for TypedWorker<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TypedWorker").finish_non_exhaustive()
  }
}

/// A worker that runs `effect` for its side effects and never emits.
pub fn side_effect<F, Fut>(effect: F) -> TypedWorker<Infallible>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  TypedWorker::from_stream(move || {
    stream::once(effect()).filter_map(|()| futures::future::ready(None::<Infallible>))
  })
}

/// Emits `()` once after `delay`.
///
/// Timers are only equivalent when their keys match, so a new key restarts
/// the delay even if a timer is already declared under the same worker key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerWorker {
  delay: Duration,
  key: String,
}

impl TimerWorker {
  pub fn new(delay: Duration, key: impl Into<String>) -> Self {
    Self {
      delay,
      key: key.into(),
    }
  }

  pub fn delay(&self) -> Duration {
    self.delay
  }
}

impl Worker for TimerWorker {
  type Output = ();

  fn run(&self) -> BoxStream<'static, ()> {
    stream::once(tokio::time::sleep(self.delay)).boxed()
  }

  fn does_same_work_as(&self, other: &Self) -> bool {
    self.key == other.key
  }

  fn describe(&self) -> String {
    format!("timer({}, {:?})", self.key, self.delay)
  }
}
