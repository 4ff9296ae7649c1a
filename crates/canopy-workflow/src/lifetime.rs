//! Keyed lifetime reconciliation.

use std::fmt;

/// A key was declared twice during the same staging pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateKey;

impl fmt::Display for DuplicateKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("key declared twice in one pass")
  }
}

impl std::error::Error for DuplicateKey {}

/// Keeps one live instance per key across successive declarations.
///
/// Each pass declares a set of keys. Keys seen in the previous pass keep
/// their instance untouched, new keys get a freshly started instance, and
/// keys that are no longer declared have their instance disposed. Keys are
/// compared with `PartialEq` only, so a key type may carry an equivalence
/// relation that is not a hash (worker equivalence, for example).
///
/// Declaration order is kept: after [`commit`](Self::commit) the instances
/// iterate in the order their keys were declared.
pub struct LifetimeTracker<K, I> {
  active: Vec<(K, I)>,
  staging: Vec<(K, I)>,
}

impl<K: PartialEq, I> LifetimeTracker<K, I> {
  pub fn new() -> Self {
    Self {
      active: Vec::new(),
      staging: Vec::new(),
    }
  }

  /// Reconcile against `cases` in one call: instances for keys in `cases`
  /// are kept or started, every other instance is disposed.
  pub fn track<C>(
    &mut self,
    cases: impl IntoIterator<Item = C>,
    key_of: impl Fn(&C) -> K,
    mut start: impl FnMut(C) -> I,
    dispose: impl FnMut(K, I),
  ) -> Result<(), DuplicateKey> {
    let mut result = Ok(());
    for case in cases {
      let key = key_of(&case);
      match self.retain(&key) {
        Ok(Some(_)) => {}
        Ok(None) => {
          self.start(key, start(case));
        }
        Err(duplicate) => result = Err(duplicate),
      }
    }
    self.commit(dispose);
    result
  }

  /// Move the active instance for `key` into the staging pass.
  ///
  /// Returns `Ok(None)` when no active instance matches, in which case the
  /// caller is expected to [`start`](Self::start) one. Returns
  /// `Err(DuplicateKey)` when `key` was already staged in this pass.
  pub fn retain(&mut self, key: &K) -> Result<Option<&mut I>, DuplicateKey> {
    if self.staging.iter().any(|(staged, _)| staged == key) {
      return Err(DuplicateKey);
    }
    let Some(index) = self.active.iter().position(|(active, _)| active == key) else {
      return Ok(None);
    };
    let (key, instance) = self.active.remove(index);
    Ok(Some(self.start(key, instance)))
  }

  /// Stage a new instance under `key`.
  pub fn start(&mut self, key: K, instance: I) -> &mut I {
    let index = self.staging.len();
    self.staging.push((key, instance));
    &mut self.staging[index].1
  }

  /// The instance staged under `key` in the current pass, if any.
  pub fn staged_mut(&mut self, key: &K) -> Option<&mut I> {
    self
      .staging
      .iter_mut()
      .find(|(staged, _)| staged == key)
      .map(|(_, instance)| instance)
  }

  /// End the pass: dispose every instance that was not retained and make
  /// the staged instances active.
  pub fn commit(&mut self, mut dispose: impl FnMut(K, I)) {
    let stale = std::mem::replace(&mut self.active, std::mem::take(&mut self.staging));
    for (key, instance) in stale {
      dispose(key, instance);
    }
  }

  /// Dispose every instance, staged or active.
  pub fn clear(&mut self, mut dispose: impl FnMut(K, I)) {
    for (key, instance) in self.active.drain(..).chain(self.staging.drain(..)) {
      dispose(key, instance);
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&K, &I)> {
    self.active.iter().map(|(key, instance)| (key, instance))
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut I> {
    self.active.iter_mut().map(|(_, instance)| instance)
  }

  pub fn len(&self) -> usize {
    self.active.len()
  }

  pub fn is_empty(&self) -> bool {
    self.active.is_empty()
  }
}

impl<K: PartialEq, I> Default for LifetimeTracker<K, I> {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug)]
  struct Instance {
    key: &'static str,
    generation: u32,
  }

  fn pass(
    tracker: &mut LifetimeTracker<&'static str, Instance>,
    keys: &[&'static str],
    generation: u32,
    disposed: &mut Vec<&'static str>,
  ) -> Result<(), DuplicateKey> {
    tracker.track(
      keys.iter().copied(),
      |key| *key,
      |key| Instance { key, generation },
      |key, _| disposed.push(key),
    )
  }

  #[test]
  fn keeps_starts_and_disposes() {
    let mut tracker = LifetimeTracker::new();
    let mut disposed = Vec::new();

    pass(&mut tracker, &["a", "b"], 1, &mut disposed).unwrap();
    pass(&mut tracker, &["b", "c"], 2, &mut disposed).unwrap();

    assert_eq!(disposed, vec!["a"]);
    let live: Vec<_> = tracker
      .iter()
      .map(|(key, instance)| (*key, instance.generation))
      .collect();
    assert_eq!(live, vec![("b", 1), ("c", 2)]);
  }

  #[test]
  fn duplicate_keys_are_reported_and_the_first_kept() {
    let mut tracker = LifetimeTracker::new();
    let mut disposed = Vec::new();

    let result = pass(&mut tracker, &["a", "a"], 1, &mut disposed);
    assert_eq!(result, Err(DuplicateKey));
    assert_eq!(tracker.len(), 1);
    assert!(disposed.is_empty());
  }

  #[test]
  fn staged_form_matches_track() {
    let mut tracker: LifetimeTracker<&'static str, Instance> = LifetimeTracker::new();
    tracker.start("x", Instance { key: "x", generation: 1 });
    tracker.commit(|_, _| panic!("nothing to dispose"));

    assert!(tracker.retain(&"x").unwrap().is_some());
    assert_eq!(tracker.retain(&"x").unwrap_err(), DuplicateKey);
    assert!(tracker.retain(&"y").unwrap().is_none());
    tracker.start("y", Instance { key: "y", generation: 2 });
    assert_eq!(tracker.staged_mut(&"y").unwrap().generation, 2);

    let mut disposed = Vec::new();
    tracker.commit(|key, _| disposed.push(key));
    assert!(disposed.is_empty());
    assert_eq!(tracker.len(), 2);
  }

  #[test]
  fn clear_disposes_everything() {
    let mut tracker = LifetimeTracker::new();
    let mut disposed = Vec::new();
    pass(&mut tracker, &["a", "b"], 1, &mut disposed).unwrap();

    tracker.clear(|_, instance: Instance| disposed.push(instance.key));
    assert_eq!(disposed, vec!["a", "b"]);
    assert!(tracker.is_empty());
  }
}
