//! The lazily materialized snapshot value.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::SnapshotError;

type Encoder = Box<dyn FnOnce() -> Bytes + Send>;

/// An immutable byte string describing some piece of workflow state.
///
/// The bytes are produced at most once, the first time anything reads them.
/// Cloning a snapshot shares the same lazy cell, so an encoder never runs
/// twice. Equality and hashing force materialization and compare bytes.
#[derive(Clone)]
pub struct Snapshot {
  bytes: Arc<Lazy<Bytes, Encoder>>,
}

impl Snapshot {
  /// The empty snapshot. Workflows that keep no state return this.
  pub fn empty() -> Self {
    Self::of_bytes(Bytes::new())
  }

  /// Wrap bytes that are already encoded.
  pub fn of_bytes(bytes: impl Into<Bytes>) -> Self {
    let bytes = bytes.into();
    Self::lazy(move || bytes)
  }

  /// A snapshot holding the raw UTF-8 bytes of `value` (no length prefix).
  pub fn of_str(value: &str) -> Self {
    Self::of_bytes(Bytes::copy_from_slice(value.as_bytes()))
  }

  /// A snapshot holding a single big-endian `i32`.
  pub fn of_i32(value: i32) -> Self {
    Self::write(move |buf| buf.put_i32(value))
  }

  /// A snapshot whose bytes are computed on first read.
  pub fn lazy(encode: impl FnOnce() -> Bytes + Send + 'static) -> Self {
    let encode: Encoder = Box::new(encode);
    Self {
      bytes: Arc::new(Lazy::new(encode)),
    }
  }

  /// A snapshot written by `encode` into a fresh buffer on first read.
  pub fn write(encode: impl FnOnce(&mut BytesMut) + Send + 'static) -> Self {
    Self::lazy(move || {
      let mut buf = BytesMut::new();
      encode(&mut buf);
      buf.freeze()
    })
  }

  /// Encode `value` as JSON eagerly.
  pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, SnapshotError> {
    Ok(Self::of_bytes(serde_json::to_vec(value)?))
  }

  /// The snapshot bytes, materializing them if needed.
  pub fn bytes(&self) -> &Bytes {
    Lazy::force(&*self.bytes)
  }

  /// Whether the bytes have been produced yet.
  pub fn is_materialized(&self) -> bool {
    Lazy::get(&*self.bytes).is_some()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes().is_empty()
  }

  pub fn len(&self) -> usize {
    self.bytes().len()
  }

  /// Run a decoder over a cursor positioned at the start of the bytes.
  ///
  /// The cursor is a cheap clone, so decoders can call
  /// [`SnapshotSource`](crate::SnapshotSource) methods on it freely.
  pub fn parse<T>(
    &self,
    decode: impl FnOnce(&mut Bytes) -> Result<T, SnapshotError>,
  ) -> Result<T, SnapshotError> {
    let mut cursor = self.bytes().clone();
    decode(&mut cursor)
  }

  /// Decode JSON produced by [`Snapshot::json`].
  pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T, SnapshotError> {
    Ok(serde_json::from_slice(self.bytes())?)
  }
}

impl Default for Snapshot {
  fn default() -> Self {
    Self::empty()
  }
}

impl PartialEq for Snapshot {
  fn eq(&self, other: &Self) -> bool {
    Arc::ptr_eq(&self.bytes, &other.bytes) || self.bytes() == other.bytes()
  }
}

impl Eq for Snapshot {}

impl Hash for Snapshot {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.bytes().hash(state);
  }
}

impl fmt::Debug for Snapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Snapshot").field(self.bytes()).finish()
  }
}

impl From<Bytes> for Snapshot {
  fn from(bytes: Bytes) -> Self {
    Self::of_bytes(bytes)
  }
}

impl From<Vec<u8>> for Snapshot {
  fn from(bytes: Vec<u8>) -> Self {
    Self::of_bytes(bytes)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::{SnapshotSink, SnapshotSource};

  #[test]
  fn encoder_runs_once_and_only_on_read() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let snapshot = Snapshot::write(move |buf| {
      counted.fetch_add(1, Ordering::SeqCst);
      buf.put_i32(7);
    });
    let copy = snapshot.clone();

    assert!(!snapshot.is_materialized());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(snapshot.bytes().as_ref(), &[0, 0, 0, 7]);
    assert_eq!(copy.bytes().as_ref(), &[0, 0, 0, 7]);
    assert!(copy.is_materialized());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn equality_compares_bytes() {
    let eager = Snapshot::of_i32(42);
    let lazy = Snapshot::lazy(|| Bytes::from_static(&[0, 0, 0, 42]));
    assert_eq!(eager, lazy);
    assert_ne!(eager, Snapshot::of_i32(41));
    assert_eq!(Snapshot::empty(), Snapshot::default());
    assert!(Snapshot::empty().is_empty());
  }

  #[test]
  fn of_str_has_no_length_prefix() {
    assert_eq!(Snapshot::of_str("hi").bytes().as_ref(), b"hi");
  }

  #[test]
  fn parse_reads_from_the_start_each_time() {
    let snapshot = Snapshot::write(|buf| {
      buf.put_utf8_with_length("launch");
      buf.put_i32(3);
    });

    for _ in 0..2 {
      let (name, count) = snapshot
        .parse(|src| Ok((src.read_utf8_with_length()?, src.read_i32()?)))
        .unwrap();
      assert_eq!(name, "launch");
      assert_eq!(count, 3);
    }
  }

  #[test]
  fn json_helpers() {
    #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Progress {
      stage: u32,
      label: String,
    }

    let progress = Progress {
      stage: 2,
      label: "orbit".to_string(),
    };
    let snapshot = Snapshot::json(&progress).unwrap();
    assert_eq!(snapshot.parse_json::<Progress>().unwrap(), progress);

    let err = Snapshot::of_str("{").parse_json::<Progress>().unwrap_err();
    assert!(matches!(err, SnapshotError::Json { .. }));
  }
}
