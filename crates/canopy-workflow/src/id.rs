//! Workflow identity within a parent.

use std::any::type_name;
use std::borrow::Cow;
use std::fmt;

use bytes::{Bytes, BytesMut};
use canopy_snapshot::{SnapshotError, SnapshotSink, SnapshotSource};

/// Identifies a child workflow among its siblings: the workflow's type name
/// plus a caller-chosen key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkflowId {
  type_name: Cow<'static, str>,
  key: String,
}

impl WorkflowId {
  /// The id of workflow type `W` under `key`.
  pub fn of<W: ?Sized + 'static>(key: impl Into<String>) -> Self {
    Self {
      type_name: Cow::Borrowed(type_name::<W>()),
      key: key.into(),
    }
  }

  pub fn new(type_name: impl Into<String>, key: impl Into<String>) -> Self {
    Self {
      type_name: Cow::Owned(type_name.into()),
      key: key.into(),
    }
  }

  pub fn type_name(&self) -> &str {
    &self.type_name
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// `utf8-with-length(type name)` followed by `utf8-with-length(key)`.
  pub fn to_bytes(&self) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_utf8_with_length(&self.type_name);
    buf.put_utf8_with_length(&self.key);
    buf.freeze()
  }

  pub fn from_bytes(mut bytes: Bytes) -> Result<Self, SnapshotError> {
    let type_name = bytes.read_utf8_with_length()?;
    let key = bytes.read_utf8_with_length()?;
    Ok(Self::new(type_name, key))
  }
}

impl fmt::Display for WorkflowId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.key.is_empty() {
      write!(f, "{}", self.type_name)
    } else {
      write!(f, "{}[{}]", self.type_name, self.key)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Checkout;

  #[test]
  fn restored_ids_equal_typed_ids() {
    let id = WorkflowId::of::<Checkout>("cart");
    let restored = WorkflowId::from_bytes(id.to_bytes()).unwrap();
    assert_eq!(restored, id);
    assert_eq!(restored.key(), "cart");
    assert!(restored.type_name().ends_with("Checkout"));
  }

  #[test]
  fn byte_layout() {
    let bytes = WorkflowId::new("A", "k").to_bytes();
    assert_eq!(bytes.as_ref(), &[0, 0, 0, 1, b'A', 0, 0, 0, 1, b'k']);
  }

  #[test]
  fn display_includes_key_when_present() {
    assert_eq!(WorkflowId::new("Root", "").to_string(), "Root");
    assert_eq!(WorkflowId::new("Item", "3").to_string(), "Item[3]");
  }
}
