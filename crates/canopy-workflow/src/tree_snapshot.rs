//! The byte layout of a node snapshot.
//!
//! ```text
//! node     = bytes-with-length(own state) children
//! children = i32 count, then per child:
//!            bytes-with-length(id bytes) bytes-with-length(node)
//! ```

use bytes::{Buf, Bytes};
use canopy_snapshot::{Snapshot, SnapshotError, SnapshotSink, SnapshotSource};

use crate::WorkflowId;

/// A decoded node snapshot: the node's own state bytes plus the still-encoded
/// snapshots of its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeSnapshot {
  /// `None` when the workflow wrote an empty snapshot for its state.
  pub own_state: Option<Bytes>,
  pub children: Vec<(WorkflowId, Bytes)>,
}

impl TreeSnapshot {
  pub fn parse(mut bytes: Bytes) -> Result<Self, SnapshotError> {
    let own_state = bytes.read_bytes_with_length()?;
    let children = bytes.read_list(|src| {
      let id = WorkflowId::from_bytes(src.read_bytes_with_length()?)?;
      let child = src.read_bytes_with_length()?;
      Ok((id, child))
    })?;
    if bytes.has_remaining() {
      return Err(SnapshotError::invalid(format!(
        "{} trailing bytes after node snapshot",
        bytes.remaining()
      )));
    }
    Ok(Self {
      own_state: (!own_state.is_empty()).then_some(own_state),
      children,
    })
  }

  /// Compose a node snapshot lazily. Neither `own` nor any child snapshot is
  /// materialized until the result is read.
  pub fn compose(own: Snapshot, children: Vec<(WorkflowId, Snapshot)>) -> Snapshot {
    Snapshot::write(move |buf| {
      buf.put_bytes_with_length(own.bytes());
      buf.put_list(children, |buf, (id, child)| {
        buf.put_bytes_with_length(&id.to_bytes());
        buf.put_bytes_with_length(child.bytes());
      });
    })
  }

  /// Encode back into the node snapshot layout.
  pub fn to_snapshot(&self) -> Snapshot {
    let own = Snapshot::of_bytes(self.own_state.clone().unwrap_or_default());
    let children = self
      .children
      .iter()
      .map(|(id, bytes)| (id.clone(), Snapshot::of_bytes(bytes.clone())))
      .collect();
    Self::compose(own, children)
  }
}

#[cfg(test)]
mod tests {
  use bytes::{BufMut, BytesMut};

  use super::*;

  #[test]
  fn layout_is_bit_exact() {
    let child = TreeSnapshot::compose(Snapshot::of_i32(3), Vec::new());
    let root = TreeSnapshot::compose(
      Snapshot::of_i32(7),
      vec![(WorkflowId::new("C", "k"), child)],
    );

    let expected: Vec<u8> = [
      // own state
      &[0, 0, 0, 4, 0, 0, 0, 7][..],
      // child count
      &[0, 0, 0, 1],
      // child id
      &[0, 0, 0, 10, 0, 0, 0, 1, b'C', 0, 0, 0, 1, b'k'],
      // child node
      &[0, 0, 0, 12, 0, 0, 0, 4, 0, 0, 0, 3, 0, 0, 0, 0],
    ]
    .concat();
    assert_eq!(root.bytes().as_ref(), expected.as_slice());
  }

  #[test]
  fn compose_is_lazy() {
    let own = Snapshot::of_i32(1);
    let root = TreeSnapshot::compose(own.clone(), Vec::new());
    assert!(!root.is_materialized());
    assert!(!own.is_materialized());
    root.bytes();
    assert!(own.is_materialized());
  }

  #[test]
  fn parse_splits_own_state_and_children() {
    let root = TreeSnapshot::compose(
      Snapshot::empty(),
      vec![
        (WorkflowId::new("A", "1"), Snapshot::of_str("x")),
        (WorkflowId::new("A", "2"), Snapshot::of_str("y")),
      ],
    );
    let tree = TreeSnapshot::parse(root.bytes().clone()).unwrap();

    assert_eq!(tree.own_state, None);
    assert_eq!(
      tree.children,
      vec![
        (WorkflowId::new("A", "1"), Bytes::from_static(b"x")),
        (WorkflowId::new("A", "2"), Bytes::from_static(b"y")),
      ]
    );
    assert_eq!(tree.to_snapshot(), root);
  }

  #[test]
  fn malformed_trees_are_rejected() {
    let mut buf = BytesMut::new();
    buf.put_bytes_with_length(&[]);
    buf.put_i32(0);
    buf.put_u8(1);
    assert!(TreeSnapshot::parse(buf.freeze()).is_err());

    let truncated = Bytes::from_static(&[0, 0, 0, 0, 0, 0, 0, 2]);
    assert!(matches!(
      TreeSnapshot::parse(truncated),
      Err(SnapshotError::Truncated { .. })
    ));
  }
}
