//! Snapshot files: reading, writing and describing them.

use std::path::Path;

use anyhow::{Context, Result};
use bytes::Bytes;
use canopy_workflow::{Snapshot, SnapshotError, TreeSnapshot};
use serde_json::{Value, json};

pub async fn read_snapshot(path: &Path) -> Result<Snapshot> {
  let bytes = tokio::fs::read(path)
    .await
    .with_context(|| format!("failed to read snapshot file: {}", path.display()))?;
  Ok(Snapshot::of_bytes(bytes))
}

pub async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<()> {
  tokio::fs::write(path, snapshot.bytes())
    .await
    .with_context(|| format!("failed to write snapshot file: {}", path.display()))
}

/// Decode a tree snapshot into JSON: each node's own state as hex and its
/// children, recursively.
pub fn describe(bytes: Bytes) -> Result<Value, SnapshotError> {
  let tree = TreeSnapshot::parse(bytes)?;
  let children = tree
    .children
    .into_iter()
    .map(|(id, child)| {
      Ok(json!({
        "workflow": id.type_name(),
        "key": id.key(),
        "node": describe(child)?,
      }))
    })
    .collect::<Result<Vec<_>, SnapshotError>>()?;

  Ok(json!({
    "state": tree.own_state.map(|state| hex(&state)),
    "children": children,
  }))
}

fn hex(bytes: &[u8]) -> String {
  bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
