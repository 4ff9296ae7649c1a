//! Snapshot codec for canopy workflows.
//!
//! A [`Snapshot`] is an immutable byte string that is only materialized when
//! someone reads it. Workflows encode their state into snapshots with the
//! helpers on [`SnapshotSink`] and decode it back with [`SnapshotSource`].
//! All integers are written big-endian.

mod codec;
mod error;
mod snapshot;

pub use codec::{EnumOrdinal, SnapshotSink, SnapshotSource};
pub use error::SnapshotError;
pub use snapshot::Snapshot;
