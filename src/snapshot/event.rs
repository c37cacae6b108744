use serde::{Deserialize, Serialize};

use super::VersionedSnapshot;
use crate::error::Result;
use crate::message::AggregateIdentifier;

pub const CREATED: &str = "CREATED";
pub const DELETED: &str = "DELETED";

/// An event as applied to snapshot stores: the full snapshot after the change,
/// tagged with its lifecycle step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotEvent<S> {
    Created(S),
    Updated { name: String, snapshot: S },
    Deleted(S),
}

/// Where an event being applied comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
    /// Emitted by this service in the current transaction.
    Online,
    /// Read back from the log, possibly for the second time.
    Restore,
}

impl<S: VersionedSnapshot> SnapshotEvent<S> {
    pub fn snapshot(&self) -> &S {
        match self {
            SnapshotEvent::Created(snapshot)
            | SnapshotEvent::Updated { snapshot, .. }
            | SnapshotEvent::Deleted(snapshot) => snapshot,
        }
    }

    pub fn into_snapshot(self) -> S {
        match self {
            SnapshotEvent::Created(snapshot)
            | SnapshotEvent::Updated { snapshot, .. }
            | SnapshotEvent::Deleted(snapshot) => snapshot,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SnapshotEvent::Created(_) => CREATED,
            SnapshotEvent::Updated { name, .. } => name,
            SnapshotEvent::Deleted(_) => DELETED,
        }
    }

    pub fn aggregate_identifier(&self) -> AggregateIdentifier {
        self.snapshot().aggregate_identifier()
    }

    pub fn is_deleted(&self) -> bool {
        matches!(self, SnapshotEvent::Deleted(_))
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bitcode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bitcode::deserialize(bytes)?)
    }
}
