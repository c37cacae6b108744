//! Snapshot stores: current aggregate state folded from version-ordered events.

mod event;
mod handler;
mod mapped;
mod sql;
mod store;
mod tombstone;
mod version;
mod versioned;

use std::sync::Arc;

pub use event::{EventSource, SnapshotEvent, CREATED, DELETED};
pub use handler::{handler, MessageHandler, SnapshotStoreHandler};
pub use mapped::MappedSnapshotStore;
pub use sql::{SnapshotHeader, SqlColumn, SqlMapping, SqlSnapshotStore};
pub use store::{apply_event, SnapshotStore};
pub use version::can_apply;
pub use versioned::{AuditingInformation, VersionedSnapshot, INITIAL_SNAPSHOT_VERSION};

use crate::config::SnapshotBackendKind;
use crate::db::Database;
use crate::error::Result;

/// Build the configured store for `S`.
///
/// The SQL backend gets its table installed; the mapped backend uses the shared
/// `snapshots` table and ignores `mapping`.
pub fn snapshot_store<S, M>(
    backend: SnapshotBackendKind,
    db: &Database,
    mapping: M,
) -> Result<Arc<dyn SnapshotStore<S>>>
where
    S: VersionedSnapshot,
    M: SqlMapping<S>,
{
    match backend {
        SnapshotBackendKind::Mapped => Ok(Arc::new(MappedSnapshotStore::<S>::new())),
        SnapshotBackendKind::Sql => {
            let store = SqlSnapshotStore::new(mapping);
            store.install(db)?;
            Ok(Arc::new(store))
        }
    }
}
