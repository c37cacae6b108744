use tracing::{debug, info};

use super::{can_apply, EventSource, SnapshotEvent, VersionedSnapshot};
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::{AggregateIdentifier, MessageKey};

/// Current state of the aggregates of one kind, folded from their events.
///
/// Implementors provide persistence (`find_or_ignore`, `tombstone_version`,
/// `update_internal`, `remove_internal`); routing and version gating come from
/// the provided methods and are shared by every backend.
pub trait SnapshotStore<S: VersionedSnapshot>: Send + Sync {
    fn find_or_ignore(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<S>>;

    /// Last version of a deleted aggregate, if it was deleted.
    fn tombstone_version(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<i64>>;

    /// Persist the result of one already validated event and return the stored version.
    fn update_internal(
        &self,
        tx: &Tx<'_>,
        event: &SnapshotEvent<S>,
        current: Option<&S>,
    ) -> Result<i64>;

    /// Remove the snapshot because a tombstone record arrived for it.
    fn remove_internal(&self, tx: &Tx<'_>, current: &S, version: i64) -> Result<()>;

    fn find_or_fail(&self, tx: &Tx<'_>, identifier: &str) -> Result<S> {
        self.find_or_ignore(tx, identifier)?
            .ok_or_else(|| EventStoreError::AggregateNotFound {
                kind: S::KIND.to_string(),
                identifier: identifier.to_string(),
            })
    }

    fn handles_message(&self, key: &MessageKey, _payload: Option<&[u8]>) -> bool {
        key.aggregate_identifier()
            .is_some_and(|aggregate| aggregate.kind == S::KIND)
    }

    fn is_deleted_event(&self, event: &SnapshotEvent<S>) -> bool {
        event.is_deleted()
    }

    fn handle_message(
        &self,
        tx: &Tx<'_>,
        key: &MessageKey,
        payload: &[u8],
        source: EventSource,
    ) -> Result<()> {
        let event = SnapshotEvent::<S>::decode(payload)?;
        let aggregate = key.aggregate_identifier().ok_or_else(|| {
            EventStoreError::IllegalArgument(format!("{} is not an aggregate key", key))
        })?;
        if *aggregate != event.aggregate_identifier() {
            return Err(EventStoreError::IllegalArgument(format!(
                "key {} does not match event {}",
                aggregate,
                event.aggregate_identifier()
            )));
        }

        apply_event(self, tx, &event, source).map(|_| ())
    }

    fn handle_tombstone(&self, tx: &Tx<'_>, key: &MessageKey) -> Result<()> {
        let aggregate = key.aggregate_identifier().ok_or_else(|| {
            EventStoreError::IllegalArgument(format!("{} is not an aggregate key", key))
        })?;

        match self.find_or_ignore(tx, &aggregate.identifier)? {
            Some(current) => {
                let version = current.version().max(aggregate.version);
                self.remove_internal(tx, &current, version)
            }
            None => {
                debug!(aggregate = %aggregate, "tombstone for absent snapshot");
                Ok(())
            }
        }
    }
}

/// Apply one event to `store`, enforcing the lifecycle
/// NONEXISTENT -> ACTIVE -> TOMBSTONED and the version gate.
///
/// Returns the new version, or `None` when the event was ignored.
pub fn apply_event<S, T>(
    store: &T,
    tx: &Tx<'_>,
    event: &SnapshotEvent<S>,
    source: EventSource,
) -> Result<Option<i64>>
where
    S: VersionedSnapshot,
    T: SnapshotStore<S> + ?Sized,
{
    let incoming = event.aggregate_identifier();
    let current = store.find_or_ignore(tx, &incoming.identifier)?;

    match &current {
        None => {
            if store.tombstone_version(tx, &incoming.identifier)?.is_some() {
                if store.is_deleted_event(event) {
                    return duplicate_delete(&incoming, source);
                }
                info!(aggregate = %incoming, event = event.name(), "aggregate already deleted, ignoring event");
                return Ok(None);
            }
            match event {
                SnapshotEvent::Created(_) => {}
                SnapshotEvent::Deleted(_) => return duplicate_delete(&incoming, source),
                SnapshotEvent::Updated { name, .. } => {
                    return Err(EventStoreError::PreconditionViolation(format!(
                        "cannot apply {} to {}: snapshot does not exist",
                        name, incoming
                    )))
                }
            }
        }
        Some(_) => {}
    }

    if !can_apply(current.as_ref().map(|s| s.version()), &incoming, source)? {
        return Ok(None);
    }

    if current.is_some() {
        if let SnapshotEvent::Created(_) = event {
            return Err(EventStoreError::PreconditionViolation(format!(
                "cannot create {}: snapshot already exists",
                incoming
            )));
        }
    }

    let version = store.update_internal(tx, event, current.as_ref())?;
    if version != incoming.version {
        return Err(EventStoreError::IllegalState(format!(
            "snapshot version {} does not equal event version {}",
            version, incoming
        )));
    }

    debug!(aggregate = %incoming, event = event.name(), "applied event");
    Ok(Some(version))
}

fn duplicate_delete(incoming: &AggregateIdentifier, source: EventSource) -> Result<Option<i64>> {
    match source {
        EventSource::Restore => {
            info!(aggregate = %incoming, "skipping delete of absent snapshot");
            Ok(None)
        }
        EventSource::Online => Err(EventStoreError::PreconditionViolation(format!(
            "cannot delete {}: snapshot does not exist",
            incoming
        ))),
    }
}
