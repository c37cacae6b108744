use chrono::Utc;
use tracing::debug;

use super::LocalEventBus;
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::MessageKey;
use crate::snapshot::{AuditingInformation, SnapshotEvent, VersionedSnapshot};

/// Lifecycle step an emission represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Created,
    /// A named change, e.g. `Updated("REORDERED")`.
    Updated(&'static str),
    Deleted,
}

impl EventKind {
    fn into_event<S>(self, snapshot: S) -> SnapshotEvent<S> {
        match self {
            EventKind::Created => SnapshotEvent::Created(snapshot),
            EventKind::Updated(name) => SnapshotEvent::Updated {
                name: name.to_string(),
                snapshot,
            },
            EventKind::Deleted => SnapshotEvent::Deleted(snapshot),
        }
    }
}

/// Fluent entry point for commands:
///
/// ```ignore
/// let task = CommandHandler::of(task)
///     .assert_version_matches(expected_version)?
///     .check_precondition(|t| !t.closed)
///     .on_failure_fail("task is closed")?
///     .apply_changes(|t| t.name = name)
///     .emit_event(EventKind::Updated("UPDATED"))
///     .if_snapshot_was_changed()
///     .to(&bus, &tx)?;
/// ```
pub struct CommandHandler<S> {
    original: S,
    snapshot: S,
}

impl<S: VersionedSnapshot> CommandHandler<S> {
    pub fn of(snapshot: S) -> Self {
        Self {
            original: snapshot.clone(),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &S {
        &self.snapshot
    }

    /// Fail when the caller worked on another version than the stored one.
    pub fn assert_version_matches(self, expected: i64) -> Result<Self> {
        if self.original.version() != expected {
            return Err(EventStoreError::OptimisticConcurrencyConflict {
                kind: S::KIND.to_string(),
                identifier: self.original.identifier().to_string(),
                expected,
                actual: self.original.version(),
            });
        }
        Ok(self)
    }

    pub fn check_precondition(self, predicate: impl FnOnce(&S) -> bool) -> Precondition<S> {
        let satisfied = predicate(&self.snapshot);
        Precondition {
            handler: self,
            satisfied,
        }
    }

    pub fn apply_changes(mut self, change: impl FnOnce(&mut S)) -> Self {
        change(&mut self.snapshot);
        self
    }

    pub fn emit_event(self, kind: EventKind) -> Emission<S> {
        Emission {
            original: self.original,
            snapshot: self.snapshot,
            action: Action::Event(kind),
            only_if_changed: false,
        }
    }

    /// Emit a null-payload record removing the aggregate from compacted topics and local stores.
    pub fn emit_tombstone(self) -> Emission<S> {
        Emission {
            original: self.original,
            snapshot: self.snapshot,
            action: Action::Tombstone,
            only_if_changed: false,
        }
    }
}

pub struct Precondition<S> {
    handler: CommandHandler<S>,
    satisfied: bool,
}

impl<S: VersionedSnapshot> Precondition<S> {
    pub fn on_failure_fail(self, message: impl Into<String>) -> Result<CommandHandler<S>> {
        if self.satisfied {
            Ok(self.handler)
        } else {
            Err(EventStoreError::PreconditionViolation(message.into()))
        }
    }
}

enum Action {
    Event(EventKind),
    Tombstone,
}

/// A pending emission, committed with [`to`](Emission::to).
pub struct Emission<S> {
    original: S,
    snapshot: S,
    action: Action,
    only_if_changed: bool,
}

impl<S: VersionedSnapshot> Emission<S> {
    /// Suppress the emission when the changes left the snapshot equal to the original.
    pub fn if_snapshot_was_changed(mut self) -> Self {
        self.only_if_changed = true;
        self
    }

    pub fn is_suppressed(&self) -> bool {
        self.only_if_changed && self.original == self.snapshot
    }

    /// Emit to `bus` within `tx` and return the snapshot as stored.
    pub fn to(self, bus: &LocalEventBus, tx: &Tx<'_>) -> Result<S> {
        if self.is_suppressed() {
            debug!(
                kind = S::KIND,
                identifier = self.original.identifier(),
                "snapshot unchanged, event suppressed"
            );
            return Ok(self.original);
        }

        match self.action {
            Action::Tombstone => {
                let snapshot = self.snapshot;
                let key = MessageKey::aggregate(
                    S::KIND,
                    snapshot.identifier(),
                    snapshot.version(),
                    snapshot.root_context_identifier(),
                );
                bus.emit_raw(tx, &key, None)?;
                Ok(snapshot)
            }
            Action::Event(kind) => {
                let mut snapshot = self.snapshot;
                let now = Utc::now();
                match kind {
                    EventKind::Created => {
                        *snapshot.auditing_mut() = AuditingInformation::new(tx.user(), now)
                    }
                    EventKind::Updated(_) | EventKind::Deleted => {
                        snapshot.auditing_mut().touch(tx.user(), now)
                    }
                }
                let version = snapshot.version() + 1;
                snapshot.set_version(version);

                let event = kind.into_event(snapshot);
                bus.emit(tx, &event)?;
                Ok(event.into_snapshot())
            }
        }
    }
}
