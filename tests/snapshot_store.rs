//! Snapshot store behavior shared by both backends.

mod support;

use sourced_runtime::snapshot::{apply_event, SnapshotEvent};
use sourced_runtime::{EventSource, EventStoreError, VersionedSnapshot, INITIAL_SNAPSHOT_VERSION};
use support::service::{TaskService, BACKENDS};
use support::task::Task;

fn updated(task: &Task, version: i64, title: &str) -> SnapshotEvent<Task> {
    let mut next = task.clone();
    next.version = version;
    next.title = title.to_string();
    SnapshotEvent::Updated {
        name: "RENAMED".to_string(),
        snapshot: next,
    }
}

#[test]
fn version_counts_events_from_zero() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);

        let task = service
            .template
            .execute(|tx| {
                service.create(tx, "t-1", "p-1", "Write docs")?;
                service.rename(tx, "t-1", "Write more docs")?;
                service.complete(tx, "t-1")
            })
            .unwrap();

        assert_eq!(task.version, 2, "{:?}", backend);
        let stored = service.find("t-1").unwrap();
        assert_eq!(stored.version, task.version);
        assert_eq!(stored.title, "Write more docs");
        assert!(stored.done);
    }
}

#[test]
fn new_snapshots_start_before_version_zero() {
    let task = Task::new("t-1", "p-1", "Draft");
    assert_eq!(task.version(), INITIAL_SNAPSHOT_VERSION);
}

#[test]
fn audit_records_creating_and_modifying_user() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let alice = service.template.clone().with_user("alice");
        let bob = service.template.clone().with_user("bob");

        alice
            .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
            .unwrap();
        bob.execute(|tx| service.rename(tx, "t-1", "Final")).unwrap();

        let stored = service.find("t-1").unwrap();
        assert_eq!(stored.auditing.created_by, "alice");
        assert_eq!(stored.auditing.last_modified_by, "bob");
        assert!(stored.auditing.last_modified_at >= stored.auditing.created_at);
    }
}

#[test]
fn online_event_with_stale_version_conflicts() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let created = service
            .template
            .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
            .unwrap();

        let result = service.template.execute(|tx| {
            apply_event(
                service.store.as_ref(),
                tx,
                &updated(&created, 0, "Stale"),
                EventSource::Online,
            )
        });

        assert!(matches!(
            result,
            Err(EventStoreError::OptimisticConcurrencyConflict {
                expected: 1,
                actual: 0,
                ..
            })
        ));
        assert_eq!(service.find("t-1").unwrap().title, "Draft");
    }
}

#[test]
fn replayed_events_are_skipped() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let created = service
            .template
            .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
            .unwrap();
        let renamed = updated(&created, 1, "Final");

        let results = service
            .template
            .execute(|tx| {
                let first = apply_event(service.store.as_ref(), tx, &renamed, EventSource::Restore)?;
                let again = apply_event(service.store.as_ref(), tx, &renamed, EventSource::Restore)?;
                let create_again = apply_event(
                    service.store.as_ref(),
                    tx,
                    &SnapshotEvent::Created(created.clone()),
                    EventSource::Restore,
                )?;
                Ok((first, again, create_again))
            })
            .unwrap();

        assert_eq!(results, (Some(1), None, None));
        assert_eq!(service.find("t-1").unwrap().version, 1);
    }
}

#[test]
fn restore_refuses_version_gaps() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let created = service
            .template
            .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
            .unwrap();

        let result = service.template.execute(|tx| {
            apply_event(
                service.store.as_ref(),
                tx,
                &updated(&created, 3, "Too far"),
                EventSource::Restore,
            )
        });

        assert!(matches!(result, Err(EventStoreError::PreconditionViolation(_))));
    }
}

#[test]
fn update_of_missing_snapshot_is_a_precondition_violation() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let ghost = Task::new("t-9", "p-1", "Ghost");

        let result = service.template.execute(|tx| {
            apply_event(
                service.store.as_ref(),
                tx,
                &updated(&ghost, 1, "Boo"),
                EventSource::Restore,
            )
        });

        assert!(matches!(result, Err(EventStoreError::PreconditionViolation(_))));
    }
}

#[test]
fn create_over_existing_snapshot_is_a_precondition_violation() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let created = service
            .template
            .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
            .unwrap();

        let mut recreated = created.clone();
        recreated.version = 1;
        let result = service.template.execute(|tx| {
            apply_event(
                service.store.as_ref(),
                tx,
                &SnapshotEvent::Created(recreated),
                EventSource::Online,
            )
        });

        assert!(matches!(result, Err(EventStoreError::PreconditionViolation(_))));
    }
}

#[test]
fn deleted_snapshots_ignore_later_events() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);
        let deleted = service
            .template
            .execute(|tx| {
                service.create(tx, "t-1", "p-1", "Draft")?;
                service.delete(tx, "t-1")
            })
            .unwrap();
        assert_eq!(deleted.version, 1);
        assert!(service.find("t-1").is_none());

        let late_update = service
            .template
            .execute(|tx| {
                apply_event(
                    service.store.as_ref(),
                    tx,
                    &updated(&deleted, 2, "Too late"),
                    EventSource::Online,
                )
            })
            .unwrap();
        assert_eq!(late_update, None);

        let replayed_delete = service
            .template
            .execute(|tx| {
                apply_event(
                    service.store.as_ref(),
                    tx,
                    &SnapshotEvent::Deleted(deleted.clone()),
                    EventSource::Restore,
                )
            })
            .unwrap();
        assert_eq!(replayed_delete, None);

        let online_delete = service.template.execute(|tx| {
            apply_event(
                service.store.as_ref(),
                tx,
                &SnapshotEvent::Deleted(deleted.clone()),
                EventSource::Online,
            )
        });
        assert!(matches!(
            online_delete,
            Err(EventStoreError::PreconditionViolation(_))
        ));
        assert!(service.find("t-1").is_none());
    }
}

#[test]
fn find_or_fail_reports_missing_aggregate() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);

        let result = service
            .template
            .execute(|tx| service.store.find_or_fail(tx, "nope"));

        assert!(matches!(
            result,
            Err(EventStoreError::AggregateNotFound { ref kind, ref identifier })
                if kind == "TASK" && identifier == "nope"
        ));
    }
}

#[test]
fn mapped_store_reads_each_snapshot_once_per_transaction() {
    let service = TaskService::new(sourced_runtime::config::SnapshotBackendKind::Mapped);
    service
        .template
        .execute(|tx| service.create(tx, "t-1", "p-1", "Draft"))
        .unwrap();

    let hits = service
        .template
        .execute(|tx| {
            service.store.find_or_fail(tx, "t-1")?;
            service.store.find_or_fail(tx, "t-1")?;
            service.rename(tx, "t-1", "Cached")?;
            Ok(tx.cache().hits())
        })
        .unwrap();

    assert!(hits >= 2, "expected cache hits, got {}", hits);
}

#[test]
fn rolled_back_changes_are_not_visible() {
    for backend in BACKENDS {
        let service = TaskService::new(backend);

        let result: sourced_runtime::Result<()> = service.template.execute(|tx| {
            service.create(tx, "t-1", "p-1", "Draft")?;
            Err(EventStoreError::IllegalState("abort".into()))
        });

        assert!(result.is_err());
        assert!(service.find("t-1").is_none());
        assert_eq!(service.outbox.pending_count().unwrap(), 0);
    }
}
