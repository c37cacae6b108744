use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::{QueuedEvent, QueuedEventStore};
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::EventRecord;

type DocumentId = (String, String, i64);
type Collection = BTreeMap<DocumentId, Value>;

#[derive(Serialize, Deserialize)]
struct QueuedEventDocument {
    transaction_id: String,
    event_processor_name: String,
    record: EventRecord,
    inserted_at: i64,
}

enum StagedChange {
    Put(DocumentId, Value),
    Purge {
        transaction_id: String,
        event_processor_name: String,
    },
}

impl StagedChange {
    fn apply(self, documents: &mut Collection) {
        match self {
            StagedChange::Put(id, document) => {
                documents.insert(id, document);
            }
            StagedChange::Purge {
                transaction_id,
                event_processor_name,
            } => documents.retain(|(tx_id, processor, _), _| {
                !(*tx_id == transaction_id && *processor == event_processor_name)
            }),
        }
    }
}

/// Buffer kept as JSON documents in a collection keyed by
/// `(transaction_id, event_processor_name, offset)`.
///
/// The collection lives outside the relational database, so changes are staged
/// per [`Tx`] and only reach the collection once that `Tx` commits. Reads
/// through a `Tx` see its own staged changes. Clones share the collection.
#[derive(Clone, Default)]
pub struct DocumentQueuedEventStore {
    collection: Arc<RwLock<Collection>>,
    staged: Arc<Mutex<HashMap<Uuid, Vec<StagedChange>>>>,
}

impl DocumentQueuedEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed documents only.
    pub fn document_count(&self) -> Result<usize> {
        let collection = self
            .collection
            .read()
            .map_err(|_| EventStoreError::LockPoisoned("queued event collection read"))?;
        Ok(collection.len())
    }

    fn stage(&self, tx: &Tx<'_>, change: StagedChange) -> Result<()> {
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| EventStoreError::LockPoisoned("queued event staging"))?;

        let id = tx.id();
        if !staged.contains_key(&id) {
            let (collection, pending) = (self.collection.clone(), self.staged.clone());
            tx.after_commit(move || publish_staged(&collection, &pending, id));

            let pending = self.staged.clone();
            tx.after_rollback(move || {
                if let Ok(mut pending) = pending.lock() {
                    pending.remove(&id);
                }
            });
        }
        staged.entry(id).or_default().push(change);
        Ok(())
    }

    /// Documents of one buffer as `tx` sees them, by offset.
    fn visible(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<Collection> {
        let mut documents: Collection = {
            let collection = self
                .collection
                .read()
                .map_err(|_| EventStoreError::LockPoisoned("queued event collection read"))?;
            collection
                .iter()
                .filter(|((tx_id, processor, _), _)| {
                    tx_id == transaction_id && processor == event_processor_name
                })
                .map(|(id, document)| (id.clone(), document.clone()))
                .collect()
        };

        let staged = self
            .staged
            .lock()
            .map_err(|_| EventStoreError::LockPoisoned("queued event staging"))?;
        for change in staged.get(&tx.id()).into_iter().flatten() {
            match change {
                StagedChange::Put(id, document)
                    if id.0 == transaction_id && id.1 == event_processor_name =>
                {
                    documents.insert(id.clone(), document.clone());
                }
                StagedChange::Purge {
                    transaction_id: tx_id,
                    event_processor_name: processor,
                } if tx_id == transaction_id && processor == event_processor_name => {
                    documents.clear();
                }
                _ => {}
            }
        }
        Ok(documents)
    }
}

fn publish_staged(
    collection: &RwLock<Collection>,
    staged: &Mutex<HashMap<Uuid, Vec<StagedChange>>>,
    id: Uuid,
) {
    let changes = match staged.lock() {
        Ok(mut staged) => staged.remove(&id).unwrap_or_default(),
        Err(_) => {
            warn!(tx = %id, "queued event staging poisoned, changes dropped");
            return;
        }
    };
    match collection.write() {
        Ok(mut documents) => {
            for change in changes {
                change.apply(&mut documents);
            }
        }
        Err(_) => warn!(tx = %id, "queued event collection poisoned, changes dropped"),
    }
}

impl QueuedEventStore for DocumentQueuedEventStore {
    fn save(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
        record: &EventRecord,
    ) -> Result<()> {
        if record.is_tombstone() {
            return Err(EventStoreError::IllegalArgument(
                "cannot buffer a tombstone".to_string(),
            ));
        }

        let document = serde_json::to_value(QueuedEventDocument {
            transaction_id: transaction_id.to_string(),
            event_processor_name: event_processor_name.to_string(),
            record: record.clone(),
            inserted_at: Utc::now().timestamp_millis(),
        })?;
        let id = (
            transaction_id.to_string(),
            event_processor_name.to_string(),
            record.offset,
        );
        self.stage(tx, StagedChange::Put(id, document))
    }

    fn read(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<Vec<QueuedEvent>> {
        self.visible(tx, transaction_id, event_processor_name)?
            .into_values()
            .map(|document| -> Result<QueuedEvent> {
                let document: QueuedEventDocument = serde_json::from_value(document)?;
                Ok(QueuedEvent {
                    transaction_id: document.transaction_id,
                    event_processor_name: document.event_processor_name,
                    offset: document.record.offset,
                    key: document.record.key,
                    payload: document.record.payload.unwrap_or_default(),
                    inserted_at: DateTime::<Utc>::from_timestamp_millis(document.inserted_at)
                        .unwrap_or_default(),
                })
            })
            .collect()
    }

    fn remove(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<usize> {
        let removed = self.visible(tx, transaction_id, event_processor_name)?.len();
        self.stage(
            tx,
            StagedChange::Purge {
                transaction_id: transaction_id.to_string(),
                event_processor_name: event_processor_name.to_string(),
            },
        )?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, TransactionTemplate};
    use crate::message::MessageKey;

    fn record(offset: i64) -> EventRecord {
        let key = MessageKey::aggregate("TASK", "t-1", offset, "p-1")
            .encode()
            .unwrap();
        EventRecord::new("project", 0, offset, key, Some(vec![1]))
    }

    #[test]
    fn staged_documents_are_visible_to_their_tx_and_published_on_commit() {
        let store = DocumentQueuedEventStore::new();
        let template = TransactionTemplate::new(Database::in_memory().unwrap());

        template
            .execute(|tx| {
                store.save(tx, "bt-1", "p", &record(1))?;
                store.save(tx, "bt-1", "p", &record(2))?;
                assert_eq!(store.read(tx, "bt-1", "p")?.len(), 2);
                assert_eq!(store.document_count()?, 0);
                Ok(())
            })
            .unwrap();

        assert_eq!(store.document_count().unwrap(), 2);
        assert!(store.staged.lock().unwrap().is_empty());
    }

    #[test]
    fn rollback_discards_staged_changes() {
        let store = DocumentQueuedEventStore::new();
        let template = TransactionTemplate::new(Database::in_memory().unwrap());
        template
            .execute(|tx| store.save(tx, "bt-1", "p", &record(1)))
            .unwrap();

        let result: Result<()> = template.execute(|tx| {
            store.save(tx, "bt-1", "p", &record(2))?;
            assert_eq!(store.remove(tx, "bt-1", "p")?, 2);
            assert!(store.read(tx, "bt-1", "p")?.is_empty());
            Err(EventStoreError::IllegalState("rolled back".into()))
        });

        assert!(result.is_err());
        assert_eq!(store.document_count().unwrap(), 1);
        assert!(store.staged.lock().unwrap().is_empty());
    }

    #[test]
    fn purge_then_save_in_one_tx_keeps_the_new_document() {
        let store = DocumentQueuedEventStore::new();
        let template = TransactionTemplate::new(Database::in_memory().unwrap());
        template
            .execute(|tx| store.save(tx, "bt-1", "p", &record(1)))
            .unwrap();

        template
            .execute(|tx| {
                store.remove(tx, "bt-1", "p")?;
                store.save(tx, "bt-1", "p", &record(5))
            })
            .unwrap();

        let offsets: Vec<i64> = template
            .execute(|tx| store.read(tx, "bt-1", "p"))
            .unwrap()
            .iter()
            .map(|event| event.offset)
            .collect();
        assert_eq!(offsets, vec![5]);
    }
}
