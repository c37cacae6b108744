use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bus::LocalEventBus;
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::MessageKey;

/// Payload of the records bracketing a business transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusinessTransactionMarker {
    Started {
        name: String,
        root_context_identifier: String,
    },
    Finished {
        name: String,
        root_context_identifier: String,
    },
}

impl BusinessTransactionMarker {
    pub fn started(name: impl Into<String>, root_context_identifier: impl Into<String>) -> Self {
        BusinessTransactionMarker::Started {
            name: name.into(),
            root_context_identifier: root_context_identifier.into(),
        }
    }

    pub fn finished(name: impl Into<String>, root_context_identifier: impl Into<String>) -> Self {
        BusinessTransactionMarker::Finished {
            name: name.into(),
            root_context_identifier: root_context_identifier.into(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bitcode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bitcode::deserialize(bytes)?)
    }
}

/// How `start_transaction` behaves when a business transaction is already open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Propagation {
    /// Join the open transaction.
    Required,
    /// Refuse to start while another transaction is open.
    RequiresNew,
}

/// Business transaction open on a [`Tx`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ActiveBusinessTransaction {
    pub(crate) transaction_id: String,
    pub(crate) root_context_identifier: String,
    pub(crate) depth: usize,
}

/// Opens and closes business transactions on the producing side.
///
/// While one is open on a [`Tx`], every outbox record written through that
/// `Tx` carries its id. Only the outermost start and finish emit markers.
#[derive(Clone)]
pub struct ProducerBusinessTransactionManager {
    bus: LocalEventBus,
}

impl ProducerBusinessTransactionManager {
    pub fn new(bus: LocalEventBus) -> Self {
        Self { bus }
    }

    pub fn is_active(&self, tx: &Tx<'_>) -> bool {
        tx.business_transaction().borrow().is_some()
    }

    pub fn current_transaction_id(&self, tx: &Tx<'_>) -> Option<String> {
        tx.business_transaction_id()
    }

    /// Returns the id of the started (or joined) transaction.
    pub fn start_transaction(
        &self,
        tx: &Tx<'_>,
        marker: &BusinessTransactionMarker,
        propagation: Propagation,
    ) -> Result<String> {
        let root_context_identifier = match marker {
            BusinessTransactionMarker::Started {
                root_context_identifier,
                ..
            } => root_context_identifier.clone(),
            BusinessTransactionMarker::Finished { .. } => {
                return Err(EventStoreError::IllegalArgument(
                    "a business transaction can only be started with a started marker".into(),
                ))
            }
        };

        let transaction_id = Uuid::new_v4().to_string();
        {
            let mut slot = tx.business_transaction().borrow_mut();
            if let Some(active) = slot.as_mut() {
                return match propagation {
                    Propagation::Required => {
                        active.depth += 1;
                        Ok(active.transaction_id.clone())
                    }
                    Propagation::RequiresNew => Err(EventStoreError::IllegalState(format!(
                        "business transaction {} is already active",
                        active.transaction_id
                    ))),
                };
            }

            *slot = Some(ActiveBusinessTransaction {
                transaction_id: transaction_id.clone(),
                root_context_identifier: root_context_identifier.clone(),
                depth: 1,
            });
        }

        let key = MessageKey::BusinessTransactionStarted {
            transaction_identifier: transaction_id.clone(),
            root_context_identifier,
        };
        if let Err(err) = self.bus.emit_raw(tx, &key, Some(&marker.encode()?)) {
            tx.business_transaction().replace(None);
            return Err(err);
        }

        debug!(transaction_id = %transaction_id, "started business transaction");
        Ok(transaction_id)
    }

    pub fn finish_transaction(&self, tx: &Tx<'_>, marker: &BusinessTransactionMarker) -> Result<()> {
        if let BusinessTransactionMarker::Started { .. } = marker {
            return Err(EventStoreError::IllegalArgument(
                "a business transaction can only be finished with a finished marker".into(),
            ));
        }

        let active = {
            let mut slot = tx.business_transaction().borrow_mut();
            let active = slot.as_mut().ok_or_else(|| {
                EventStoreError::IllegalState("no business transaction is active".into())
            })?;
            if active.depth > 1 {
                active.depth -= 1;
                return Ok(());
            }
            active.clone()
        };

        let key = MessageKey::BusinessTransactionFinished {
            transaction_identifier: active.transaction_id.clone(),
            root_context_identifier: active.root_context_identifier,
        };
        let emitted = self.bus.emit_raw(tx, &key, Some(&marker.encode()?));
        tx.business_transaction().replace(None);
        emitted?;

        debug!(transaction_id = %active.transaction_id, "finished business transaction");
        Ok(())
    }

    /// Run `f` inside a business transaction, joining an open one if present.
    ///
    /// When `f` fails the transaction is left without emitting a finished marker.
    pub fn do_in_business_transaction<T, F>(
        &self,
        tx: &Tx<'_>,
        started: &BusinessTransactionMarker,
        finished: &BusinessTransactionMarker,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.start_transaction(tx, started, Propagation::Required)?;
        match f(tx) {
            Ok(value) => {
                self.finish_transaction(tx, finished)?;
                Ok(value)
            }
            Err(err) => {
                self.abandon(tx);
                Err(err)
            }
        }
    }

    fn abandon(&self, tx: &Tx<'_>) {
        let mut slot = tx.business_transaction().borrow_mut();
        let outermost = match slot.as_mut() {
            Some(active) if active.depth > 1 => {
                active.depth -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };
        if outermost {
            *slot = None;
        }
    }
}
