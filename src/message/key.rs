use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EventStoreError, Result};

/// Kind, identifier and version of one aggregate at one point in its history.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateIdentifier {
    pub kind: String,
    pub identifier: String,
    pub version: i64,
}

impl AggregateIdentifier {
    pub fn new(kind: impl Into<String>, identifier: impl Into<String>, version: i64) -> Self {
        Self {
            kind: kind.into(),
            identifier: identifier.into(),
            version,
        }
    }
}

impl fmt::Display for AggregateIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.kind, self.identifier, self.version)
    }
}

/// Key of a record on the log.
///
/// The root context identifier decides the partition, so every event of one
/// aggregate tree (and every marker of a business transaction started there)
/// lands on the same partition in order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKey {
    Aggregate {
        aggregate: AggregateIdentifier,
        root_context_identifier: String,
    },
    BusinessTransactionStarted {
        transaction_identifier: String,
        root_context_identifier: String,
    },
    BusinessTransactionFinished {
        transaction_identifier: String,
        root_context_identifier: String,
    },
}

pub const BUSINESS_TRANSACTION_STARTED: &str = "BUSINESS_TRANSACTION_STARTED";
pub const BUSINESS_TRANSACTION_FINISHED: &str = "BUSINESS_TRANSACTION_FINISHED";

impl MessageKey {
    pub fn aggregate(
        kind: impl Into<String>,
        identifier: impl Into<String>,
        version: i64,
        root_context_identifier: impl Into<String>,
    ) -> Self {
        MessageKey::Aggregate {
            aggregate: AggregateIdentifier::new(kind, identifier, version),
            root_context_identifier: root_context_identifier.into(),
        }
    }

    pub fn aggregate_identifier(&self) -> Option<&AggregateIdentifier> {
        match self {
            MessageKey::Aggregate { aggregate, .. } => Some(aggregate),
            _ => None,
        }
    }

    pub fn root_context_identifier(&self) -> &str {
        match self {
            MessageKey::Aggregate {
                root_context_identifier,
                ..
            }
            | MessageKey::BusinessTransactionStarted {
                root_context_identifier,
                ..
            }
            | MessageKey::BusinessTransactionFinished {
                root_context_identifier,
                ..
            } => root_context_identifier,
        }
    }

    /// Transaction id carried by the key itself (markers only).
    pub fn transaction_identifier(&self) -> Option<&str> {
        match self {
            MessageKey::Aggregate { .. } => None,
            MessageKey::BusinessTransactionStarted {
                transaction_identifier,
                ..
            }
            | MessageKey::BusinessTransactionFinished {
                transaction_identifier,
                ..
            } => Some(transaction_identifier),
        }
    }

    /// Name used in routing decisions and error messages.
    pub fn type_name(&self) -> &str {
        match self {
            MessageKey::Aggregate { aggregate, .. } => &aggregate.kind,
            MessageKey::BusinessTransactionStarted { .. } => BUSINESS_TRANSACTION_STARTED,
            MessageKey::BusinessTransactionFinished { .. } => BUSINESS_TRANSACTION_FINISHED,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            EventStoreError::IllegalArgument(format!("unreadable message key: {}", e))
        })
    }
}

impl fmt::Display for MessageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKey::Aggregate { aggregate, .. } => write!(f, "{}", aggregate),
            MessageKey::BusinessTransactionStarted {
                transaction_identifier,
                ..
            } => write!(f, "{}:{}", BUSINESS_TRANSACTION_STARTED, transaction_identifier),
            MessageKey::BusinessTransactionFinished {
                transaction_identifier,
                ..
            } => write!(f, "{}:{}", BUSINESS_TRANSACTION_FINISHED, transaction_identifier),
        }
    }
}
