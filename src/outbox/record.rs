use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EventStoreError, Result};
use crate::log::ProducerRecord;
use crate::message::TRANSACTION_ID_HEADER;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    InFlight,
    Published,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::InFlight => "in_flight",
            OutboxStatus::Published => "published",
            OutboxStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "pending" => Ok(OutboxStatus::Pending),
            "in_flight" => Ok(OutboxStatus::InFlight),
            "published" => Ok(OutboxStatus::Published),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(EventStoreError::IllegalState(format!(
                "unknown outbox status {}",
                other
            ))),
        }
    }
}

/// An outbox row as written inside the emitting transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOutboxRecord {
    pub trace_header_key: String,
    pub trace_header_value: String,
    pub partition: i32,
    pub key: Vec<u8>,
    /// `None` is a tombstone.
    pub payload: Option<Vec<u8>>,
    pub transaction_id: Option<String>,
}

/// A stored outbox row awaiting (or done with) publication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboxRecord {
    pub sequence_id: i64,
    pub trace_header_key: String,
    pub trace_header_value: String,
    pub partition: i32,
    pub key: Vec<u8>,
    pub payload: Option<Vec<u8>>,
    pub transaction_id: Option<String>,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    pub fn to_producer_record(&self, topic: &str) -> ProducerRecord {
        let record = ProducerRecord::new(topic, self.partition, self.key.clone(), self.payload.clone())
            .with_header(&self.trace_header_key, &self.trace_header_value);
        match &self.transaction_id {
            Some(transaction_id) => record.with_header(TRANSACTION_ID_HEADER, transaction_id),
            None => record,
        }
    }
}
