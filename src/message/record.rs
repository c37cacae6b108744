use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::MessageKey;
use crate::error::Result;

pub const TRACE_HEADER_KEY: &str = "X-B3-TraceId";
pub const TRANSACTION_ID_HEADER: &str = "transaction_id";

/// A record as delivered by the log to a consumer.
///
/// Byte fields are base64 encoded when the record itself is serialized, which
/// is how document-backed buffers persist it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    #[serde(with = "bytes_serde")]
    pub key: Vec<u8>,
    /// `None` is a tombstone.
    #[serde(with = "optional_bytes_serde")]
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
    /// Milliseconds since the epoch.
    pub timestamp: i64,
}

mod bytes_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

mod optional_bytes_serde {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        bytes.as_ref().map(|b| STANDARD.encode(b)).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| STANDARD.decode(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

impl EventRecord {
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        key: Vec<u8>,
        payload: Option<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            key,
            payload,
            headers: Vec::new(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.header(TRACE_HEADER_KEY)
    }

    pub fn is_tombstone(&self) -> bool {
        self.payload.is_none()
    }

    pub fn message_key(&self) -> Result<MessageKey> {
        MessageKey::decode(&self.key)
    }

    /// The business transaction this record belongs to. A marker's key names
    /// its transaction; any other record relies on its header.
    pub fn business_transaction_id(&self, key: &MessageKey) -> Option<String> {
        key.transaction_identifier()
            .or_else(|| self.header(TRANSACTION_ID_HEADER))
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: Option<Vec<u8>>) -> EventRecord {
        let key = MessageKey::aggregate("TASK", "t-1", 0, "p-1").encode().unwrap();
        EventRecord::new("project", 1, 7, key, payload)
    }

    #[test]
    fn last_header_wins() {
        let record = record(Some(vec![1]))
            .with_header(TRACE_HEADER_KEY, "first")
            .with_header(TRACE_HEADER_KEY, "second");

        assert_eq!(record.trace_id(), Some("second"));
        assert_eq!(record.header("missing"), None);
    }

    #[test]
    fn transaction_id_from_header() {
        let record = record(Some(vec![1])).with_header(TRANSACTION_ID_HEADER, "bt-1");
        let key = record.message_key().unwrap();

        assert_eq!(record.business_transaction_id(&key), Some("bt-1".to_string()));
    }

    #[test]
    fn transaction_id_from_marker_key() {
        let key = MessageKey::BusinessTransactionFinished {
            transaction_identifier: "bt-2".into(),
            root_context_identifier: "p-1".into(),
        };
        let record = EventRecord::new("project", 0, 3, key.encode().unwrap(), Some(vec![]));

        assert_eq!(record.business_transaction_id(&key), Some("bt-2".to_string()));
    }

    #[test]
    fn marker_key_wins_over_header() {
        let key = MessageKey::BusinessTransactionStarted {
            transaction_identifier: "bt-inner".into(),
            root_context_identifier: "p-1".into(),
        };
        let record = EventRecord::new("project", 0, 4, key.encode().unwrap(), Some(vec![]))
            .with_header(TRANSACTION_ID_HEADER, "bt-outer");

        assert_eq!(record.business_transaction_id(&key), Some("bt-inner".to_string()));
    }

    #[test]
    fn json_form_uses_base64_and_null_for_tombstones() {
        let tombstone = record(None);
        let json = serde_json::to_value(&tombstone).unwrap();

        assert!(json["payload"].is_null());
        assert!(json["key"].is_string());

        let back: EventRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, tombstone);
        assert!(back.is_tombstone());
    }
}
