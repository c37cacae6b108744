//! Runtime configuration.
//!
//! Every section deserializes with defaults, so a partial JSON document (or no
//! environment variables at all) yields a usable configuration.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EventStoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub outbox: OutboxConfig,

    /// Which snapshot persistence strategy stores are built with.
    #[serde(default)]
    pub snapshot_backend: SnapshotBackendKind,

    /// Where business-transaction buffers are kept.
    #[serde(default)]
    pub queued_event_backend: QueuedEventBackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to the SQLite file. `None` opens a private in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Enable WAL mode (file databases only)
    /// Default: true
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Default: 5000
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboxConfig {
    /// Topic every outbox record of this service is published to.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Number of partitions of the topic.
    /// Default: 3
    #[serde(default = "default_partitions")]
    pub partitions: u32,

    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    /// Default: 100
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Default: 60000
    #[serde(default = "default_lease_ms")]
    pub lease_ms: u64,

    /// Default: 5
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Default: 100
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotBackendKind {
    /// Entity-mapped documents with a per-transaction identity cache.
    #[default]
    Mapped,
    /// Hand-written parameterized statements against a dedicated table.
    Sql,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueuedEventBackendKind {
    #[default]
    Relational,
    Document,
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_topic() -> String {
    "events".to_string()
}

fn default_partitions() -> u32 {
    3
}

fn default_worker_id() -> String {
    format!("outbox-worker-{}", std::process::id())
}

fn default_batch_size() -> usize {
    100
}

fn default_lease_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    100
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl DatabaseConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            partitions: default_partitions(),
            worker_id: default_worker_id(),
            batch_size: default_batch_size(),
            lease_ms: default_lease_ms(),
            max_attempts: default_max_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl OutboxConfig {
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            topic: topic.into(),
            partitions,
            ..Self::default()
        }
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            outbox: OutboxConfig::default(),
            snapshot_backend: SnapshotBackendKind::default(),
            queued_event_backend: QueuedEventBackendKind::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `SOURCED_*` environment variables, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();
        if let Ok(path) = env::var("SOURCED_DATABASE_PATH") {
            config.database.path = Some(PathBuf::from(path));
        }
        if let Some(wal) = parse_var("SOURCED_DATABASE_WAL")? {
            config.database.wal_mode = wal;
        }
        if let Some(timeout) = parse_var("SOURCED_DATABASE_BUSY_TIMEOUT_MS")? {
            config.database.busy_timeout_ms = timeout;
        }
        if let Ok(topic) = env::var("SOURCED_OUTBOX_TOPIC") {
            config.outbox.topic = topic;
        }
        if let Some(partitions) = parse_var("SOURCED_OUTBOX_PARTITIONS")? {
            config.outbox.partitions = partitions;
        }
        if let Ok(worker_id) = env::var("SOURCED_OUTBOX_WORKER_ID") {
            config.outbox.worker_id = worker_id;
        }
        if let Some(batch_size) = parse_var("SOURCED_OUTBOX_BATCH_SIZE")? {
            config.outbox.batch_size = batch_size;
        }
        if let Some(lease) = parse_var("SOURCED_OUTBOX_LEASE_MS")? {
            config.outbox.lease_ms = lease;
        }
        if let Some(attempts) = parse_var("SOURCED_OUTBOX_MAX_ATTEMPTS")? {
            config.outbox.max_attempts = attempts;
        }
        if let Some(interval) = parse_var("SOURCED_OUTBOX_POLL_INTERVAL_MS")? {
            config.outbox.poll_interval_ms = interval;
        }
        if let Ok(kind) = env::var("SOURCED_SNAPSHOT_BACKEND") {
            config.snapshot_backend = parse_kind(&kind)?;
        }
        if let Ok(kind) = env::var("SOURCED_QUEUED_EVENT_BACKEND") {
            config.queued_event_backend = parse_kind(&kind)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.outbox.partitions == 0 {
            return Err(EventStoreError::Config(
                "outbox.partitions must be at least 1".into(),
            ));
        }
        if self.outbox.batch_size == 0 {
            return Err(EventStoreError::Config(
                "outbox.batch_size must be at least 1".into(),
            ));
        }
        if self.outbox.max_attempts == 0 {
            return Err(EventStoreError::Config(
                "outbox.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| EventStoreError::Config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

fn parse_kind<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(raw.to_ascii_lowercase()))
        .map_err(|e| EventStoreError::Config(format!("unknown backend {}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.outbox.partitions, 3);
        assert_eq!(config.snapshot_backend, SnapshotBackendKind::Mapped);
        assert_eq!(config.queued_event_backend, QueuedEventBackendKind::Relational);
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = RuntimeConfig::from_json(
            r#"{
                "outbox": { "topic": "project", "partitions": 6 },
                "snapshot_backend": "sql",
                "queued_event_backend": "document"
            }"#,
        )
        .unwrap();

        assert_eq!(config.outbox.topic, "project");
        assert_eq!(config.outbox.partitions, 6);
        assert_eq!(config.outbox.batch_size, 100);
        assert_eq!(config.snapshot_backend, SnapshotBackendKind::Sql);
        assert_eq!(config.queued_event_backend, QueuedEventBackendKind::Document);
    }

    #[test]
    fn zero_partitions_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{ "outbox": { "partitions": 0 } }"#).unwrap_err();
        assert!(matches!(err, EventStoreError::Config(_)));
    }

    #[test]
    fn backend_names_parse_case_insensitively() {
        let kind: SnapshotBackendKind = parse_kind("SQL").unwrap();
        assert_eq!(kind, SnapshotBackendKind::Sql);
        assert!(parse_kind::<QueuedEventBackendKind>("mongo").is_err());
    }
}
