use thiserror::Error;

use crate::log::PublishError;

#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("could not find {kind} with identifier {identifier}")]
    AggregateNotFound { kind: String, identifier: String },

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error(
        "concurrent write detected for {kind} {identifier} (expected version {expected}, got {actual})"
    )]
    OptimisticConcurrencyConflict {
        kind: String,
        identifier: String,
        expected: i64,
        actual: i64,
    },

    #[error(
        "restore service is ahead of online service on {topic}-{partition}: offset {offset} exceeds max allowed offset {max_allowed:?}"
    )]
    RestoreServiceAheadOfOnlineService {
        topic: String,
        partition: i32,
        offset: i64,
        max_allowed: Option<i64>,
    },

    #[error("lock poisoned during {0}")]
    LockPoisoned(&'static str),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl EventStoreError {
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        EventStoreError::Serialization(err.to_string())
    }

    /// Semantic failures must halt the consumer instead of being redelivered blindly.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            EventStoreError::Storage(_)
                | EventStoreError::Publish(_)
                | EventStoreError::LockPoisoned(_)
        )
    }
}

impl From<serde_json::Error> for EventStoreError {
    fn from(err: serde_json::Error) -> Self {
        EventStoreError::serialization(err)
    }
}

impl From<bitcode::Error> for EventStoreError {
    fn from(err: bitcode::Error) -> Self {
        EventStoreError::serialization(err)
    }
}

pub type Result<T> = std::result::Result<T, EventStoreError>;
