use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::message::AggregateIdentifier;

/// Version of a snapshot that has never been stored. The CREATED event moves it to 0.
pub const INITIAL_SNAPSHOT_VERSION: i64 = -1;

/// Who created and last modified a snapshot, and when.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditingInformation {
    pub created_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub last_modified_by: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_modified_at: DateTime<Utc>,
}

impl AuditingInformation {
    pub fn new(user: impl Into<String>, at: DateTime<Utc>) -> Self {
        let user = user.into();
        Self {
            created_by: user.clone(),
            created_at: at,
            last_modified_by: user,
            last_modified_at: at,
        }
    }

    pub fn touch(&mut self, user: impl Into<String>, at: DateTime<Utc>) {
        self.last_modified_by = user.into();
        self.last_modified_at = at;
    }
}

/// The materialized current state of one aggregate.
///
/// `KIND` is the aggregate type name used on message keys; stores only accept
/// events whose key carries their kind.
pub trait VersionedSnapshot:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: &'static str;

    fn identifier(&self) -> &str;

    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);

    fn auditing(&self) -> &AuditingInformation;

    fn auditing_mut(&mut self) -> &mut AuditingInformation;

    /// Identifier deciding the partition. Child aggregates return their root's id.
    fn root_context_identifier(&self) -> &str {
        self.identifier()
    }

    fn aggregate_identifier(&self) -> AggregateIdentifier {
        AggregateIdentifier::new(Self::KIND, self.identifier(), self.version())
    }
}
