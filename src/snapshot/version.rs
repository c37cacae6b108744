use tracing::info;

use super::EventSource;
use crate::error::{EventStoreError, Result};
use crate::message::AggregateIdentifier;

/// Decide whether an event at `incoming.version` may be applied on top of a
/// snapshot at `current`.
///
/// Returns `Ok(false)` for replayed events the store has already seen.
pub fn can_apply(
    current: Option<i64>,
    incoming: &AggregateIdentifier,
    source: EventSource,
) -> Result<bool> {
    let expected = current.map_or(0, |version| version + 1);

    if incoming.version == expected {
        return Ok(true);
    }

    match source {
        EventSource::Online => Err(EventStoreError::OptimisticConcurrencyConflict {
            kind: incoming.kind.clone(),
            identifier: incoming.identifier.clone(),
            expected,
            actual: incoming.version,
        }),
        EventSource::Restore if incoming.version < expected => {
            info!(
                aggregate = %incoming,
                current = ?current,
                "skipping event that was already applied"
            );
            Ok(false)
        }
        EventSource::Restore => Err(EventStoreError::PreconditionViolation(format!(
            "event {} skips versions: snapshot is at {:?}, expected version {}",
            incoming, current, expected
        ))),
    }
}
