//! Wire-level types shared by producers and consumers.

mod key;
mod partition;
mod record;

pub use key::{AggregateIdentifier, MessageKey};
pub use partition::partition_for;
pub use record::{EventRecord, TRACE_HEADER_KEY, TRANSACTION_ID_HEADER};
