//! Reading the log: per-partition consumption, acknowledgment, and routing to stores.

mod acknowledgment;
mod dispatcher;
mod partition;

pub use acknowledgment::Acknowledgment;
pub use dispatcher::EventDispatcher;
pub use partition::PartitionConsumer;
