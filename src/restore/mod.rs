//! Rebuilding snapshot databases by replaying the whole log.
//!
//! A restore instance may run next to the online service, so it must never get
//! ahead of what the online service already committed. The online side
//! publishes per-partition watermarks through [`OffsetSynchronizationManager`];
//! [`RestoreEventListener`] refuses records above them.

mod dispatcher;
mod listener;
mod offsets;
mod strategy;

pub use dispatcher::RestoreDbStrategyDispatcher;
pub use listener::RestoreEventListener;
pub use offsets::OffsetSynchronizationManager;
pub use strategy::{BusinessTransactionMarkerStrategy, RestoreStrategy, SnapshotRestoreStrategy};
