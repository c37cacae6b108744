//! Transactional outbox: records written with the snapshot change, published after commit.

mod record;
mod repository;
mod thread;
mod worker;

pub use record::{NewOutboxRecord, OutboxRecord, OutboxStatus};
pub use repository::OutboxRepository;
pub use thread::{OutboxWaker, OutboxWorkerThread, WorkerStats};
pub use worker::{DrainResult, OutboxWorker, ProcessOneResult};
