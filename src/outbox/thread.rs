//! Background thread draining the outbox.

use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{error, info};

use super::OutboxWorker;
use crate::log::Publisher;

/// Statistics from the outbox worker.
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    pub messages_published: usize,
    pub messages_released: usize,
    pub messages_failed: usize,
    pub polls: usize,
}

enum Signal {
    Wake,
    Stop,
}

/// Wakes a sleeping [`OutboxWorkerThread`] so freshly committed records go out
/// without waiting for the next poll.
#[derive(Clone)]
pub struct OutboxWaker {
    tx: Sender<Signal>,
}

impl OutboxWaker {
    pub fn wake(&self) {
        let _ = self.tx.send(Signal::Wake);
    }
}

/// A background thread that drains outbox records and publishes them.
///
/// ```ignore
/// let worker = OutboxWorker::from_config(OutboxRepository::new(db.clone()), log, &config.outbox);
/// let thread = OutboxWorkerThread::spawn(worker, config.outbox.poll_interval());
/// let bus = LocalEventBus::new(&config.outbox).with_waker(thread.waker());
/// // ...
/// let stats = thread.stop();
/// ```
pub struct OutboxWorkerThread {
    tx: Sender<Signal>,
    handle: Option<JoinHandle<WorkerStats>>,
}

impl OutboxWorkerThread {
    pub fn spawn<P>(worker: OutboxWorker<P>, poll_interval: Duration) -> Self
    where
        P: Publisher + 'static,
    {
        let (tx, rx) = channel();

        let handle = thread::spawn(move || {
            let mut stats = WorkerStats::default();
            info!("outbox worker started");

            loop {
                stats.polls += 1;
                match worker.drain() {
                    Ok(result) => {
                        stats.messages_published += result.completed;
                        stats.messages_released += result.released;
                        stats.messages_failed += result.failed;
                    }
                    Err(err) => error!(error = %err, "draining outbox failed"),
                }

                match rx.recv_timeout(poll_interval) {
                    Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => {}
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            info!(published = stats.messages_published, "outbox worker stopped");
            stats
        });

        Self {
            tx,
            handle: Some(handle),
        }
    }

    pub fn waker(&self) -> OutboxWaker {
        OutboxWaker {
            tx: self.tx.clone(),
        }
    }

    /// Signal the worker to stop and wait for it to finish.
    pub fn stop(mut self) -> WorkerStats {
        let _ = self.tx.send(Signal::Stop);
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_default(),
            None => WorkerStats::default(),
        }
    }
}

impl Drop for OutboxWorkerThread {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}
