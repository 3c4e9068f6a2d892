//! Classification worker pool
//!
//! One OS thread per receive-queue context, fed over a bounded channel.
//! Each worker runs every frame to completion through the shared engine.

use crossbeam::channel::{bounded, Receiver, SendError, Sender, TrySendError};
use depwall_dataplane::DecisionEngine;
use serde::Serialize;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Yields to the scheduler before a full queue backs off with a sleep
const SPINS_BEFORE_SLEEP: u32 = 64;

const FULL_QUEUE_BACKOFF: Duration = Duration::from_millis(1);

/// Frames one worker classified
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    /// Worker index
    pub id: usize,
    /// Frames classified
    pub frames: u64,
    /// Frames given PASS
    pub passed: u64,
}

struct WorkerHandle {
    id: usize,
    thread: thread::JoinHandle<WorkerReport>,
}

/// Pool of classification threads
pub struct WorkerPool {
    tx: Sender<Vec<u8>>,
    workers: Vec<WorkerHandle>,
}

impl WorkerPool {
    /// Spawn `workers` threads sharing `engine`
    pub fn spawn(
        engine: Arc<DecisionEngine>,
        workers: usize,
        queue_depth: usize,
    ) -> std::io::Result<Self> {
        let (tx, rx) = bounded(queue_depth.max(1));
        let mut handles = Vec::with_capacity(workers);

        for id in 0..workers.max(1) {
            let engine = Arc::clone(&engine);
            let rx = rx.clone();
            let thread = thread::Builder::new()
                .name(format!("depwall-worker-{}", id))
                .spawn(move || run_worker(id, &engine, rx))?;
            handles.push(WorkerHandle { id, thread });
        }

        debug!(workers = handles.len(), queue_depth, "worker pool started");
        Ok(Self {
            tx,
            workers: handles,
        })
    }

    /// Queue a frame, waiting for space without blocking the async runtime.
    ///
    /// Works on both the current-thread and multi-thread schedulers.
    pub async fn submit(&self, mut frame: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        let mut spins = 0;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(frame)) => return Err(SendError(frame)),
                Err(TrySendError::Full(back)) => {
                    frame = back;
                    if spins < SPINS_BEFORE_SLEEP {
                        spins += 1;
                        tokio::task::yield_now().await;
                    } else {
                        trace!(backlog = self.backlog(), "worker queue full");
                        tokio::time::sleep(FULL_QUEUE_BACKOFF).await;
                    }
                }
            }
        }
    }

    /// Frames queued but not yet picked up
    pub fn backlog(&self) -> usize {
        self.tx.len()
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue, let workers drain it, and collect their reports
    pub fn join(self) -> Vec<WorkerReport> {
        drop(self.tx);
        self.workers
            .into_iter()
            .filter_map(|worker| match worker.thread.join() {
                Ok(report) => Some(report),
                Err(_) => {
                    warn!(worker = worker.id, "worker thread panicked");
                    None
                }
            })
            .collect()
    }
}

fn run_worker(id: usize, engine: &DecisionEngine, rx: Receiver<Vec<u8>>) -> WorkerReport {
    let mut report = WorkerReport {
        id,
        ..Default::default()
    };

    for frame in rx.iter() {
        report.frames += 1;
        if engine.classify(&frame).is_pass() {
            report.passed += 1;
        }
    }

    debug!(worker = id, frames = report.frames, "worker stopped");
    report
}
