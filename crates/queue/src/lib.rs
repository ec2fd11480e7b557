//! Serial work queue with in-place, policy-driven retry.
//!
//! Each queue owns a bounded backlog and one worker task. Units run strictly
//! one at a time in submission order; a failing unit is retried in place until
//! its policy gives up, so no later unit starts while it is still retrying.

#![forbid(unsafe_code)]

mod policy;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use metrics::counter;
use ray_core::{ReconcileError, UnitOfWork};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use policy::RetryPolicy;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work queue {0} is stopped")]
    Stopped(String),
}

/// Largest backlog a queue accepts; larger capacities are clamped.
pub const MAX_CAPACITY: usize = tokio::sync::Semaphore::MAX_PERMITS;

struct Queued {
    work: UnitOfWork,
    policy: RetryPolicy,
}

/// Handle to one queue; cheap to share behind an `Arc`.
pub struct RetryQueue {
    name: Arc<str>,
    tx: mpsc::Sender<Queued>,
    stop: CancellationToken,
    exited: CancellationToken,
}

impl RetryQueue {
    /// Create a queue with room for `capacity` pending units and spawn its worker.
    /// Must be called from within a tokio runtime.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self::with_stop(name, capacity, CancellationToken::new())
    }

    /// Like [`RetryQueue::new`], stopping when `stop` (or a parent of it) is cancelled.
    pub fn with_stop(name: impl Into<String>, capacity: usize, stop: CancellationToken) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (tx, rx) = mpsc::channel::<Queued>(capacity.clamp(1, MAX_CAPACITY));
        let exited = CancellationToken::new();
        tokio::spawn(run_worker(Arc::clone(&name), rx, stop.clone(), exited.clone()));
        Self { name, tx, stop, exited }
    }

    pub fn name(&self) -> &str { &self.name }

    /// Enqueue a unit. Waits while the backlog is full; fails only once the queue is stopped.
    pub async fn submit(&self, work: UnitOfWork, policy: RetryPolicy) -> Result<(), QueueError> {
        if self.stop.is_cancelled() {
            return Err(QueueError::Stopped(self.name.to_string()));
        }
        self.tx
            .send(Queued { work, policy })
            .await
            .map_err(|_| QueueError::Stopped(self.name.to_string()))?;
        counter!("work_submitted_total", 1, "queue" => self.name.to_string());
        Ok(())
    }

    /// Units waiting in the backlog (not counting the one being attempted).
    pub fn backlog(&self) -> usize { self.tx.max_capacity().saturating_sub(self.tx.capacity()) }

    /// Ask the worker to exit at the next dequeue or attempt boundary. The backlog is not drained.
    pub fn stop(&self) { self.stop.cancel(); }

    pub fn is_stopped(&self) -> bool { self.stop.is_cancelled() }

    /// Resolves once the worker task has exited.
    pub async fn stopped(&self) { self.exited.cancelled().await }
}

async fn run_worker(name: Arc<str>, mut rx: mpsc::Receiver<Queued>, stop: CancellationToken, exited: CancellationToken) {
    let _exited = exited.drop_guard();
    debug!(queue = %name, "work queue started");
    loop {
        let mut item = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = rx.recv() => match next {
                Some(item) => item,
                None => break,
            },
        };
        if !drive(&name, &mut item, &stop).await {
            break;
        }
    }
    info!(queue = %name, "work queue stopped");
}

/// Attempt one unit until it succeeds or its policy gives up.
/// Returns `false` if the stop signal was observed first.
async fn drive(name: &str, item: &mut Queued, stop: &CancellationToken) -> bool {
    let mut attempt: u32 = 0;
    loop {
        if stop.is_cancelled() {
            return false;
        }
        attempt = attempt.saturating_add(1);
        counter!("reconcile_attempts_total", 1, "queue" => name.to_string());
        let err = match attempt_once(&mut item.work).await {
            Ok(()) => {
                debug!(queue = %name, work = %item.work.label(), attempt, "work done");
                return true;
            }
            Err(e) => e,
        };
        counter!("reconcile_failures_total", 1, "queue" => name.to_string());
        if !item.policy.should_retry(attempt) {
            warn!(queue = %name, work = %item.work.label(), attempts = attempt, error = %err, "abandoning work");
            counter!("reconcile_abandoned_total", 1, "queue" => name.to_string());
            return true;
        }
        let delay = item.policy.delay(attempt);
        debug!(queue = %name, work = %item.work.label(), attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying work");
        if !delay.is_zero() {
            tokio::select! {
                biased;
                _ = stop.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

async fn attempt_once(work: &mut UnitOfWork) -> Result<(), ReconcileError> {
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| work.attempt())) {
        Ok(fut) => fut,
        Err(panic) => return Err(ReconcileError::Panicked(panic_message(panic.as_ref()))),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(res) => res,
        Err(panic) => Err(ReconcileError::Panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
