//! Bounded-concurrency wave execution.
//!
//! Every ticket of a wave runs on its own task behind a semaphore of `N`
//! permits. A ticket's fault, whether an `Err` from the worker or an outright
//! panic, is converted into a failed `WorkResult`; siblings are never affected.
//! Each task provisions its own sandbox and releases it on every exit path.
//! Results are collected in completion order, and the call does not return
//! until the whole wave has drained.

use crate::events::EventBus;
use crate::sandbox::Sandbox;
use crate::ticket::Ticket;
use crate::work::{WorkResult, Worker};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum units of work in flight at once.
    pub max_workers: usize,
    /// Reference workspace each sandbox is copied from.
    pub source_root: PathBuf,
}

impl PoolConfig {
    pub fn new(source_root: impl Into<PathBuf>) -> Self {
        Self {
            max_workers: 4,
            source_root: source_root.into(),
        }
    }
}

/// Execute one wave of tickets. Returns one `(Ticket, WorkResult)` pair per
/// ticket, in completion order. The returned ticket carries criterion
/// updates made by the worker; status transitions stay with the caller.
pub async fn execute_wave(
    tickets: Vec<Ticket>,
    worker: Arc<dyn Worker>,
    config: &PoolConfig,
    events: &EventBus,
) -> Vec<(Ticket, WorkResult)> {
    let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
    let mut set = JoinSet::new();

    for (index, ticket) in tickets.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let worker = worker.clone();
        let source = config.source_root.clone();
        let events = events.clone();
        let worker_id = format!("W{}", index + 1);

        set.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let result = WorkResult::failure(
                        ticket.id.clone(),
                        "worker pool closed",
                        Vec::new(),
                        std::time::Duration::ZERO,
                    );
                    return (ticket, result);
                }
            };
            run_one(ticket, worker, &source, worker_id, events).await
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => outcomes.push(pair),
            // Only reachable if the wrapper task itself dies; the worker's
            // own panics are caught inside run_one.
            Err(e) => tracing::error!(error = %e, "wave task lost"),
        }
    }
    outcomes
}

async fn run_one(
    ticket: Ticket,
    worker: Arc<dyn Worker>,
    source: &Path,
    worker_id: String,
    events: EventBus,
) -> (Ticket, WorkResult) {
    let started = Instant::now();
    let original = ticket.clone();
    let ticket_id = ticket.id.clone();
    events.progress(format!("{worker_id} picked up {ticket_id}"));

    // Sandbox copy is blocking filesystem work.
    let provision_source = source.to_path_buf();
    let provision_id = worker_id.clone();
    let sandbox = tokio::task::spawn_blocking(move || {
        Sandbox::provision(&provision_source, &provision_id)
    })
    .await;

    let sandbox = match sandbox {
        Ok(Ok(sandbox)) => sandbox,
        Ok(Err(e)) => {
            tracing::error!(ticket = %ticket_id, error = %e, "sandbox provisioning failed");
            let result = WorkResult::failure(
                ticket_id,
                format!("sandbox provisioning failed: {e}"),
                Vec::new(),
                started.elapsed(),
            );
            return (original, result);
        }
        Err(e) => {
            let result = WorkResult::failure(
                ticket_id,
                format!("sandbox provisioning panicked: {e}"),
                Vec::new(),
                started.elapsed(),
            );
            return (original, result);
        }
    };

    let handle = sandbox.handle();
    let executed = AssertUnwindSafe(worker.execute(ticket, handle))
        .catch_unwind()
        .await;

    // Teardown happens before the result is surfaced, on every path.
    release(sandbox).await;

    let pair = match executed {
        Ok(Ok((ticket, result))) => (ticket, result),
        Ok(Err(e)) => {
            tracing::warn!(ticket = %ticket_id, error = %e, "unit of work failed");
            let result = WorkResult::failure(
                ticket_id,
                e.to_string(),
                Vec::new(),
                started.elapsed(),
            );
            (original, result)
        }
        Err(panic) => {
            let message = panic_message(panic);
            tracing::error!(ticket = %ticket_id, panic = %message, "unit of work panicked");
            let result = WorkResult::failure(
                ticket_id,
                format!("unit of work panicked: {message}"),
                Vec::new(),
                started.elapsed(),
            );
            (original, result)
        }
    };

    events.progress(format!(
        "{worker_id} finished {} ({})",
        pair.1.ticket_id,
        if pair.1.success { "ok" } else { "failed" }
    ));
    (pair.0, pair.1)
}

async fn release(sandbox: Sandbox) {
    let _ = tokio::task::spawn_blocking(move || {
        let mut sandbox = sandbox;
        if let Err(e) = sandbox.cleanup() {
            tracing::warn!(error = %e, "sandbox cleanup failed");
        }
    })
    .await;
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
