//! Audit dispatch queue and workers
//!
//! The interceptor never blocks on persistence: finished entries go into a
//! bounded queue and a small pool of workers drains it. Each entry is
//! delivered to the log channel and the database trail; a failed delivery is
//! retried a fixed number of times and then dropped with an error log. No
//! delivery failure ever surfaces to the request that produced the entry.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::db::{AuditLogRepository, DbPool};

use super::entry::AuditEntry;
use super::sink::{format_document, AuditLogChannel};

/// Total delivery attempts per entry (initial try plus retries)
pub const MAX_DELIVERY_ATTEMPTS: u32 = 3;
/// Ceiling for a single delivery attempt
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between attempts
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// Terminal state of one queued entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Dropped,
}

/// Cloneable handle for queueing entries from the request path
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditEntry>,
}

impl AuditDispatcher {
    /// Queue an entry, dropping it when the queue is saturated
    pub fn dispatch(&self, entry: AuditEntry) {
        if let Err(err) = self.tx.try_send(entry) {
            match err {
                mpsc::error::TrySendError::Full(entry) => {
                    warn!(
                        trace_id = %entry.trace_id,
                        "Audit queue full, dropping entry"
                    );
                }
                mpsc::error::TrySendError::Closed(entry) => {
                    warn!(
                        trace_id = %entry.trace_id,
                        "Audit queue closed, dropping entry"
                    );
                }
            }
        }
    }

    /// A dispatcher with no workers behind it; entries are discarded
    pub fn null() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }
}

/// Delivers entries to the configured sinks
pub struct AuditDispatchWorker {
    channel: AuditLogChannel,
    db: Option<DbPool>,
}

impl AuditDispatchWorker {
    /// Create a worker writing to the log channel and, optionally, the
    /// database trail
    pub fn new(channel: AuditLogChannel, db: Option<DbPool>) -> Self {
        Self { channel, db }
    }

    /// Deliver one entry, retrying on failure
    pub async fn handle(&self, entry: &AuditEntry) -> DispatchOutcome {
        let mut last_error = None;

        for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
            match tokio::time::timeout(ATTEMPT_TIMEOUT, self.deliver(entry)).await {
                Ok(Ok(())) => return DispatchOutcome::Delivered,
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => {
                    last_error = Some(anyhow!(
                        "delivery attempt timed out after {}s",
                        ATTEMPT_TIMEOUT.as_secs()
                    ));
                }
            }

            if attempt < MAX_DELIVERY_ATTEMPTS {
                warn!(
                    trace_id = %entry.trace_id,
                    attempt,
                    error = %last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                    "Audit delivery failed, retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }

        error!(
            trace_id = %entry.trace_id,
            attempts = MAX_DELIVERY_ATTEMPTS,
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "Audit entry dropped after repeated delivery failures"
        );
        DispatchOutcome::Dropped
    }

    /// One delivery pass over both sinks
    ///
    /// Both sinks are attempted even when the first fails; the first error
    /// is reported. Repeating a pass may duplicate a sink write that already
    /// succeeded, which the trail tolerates.
    async fn deliver(&self, entry: &AuditEntry) -> Result<()> {
        let document = format_document(entry);

        let mut first_error: Option<anyhow::Error> = None;

        if let Err(e) = self.channel.write(&document) {
            first_error = Some(e.context("log channel delivery failed"));
        }

        if let Some(db) = &self.db {
            if let Err(e) = AuditLogRepository::new(db).insert(entry).await {
                let e = e.context("database trail delivery failed");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Start the dispatch workers and return the queue handle
pub fn spawn_workers(
    config: &crate::config::AuditConfig,
    db: DbPool,
    channel: AuditLogChannel,
) -> AuditDispatcher {
    let (tx, rx) = mpsc::channel(config.queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    let store = config.store_in_database.then_some(db);
    let worker = Arc::new(AuditDispatchWorker::new(channel, store));

    let worker_count = config.workers.max(1);
    for id in 0..worker_count {
        tokio::spawn(run_worker(id, worker.clone(), rx.clone()));
    }

    AuditDispatcher { tx }
}

async fn run_worker(
    id: usize,
    worker: Arc<AuditDispatchWorker>,
    rx: Arc<Mutex<mpsc::Receiver<AuditEntry>>>,
) {
    debug!(worker = id, "Audit dispatch worker started");
    loop {
        // Hold the lock only while waiting for the next entry
        let entry = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        match entry {
            Some(entry) => {
                let _ = worker.handle(&entry).await;
            }
            None => break,
        }
    }
    debug!(worker = id, "Audit dispatch worker stopped");
}

/// Periodically delete audit rows older than the retention window
pub fn spawn_retention_pruner(db: DbPool, retention_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            match AuditLogRepository::new(&db)
                .prune_older_than(retention_days)
                .await
            {
                Ok(0) => {}
                Ok(removed) => {
                    info!(removed, retention_days, "Pruned expired audit entries");
                }
                Err(e) => {
                    warn!(error = %e, "Audit retention prune failed");
                }
            }
        }
    });
}
