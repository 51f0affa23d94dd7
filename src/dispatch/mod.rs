//! Bounded alert queue drained by a fixed worker pool. Submission waits while the
//! queue is full; `drain` closes the queue and returns once every accepted alert
//! has a persisted trace.

use crate::config::DispatchConfig;
use crate::detect::Alert;
use crate::diagnosis::{Diagnoser, DiagnosisTrace, VerdictStatus};
use crate::error::DispatchError;
use crate::storage::TraceSink;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    sealed: AtomicU64,
    persist_failures: AtomicU64,
    verdicts: Mutex<BTreeMap<VerdictStatus, u64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submitted: u64,
    pub sealed: u64,
    pub persist_failures: u64,
    pub verdicts: BTreeMap<VerdictStatus, u64>,
}

impl DispatchStats {
    pub fn count(&self, status: VerdictStatus) -> u64 {
        self.verdicts.get(&status).copied().unwrap_or(0)
    }
}

pub struct Dispatcher {
    tx: Option<mpsc::Sender<Alert>>,
    capacity: usize,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    /// Start `config.workers` workers pulling from a queue of `config.queue_capacity`.
    /// Must be called inside a tokio runtime.
    pub fn start(
        config: &DispatchConfig,
        diagnoser: Arc<dyn Diagnoser>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let workers = (0..config.workers.max(1))
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&rx),
                    Arc::clone(&diagnoser),
                    Arc::clone(&sink),
                    Arc::clone(&counters),
                ))
            })
            .collect::<Vec<_>>();
        info!(workers = workers.len(), capacity, "dispatcher started");
        Self {
            tx: Some(tx),
            capacity,
            workers,
            counters,
        }
    }

    /// Enqueue, waiting for space when the queue is full.
    pub async fn submit(&self, alert: Alert) -> Result<(), DispatchError> {
        let tx = self.tx.as_ref().ok_or(DispatchError::Closed)?;
        tx.send(alert).await.map_err(|_| DispatchError::Closed)?;
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Alerts accepted but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.tx
            .as_ref()
            .map(|tx| self.capacity - tx.capacity())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            sealed: self.counters.sealed.load(Ordering::Relaxed),
            persist_failures: self.counters.persist_failures.load(Ordering::Relaxed),
            verdicts: self.counters.verdicts.lock().clone(),
        }
    }

    /// Close the queue and wait until every worker has finished.
    pub async fn drain(mut self) -> DispatchStats {
        drop(self.tx.take());
        let snapshot = self.stats();
        info!(
            pending = snapshot.submitted.saturating_sub(snapshot.sealed),
            "draining dispatch queue"
        );
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "diagnosis worker aborted");
            }
        }
        let stats = self.stats();
        info!(
            submitted = stats.submitted,
            sealed = stats.sealed,
            persist_failures = stats.persist_failures,
            "dispatch drained"
        );
        stats
    }
}

async fn run_worker(
    id: usize,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Alert>>>,
    diagnoser: Arc<dyn Diagnoser>,
    sink: Arc<dyn TraceSink>,
    counters: Arc<Counters>,
) {
    loop {
        // lock released before diagnosing so other workers keep pulling
        let next = rx.lock().await.recv().await;
        let Some(alert) = next else { break };
        debug!(worker = id, alert_id = %alert.id, prefix = %alert.prefix, "diagnosis started");

        let trace = diagnose_isolated(id, &diagnoser, alert).await;
        match sink.persist(&trace).await {
            Ok(location) => debug!(
                worker = id,
                alert_id = %trace.alert.id,
                location = ?location,
                "trace persisted"
            ),
            Err(e) => {
                counters.persist_failures.fetch_add(1, Ordering::Relaxed);
                error!(worker = id, alert_id = %trace.alert.id, error = %e, "trace not persisted");
            }
        }
        counters.sealed.fetch_add(1, Ordering::Relaxed);
        *counters
            .verdicts
            .lock()
            .entry(trace.verdict.status)
            .or_insert(0) += 1;
    }
    debug!(worker = id, "worker stopped");
}

/// Runs the diagnosis on its own task so a panic becomes an ERROR trace instead of
/// taking the worker down.
async fn diagnose_isolated(
    worker: usize,
    diagnoser: &Arc<dyn Diagnoser>,
    alert: Alert,
) -> DiagnosisTrace {
    let task_diagnoser = Arc::clone(diagnoser);
    let task_alert = alert.clone();
    let task = tokio::spawn(async move { task_diagnoser.diagnose(&task_alert).await });
    match task.await {
        Ok(trace) => trace,
        Err(e) => {
            error!(worker, alert_id = %alert.id, error = %e, "diagnosis failed");
            DiagnosisTrace::failed(alert, format!("diagnosis aborted: {e}"))
        }
    }
}
