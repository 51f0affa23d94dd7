//! One sentinel run: updates flow through the detector on a single producer task;
//! alerts are handed to the dispatcher; the run returns after the dispatcher drains.

use crate::config::SentinelConfig;
use crate::detect::{Detector, DetectorStats, OwnershipTable};
use crate::diagnosis::{ChatCompletionsClient, DiagnosisStateMachine, DiagnosisTrace};
use crate::dispatch::{DispatchStats, Dispatcher};
use crate::error::{Result, StorageError};
use crate::evidence::{
    AsGraph, CaseLibrary, KnowledgeRetriever, OfflineRegistry, Registry, RipeStatRegistry, ToolKit,
};
use crate::feed::UpdateSource;
use crate::logging::{StructuredLogger, VerdictLine};
use crate::model::ScorerPhase;
use crate::storage::{ReportStore, TraceSink};
use crate::uplink::UplinkClient;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Stream seconds between progress lines.
const PROGRESS_EVERY_SECS: i64 = 60;

/// Verdict index file kept next to the reports.
pub const VERDICT_INDEX: &str = "verdicts.jsonl";

/// Report file, verdict index line and optional uplink for every sealed trace.
pub struct ReportPublisher {
    store: ReportStore,
    uplink: Option<UplinkClient>,
    index_lock: tokio::sync::Mutex<()>,
}

impl ReportPublisher {
    pub fn new(store: ReportStore, uplink: Option<UplinkClient>) -> Self {
        Self {
            store,
            uplink,
            index_lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn append_index(&self, trace: &DiagnosisTrace, report: &str) -> std::result::Result<(), StorageError> {
        let mut line = Vec::new();
        StructuredLogger::emit_json(&VerdictLine::from_trace(trace, Some(report.to_string())), &mut line);
        let _guard = self.index_lock.lock().await;
        let mut index = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.store.dir().join(VERDICT_INDEX))
            .await?;
        index.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl TraceSink for ReportPublisher {
    async fn persist(&self, trace: &DiagnosisTrace) -> std::result::Result<Option<PathBuf>, StorageError> {
        let path = self.store.write(trace).await?;
        let location = path.display().to_string();
        // the report is on disk; a lost index line does not undo that
        if let Err(e) = self.append_index(trace, &location).await {
            warn!(alert_id = %trace.alert.id, error = %e, "verdict index not updated");
        }
        if let Some(uplink) = &self.uplink {
            if let Err(e) = uplink.report(trace, Some(&location)).await {
                warn!(alert_id = %trace.alert.id, error = %e, "uplink verdict failed");
            }
        }
        info!(
            alert_id = %trace.alert.id,
            prefix = %trace.alert.prefix,
            status = trace.verdict.status.as_str(),
            report = %location,
            "report written"
        );
        Ok(Some(path))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub detector: DetectorStats,
    pub dispatch: DispatchStats,
    pub scorer_phase: ScorerPhase,
    pub tracked_resources: usize,
    pub elapsed_ms: u128,
}

pub struct Sentinel {
    detector: Arc<Detector>,
    dispatcher: Dispatcher,
}

impl Sentinel {
    pub fn new(detector: Arc<Detector>, dispatcher: Dispatcher) -> Self {
        Self {
            detector,
            dispatcher,
        }
    }

    /// Build every stage from configuration. Must be called inside a tokio runtime.
    pub fn from_config(config: &SentinelConfig) -> Result<Self> {
        let ownership = OwnershipTable::from_config(&config.ownership)?;
        let detector = Arc::new(Detector::from_config(config, ownership));

        let offline = OfflineRegistry::from_config(&config.evidence);
        let registry: Arc<dyn Registry> = if config.evidence.online {
            match RipeStatRegistry::new(&config.evidence) {
                Ok(r) => Arc::new(r),
                Err(e) => {
                    warn!(error = %e, "registry client unavailable; using offline tables");
                    Arc::new(offline)
                }
            }
        } else {
            Arc::new(offline)
        };
        let graph = match &config.evidence.topology_path {
            Some(path) => AsGraph::load(path)?,
            None => AsGraph::default(),
        };
        let tools = Arc::new(ToolKit::standard(
            &config.evidence,
            registry,
            Arc::new(graph),
            Arc::clone(detector.extractor()),
        ));
        let knowledge: Arc<dyn KnowledgeRetriever> = Arc::new(match &config.knowledge.cases_path {
            Some(path) => CaseLibrary::load(path)?,
            None => CaseLibrary::empty(),
        });
        let reasoning = Arc::new(ChatCompletionsClient::from_config(
            &config.reasoning,
            config.diagnosis.reasoning_timeout(),
        )?);
        let machine = Arc::new(DiagnosisStateMachine::new(
            reasoning,
            tools,
            knowledge,
            config.diagnosis.clone(),
        ));
        let publisher = Arc::new(ReportPublisher::new(
            ReportStore::new(&config.report_dir),
            UplinkClient::new(&config.uplink),
        ));
        let dispatcher = Dispatcher::start(&config.dispatch, machine, publisher);
        Ok(Self::new(detector, dispatcher))
    }

    pub fn detector(&self) -> &Arc<Detector> {
        &self.detector
    }

    /// Consume `source` to its end, then drain. A feed fault still drains before
    /// it is returned.
    pub async fn run<S: UpdateSource>(self, mut source: S) -> Result<RunSummary> {
        let started = Instant::now();
        let Sentinel {
            detector,
            dispatcher,
        } = self;

        let produced = produce(&detector, &dispatcher, &mut source).await;
        if let Err(e) = &produced {
            warn!(error = %e, "update stream ended with an error; draining");
        }
        let dispatch = dispatcher.drain().await;
        produced?;

        let summary = RunSummary {
            detector: detector.stats(),
            dispatch,
            scorer_phase: detector.scorer().phase(),
            tracked_resources: detector.extractor().tracked_resources(),
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            processed = summary.detector.processed,
            alerts = summary.detector.alerts,
            suppressed = summary.detector.suppressed,
            sealed = summary.dispatch.sealed,
            elapsed_ms = summary.elapsed_ms as u64,
            "run complete"
        );
        Ok(summary)
    }
}

async fn produce<S: UpdateSource>(
    detector: &Detector,
    dispatcher: &Dispatcher,
    source: &mut S,
) -> Result<()> {
    let mut last_progress: Option<i64> = None;
    while let Some(update) = source.next_update().await? {
        if let Some(alert) = detector.process(&update) {
            dispatcher.submit(alert).await?;
        }
        match last_progress {
            None => last_progress = Some(update.timestamp),
            Some(t) if update.timestamp - t >= PROGRESS_EVERY_SECS => {
                let stats = detector.stats();
                info!(
                    processed = stats.processed,
                    alerts = stats.alerts,
                    suppressed = stats.suppressed,
                    warming = !detector.scorer().is_frozen(),
                    queued = dispatcher.queued(),
                    "progress"
                );
                last_progress = Some(update.timestamp);
            }
            Some(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Alert, TriggerReason};
    use crate::diagnosis::{TraceLog, Verdict};
    use crate::feed::RouteUpdate;

    fn trace() -> DiagnosisTrace {
        let alert = Alert::from_update(
            &RouteUpdate::announce("104.244.42.0/24", "174 12389", 1_000),
            TriggerReason::OwnershipMismatch,
            Some("13414".into()),
            None,
        );
        TraceLog::open(alert, String::new()).seal(Verdict::unknown("test"))
    }

    #[tokio::test]
    async fn report_and_index_line_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = ReportPublisher::new(ReportStore::new(dir.path()), None);
        let t = trace();
        let path = publisher.persist(&t).await.unwrap().unwrap();
        assert!(path.exists());
        let index = std::fs::read_to_string(dir.path().join(VERDICT_INDEX)).unwrap();
        assert_eq!(index.lines().count(), 1);
        assert!(index.contains(&t.alert.prefix));
    }

    #[tokio::test]
    async fn index_failure_keeps_the_report() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the index file should be makes the append fail
        std::fs::create_dir(dir.path().join(VERDICT_INDEX)).unwrap();
        let publisher = ReportPublisher::new(ReportStore::new(dir.path()), None);
        let path = publisher.persist(&trace()).await.unwrap().unwrap();
        assert!(path.is_file());
    }
}
