//! Write-once JSON reports, one file per sealed trace.

use super::TraceSink;
use crate::diagnosis::DiagnosisTrace;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// `analysis_<prefix>_<YYYYmmdd_HHMMSS>_<alert id head>.json`; `/` and `:` in the prefix become `_`.
pub fn report_file_name(trace: &DiagnosisTrace, at: DateTime<Utc>) -> String {
    let safe_prefix: String = trace
        .alert
        .prefix
        .chars()
        .map(|c| if c == '/' || c == ':' { '_' } else { c })
        .collect();
    let id_head: String = trace.alert.id.chars().filter(|c| *c != '-').take(8).collect();
    format!(
        "analysis_{safe_prefix}_{}_{id_head}.json",
        at.format("%Y%m%d_%H%M%S")
    )
}

#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `trace`; an existing file is never overwritten.
    pub async fn write(&self, trace: &DiagnosisTrace) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_vec_pretty(trace)?;
        let path = self.dir.join(report_file_name(trace, trace.finished_at));
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        file.write_all(&body).await?;
        file.flush().await?;
        Ok(path)
    }
}

#[async_trait]
impl TraceSink for ReportStore {
    async fn persist(&self, trace: &DiagnosisTrace) -> Result<Option<PathBuf>, StorageError> {
        self.write(trace).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Alert, TriggerReason};
    use crate::diagnosis::{TraceLog, Verdict, VerdictStatus};
    use crate::feed::RouteUpdate;

    fn trace(prefix: &str) -> DiagnosisTrace {
        let update = RouteUpdate::announce(prefix, "174 12389", 1_700_000_000);
        let alert = Alert::from_update(&update, TriggerReason::OwnershipMismatch, Some("13414".into()), None);
        TraceLog::open(alert, "ctx".into()).seal(Verdict::unknown("x"))
    }

    #[test]
    fn file_name_is_filesystem_safe() {
        let t = trace("2001:db8::/32");
        let name = report_file_name(&t, t.finished_at);
        assert!(name.starts_with("analysis_2001_db8___32_"));
        assert!(name.ends_with(".json"));
        assert!(!name.contains('/'));
    }

    #[tokio::test]
    async fn written_once_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path().join("reports"));
        let t = trace("104.244.42.0/24");
        let path = store.write(&t).await.unwrap();
        let back: DiagnosisTrace =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back.verdict.status, VerdictStatus::Unknown);
        assert_eq!(back.alert.prefix, "104.244.42.0/24");

        // same trace, same instant, same name: refused rather than overwritten
        assert!(store.write(&t).await.is_err());
    }
}
