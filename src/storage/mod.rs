//! Sealed-trace persistence.

mod report;

pub use report::{report_file_name, ReportStore};

use crate::diagnosis::DiagnosisTrace;
use crate::error::StorageError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::PathBuf;

/// Destination for sealed traces. Returns where the trace landed, if anywhere.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn persist(&self, trace: &DiagnosisTrace) -> Result<Option<PathBuf>, StorageError>;
}

/// Keeps traces in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    traces: Mutex<Vec<DiagnosisTrace>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<DiagnosisTrace> {
        self.traces.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.traces.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.lock().is_empty()
    }
}

#[async_trait]
impl TraceSink for MemorySink {
    async fn persist(&self, trace: &DiagnosisTrace) -> Result<Option<PathBuf>, StorageError> {
        self.traces.lock().push(trace.clone());
        Ok(None)
    }
}
