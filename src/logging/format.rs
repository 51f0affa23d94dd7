//! JSON log lines: one JSON object per line (ndjson) for ingestion and audit.

use crate::diagnosis::DiagnosisTrace;
use serde::Serialize;
use std::io::Write;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// One verdict per line, appended to the verdict index next to the reports.
#[derive(Debug, Serialize)]
pub struct VerdictLine<'a> {
    pub ts: String,
    pub alert_id: &'a str,
    pub prefix: &'a str,
    pub origin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_owner: Option<&'a str>,
    pub trigger: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomaly_score: Option<f64>,
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implicated_asn: Option<&'a str>,
    pub confidence: f64,
    pub rounds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl<'a> VerdictLine<'a> {
    pub fn from_trace(trace: &'a DiagnosisTrace, report: Option<String>) -> Self {
        Self {
            ts: trace.finished_at.to_rfc3339(),
            alert_id: &trace.alert.id,
            prefix: &trace.alert.prefix,
            origin: &trace.alert.origin,
            expected_owner: trace.alert.expected_owner.as_deref(),
            trigger: trace.alert.reason.as_str(),
            anomaly_score: trace.alert.anomaly_score,
            status: trace.verdict.status.as_str(),
            implicated_asn: trace.verdict.implicated_asn.as_deref(),
            confidence: trace.verdict.confidence,
            rounds: trace.rounds.len(),
            report,
        }
    }
}

/// Initialize tracing with JSON format (one JSON object per line)
pub struct StructuredLogger;

impl StructuredLogger {
    /// Install global subscriber: JSON lines to stderr, level from RUST_LOG or default.
    pub fn init(json: bool, default_level: &str) {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        if json {
            let fmt = tracing_subscriber::fmt::layer()
                .json()
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry().with(filter).with(fmt).init();
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    /// Emit a single structured line without going through tracing
    pub fn emit_json(event: &impl Serialize, w: &mut impl Write) {
        if let Ok(line) = serde_json::to_string(event) {
            let _ = writeln!(w, "{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Alert, TriggerReason};
    use crate::diagnosis::{TraceLog, Verdict, VerdictStatus};
    use crate::feed::RouteUpdate;

    #[test]
    fn verdict_line_is_one_json_object() {
        let alert = Alert::from_update(
            &RouteUpdate::announce("104.244.42.0/24", "174 12389", 0),
            TriggerReason::OwnershipMismatch,
            Some("13414".into()),
            None,
        );
        let trace = TraceLog::open(alert, String::new()).seal(Verdict {
            status: VerdictStatus::Malicious,
            implicated_asn: Some("12389".into()),
            confidence: 0.9,
            summary: "forged origin".into(),
        });
        let mut buf = Vec::new();
        StructuredLogger::emit_json(&VerdictLine::from_trace(&trace, None), &mut buf);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text.lines().count(), 1);
        let v: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(v["status"], "MALICIOUS");
        assert_eq!(v["implicated_asn"], "12389");
        assert!(v.get("report").is_none());
    }
}
