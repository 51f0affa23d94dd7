//! Bounded multi-round diagnosis of one alert. A trace is opened per alert, grows one
//! round at a time and is sealed exactly once with a verdict.

mod machine;
pub mod prompt;
mod reasoning;
mod response;

pub use machine::{DiagnosisState, DiagnosisStateMachine};
pub use reasoning::{ChatCompletionsClient, ChatMessage, ReasoningCollaborator, Role};
pub use response::ReasoningResponse;

use crate::detect::Alert;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictStatus {
    /// Deliberate hijack
    Malicious,
    /// Route leak
    Leak,
    Benign,
    Unknown,
    /// Diagnosis itself failed
    Error,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictStatus::Malicious => "MALICIOUS",
            VerdictStatus::Leak => "LEAK",
            VerdictStatus::Benign => "BENIGN",
            VerdictStatus::Unknown => "UNKNOWN",
            VerdictStatus::Error => "ERROR",
        }
    }

    /// Lenient parse of a status named by the reasoning step. `ERROR` is reserved for
    /// internal failures and reads as unknown.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace([' ', '-'], "_").as_str() {
            "MALICIOUS" | "HIJACK" | "ORIGIN_HIJACK" | "ATTACK" => VerdictStatus::Malicious,
            "LEAK" | "ROUTE_LEAK" => VerdictStatus::Leak,
            "BENIGN" | "LEGITIMATE" | "NORMAL" | "SAFE" => VerdictStatus::Benign,
            _ => VerdictStatus::Unknown,
        }
    }
}

impl fmt::Display for VerdictStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub status: VerdictStatus,
    /// Network held responsible; `None` when no one is
    pub implicated_asn: Option<String>,
    /// 0.0–1.0
    pub confidence: f64,
    pub summary: String,
}

impl Verdict {
    pub fn unknown(summary: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Unknown,
            implicated_asn: None,
            confidence: 0.0,
            summary: summary.into(),
        }
    }

    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            status: VerdictStatus::Error,
            ..Self::unknown(summary)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Investigation,
    /// Final verdict-only round
    Forced,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    pub index: u32,
    pub kind: RoundKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspicion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    /// Collaborator failure recorded for this round
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Round {
    pub fn new(index: u32, kind: RoundKind) -> Self {
        Self {
            index,
            kind,
            thought: None,
            suspicion: None,
            tool: None,
            tool_output: None,
            error: None,
        }
    }
}

/// Sealed record of one diagnosis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisTrace {
    pub alert: Alert,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub knowledge_context: String,
    pub rounds: Vec<Round>,
    pub reasoning_calls: u32,
    pub verdict: Verdict,
}

impl DiagnosisTrace {
    /// Trace for a diagnosis that never completed.
    pub fn failed(alert: Alert, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            alert,
            started_at: now,
            finished_at: now,
            knowledge_context: String::new(),
            rounds: Vec::new(),
            reasoning_calls: 0,
            verdict: Verdict::error(reason),
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &str> {
        self.rounds.iter().filter_map(|r| r.tool.as_deref())
    }
}

/// Open trace; only `seal` turns it into a `DiagnosisTrace`.
#[derive(Debug)]
pub struct TraceLog {
    alert: Alert,
    started_at: DateTime<Utc>,
    knowledge_context: String,
    rounds: Vec<Round>,
    reasoning_calls: u32,
}

impl TraceLog {
    pub fn open(alert: Alert, knowledge_context: String) -> Self {
        Self {
            alert,
            started_at: Utc::now(),
            knowledge_context,
            rounds: Vec::new(),
            reasoning_calls: 0,
        }
    }

    pub fn push(&mut self, round: Round) {
        self.rounds.push(round);
    }

    pub fn count_call(&mut self) {
        self.reasoning_calls += 1;
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn seal(self, verdict: Verdict) -> DiagnosisTrace {
        DiagnosisTrace {
            alert: self.alert,
            started_at: self.started_at,
            finished_at: Utc::now(),
            knowledge_context: self.knowledge_context,
            rounds: self.rounds,
            reasoning_calls: self.reasoning_calls,
            verdict,
        }
    }
}

/// Turns an alert into a sealed trace. Never fails: every failure ends in a verdict.
#[async_trait]
pub trait Diagnoser: Send + Sync {
    async fn diagnose(&self, alert: &Alert) -> DiagnosisTrace;
}
