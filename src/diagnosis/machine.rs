//! Diagnosis state machine: `Round(1..=K)` investigation rounds, then at most one
//! forced verdict round, then `Done`. At most K + 1 reasoning calls per alert.

use super::prompt;
use super::{
    ChatMessage, Diagnoser, DiagnosisTrace, ReasoningCollaborator, ReasoningResponse, Round,
    RoundKind, TraceLog, Verdict,
};
use crate::config::DiagnosisConfig;
use crate::detect::Alert;
use crate::error::ReasoningError;
use crate::evidence::knowledge::render_cases;
use crate::evidence::{KnowledgeRetriever, ToolKit, NO_SIMILAR_CASES};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosisState {
    /// Investigation round k, 1-based
    Round(u32),
    Forced,
    Done,
}

/// Per-alert conversation and open trace.
struct Session<'a> {
    alert: &'a Alert,
    conversation: Vec<ChatMessage>,
    log: TraceLog,
    verdict: Option<Verdict>,
}

pub struct DiagnosisStateMachine {
    reasoning: Arc<dyn ReasoningCollaborator>,
    tools: Arc<ToolKit>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    config: DiagnosisConfig,
}

impl DiagnosisStateMachine {
    pub fn new(
        reasoning: Arc<dyn ReasoningCollaborator>,
        tools: Arc<ToolKit>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        config: DiagnosisConfig,
    ) -> Self {
        Self {
            reasoning,
            tools,
            knowledge,
            config,
        }
    }

    fn after_round(&self, k: u32) -> DiagnosisState {
        if k >= self.config.max_rounds {
            DiagnosisState::Forced
        } else {
            DiagnosisState::Round(k + 1)
        }
    }

    fn first_state(&self) -> DiagnosisState {
        if self.config.max_rounds == 0 {
            DiagnosisState::Forced
        } else {
            DiagnosisState::Round(1)
        }
    }

    async fn knowledge_context(&self, alert: &Alert) -> String {
        let lookup = self
            .knowledge
            .retrieve_similar(alert, self.config.knowledge_k);
        match tokio::time::timeout(self.config.tool_timeout(), lookup).await {
            Ok(Ok(cases)) => render_cases(&cases),
            Ok(Err(e)) => {
                warn!(alert_id = %alert.id, error = %e, "knowledge retrieval failed");
                NO_SIMILAR_CASES.to_string()
            }
            Err(_) => {
                warn!(alert_id = %alert.id, "knowledge retrieval timed out");
                NO_SIMILAR_CASES.to_string()
            }
        }
    }

    async fn ask(&self, session: &mut Session<'_>) -> Result<String, ReasoningError> {
        session.log.count_call();
        let timeout = self.config.reasoning_timeout();
        match tokio::time::timeout(timeout, self.reasoning.complete(&session.conversation)).await {
            Ok(reply) => reply,
            Err(_) => Err(ReasoningError::Timeout(timeout)),
        }
    }

    async fn investigate(&self, k: u32, session: &mut Session<'_>) -> DiagnosisState {
        let mut round = Round::new(k, RoundKind::Investigation);
        let raw = match self.ask(session).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(alert_id = %session.alert.id, round = k, error = %e, "reasoning call failed");
                round.error = Some(e.to_string());
                session.log.push(round);
                return self.after_round(k);
            }
        };
        let response = match ReasoningResponse::parse(&raw) {
            Ok(r) => r,
            Err(e) => {
                debug!(alert_id = %session.alert.id, round = k, error = %e, "unusable reasoning reply");
                round.error = Some(e.to_string());
                session.conversation.push(ChatMessage::assistant(raw));
                session
                    .conversation
                    .push(ChatMessage::user(prompt::reply_rejected(&e.to_string())));
                session.log.push(round);
                return self.after_round(k);
            }
        };
        round.thought = response.thought;
        round.suspicion = response.suspicion;
        session.conversation.push(ChatMessage::assistant(raw));

        // a tool request wins over a verdict in the same reply
        if let Some(request) = response.tool_request {
            round.tool = Some(request.name().to_string());
            let outcome = self
                .tools
                .run_check(&request, session.alert, self.config.tool_timeout())
                .await;
            let feedback = match outcome {
                Ok(output) => {
                    debug!(alert_id = %session.alert.id, round = k, tool = request.name(), "tool answered");
                    let feedback = prompt::tool_feedback(&output);
                    round.tool_output = Some(output);
                    feedback
                }
                Err(e) => {
                    warn!(alert_id = %session.alert.id, round = k, tool = request.name(), error = %e, "tool failed");
                    round.error = Some(e.to_string());
                    prompt::tool_failure(request.name(), &e.to_string())
                }
            };
            session.conversation.push(ChatMessage::user(feedback));
            session.log.push(round);
            return self.after_round(k);
        }

        if let Some(verdict) = response.final_verdict {
            session.log.push(round);
            session.verdict = Some(verdict);
            return DiagnosisState::Done;
        }

        session.conversation.push(ChatMessage::user(prompt::CONTINUE));
        session.log.push(round);
        self.after_round(k)
    }

    async fn force(&self, session: &mut Session<'_>) -> DiagnosisState {
        let mut round = Round::new(self.config.max_rounds + 1, RoundKind::Forced);
        session.conversation.push(ChatMessage::user(prompt::FORCED));
        let verdict = match self.ask(session).await {
            Ok(raw) => match ReasoningResponse::parse(&raw) {
                Ok(response) => {
                    round.thought = response.thought;
                    round.suspicion = response.suspicion;
                    match response.final_verdict {
                        Some(v) => v,
                        None => {
                            round.error = Some("forced round returned no verdict".to_string());
                            Verdict::unknown("no verdict after the investigation budget was exhausted")
                        }
                    }
                }
                Err(e) => {
                    round.error = Some(e.to_string());
                    Verdict::unknown(format!("forced round reply unusable: {e}"))
                }
            },
            Err(e) => {
                warn!(alert_id = %session.alert.id, error = %e, "forced reasoning call failed");
                round.error = Some(e.to_string());
                Verdict::unknown(format!("forced round failed: {e}"))
            }
        };
        session.log.push(round);
        session.verdict = Some(verdict);
        DiagnosisState::Done
    }

    pub async fn run(&self, alert: &Alert) -> DiagnosisTrace {
        let knowledge = self.knowledge_context(alert).await;
        let system = prompt::system_prompt(
            alert,
            &knowledge,
            &self.tools.available(),
            self.config.max_rounds,
        );
        let mut session = Session {
            alert,
            conversation: vec![ChatMessage::system(system), ChatMessage::user(prompt::OPENING)],
            log: TraceLog::open(alert.clone(), knowledge),
            verdict: None,
        };

        let mut state = self.first_state();
        loop {
            state = match state {
                DiagnosisState::Round(k) => self.investigate(k, &mut session).await,
                DiagnosisState::Forced => self.force(&mut session).await,
                DiagnosisState::Done => break,
            };
        }

        let verdict = session
            .verdict
            .unwrap_or_else(|| Verdict::unknown("diagnosis ended without a verdict"));
        let trace = session.log.seal(verdict);
        info!(
            alert_id = %trace.alert.id,
            prefix = %trace.alert.prefix,
            status = trace.verdict.status.as_str(),
            implicated = trace.verdict.implicated_asn.as_deref().unwrap_or("none"),
            rounds = trace.rounds.len(),
            calls = trace.reasoning_calls,
            "diagnosis sealed"
        );
        trace
    }
}

#[async_trait]
impl Diagnoser for DiagnosisStateMachine {
    async fn diagnose(&self, alert: &Alert) -> DiagnosisTrace {
        self.run(alert).await
    }
}
