//! Conversation text for diagnosis.

use crate::detect::Alert;
use crate::evidence::ToolId;

pub const OPENING: &str = "A BGP anomaly has been detected. Begin the analysis.";

pub const CONTINUE: &str =
    "Continue the analysis: request another tool, or give finalVerdict if the evidence is sufficient.";

pub const FORCED: &str = "SYSTEM INSTRUCTION: the investigation budget is exhausted. No further tools will run. \
Using the historical cases and the evidence gathered so far, reply now with finalVerdict. toolRequest must be null.";

pub fn system_prompt(alert: &Alert, knowledge: &str, tools: &[ToolId], max_rounds: u32) -> String {
    let tool_list = tools
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. `{}`: {}.", i + 1, t.as_str(), t.describe()))
        .collect::<Vec<_>>()
        .join("\n");
    let score = alert
        .anomaly_score
        .map(|s| format!("{s:.3}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        r#"You are a BGP security analyst. Classify the anomaly below using the historical cases and live evidence tools.

Available tools:
{tool_list}

Procedure: you have at most {max_rounds} investigation rounds. Request one tool per round; after the last round you must give a verdict without tools.

Reply with a single JSON object:
{{
  "thought": "reasoning about the evidence so far",
  "suspicion": "low | medium | high",
  "toolRequest": "tool_name" or null,
  "finalVerdict": null or {{
    "status": "MALICIOUS | LEAK | BENIGN | UNKNOWN",
    "implicated_asn": "ASN held responsible, or none",
    "confidence": 0.0 to 1.0,
    "summary": "one-paragraph conclusion"
  }}
}}

Historical reference cases:
{knowledge}

Alert under analysis:
Prefix: {prefix}
AS path: {path}
Origin: AS{origin}
Expected owner: {expected}
Trigger: {reason}
Anomaly score: {score}"#,
        prefix = alert.prefix,
        path = alert.path_string(),
        origin = alert.origin,
        expected = alert
            .expected_owner
            .as_deref()
            .map(|o| format!("AS{o}"))
            .unwrap_or_else(|| "unknown".to_string()),
        reason = alert.reason.as_str(),
    )
}

pub fn tool_feedback(output: &str) -> String {
    format!("TOOL RESULT:\n{output}\n\nContinue the analysis based on this result; do not conclude prematurely.")
}

pub fn tool_failure(tool: &str, error: &str) -> String {
    format!("TOOL RESULT:\n{tool} failed: {error}\n\nContinue with the evidence available.")
}

pub fn reply_rejected(error: &str) -> String {
    format!("Your previous reply could not be used ({error}). Reply with a single JSON object in the required format.")
}
