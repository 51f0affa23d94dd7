//! Normalisation of one reasoning reply. Replies are loosely structured JSON; key
//! aliases and the different shapes a tool request can take are folded into one type.

use super::{Verdict, VerdictStatus};
use crate::error::ReasoningError;
use crate::evidence::ToolRequest;
use serde_json::{Map, Value};

const THOUGHT_KEYS: &[&str] = &["thought", "thought_process", "reasoning"];
const SUSPICION_KEYS: &[&str] = &["suspicion", "suspicion_level"];
const TOOL_KEYS: &[&str] = &["toolRequest", "tool_request", "tool"];
const VERDICT_KEYS: &[&str] = &["finalVerdict", "final_verdict", "final_decision", "verdict"];
const TOOL_NAME_KEYS: &[&str] = &["name", "tool", "tool_name", "id", "function"];
const IMPLICATED_KEYS: &[&str] = &[
    "implicated_asn",
    "implicatedAsn",
    "implicated_network",
    "most_likely_hijacker",
    "suspect",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReasoningResponse {
    pub thought: Option<String>,
    pub suspicion: Option<String>,
    pub tool_request: Option<ToolRequest>,
    pub final_verdict: Option<Verdict>,
}

impl ReasoningResponse {
    pub fn parse(raw: &str) -> Result<Self, ReasoningError> {
        let body = extract_json(raw);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ReasoningError::Malformed(format!("{e}: {}", preview(raw))))?;
        Self::from_value(&value)
    }

    pub fn from_value(value: &Value) -> Result<Self, ReasoningError> {
        let Value::Object(map) = value else {
            return Err(ReasoningError::Malformed(format!(
                "expected a JSON object, got {}",
                preview(&value.to_string())
            )));
        };
        Ok(Self {
            thought: first(map, THOUGHT_KEYS).and_then(text),
            suspicion: first(map, SUSPICION_KEYS).and_then(text),
            tool_request: first(map, TOOL_KEYS)
                .and_then(tool_name)
                .map(|name| ToolRequest::parse(&name)),
            final_verdict: first(map, VERDICT_KEYS).and_then(verdict),
        })
    }
}

fn preview(raw: &str) -> String {
    raw.chars().take(120).collect()
}

/// Strip markdown fences and anything outside the outermost object.
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| map.get(*k)).filter(|v| !v.is_null())
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        other => Some(other.to_string()),
    }
}

/// A tool request may be a name, a list of names (first usable wins) or an object
/// naming the tool.
fn tool_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            let absent = s.is_empty()
                || s.eq_ignore_ascii_case("null")
                || s.eq_ignore_ascii_case("none");
            (!absent).then(|| s.to_string())
        }
        Value::Array(items) => items.iter().find_map(tool_name),
        Value::Object(map) => TOOL_NAME_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(tool_name))
            // `{"geo_check": {...}}`; a name field without a usable name is no request
            .or_else(|| match map.len() {
                1 => map
                    .keys()
                    .next()
                    .filter(|k| !TOOL_NAME_KEYS.contains(&k.as_str()))
                    .cloned(),
                _ => None,
            }),
        _ => None,
    }
}

fn confidence(value: &Value) -> f64 {
    let raw = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => {
            let s = s.trim().trim_end_matches('%');
            match s.to_ascii_lowercase().as_str() {
                "high" => 0.9,
                "medium" => 0.6,
                "low" => 0.3,
                other => other.parse::<f64>().unwrap_or(0.0),
            }
        }
        _ => 0.0,
    };
    let scaled = if raw > 1.0 { raw / 100.0 } else { raw };
    scaled.clamp(0.0, 1.0)
}

fn implicated(value: &Value) -> Option<String> {
    let asn = text(value)?;
    let asn = asn.trim_start_matches("AS").trim_start_matches("as").trim();
    match asn.to_ascii_lowercase().as_str() {
        "" | "none" | "null" | "n/a" | "unknown" => None,
        _ => Some(asn.to_string()),
    }
}

fn verdict(value: &Value) -> Option<Verdict> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(Verdict {
            status: VerdictStatus::parse(s),
            implicated_asn: None,
            confidence: 0.0,
            summary: String::new(),
        }),
        Value::Object(map) if !map.is_empty() => Some(Verdict {
            status: first(map, &["status", "verdict", "classification"])
                .and_then(text)
                .map(|s| VerdictStatus::parse(&s))
                .unwrap_or(VerdictStatus::Unknown),
            implicated_asn: first(map, IMPLICATED_KEYS).and_then(implicated),
            confidence: first(map, &["confidence", "confidence_score"])
                .map(confidence)
                .unwrap_or(0.0),
            summary: first(map, &["summary", "reason", "explanation"])
                .and_then(text)
                .unwrap_or_default(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::ToolId;

    #[test]
    fn fenced_reply_with_tool() {
        let raw = "```json\n{\"thought\": \"check rpki\", \"toolRequest\": \"authority_check\"}\n```";
        let r = ReasoningResponse::parse(raw).unwrap();
        assert_eq!(r.thought.as_deref(), Some("check rpki"));
        assert_eq!(r.tool_request, Some(ToolRequest::Known(ToolId::AuthorityCheck)));
        assert!(r.final_verdict.is_none());
    }

    #[test]
    fn tool_request_shapes() {
        for raw in [
            r#"{"tool_request": ["null", "geo_check", "authority_check"]}"#,
            r#"{"toolRequest": {"name": "geo_check", "args": {}}}"#,
            r#"{"toolRequest": {"geo_check": {"prefix": "x"}}}"#,
            r#"{"toolRequest": "  geo_check "}"#,
        ] {
            let r = ReasoningResponse::parse(raw).unwrap();
            assert_eq!(r.tool_request, Some(ToolRequest::Known(ToolId::GeoCheck)), "{raw}");
        }
        for raw in [
            r#"{"toolRequest": "none"}"#,
            r#"{"toolRequest": null}"#,
            r#"{"toolRequest": 42}"#,
            r#"{"toolRequest": {"a": 1, "b": 2}}"#,
            r#"{"toolRequest": []}"#,
            r#"{"toolRequest": {"name": 42}}"#,
            r#"{"toolRequest": {"tool": null}}"#,
            r#"{"toolRequest": {"function": ""}}"#,
        ] {
            assert_eq!(ReasoningResponse::parse(raw).unwrap().tool_request, None, "{raw}");
        }
    }

    #[test]
    fn verdict_aliases_and_normalisation() {
        let raw = r#"{"thought_process": "done", "final_decision": {"status": "malicious", "most_likely_hijacker": "AS12389", "confidence": "95%", "summary": "forged origin"}}"#;
        let v = ReasoningResponse::parse(raw).unwrap().final_verdict.unwrap();
        assert_eq!(v.status, VerdictStatus::Malicious);
        assert_eq!(v.implicated_asn.as_deref(), Some("12389"));
        assert!((v.confidence - 0.95).abs() < 1e-9);

        let raw = r#"{"finalVerdict": {"status": "BENIGN", "implicated_asn": "none", "confidence": 0.8}}"#;
        let v = ReasoningResponse::parse(raw).unwrap().final_verdict.unwrap();
        assert_eq!(v.implicated_asn, None);
    }

    #[test]
    fn malformed_and_non_object() {
        assert!(matches!(
            ReasoningResponse::parse("not json at all"),
            Err(ReasoningError::Malformed(_))
        ));
        assert!(matches!(
            ReasoningResponse::parse("[1, 2]"),
            Err(ReasoningError::Malformed(_))
        ));
    }

    #[test]
    fn unsupported_tool_is_kept() {
        let r = ReasoningResponse::parse(r#"{"toolRequest": "whois"}"#).unwrap();
        assert_eq!(r.tool_request, Some(ToolRequest::Unsupported("whois".into())));
    }
}
