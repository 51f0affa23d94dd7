//! Historical case library. Cases are ranked by token-set overlap between the alert
//! query and each case's scenario text.

use crate::detect::Alert;
use crate::error::KnowledgeError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Context text used when retrieval finds nothing or fails.
pub const NO_SIMILAR_CASES: &str = "(no similar historical cases found)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarCase {
    pub id: String,
    pub kind: String,
    pub scenario: String,
    pub analysis: String,
    pub conclusion: String,
    /// Jaccard similarity in (0, 1]
    pub similarity: f64,
}

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    async fn retrieve_similar(&self, alert: &Alert, k: usize)
        -> Result<Vec<SimilarCase>, KnowledgeError>;
}

/// Render retrieved cases as conversation context.
pub fn render_cases(cases: &[SimilarCase]) -> String {
    if cases.is_empty() {
        return NO_SIMILAR_CASES.to_string();
    }
    cases
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "--- [reference case #{} | relevance: {:.2}] ---\ntype: {}\nscenario: {}\nanalysis: {}\nconclusion: {}",
                i + 1,
                c.similarity,
                c.kind,
                c.scenario,
                c.analysis,
                c.conclusion
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn query_text(alert: &Alert) -> String {
    format!(
        "BGP anomaly prefix {} path {} origin {}",
        alert.prefix,
        alert.path_string(),
        alert.origin
    )
}

/// Lowercased tokens; `AS12389` and `12389` are the same token.
fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '/' || c == ':'))
        .map(|t| t.trim_matches(|c| c == '.' || c == ':').to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| match t.strip_prefix("as") {
            Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                digits.to_string()
            }
            _ => t,
        })
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[derive(Debug, Clone)]
struct StoredCase {
    id: String,
    kind: String,
    scenario: String,
    analysis: String,
    conclusion: String,
    tokens: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CaseLibrary {
    cases: Vec<StoredCase>,
}

fn text_field(case: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match case.get(*k)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    })
}

impl CaseLibrary {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Cases as raw JSON objects. Duplicate ids get a numeric suffix.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cases = Vec::new();
        for case in values {
            let base = text_field(&case, &["id"]).unwrap_or_else(|| format!("auto_{}", cases.len()));
            let mut id = base.clone();
            let mut retry = 0;
            while seen.contains(&id) {
                retry += 1;
                id = format!("{base}_{retry}");
            }
            seen.insert(id.clone());

            let scenario = text_field(&case, &["scenario_desc", "scenario"])
                .unwrap_or_else(|| case.to_string());
            let kind = text_field(&case, &["type"]).unwrap_or_else(|| "Unknown".to_string());
            let tokens = tokenize(&format!("{kind} {scenario}"));
            cases.push(StoredCase {
                id,
                kind,
                analysis: text_field(&case, &["analysis", "analysis_logic"])
                    .unwrap_or_else(|| "N/A".to_string()),
                conclusion: text_field(&case, &["conclusion"]).unwrap_or_else(|| "N/A".to_string()),
                scenario,
                tokens,
            });
        }
        Self { cases }
    }

    /// JSON array file, or one JSON object per line.
    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let data = std::fs::read_to_string(path)?;
        let values: Vec<Value> = if data.trim_start().starts_with('[') {
            serde_json::from_str(&data)?
        } else {
            data.lines()
                .filter(|l| !l.trim().is_empty())
                .map(serde_json::from_str::<Value>)
                .collect::<Result<_, _>>()?
        };
        let library = Self::from_values(values);
        info!(path = %path.display(), cases = library.len(), "case library loaded");
        Ok(library)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<SimilarCase> {
        let query = tokenize(query);
        let mut ranked: Vec<(f64, &StoredCase)> = self
            .cases
            .iter()
            .map(|c| (jaccard(&query, &c.tokens), c))
            .filter(|(s, _)| *s > 0.0)
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
            .into_iter()
            .take(k)
            .map(|(similarity, c)| SimilarCase {
                id: c.id.clone(),
                kind: c.kind.clone(),
                scenario: c.scenario.clone(),
                analysis: c.analysis.clone(),
                conclusion: c.conclusion.clone(),
                similarity,
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeRetriever for CaseLibrary {
    async fn retrieve_similar(
        &self,
        alert: &Alert,
        k: usize,
    ) -> Result<Vec<SimilarCase>, KnowledgeError> {
        Ok(self.search(&query_text(alert), k))
    }
}
