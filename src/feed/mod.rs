//! Update feed: the route-update record and the sources that yield it.
//! A source returns `Ok(None)` at end of stream; errors are feed faults.

mod bgplay;
mod lines;
mod replay;
mod stop;

use crate::error::FeedError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;

pub use bgplay::BgplaySource;
pub use lines::JsonLinesSource;
pub use replay::ReplayWindow;
pub use stop::{StopHandle, Stoppable};

/// One announcement as observed by a collector. Never mutated after decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteUpdate {
    pub prefix: String,
    /// AS path, rightmost element is the origin; never empty
    pub path: Vec<String>,
    #[serde(default)]
    pub communities: Vec<String>,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_asn: Option<String>,
}

impl RouteUpdate {
    pub fn new(prefix: impl Into<String>, path: Vec<String>, timestamp: i64) -> Self {
        Self {
            prefix: prefix.into(),
            path,
            communities: Vec::new(),
            timestamp,
            collector: None,
            peer_asn: None,
        }
    }

    /// Build from a space-separated path string.
    pub fn announce(prefix: &str, path: &str, timestamp: i64) -> Self {
        Self::new(prefix, split_path(path), timestamp)
    }

    pub fn with_communities(mut self, communities: Vec<String>) -> Self {
        self.communities = communities;
        self
    }

    /// Announcing network (rightmost path element).
    pub fn origin(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    pub fn first_hop(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }

    pub fn path_string(&self) -> String {
        self.path.join(" ")
    }
}

pub(crate) fn split_path(path: &str) -> Vec<String> {
    path.split_whitespace().map(str::to_string).collect()
}

/// Wire form of one ndjson feed line. Lenient about field names and path shape.
#[derive(Debug, Deserialize)]
struct FeedLine {
    #[serde(default, alias = "type")]
    kind: Option<String>,
    prefix: String,
    #[serde(default, alias = "as_path", alias = "as-path", deserialize_with = "path_tokens")]
    path: Vec<String>,
    #[serde(default)]
    communities: Vec<serde_json::Value>,
    #[serde(alias = "time", alias = "ts")]
    timestamp: f64,
    #[serde(default)]
    collector: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    peer_asn: Option<String>,
}

impl FeedLine {
    /// Announcements with a non-empty path; withdrawals and empty paths are dropped.
    fn into_update(self) -> Option<RouteUpdate> {
        if matches!(self.kind.as_deref(), Some("W") | Some("withdrawal")) || self.path.is_empty() {
            return None;
        }
        Some(RouteUpdate {
            prefix: self.prefix,
            path: self.path,
            communities: self.communities.iter().map(value_token).collect(),
            timestamp: self.timestamp as i64,
            collector: self.collector,
            peer_asn: self.peer_asn,
        })
    }
}

fn value_token(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

fn path_tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => split_path(&s),
        serde_json::Value::Array(items) => items
            .iter()
            .map(value_token)
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_null()).map(|v| value_token(&v)))
}

/// Decode one feed line. `Ok(None)` for withdrawals and empty paths.
pub fn decode_line(line: &str) -> Result<Option<RouteUpdate>, FeedError> {
    let parsed: FeedLine = serde_json::from_str(line)?;
    Ok(parsed.into_update())
}

/// Yields route updates in arrival order.
#[async_trait]
pub trait UpdateSource: Send {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError>;
}

#[async_trait]
impl<S: UpdateSource + ?Sized> UpdateSource for Box<S> {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        (**self).next_update().await
    }
}

/// Pre-loaded updates, mainly for tests and benches.
#[derive(Debug, Default)]
pub struct MemorySource {
    updates: VecDeque<RouteUpdate>,
}

impl MemorySource {
    pub fn new(updates: impl IntoIterator<Item = RouteUpdate>) -> Self {
        Self {
            updates: updates.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UpdateSource for MemorySource {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        Ok(self.updates.pop_front())
    }
}
