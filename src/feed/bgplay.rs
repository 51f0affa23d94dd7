//! Replay straight from the RIPEstat BGPlay API: one request for the whole window,
//! announcements yielded in event order.

use super::{RouteUpdate, UpdateSource};
use crate::error::FeedError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize)]
struct BgplayResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<BgplayData>,
}

#[derive(Debug, Deserialize)]
struct BgplayData {
    #[serde(default)]
    events: Vec<BgplayEvent>,
}

#[derive(Debug, Deserialize)]
struct BgplayEvent {
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
    attrs: BgplayAttrs,
}

#[derive(Debug, Deserialize)]
struct BgplayAttrs {
    #[serde(default)]
    path: Vec<serde_json::Value>,
    #[serde(default)]
    community: Vec<String>,
    #[serde(default)]
    source_id: Option<String>,
    target_prefix: String,
}

fn parse_timestamp(raw: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|t| t.and_utc().timestamp())
}

impl BgplayEvent {
    fn into_update(self) -> Option<RouteUpdate> {
        if self.kind != "A" {
            return None;
        }
        let path: Vec<String> = self
            .attrs
            .path
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        if path.is_empty() {
            return None;
        }
        Some(RouteUpdate {
            prefix: self.attrs.target_prefix,
            path,
            communities: self.attrs.community,
            timestamp: parse_timestamp(&self.timestamp)?,
            collector: self.attrs.source_id,
            peer_asn: None,
        })
    }
}

pub struct BgplaySource {
    client: reqwest::Client,
    url: String,
    prefix: String,
    from: DateTime<Utc>,
    until: DateTime<Utc>,
    source_app: String,
    pending: Option<VecDeque<RouteUpdate>>,
}

impl BgplaySource {
    pub fn new(
        url: impl Into<String>,
        prefix: impl Into<String>,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
        source_app: impl Into<String>,
    ) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            prefix: prefix.into(),
            from,
            until,
            source_app: source_app.into(),
            pending: None,
        })
    }

    async fn fetch(&self) -> Result<VecDeque<RouteUpdate>, FeedError> {
        let fmt = "%Y-%m-%dT%H:%M:%S";
        let starttime = self.from.format(fmt).to_string();
        let endtime = self.until.format(fmt).to_string();
        let res: BgplayResponse = self
            .client
            .get(&self.url)
            .query(&[
                ("resource", self.prefix.as_str()),
                ("starttime", starttime.as_str()),
                ("endtime", endtime.as_str()),
                ("sourceapp", self.source_app.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if res.status != "ok" {
            return Err(FeedError::Rejected(
                res.message.unwrap_or_else(|| res.status.clone()),
            ));
        }
        let updates: VecDeque<RouteUpdate> = res
            .data
            .map(|d| d.events)
            .unwrap_or_default()
            .into_iter()
            .filter_map(BgplayEvent::into_update)
            .collect();
        info!(prefix = %self.prefix, count = updates.len(), "BGPlay window fetched");
        Ok(updates)
    }
}

#[async_trait]
impl UpdateSource for BgplaySource {
    async fn next_update(&mut self) -> Result<Option<RouteUpdate>, FeedError> {
        if self.pending.is_none() {
            self.pending = Some(self.fetch().await?);
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }
}
