//! Uplink client: report sealed verdicts to a remote collector.

use crate::config::UplinkConfig;
use crate::diagnosis::DiagnosisTrace;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Payload for the verdict endpoint.
#[derive(Serialize)]
struct VerdictPayload<'a> {
    alert_id: &'a str,
    prefix: &'a str,
    as_path: String,
    origin: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected_owner: Option<&'a str>,
    trigger: &'a str,
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    implicated_asn: Option<&'a str>,
    confidence: f64,
    summary: &'a str,
    observed_at: i64,
    sealed_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<&'a str>,
}

pub struct UplinkClient {
    client: reqwest::Client,
    endpoint: String,
}

impl UplinkClient {
    /// `None` when disabled, without an endpoint, or when the HTTP client cannot be built.
    pub fn new(config: &UplinkConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let endpoint = config.endpoint.as_ref()?.trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| warn!(error = %e, "uplink client not built"))
            .ok()?;
        Some(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), String> {
        let url = format!("{}{}", self.endpoint, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, text));
        }
        Ok(())
    }

    /// Report one sealed verdict; `report` is where the full trace was stored.
    pub async fn report(&self, trace: &DiagnosisTrace, report: Option<&str>) -> Result<(), String> {
        let payload = VerdictPayload {
            alert_id: &trace.alert.id,
            prefix: &trace.alert.prefix,
            as_path: trace.alert.path_string(),
            origin: &trace.alert.origin,
            expected_owner: trace.alert.expected_owner.as_deref(),
            trigger: trace.alert.reason.as_str(),
            status: trace.verdict.status.as_str(),
            implicated_asn: trace.verdict.implicated_asn.as_deref(),
            confidence: trace.verdict.confidence,
            summary: &trace.verdict.summary,
            observed_at: trace.alert.timestamp,
            sealed_at: trace.finished_at.to_rfc3339(),
            report,
        };
        self.post("/api/v1/verdicts", &payload).await?;
        debug!(alert_id = %trace.alert.id, status = payload.status, "uplink verdict reported");
        Ok(())
    }
}
