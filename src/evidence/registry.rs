//! Internet registry lookups (RPKI validity, geolocation, AS holder). RIPEstat when
//! online, always backed by offline tables; successful answers are cached per key.

use crate::config::EvidenceConfig;
use crate::error::EvidenceError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpkiStatus {
    Valid,
    InvalidAsn,
    InvalidLength,
    /// No covering ROA
    Unknown,
    /// Registry could not be reached
    Unavailable,
}

impl RpkiStatus {
    fn from_api(raw: &str) -> Self {
        match raw {
            "valid" => RpkiStatus::Valid,
            "invalid_asn" => RpkiStatus::InvalidAsn,
            "invalid_length" => RpkiStatus::InvalidLength,
            "invalid" => RpkiStatus::InvalidAsn,
            _ => RpkiStatus::Unknown,
        }
    }
}

impl fmt::Display for RpkiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RpkiStatus::Valid => "valid",
            RpkiStatus::InvalidAsn => "invalid_asn",
            RpkiStatus::InvalidLength => "invalid_length",
            RpkiStatus::Unknown => "unknown",
            RpkiStatus::Unavailable => "unavailable",
        })
    }
}

#[async_trait]
pub trait Registry: Send + Sync {
    async fn rpki_status(&self, prefix: &str, origin: &str) -> Result<RpkiStatus, EvidenceError>;

    /// Country code of an ASN or prefix.
    async fn country_of(&self, resource: &str) -> Result<Option<String>, EvidenceError>;

    async fn as_holder(&self, asn: &str) -> Result<Option<String>, EvidenceError>;
}

/// Static tables only; RPKI is always unavailable.
#[derive(Debug, Clone, Default)]
pub struct OfflineRegistry {
    geo: HashMap<String, String>,
    holders: HashMap<String, String>,
}

impl OfflineRegistry {
    pub fn new(geo: HashMap<String, String>, holders: HashMap<String, String>) -> Self {
        Self { geo, holders }
    }

    pub fn from_config(config: &EvidenceConfig) -> Self {
        Self::new(
            config.offline_geo.clone().into_iter().collect(),
            config.offline_as_names.clone().into_iter().collect(),
        )
    }
}

#[async_trait]
impl Registry for OfflineRegistry {
    async fn rpki_status(&self, _prefix: &str, _origin: &str) -> Result<RpkiStatus, EvidenceError> {
        Ok(RpkiStatus::Unavailable)
    }

    async fn country_of(&self, resource: &str) -> Result<Option<String>, EvidenceError> {
        Ok(self.geo.get(resource).cloned())
    }

    async fn as_holder(&self, asn: &str) -> Result<Option<String>, EvidenceError> {
        Ok(self.holders.get(asn).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct RpkiData {
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeoData {
    #[serde(default)]
    locations: Vec<GeoLocation>,
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverviewData {
    holder: Option<String>,
}

pub struct RipeStatRegistry {
    client: reqwest::Client,
    base_url: String,
    source_app: String,
    offline: OfflineRegistry,
    rpki_cache: Mutex<HashMap<(String, String), RpkiStatus>>,
    geo_cache: Mutex<HashMap<String, String>>,
    holder_cache: Mutex<HashMap<String, String>>,
}

impl RipeStatRegistry {
    pub fn new(config: &EvidenceConfig) -> Result<Self, EvidenceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.ripestat_url.trim_end_matches('/').to_string(),
            source_app: config.source_app.clone(),
            offline: OfflineRegistry::from_config(config),
            rpki_cache: Mutex::new(HashMap::new()),
            geo_cache: Mutex::new(HashMap::new()),
            holder_cache: Mutex::new(HashMap::new()),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>, EvidenceError> {
        let url = format!("{}/{}/data.json", self.base_url, endpoint);
        let envelope: Envelope<T> = self
            .client
            .get(&url)
            .query(params)
            .query(&[("sourceapp", self.source_app.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(envelope.data)
    }
}

fn looks_like_ip_resource(resource: &str) -> bool {
    resource.contains('.') || resource.contains(':')
}

#[async_trait]
impl Registry for RipeStatRegistry {
    async fn rpki_status(&self, prefix: &str, origin: &str) -> Result<RpkiStatus, EvidenceError> {
        let key = (prefix.to_string(), origin.to_string());
        if let Some(status) = self.rpki_cache.lock().get(&key) {
            return Ok(*status);
        }
        match self
            .get::<RpkiData>("rpki-validation", &[("resource", origin), ("prefix", prefix)])
            .await
        {
            Ok(data) => {
                let status = data
                    .and_then(|d| d.status)
                    .map(|s| RpkiStatus::from_api(&s))
                    .unwrap_or(RpkiStatus::Unknown);
                self.rpki_cache.lock().insert(key, status);
                Ok(status)
            }
            Err(e) => {
                debug!(prefix, origin, error = %e, "rpki lookup failed");
                Ok(RpkiStatus::Unavailable)
            }
        }
    }

    async fn country_of(&self, resource: &str) -> Result<Option<String>, EvidenceError> {
        if let Some(c) = self.offline.country_of(resource).await? {
            return Ok(Some(c));
        }
        if let Some(c) = self.geo_cache.lock().get(resource) {
            return Ok(Some(c.clone()));
        }
        // geoloc only answers for address space
        if !looks_like_ip_resource(resource) {
            return Ok(None);
        }
        match self.get::<GeoData>("geoloc", &[("resource", resource)]).await {
            Ok(data) => {
                let country = data
                    .and_then(|d| d.locations.into_iter().find_map(|l| l.country));
                if let Some(c) = &country {
                    self.geo_cache.lock().insert(resource.to_string(), c.clone());
                }
                Ok(country)
            }
            Err(e) => {
                debug!(resource, error = %e, "geoloc lookup failed");
                Ok(None)
            }
        }
    }

    async fn as_holder(&self, asn: &str) -> Result<Option<String>, EvidenceError> {
        if let Some(h) = self.offline.as_holder(asn).await? {
            return Ok(Some(h));
        }
        if let Some(h) = self.holder_cache.lock().get(asn) {
            return Ok(Some(h.clone()));
        }
        match self.get::<OverviewData>("as-overview", &[("resource", asn)]).await {
            Ok(data) => {
                let holder = data.and_then(|d| d.holder).filter(|h| !h.is_empty());
                if let Some(h) = &holder {
                    self.holder_cache.lock().insert(asn.to_string(), h.clone());
                }
                Ok(holder)
            }
            Err(e) => {
                debug!(asn, error = %e, "as-overview lookup failed");
                Ok(None)
            }
        }
    }
}
