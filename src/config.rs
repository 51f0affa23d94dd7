//! Sentinel configuration. One JSON document; every section has defaults so a
//! partial file is enough.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Directory for write-once diagnosis reports
    pub report_dir: PathBuf,
    /// Where updates come from
    pub source: SourceConfig,
    /// Authoritative prefix -> owner table
    pub ownership: OwnershipConfig,
    /// Per-resource feature state
    pub features: FeaturesConfig,
    /// Novelty model parameters
    pub scorer: ScorerConfig,
    /// Alert cooldown
    pub suppression: SuppressionConfig,
    /// Queue capacity and worker pool size
    pub dispatch: DispatchConfig,
    /// Round budget and collaborator timeouts
    pub diagnosis: DiagnosisConfig,
    /// Reasoning collaborator endpoint
    pub reasoning: ReasoningConfig,
    /// Registry lookups and offline tables for evidence tools
    pub evidence: EvidenceConfig,
    /// Historical case library
    pub knowledge: KnowledgeConfig,
    /// Optional verdict uplink
    pub uplink: UplinkConfig,
    /// Logging
    pub log: LogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Indefinite ndjson stream on stdin
    Live,
    /// Bounded replay of a file or BGPlay window
    Replay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayInput {
    File,
    Bgplay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    pub replay: ReplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    pub input: ReplayInput,
    /// ndjson update file (input = file)
    pub path: Option<PathBuf>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Only this prefix is replayed; required for BGPlay
    pub prefix: Option<String>,
    /// BGPlay endpoint
    pub bgplay_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnershipConfig {
    /// Inline prefix -> owning ASN entries
    pub table: BTreeMap<String, String>,
    /// Optional JSON object file merged over the inline table
    pub table_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Lock shards for per-resource history
    pub shards: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Vectors buffered before the model is fit and frozen
    pub warmup_size: usize,
    /// Number of isolation trees
    pub trees: usize,
    /// Sub-sample size per tree
    pub sample_size: usize,
    /// Expected outlier fraction; sets the outlier cut-off
    pub contamination: f64,
    /// Novelty alerts need a score strictly above this (0.0–1.0)
    pub score_threshold: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Minimum seconds between two admitted alerts for one resource
    pub cooldown_secs: i64,
    /// Ownership-mismatch alerts bypass the cooldown when set
    pub exempt_ownership_mismatch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Bounded queue capacity (C)
    pub queue_capacity: usize,
    /// Diagnosis workers (N)
    pub workers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosisConfig {
    /// Investigation rounds before the forced round (K)
    pub max_rounds: u32,
    pub reasoning_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    /// Similar cases retrieved to seed the conversation
    pub knowledge_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvidenceConfig {
    /// Query RIPEstat; offline tables only when false
    pub online: bool,
    pub ripestat_url: String,
    pub source_app: String,
    pub request_timeout_secs: u64,
    pub tier1_asns: Vec<String>,
    pub europe_region_codes: Vec<String>,
    /// Resource (ASN or prefix) -> country code
    pub offline_geo: BTreeMap<String, String>,
    /// ASN -> holder name
    pub offline_as_names: BTreeMap<String, String>,
    /// Prefix -> origin used when RPKI has no answer
    pub known_prefix_origins: BTreeMap<String, String>,
    /// AS topology graph (JSON)
    pub topology_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Historical cases, one JSON object per line
    pub cases_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UplinkConfig {
    pub enabled: bool,
    /// Verdicts are POSTed here when enabled
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("report"),
            source: SourceConfig::default(),
            ownership: OwnershipConfig::default(),
            features: FeaturesConfig::default(),
            scorer: ScorerConfig::default(),
            suppression: SuppressionConfig::default(),
            dispatch: DispatchConfig::default(),
            diagnosis: DiagnosisConfig::default(),
            reasoning: ReasoningConfig::default(),
            evidence: EvidenceConfig::default(),
            knowledge: KnowledgeConfig::default(),
            uplink: UplinkConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Live,
            replay: ReplayConfig::default(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input: ReplayInput::File,
            path: None,
            from: None,
            until: None,
            prefix: None,
            bgplay_url: "https://stat.ripe.net/data/bgplay/data.json".to_string(),
        }
    }
}

impl Default for OwnershipConfig {
    fn default() -> Self {
        let table = [
            ("104.244.42.0/24", "13414"),
            ("8.8.8.0/24", "15169"),
            ("208.65.153.0/24", "36561"),
        ]
        .into_iter()
        .map(|(p, o)| (p.to_string(), o.to_string()))
        .collect();
        Self {
            table,
            table_path: None,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self { shards: 16 }
    }
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            warmup_size: 10_000,
            trees: 100,
            sample_size: 256,
            contamination: 0.05,
            score_threshold: 0.6,
            seed: 42,
        }
    }
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 300,
            exempt_ownership_mismatch: false,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            workers: 5,
        }
    }
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            reasoning_timeout_secs: 60,
            tool_timeout_secs: 15,
            knowledge_k: 2,
        }
    }
}

impl DiagnosisConfig {
    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_secs(self.reasoning_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.deepseek.com".to_string(),
            model: "deepseek-chat".to_string(),
            api_key_env: "BGP_SENTINEL_API_KEY".to_string(),
            temperature: 0.0,
        }
    }
}

fn string_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        let tier1 = [
            "174", "209", "286", "701", "1239", "1299", "2828", "2914", "3257", "3320", "3356",
            "3491", "5511", "6453", "6461", "6762", "6830", "7018", "12956",
        ];
        let europe = [
            "AT", "BE", "BG", "CH", "CY", "CZ", "DE", "DK", "EE", "ES", "FI", "FR", "GB", "GR",
            "HR", "HU", "IE", "IS", "IT", "LT", "LU", "LV", "MT", "NL", "NO", "PL", "PT", "RO",
            "SE", "SI", "SK",
        ];
        Self {
            online: true,
            ripestat_url: "https://stat.ripe.net/data".to_string(),
            source_app: "bgp-sentinel".to_string(),
            request_timeout_secs: 5,
            tier1_asns: tier1.iter().map(|s| s.to_string()).collect(),
            europe_region_codes: europe.iter().map(|s| s.to_string()).collect(),
            offline_geo: string_map(&[
                ("12389", "RU"),
                ("13414", "US"),
                ("174", "US"),
                ("104.244.42.0/24", "US"),
                ("2914", "JP"),
            ]),
            offline_as_names: string_map(&[
                ("12389", "PJSC Rostelecom"),
                ("13414", "Twitter Inc."),
                ("174", "Cogent"),
            ]),
            known_prefix_origins: string_map(&[("104.244.42.0/24", "13414")]),
            topology_path: None,
        }
    }
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: 15,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl SentinelConfig {
    /// Load from JSON file if present; otherwise return default
    pub fn load(path: &std::path::Path) -> Self {
        if path.exists() {
            if let Ok(data) = std::fs::read_to_string(path) {
                match serde_json::from_str::<SentinelConfig>(&data) {
                    Ok(c) => return c,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "config unparsable; using defaults")
                    }
                }
            }
        }
        Self::default()
    }
}
