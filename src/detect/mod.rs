//! Detection: feature extraction + hard ownership rule + novelty scorer + cooldown.
//! At most one alert per update.

mod ownership;
mod suppress;

pub use ownership::{MatchOutcome, OwnershipRule, OwnershipTable};
pub use suppress::AlertSuppressor;

use crate::config::SentinelConfig;
use crate::features::FeatureExtractor;
use crate::feed::RouteUpdate;
use crate::model::NoveltyScorer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    OwnershipMismatch,
    Novelty,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::OwnershipMismatch => "ownership_mismatch",
            TriggerReason::Novelty => "novelty",
        }
    }
}

/// Suspicious update handed to diagnosis. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub prefix: String,
    pub path: Vec<String>,
    pub origin: String,
    /// Authoritative owner, when the table has one
    pub expected_owner: Option<String>,
    /// Novelty score; absent while the scorer is warming
    pub anomaly_score: Option<f64>,
    pub reason: TriggerReason,
    pub timestamp: i64,
    #[serde(default)]
    pub communities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_asn: Option<String>,
}

impl Alert {
    pub fn from_update(
        update: &RouteUpdate,
        reason: TriggerReason,
        expected_owner: Option<String>,
        anomaly_score: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            prefix: update.prefix.clone(),
            path: update.path.clone(),
            origin: update.origin().to_string(),
            expected_owner,
            anomaly_score,
            reason,
            timestamp: update.timestamp,
            communities: update.communities.clone(),
            collector: update.collector.clone(),
            peer_asn: update.peer_asn.clone(),
        }
    }

    pub fn path_string(&self) -> String {
        self.path.join(" ")
    }

    pub fn first_hop(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct DetectorCounters {
    processed: AtomicU64,
    ownership_mismatches: AtomicU64,
    novelty_candidates: AtomicU64,
    suppressed: AtomicU64,
    alerts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectorStats {
    pub processed: u64,
    pub ownership_mismatches: u64,
    pub novelty_candidates: u64,
    pub suppressed: u64,
    pub alerts: u64,
}

pub struct Detector {
    extractor: Arc<FeatureExtractor>,
    scorer: NoveltyScorer,
    ownership: OwnershipTable,
    suppressor: AlertSuppressor,
    /// Mismatch alerts bypass the cooldown
    exempt_mismatch: bool,
    counters: DetectorCounters,
}

impl Detector {
    pub fn new(
        extractor: Arc<FeatureExtractor>,
        scorer: NoveltyScorer,
        ownership: OwnershipTable,
        suppressor: AlertSuppressor,
        exempt_mismatch: bool,
    ) -> Self {
        Self {
            extractor,
            scorer,
            ownership,
            suppressor,
            exempt_mismatch,
            counters: DetectorCounters::default(),
        }
    }

    pub fn from_config(config: &SentinelConfig, ownership: OwnershipTable) -> Self {
        info!(
            owners = ownership.len(),
            warmup = config.scorer.warmup_size,
            cooldown_secs = config.suppression.cooldown_secs,
            exempt_mismatch = config.suppression.exempt_ownership_mismatch,
            "detector ready"
        );
        Self::new(
            Arc::new(FeatureExtractor::new(&config.features)),
            NoveltyScorer::new(config.scorer.clone()),
            ownership,
            AlertSuppressor::new(config.suppression.cooldown_secs),
            config.suppression.exempt_ownership_mismatch,
        )
    }

    pub fn extractor(&self) -> &Arc<FeatureExtractor> {
        &self.extractor
    }

    pub fn scorer(&self) -> &NoveltyScorer {
        &self.scorer
    }

    pub fn ownership(&self) -> &OwnershipTable {
        &self.ownership
    }

    pub fn process(&self, update: &RouteUpdate) -> Option<Alert> {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        let vector = self.extractor.extract(update);

        let candidate = match OwnershipRule::check(update, &self.ownership) {
            MatchOutcome::Mismatch { expected } => {
                self.counters
                    .ownership_mismatches
                    .fetch_add(1, Ordering::Relaxed);
                // scored for context only; mismatches never feed the warm-up buffer
                let score = self.scorer.score(&vector).map(|s| s.score);
                Alert::from_update(update, TriggerReason::OwnershipMismatch, Some(expected), score)
            }
            MatchOutcome::Match | MatchOutcome::Unknown => {
                let novelty = self.scorer.observe(&vector)?;
                if !novelty.is_outlier || novelty.score <= self.scorer.threshold() {
                    return None;
                }
                self.counters
                    .novelty_candidates
                    .fetch_add(1, Ordering::Relaxed);
                let expected = self.ownership.owner_of(&update.prefix).map(str::to_string);
                Alert::from_update(update, TriggerReason::Novelty, expected, Some(novelty.score))
            }
        };

        let exempt = self.exempt_mismatch && candidate.reason == TriggerReason::OwnershipMismatch;
        if !exempt && !self.suppressor.admit(&candidate.prefix, candidate.timestamp) {
            self.counters.suppressed.fetch_add(1, Ordering::Relaxed);
            debug!(prefix = %candidate.prefix, reason = candidate.reason.as_str(), "alert suppressed");
            return None;
        }

        self.counters.alerts.fetch_add(1, Ordering::Relaxed);
        info!(
            prefix = %candidate.prefix,
            origin = %candidate.origin,
            expected = candidate.expected_owner.as_deref().unwrap_or("-"),
            score = ?candidate.anomaly_score,
            reason = candidate.reason.as_str(),
            "alert raised"
        );
        Some(candidate)
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            processed: self.counters.processed.load(Ordering::Relaxed),
            ownership_mismatches: self.counters.ownership_mismatches.load(Ordering::Relaxed),
            novelty_candidates: self.counters.novelty_candidates.load(Ordering::Relaxed),
            suppressed: self.counters.suppressed.load(Ordering::Relaxed),
            alerts: self.counters.alerts.load(Ordering::Relaxed),
        }
    }
}
