//! Integration test: config load, detector scenarios, suppression, end-to-end run.

use async_trait::async_trait;
use bgp_sentinel::{
    config::{DispatchConfig, ScorerConfig, SentinelConfig},
    detect::{AlertSuppressor, Detector, OwnershipTable, TriggerReason},
    diagnosis::{ChatMessage, DiagnosisStateMachine, ReasoningCollaborator, VerdictStatus},
    dispatch::Dispatcher,
    error::ReasoningError,
    evidence::{AsGraph, CaseLibrary, OfflineRegistry, ToolKit},
    features::FeatureExtractor,
    feed::{MemorySource, RouteUpdate},
    model::NoveltyScorer,
    storage::MemorySink,
    Sentinel,
};
use std::path::Path;
use std::sync::Arc;

const P: &str = "104.244.42.0/24";

fn detector(warmup_size: usize, cooldown_secs: i64, exempt_mismatch: bool) -> Detector {
    let scorer = ScorerConfig {
        warmup_size,
        trees: 20,
        sample_size: 32,
        ..ScorerConfig::default()
    };
    Detector::new(
        Arc::new(FeatureExtractor::with_shards(4)),
        NoveltyScorer::new(scorer),
        OwnershipTable::new([(P, "13414")]),
        AlertSuppressor::new(cooldown_secs),
        exempt_mismatch,
    )
}

#[test]
fn config_load_default() {
    let c = SentinelConfig::load(Path::new("nonexistent.json"));
    assert_eq!(c.dispatch.queue_capacity, 10);
    assert_eq!(c.dispatch.workers, 5);
    assert_eq!(c.diagnosis.max_rounds, 3);
    assert_eq!(c.scorer.warmup_size, 10_000);
    assert!(!c.uplink.enabled);
    assert!(!c.suppression.exempt_ownership_mismatch);
}

#[test]
fn config_partial_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"dispatch": {"workers": 2}, "suppression": {"cooldown_secs": 60}}"#)
        .unwrap();
    let c = SentinelConfig::load(&path);
    assert_eq!(c.dispatch.workers, 2);
    assert_eq!(c.dispatch.queue_capacity, 10);
    assert_eq!(c.suppression.cooldown_secs, 60);
}

#[test]
fn ownership_mismatch_raises_alert() {
    let d = detector(10_000, 300, false);
    let alert = d
        .process(&RouteUpdate::announce(P, "3356 174 12389", 1_000))
        .expect("mismatch alert");
    assert_eq!(alert.reason, TriggerReason::OwnershipMismatch);
    assert_eq!(alert.expected_owner.as_deref(), Some("13414"));
    assert_eq!(alert.origin, "12389");
    // scorer still warming: no score attached
    assert_eq!(alert.anomaly_score, None);
}

#[test]
fn ownership_match_raises_nothing() {
    let d = detector(10_000, 300, false);
    assert!(d.process(&RouteUpdate::announce(P, "3356 174 13414", 1_000)).is_none());
    assert_eq!(d.stats().ownership_mismatches, 0);
}

#[test]
fn warming_scorer_never_raises_novelty() {
    let d = detector(10_000, 0, false);
    for i in 0..200 {
        let path: Vec<String> = (0..(1 + i % 40)).map(|h| (64_512 + h).to_string()).collect();
        let update = RouteUpdate::new(format!("10.{}.0.0/16", i % 7), path, i as i64)
            .with_communities((0..(i % 25)).map(|c| format!("65000:{c}")).collect());
        assert!(d.process(&update).is_none());
    }
    assert!(!d.scorer().is_frozen());
    assert_eq!(d.stats().novelty_candidates, 0);
    assert_eq!(d.stats().processed, 200);
}

#[test]
fn mismatch_alerts_carry_score_once_frozen() {
    let d = detector(64, 300, false);
    for i in 0..64 {
        let path = format!("{} {} 15169", 3356 + i % 3, 174 + i % 5);
        d.process(&RouteUpdate::announce(&format!("8.{i}.0.0/16"), &path, i));
    }
    assert!(d.scorer().is_frozen());
    let alert = d.process(&RouteUpdate::announce(P, "174 12389", 10_000)).unwrap();
    let score = alert.anomaly_score.expect("score once frozen");
    assert!(score > 0.0 && score <= 1.0);
}

/// Warm-up traffic on unowned prefixes: mostly 3-hop paths without communities, with
/// rare longer paths and rare community-tagged updates.
fn warm_up_traffic() -> Vec<RouteUpdate> {
    (0..256i64)
        .map(|i| {
            let origin = 64_512 + i % 16;
            let path = if i % 37 == 5 {
                format!("3356 1299 2914 174 {origin}")
            } else {
                format!("3356 174 {origin}")
            };
            let communities = if i % 41 == 7 {
                vec!["174:21000".into(), "174:22013".into(), "3356:2".into()]
            } else {
                Vec::new()
            };
            RouteUpdate::announce(&format!("10.{}.0.0/16", i % 16), &path, i)
                .with_communities(communities)
        })
        .collect()
}

fn long_path(first: u32) -> String {
    (first..first + 40).map(|a| a.to_string()).collect::<Vec<_>>().join(" ")
}

#[test]
fn frozen_scorer_raises_novelty_alert_then_cooldown() {
    let d = Detector::new(
        Arc::new(FeatureExtractor::with_shards(4)),
        NoveltyScorer::new(ScorerConfig {
            warmup_size: 256,
            trees: 100,
            sample_size: 256,
            contamination: 0.05,
            score_threshold: 0.55,
            seed: 42,
        }),
        OwnershipTable::new([(P, "13414")]),
        AlertSuppressor::new(300),
        false,
    );
    for update in warm_up_traffic() {
        assert!(d.process(&update).is_none());
    }
    assert!(d.scorer().is_frozen());
    assert_eq!(d.stats().novelty_candidates, 0);

    // path length, path change, communities and update count all beyond anything seen
    let communities: Vec<String> = (0..30).map(|c| format!("65000:{c}")).collect();
    let burst = RouteUpdate::announce("10.0.0.0/16", &long_path(65_000), 1_000)
        .with_communities(communities.clone());
    let alert = d.process(&burst).expect("novelty alert");
    assert_eq!(alert.reason, TriggerReason::Novelty);
    assert_eq!(alert.expected_owner, None);
    let score = alert.anomaly_score.expect("frozen scorer attaches a score");
    assert!(score > d.scorer().threshold(), "score {score}");
    assert_eq!(d.stats().novelty_candidates, 1);
    assert_eq!(d.stats().alerts, 1);

    let repeat = RouteUpdate::announce("10.0.0.0/16", &long_path(65_100), 1_010)
        .with_communities(communities);
    assert!(d.process(&repeat).is_none());
    let stats = d.stats();
    assert_eq!(stats.novelty_candidates, 2);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(stats.alerts, 1);
}

#[test]
fn cooldown_applies_to_mismatch_alerts_by_default() {
    let d = detector(10_000, 300, false);
    assert!(d.process(&RouteUpdate::announce(P, "174 12389", 1_000)).is_some());
    assert!(d.process(&RouteUpdate::announce(P, "174 12389", 1_100)).is_none());
    assert!(d.process(&RouteUpdate::announce(P, "174 12389", 1_300)).is_some());
    assert_eq!(d.stats().suppressed, 1);
    assert_eq!(d.stats().alerts, 2);
}

#[test]
fn exempt_policy_lets_mismatches_through() {
    let d = detector(10_000, 300, true);
    assert!(d.process(&RouteUpdate::announce(P, "174 12389", 1_000)).is_some());
    assert!(d.process(&RouteUpdate::announce(P, "174 12389", 1_001)).is_some());
    assert_eq!(d.stats().suppressed, 0);
}

#[test]
fn cloned_history_replays_identically() {
    let updates = [
        RouteUpdate::announce(P, "174 13414", 1),
        RouteUpdate::announce(P, "3356 174 13414", 2),
        RouteUpdate::announce(P, "3356 12389", 3),
    ];
    let a = FeatureExtractor::with_shards(2);
    a.extract(&updates[0]);
    let b = a.clone();
    let from_a: Vec<_> = updates[1..].iter().map(|u| a.extract(u)).collect();
    let from_b: Vec<_> = updates[1..].iter().map(|u| b.extract(u)).collect();
    assert_eq!(from_a, from_b);
    assert_eq!(from_a[0].edit_distance(), 1.0);
}

struct FixedReply(&'static str);

#[async_trait]
impl ReasoningCollaborator for FixedReply {
    async fn complete(&self, _conversation: &[ChatMessage]) -> Result<String, ReasoningError> {
        Ok(self.0.to_string())
    }
}

#[tokio::test]
async fn end_to_end_every_alert_gets_one_trace() {
    let config = SentinelConfig::default();
    let detector = Arc::new(detector(10_000, 300, false));
    let tools = Arc::new(ToolKit::standard(
        &config.evidence,
        Arc::new(OfflineRegistry::from_config(&config.evidence)),
        Arc::new(AsGraph::default()),
        Arc::clone(detector.extractor()),
    ));
    let machine = Arc::new(DiagnosisStateMachine::new(
        Arc::new(FixedReply(
            r#"{"thought": "origin conflict", "finalVerdict": {"status": "MALICIOUS", "implicated_asn": "12389", "confidence": 0.9, "summary": "hijack"}}"#,
        )),
        tools,
        Arc::new(CaseLibrary::empty()),
        config.diagnosis.clone(),
    ));
    let sink = Arc::new(MemorySink::new());
    let dispatcher = Dispatcher::start(
        &DispatchConfig {
            queue_capacity: 2,
            workers: 2,
        },
        machine,
        sink.clone(),
    );

    let source = MemorySource::new([
        RouteUpdate::announce(P, "174 12389", 1_000),
        RouteUpdate::announce(P, "174 13414", 1_010),
        RouteUpdate::announce(P, "174 12389", 1_020),
        RouteUpdate::announce(P, "174 12389", 2_000),
        RouteUpdate::announce("8.8.8.0/24", "3356 64500", 2_001),
    ]);
    let summary = Sentinel::new(detector, dispatcher).run(source).await.unwrap();

    assert_eq!(summary.detector.processed, 5);
    assert_eq!(summary.detector.alerts, 2);
    assert_eq!(summary.detector.suppressed, 1);
    assert_eq!(summary.dispatch.sealed, 2);
    assert_eq!(summary.dispatch.count(VerdictStatus::Malicious), 2);
    let traces = sink.traces();
    assert_eq!(traces.len(), 2);
    assert!(traces.iter().all(|t| t.verdict.implicated_asn.as_deref() == Some("12389")));
}
