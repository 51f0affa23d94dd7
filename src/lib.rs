//! BGP Sentinel: streaming hijack and route-leak detection with bounded diagnosis.
//!
//! Modular structure:
//! - [`feed`] — Route updates and the sources that yield them (stdin, file, BGPlay)
//! - [`features`] — Per-resource incremental feature extraction
//! - [`model`] — Isolation-forest novelty scorer with a one-time warm-up
//! - [`detect`] — Ownership rule, novelty trigger and per-resource cooldown
//! - [`dispatch`] — Bounded alert queue and diagnosis worker pool
//! - [`diagnosis`] — Multi-round diagnosis state machine and reasoning client
//! - [`evidence`] — Evidence tools and historical case retrieval
//! - [`storage`] — Write-once JSON reports
//! - [`logging`] — Structured JSON logging

pub mod config;
pub mod detect;
pub mod diagnosis;
pub mod dispatch;
pub mod error;
pub mod evidence;
pub mod features;
pub mod feed;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod storage;
pub mod uplink;

pub use config::SentinelConfig;
pub use detect::{Alert, Detector, TriggerReason};
pub use diagnosis::{DiagnosisStateMachine, DiagnosisTrace, Verdict, VerdictStatus};
pub use dispatch::Dispatcher;
pub use error::{Result, SentinelError};
pub use features::{FeatureExtractor, FeatureVector};
pub use feed::{RouteUpdate, UpdateSource};
pub use logging::StructuredLogger;
pub use model::NoveltyScorer;
pub use pipeline::{RunSummary, Sentinel};
pub use storage::ReportStore;
