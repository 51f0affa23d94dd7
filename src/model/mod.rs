//! Novelty scoring. The scorer buffers vectors while `Warming`, fits an isolation
//! forest once the buffer reaches the warm-up size, and is `Frozen` from then on:
//! scoring never re-trains and takes no lock.

mod iforest;

pub use iforest::IsolationForest;

use crate::config::ScorerConfig;
use crate::features::{FeatureVector, FEATURE_DIM};
use ndarray::Array2;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerPhase {
    Warming,
    Frozen,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoveltyScore {
    pub score: f64,
    pub is_outlier: bool,
}

pub struct NoveltyScorer {
    config: ScorerConfig,
    warmup: Mutex<Vec<FeatureVector>>,
    model: OnceLock<IsolationForest>,
}

impl NoveltyScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self {
            config,
            warmup: Mutex::new(Vec::new()),
            model: OnceLock::new(),
        }
    }

    pub fn phase(&self) -> ScorerPhase {
        if self.model.get().is_some() {
            ScorerPhase::Frozen
        } else {
            ScorerPhase::Warming
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.phase() == ScorerPhase::Frozen
    }

    /// Vectors waiting for the fit; 0 once frozen.
    pub fn buffered(&self) -> usize {
        self.warmup.lock().len()
    }

    pub fn threshold(&self) -> f64 {
        self.config.score_threshold
    }

    /// Pure scoring against the frozen model; `None` while warming.
    pub fn score(&self, vector: &FeatureVector) -> Option<NoveltyScore> {
        let model = self.model.get()?;
        let score = model.score(vector.as_slice());
        Some(NoveltyScore {
            score,
            is_outlier: model.is_outlier(score),
        })
    }

    /// Warming: buffer the vector (fitting when the buffer is full) and return `None`.
    /// Frozen: same as [`score`](Self::score). Buffered vectors are never scored later.
    pub fn observe(&self, vector: &FeatureVector) -> Option<NoveltyScore> {
        if self.model.get().is_some() {
            return self.score(vector);
        }
        let mut buffer = self.warmup.lock();
        if self.model.get().is_some() {
            drop(buffer);
            return self.score(vector);
        }
        buffer.push(vector.clone());
        if buffer.len() >= self.config.warmup_size.max(1) {
            let started = Instant::now();
            let data = Array2::from_shape_fn((buffer.len(), FEATURE_DIM), |(i, j)| buffer[i].values[j]);
            let forest = IsolationForest::fit(data.view(), &self.config);
            info!(
                samples = buffer.len(),
                trees = forest.trees(),
                outlier_threshold = forest.threshold(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "novelty model fitted; scorer frozen"
            );
            let _ = self.model.set(forest);
            *buffer = Vec::new();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(values: [f64; FEATURE_DIM]) -> FeatureVector {
        FeatureVector {
            values,
            prefix: "p".into(),
            ts: 0,
        }
    }

    fn config(warmup: usize) -> ScorerConfig {
        ScorerConfig {
            warmup_size: warmup,
            trees: 50,
            sample_size: 64,
            contamination: 0.05,
            score_threshold: 0.5,
            seed: 1,
        }
    }

    #[test]
    fn warming_never_scores() {
        let scorer = NoveltyScorer::new(config(10));
        for i in 0..9 {
            assert!(scorer.observe(&vector([i as f64, 0.0, 0.0, 1.0])).is_none());
            assert_eq!(scorer.phase(), ScorerPhase::Warming);
        }
        assert!(scorer.score(&vector([1.0; FEATURE_DIM])).is_none());
        assert_eq!(scorer.buffered(), 9);
    }

    #[test]
    fn freezes_at_warmup_size_and_stays_frozen() {
        let scorer = NoveltyScorer::new(config(20));
        for i in 0..20 {
            assert!(scorer.observe(&vector([(i % 4) as f64 + 2.0, (i % 3) as f64, 0.0, i as f64])).is_none());
        }
        assert!(scorer.is_frozen());
        assert_eq!(scorer.buffered(), 0);

        let v = vector([30.0, 12.0, 9.0, 1.0]);
        let first = scorer.observe(&v).unwrap();
        let second = scorer.score(&v).unwrap();
        assert_eq!(first, second);
        assert!(scorer.is_frozen());
    }
}
