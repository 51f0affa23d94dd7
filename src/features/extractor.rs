//! Feature extraction: update + resource history → vector. History is sharded by
//! prefix so updates for one resource are serialized while others proceed.

use super::{path_edit_distance, FeatureVector, ResourceHistory, FEATURE_DIM};
use crate::config::FeaturesConfig;
use crate::feed::RouteUpdate;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

type Shard = Mutex<HashMap<String, ResourceHistory>>;

/// Owns every `ResourceHistory` for the lifetime of the pipeline; entries are never evicted.
pub struct FeatureExtractor {
    shards: Vec<Shard>,
}

impl FeatureExtractor {
    pub fn new(config: &FeaturesConfig) -> Self {
        Self::with_shards(config.shards)
    }

    pub fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, prefix: &str) -> &Shard {
        let mut h = DefaultHasher::new();
        prefix.hash(&mut h);
        &self.shards[(h.finish() % self.shards.len() as u64) as usize]
    }

    /// Compute the vector for `update` and advance the resource's history.
    pub fn extract(&self, update: &RouteUpdate) -> FeatureVector {
        let mut shard = self.shard(&update.prefix).lock();
        let history = shard.entry(update.prefix.clone()).or_default();

        let distance = if history.update_count == 0 {
            0
        } else {
            path_edit_distance(&update.path, &history.last_path)
        };
        history.last_path = update.path.clone();
        history.update_count += 1;

        let values: [f64; FEATURE_DIM] = [
            update.path.len() as f64,
            distance as f64,
            update.communities.len() as f64,
            history.update_count as f64,
        ];
        FeatureVector {
            values,
            prefix: update.prefix.clone(),
            ts: update.timestamp,
        }
    }

    pub fn history(&self, prefix: &str) -> Option<ResourceHistory> {
        self.shard(prefix).lock().get(prefix).cloned()
    }

    /// Running update count; 0 for an unseen resource.
    pub fn update_count(&self, prefix: &str) -> u64 {
        self.shard(prefix)
            .lock()
            .get(prefix)
            .map(|h| h.update_count)
            .unwrap_or(0)
    }

    pub fn tracked_resources(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }
}

impl Clone for FeatureExtractor {
    fn clone(&self) -> Self {
        Self {
            shards: self
                .shards
                .iter()
                .map(|s| Mutex::new(s.lock().clone()))
                .collect(),
        }
    }
}
