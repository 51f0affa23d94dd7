//! Per-resource incremental feature extraction from route updates.

mod distance;
mod extractor;

pub use distance::path_edit_distance;
pub use extractor::FeatureExtractor;

use serde::{Deserialize, Serialize};

/// Path length, edit distance to previous path, community count, running update count.
pub const FEATURE_DIM: usize = 4;

/// Fixed-size feature vector for the novelty model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: [f64; FEATURE_DIM],
    pub prefix: String,
    pub ts: i64,
}

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn path_len(&self) -> f64 {
        self.values[0]
    }

    pub fn edit_distance(&self) -> f64 {
        self.values[1]
    }

    pub fn community_count(&self) -> f64 {
        self.values[2]
    }

    pub fn update_count(&self) -> f64 {
        self.values[3]
    }
}

/// Last path seen and running update count for one resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceHistory {
    pub last_path: Vec<String>,
    pub update_count: u64,
}
