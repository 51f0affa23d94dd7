//! Isolation forest. Fit once on a batch, then score is a pure function of the trees.
//! Score is `2^(-E[h(x)] / c(psi))` in (0, 1]; higher is more isolated.

use crate::config::ScorerConfig;
use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(data: &ArrayView2<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(data, rows, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        data: &ArrayView2<f64>,
        rows: Vec<usize>,
        depth: usize,
        limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { size: rows.len() });
        if depth >= limit || rows.len() <= 1 {
            return idx;
        }

        // only features that still vary within this node can split it
        let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
            .filter_map(|f| {
                let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                    let v = data[[r, f]];
                    (lo.min(v), hi.max(v))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if candidates.is_empty() {
            return idx;
        }

        let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
        let value = rng.gen_range(lo..hi);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
            rows.into_iter().partition(|&r| data[[r, feature]] < value);

        let left = self.grow(data, left_rows, depth + 1, limit, rng);
        let right = self.grow(data, right_rows, depth + 1, limit, rng);
        self.nodes[idx] = Node::Split {
            feature,
            value,
            left,
            right,
        };
        idx
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    value,
                    left,
                    right,
                } => {
                    node = if x.get(*feature).copied().unwrap_or(0.0) < *value {
                        *left
                    } else {
                        *right
                    };
                    depth += 1.0;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    normalizer: f64,
    threshold: f64,
}

impl IsolationForest {
    /// Fit on `data` (rows = samples). The outlier threshold is the training-score
    /// quantile at `1 - contamination`.
    pub fn fit(data: ArrayView2<f64>, config: &ScorerConfig) -> Self {
        let n = data.nrows();
        let psi = config.sample_size.min(n).max(1);
        let height_limit = (psi as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(config.seed);

        let trees = if n == 0 {
            Vec::new()
        } else {
            (0..config.trees.max(1))
                .map(|_| {
                    let rows = rand::seq::index::sample(&mut rng, n, psi).into_vec();
                    IsolationTree::fit(&data, rows, height_limit, &mut rng)
                })
                .collect()
        };

        let mut forest = Self {
            trees,
            normalizer: average_path_length(psi),
            threshold: 1.0,
        };

        let mut training: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|row| forest.score(&row.to_vec()))
            .collect();
        if !training.is_empty() {
            training.sort_by(f64::total_cmp);
            let q = 1.0 - config.contamination.clamp(0.0, 0.5);
            let idx = ((training.len() - 1) as f64 * q).round() as usize;
            forest.threshold = training[idx.min(training.len() - 1)];
        }
        forest
    }

    pub fn score(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() || self.normalizer == 0.0 {
            return 0.5;
        }
        let mean = self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
        2f64.powf(-mean / self.normalizer)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn is_outlier(&self, score: f64) -> bool {
        score > self.threshold
    }

    pub fn trees(&self) -> usize {
        self.trees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn config() -> ScorerConfig {
        ScorerConfig {
            warmup_size: 0,
            trees: 100,
            sample_size: 256,
            contamination: 0.05,
            score_threshold: 0.5,
            seed: 7,
        }
    }

    #[test]
    fn isolated_point_scores_higher_than_cluster() {
        let data = Array2::from_shape_fn((500, 4), |(i, j)| {
            3.0 + ((i * 37 + j * 11) % 101) as f64 / 100.0
        });
        let forest = IsolationForest::fit(data.view(), &config());
        let inlier = forest.score(&[3.5, 3.5, 3.5, 3.5]);
        let outlier = forest.score(&[40.0, 25.0, 90.0, 1.0]);
        assert!(outlier > inlier, "outlier {outlier} inlier {inlier}");
        assert!(forest.is_outlier(outlier));
    }

    #[test]
    fn same_seed_same_model() {
        let data = Array2::from_shape_fn((300, 4), |(i, j)| ((i * 13 + j) % 17) as f64);
        let a = IsolationForest::fit(data.view(), &config());
        let b = IsolationForest::fit(data.view(), &config());
        let x = [1.0, 5.0, 9.0, 2.0];
        assert_eq!(a.score(&x), b.score(&x));
        assert_eq!(a.threshold(), b.threshold());
    }

    #[test]
    fn average_path_length_small_cases() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!((average_path_length(256) - 10.244).abs() < 0.01);
    }
}
