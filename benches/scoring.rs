//! Novelty scoring benchmark: isolation-forest fit at warm-up and frozen scoring.

use bgp_sentinel::config::ScorerConfig;
use bgp_sentinel::features::FeatureExtractor;
use bgp_sentinel::feed::RouteUpdate;
use bgp_sentinel::model::{IsolationForest, NoveltyScorer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;

fn training_rows(n: usize) -> Array2<f64> {
    Array2::from_shape_fn((n, 4), |(i, j)| ((i * 7 + j * 13) % 23) as f64)
}

fn bench_fit(c: &mut Criterion) {
    let config = ScorerConfig::default();
    let mut g = c.benchmark_group("iforest_fit");
    for n in [1_000, 10_000] {
        let data = training_rows(n);
        g.bench_function(format!("rows_{n}").as_str(), |b| {
            b.iter(|| IsolationForest::fit(black_box(data.view()), &config))
        });
    }
    g.finish();
}

fn bench_frozen_score(c: &mut Criterion) {
    let config = ScorerConfig {
        warmup_size: 256,
        ..ScorerConfig::default()
    };
    let scorer = NoveltyScorer::new(config);
    let extractor = FeatureExtractor::with_shards(8);
    for i in 0..256i64 {
        let path = format!("{} {} 15169", 3356 + i % 4, 174 + i % 9);
        scorer.observe(&extractor.extract(&RouteUpdate::announce(
            &format!("8.{}.0.0/16", i % 64),
            &path,
            i,
        )));
    }
    let sample = extractor.extract(&RouteUpdate::announce("104.244.42.0/24", "174 12389", 1_000));

    c.bench_function("frozen_score", |b| b.iter(|| scorer.score(black_box(&sample))));
}

criterion_group!(benches, bench_fit, bench_frozen_score);
criterion_main!(benches);
