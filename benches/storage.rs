//! Report storage benchmark: write-once JSON reports for sealed traces.

use bgp_sentinel::detect::{Alert, TriggerReason};
use bgp_sentinel::diagnosis::{Round, RoundKind, TraceLog, Verdict};
use bgp_sentinel::feed::RouteUpdate;
use bgp_sentinel::storage::ReportStore;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempfile::tempdir;

fn trace() -> bgp_sentinel::DiagnosisTrace {
    let alert = Alert::from_update(
        &RouteUpdate::announce("104.244.42.0/24", "3356 174 12389", 1_700_000_000),
        TriggerReason::OwnershipMismatch,
        Some("13414".into()),
        None,
    );
    let mut log = TraceLog::open(alert, "(no similar historical cases found)".into());
    for k in 1..=3 {
        let mut round = Round::new(k, RoundKind::Investigation);
        round.tool = Some("authority_check".into());
        round.tool_output = Some("[AUTHORITY_CHECK]: INVALID (historical)".into());
        log.push(round);
        log.count_call();
    }
    log.seal(Verdict::unknown("bench"))
}

fn bench_write_report(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let store = ReportStore::new(dir.path());
    let runtime = tokio::runtime::Runtime::new().unwrap();

    // fresh alert id per write so create_new never collides
    c.bench_function("storage_write_report", |b| {
        b.to_async(&runtime).iter(|| async {
            let t = trace();
            black_box(store.write(&t).await).unwrap()
        })
    });
}

fn bench_encode_report(c: &mut Criterion) {
    let t = trace();
    c.bench_function("storage_encode_report", |b| {
        b.iter(|| black_box(serde_json::to_vec_pretty(black_box(&t))).unwrap())
    });
}

criterion_group!(benches, bench_write_report, bench_encode_report);
criterion_main!(benches);
