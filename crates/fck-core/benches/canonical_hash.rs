use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fck_core::{CanonicalActionFrame, RiskTier};

fn bench_canonical_hash(c: &mut Criterion) {
    let frame = CanonicalActionFrame::new(
        "act_bench",
        "agent_bench",
        RiskTier::T2HighStakes,
        "sdc-v1",
        true,
        true,
        false,
        Utc::now(),
    )
    .with_extension("region", "eu-west")
    .with_extension("retry_count", 3i64)
    .with_extension("dry_run", false);

    c.bench_function("canonical_action_frame_hash", |b| {
        b.iter(|| black_box(&frame).canonical_hash().unwrap())
    });
}

criterion_group!(benches, bench_canonical_hash);
criterion_main!(benches);
