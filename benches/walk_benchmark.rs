use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use petpal_tracker::models::{PositionSample, WalkResult};
use petpal_tracker::services::location::path_distance_meters;

/// A one-hour walk sampled every second, drifting north-east.
fn synthetic_track(len: usize) -> Vec<PositionSample> {
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap();
    (0..len)
        .map(|i| {
            let step = i as f64 * 0.00001;
            PositionSample::new(
                37.4 + step,
                -122.1 + step * 0.7,
                start + Duration::seconds(i as i64),
            )
        })
        .collect()
}

fn benchmark_walk_tracks(c: &mut Criterion) {
    let track = synthetic_track(3600);
    let start = track[0].timestamp;
    let end = track[track.len() - 1].timestamp;

    // Same fixes, replayed out of order
    let mut shuffled = track.clone();
    shuffled.reverse();

    let mut group = c.benchmark_group("walk_tracks");

    group.bench_function("path_distance_hour", |b| {
        b.iter(|| path_distance_meters(black_box(&track)))
    });

    group.bench_function("from_track_ordered", |b| {
        b.iter(|| WalkResult::from_track(black_box(&track), start, end, 0))
    });

    group.bench_function("from_track_reversed", |b| {
        b.iter(|| WalkResult::from_track(black_box(&shuffled), start, end, 0))
    });

    group.finish();
}

criterion_group!(benches, benchmark_walk_tracks);
criterion_main!(benches);
