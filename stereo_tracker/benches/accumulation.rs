//! Per-frame accumulation and tabulation benchmarks.
//!
//! Run with: cargo bench --package stereo_tracker

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::time::Duration;

use stereo_tracker::core_modules::centroid_accumulator::Classifier;
use stereo_tracker::core_modules::utils::synthetic_scene::{ScenePlayer, SyntheticScene};
use stereo_tracker::{Coordinate, MAX_PLAYERS, PipelineConfig, PlayerCount, Resolution, StereoPipeline};

fn four_player_scene(stride: u32) -> SyntheticScene {
    SyntheticScene::new(Resolution::new(1280, 720), stride)
        .with_player(ScenePlayer::new(250, 150).with_radius_sq(900).with_disparity(40))
        .with_player(ScenePlayer::new(900, 250).with_radius_sq(900).with_disparity(20))
        .with_player(ScenePlayer::new(640, 500).with_radius_sq(900).with_disparity(60))
        .with_player(ScenePlayer::new(300, 620).with_radius_sq(900).with_disparity(100))
}

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Classification");
    group.measurement_time(Duration::from_secs(5));

    let references = [
        Coordinate::new(250, 150),
        Coordinate::new(900, 250),
        Coordinate::new(640, 500),
        Coordinate::new(300, 620),
    ];
    let classifier = Classifier::new(references, Resolution::new(1280, 720));

    for stride in [1u32, 2, 4] {
        let samples = four_player_scene(stride).sensor_a_samples();
        group.throughput(Throughput::Elements(samples.len() as u64));
        group.bench_with_input(BenchmarkId::new("accumulate", format!("stride {stride}")), &samples, |b, s| {
            b.iter(|| classifier.accumulate(black_box(s), PlayerCount::MAX))
        });
    }

    group.finish();
}

fn bench_stereo_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stereo frame");
    group.measurement_time(Duration::from_secs(5));

    for players in 1..=MAX_PLAYERS as u8 {
        let frame = four_player_scene(4).stereo_frame();
        let count = PlayerCount::new(players).unwrap();
        let mut pipeline = StereoPipeline::new(PipelineConfig::default()).unwrap();

        group.throughput(Throughput::Elements((frame.sensor_a.len() + frame.sensor_b.len()) as u64));
        group.bench_with_input(BenchmarkId::new("process_frame", players), &frame, |b, f| {
            b.iter(|| pipeline.process_frame(black_box(f), count).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_classify, bench_stereo_frame);
criterion_main!(benches);
