//! Benchmarks for the decode loop.
//!
//! Run with: cargo bench
//!
//! The synthetic runs need nothing on disk. The file runs require fixture
//! files from `tests/fixtures/generate_fixtures.sh` and are skipped without
//! them.

use std::{hint::black_box, io::sink, path::Path};

use criterion::{BenchmarkId, Criterion};
use ffmpeg_next::util::log::Level as LogLevel;
use framewalk::{
    CollectingSink, FrameReport, JsonLinesSink, LineSink, MediaKind, Pipeline, ScanOptions,
    report,
};

#[path = "../tests/common/mod.rs"]
mod common;

use common::SyntheticContainer;

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const SAMPLE_MKV: &str = "tests/fixtures/sample_video.mkv";

/// A GOP-structured stream interleaved with an audio stream.
fn synthetic(frames: i64, decoder_delay: usize) -> SyntheticContainer {
    let mut container = SyntheticContainer::new()
        .with_stream(0, MediaKind::Video)
        .with_stream(1, MediaKind::Audio)
        .with_decoder_delay(decoder_delay);
    for pts in 0..frames {
        let key = pts % 30 == 0;
        container = container
            .packet(0, if key { 12_000 } else { 1_500 }, pts, key)
            .packet(1, 400, pts, true);
    }
    container
}

fn benchmark_synthetic_pipeline(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("synthetic pipeline");

    for frames in [100_i64, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("collect", frames), &frames, |bencher, &frames| {
            bencher.iter_batched(
                || synthetic(frames, 0),
                |container| {
                    let mut sink = CollectingSink::new();
                    Pipeline::default().run(container, &mut sink).unwrap();
                    black_box(sink.reports.len())
                },
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.bench_function("flush with decoder delay", |bencher| {
        let options = ScanOptions::new().with_flush_at_end_of_stream(true);
        bencher.iter_batched(
            || synthetic(1_000, 4),
            |container| {
                Pipeline::new(options.clone())
                    .run(container, CollectingSink::new())
                    .unwrap()
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

fn benchmark_report_formatting(criterion: &mut Criterion) {
    let reports: Vec<FrameReport> = (0..1_000)
        .map(|pts| {
            let frame = framewalk::DecodedFrame {
                picture_type: framewalk::PictureType::P,
                packet_size: 1_500,
                pts: Some(pts),
                is_key_frame: false,
            };
            report(&frame, pts as u64 + 1)
        })
        .collect();

    criterion.bench_function("format 1000 text lines", |bencher| {
        bencher.iter(|| {
            for frame_report in &reports {
                black_box(frame_report.to_string());
            }
        });
    });

    criterion.bench_function("format 1000 json lines", |bencher| {
        bencher.iter(|| {
            for frame_report in &reports {
                black_box(frame_report.to_json().to_string());
            }
        });
    });
}

fn benchmark_file_scan(criterion: &mut Criterion) {
    ffmpeg_next::util::log::set_level(LogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    criterion.bench_function("scan sample_video.mp4 (text)", |bencher| {
        bencher.iter(|| {
            Pipeline::default()
                .run_file(SAMPLE_VIDEO, LineSink::new(sink()))
                .unwrap()
        });
    });

    criterion.bench_function("scan sample_video.mp4 (json, flush)", |bencher| {
        let pipeline = Pipeline::new(ScanOptions::new().with_flush_at_end_of_stream(true));
        bencher.iter(|| {
            pipeline
                .run_file(SAMPLE_VIDEO, JsonLinesSink::new(sink()))
                .unwrap()
        });
    });

    if Path::new(SAMPLE_MKV).exists() {
        criterion.bench_function("scan sample_video.mkv (interleaved audio)", |bencher| {
            bencher.iter(|| {
                Pipeline::default()
                    .run_file(SAMPLE_MKV, CollectingSink::new())
                    .unwrap()
            });
        });
    }
}

criterion::criterion_group!(
    benches,
    benchmark_synthetic_pipeline,
    benchmark_report_formatting,
    benchmark_file_scan,
);
criterion::criterion_main!(benches);
