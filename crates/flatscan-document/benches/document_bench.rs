// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the flatscan-document crate: page outline
// detection, shadow removal, and a full pipeline run on a synthetic capture.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{GrayImage, Luma, Rgb, RgbImage};

use flatscan_core::RenderMode;
use flatscan_document::{BoundaryDetector, Frame, IlluminationNormalizer, Pipeline, RunOptions};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// 1200x1600 capture: dark desk with an axis-aligned light page and a few
/// rows of dark "text".
fn synthetic_capture() -> RgbImage {
    let (width, height) = (1200u32, 1600u32);
    let mut img = RgbImage::from_pixel(width, height, Rgb([30, 30, 34]));
    for y in 160..1440 {
        for x in 150..1050 {
            let ink = (220..1380).contains(&y) && y % 40 < 6 && x % 60 < 45 && (200..1000).contains(&x);
            // Left-to-right falloff so shadow removal has real work to do.
            let light = 240 - ((x - 150) / 12) as u8;
            img.put_pixel(x, y, if ink { Rgb([25, 25, 25]) } else { Rgb([light, light, light - 4]) });
        }
    }
    img
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Outline detection runs on a quarter-scale copy, so it should stay cheap
/// even at phone-camera sizes.
fn bench_boundary_detection(c: &mut Criterion) {
    let frame = Frame::Color(synthetic_capture());
    let detector = BoundaryDetector::default();

    c.bench_function("boundary_detection (1200x1600)", |b| {
        b.iter(|| black_box(detector.detect(black_box(&frame))));
    });
}

/// Shadow removal on a frame above the 800px working cap, exercising the
/// downscale/upscale path.
fn bench_shadow_removal(c: &mut Criterion) {
    let gray = GrayImage::from_fn(1200, 1600, |x, y| Luma([(120 + (x + y) / 30) as u8]));
    let normalizer = IlluminationNormalizer::default();

    c.bench_function("shadow_removal (1200x1600)", |b| {
        b.iter(|| black_box(normalizer.remove_shadows(black_box(&gray))));
    });
}

fn bench_full_pipeline(c: &mut Criterion) {
    let bytes = match Frame::Color(synthetic_capture()).to_png_bytes() {
        Ok(bytes) => bytes,
        Err(err) => panic!("fixture encoding failed: {err}"),
    };
    let pipeline = Pipeline::default();

    let mut group = c.benchmark_group("pipeline");
    group.sample_size(10);
    for mode in [RenderMode::Document, RenderMode::Grayscale] {
        let options = RunOptions {
            mode,
            ..RunOptions::default()
        };
        group.bench_function(format!("{mode:?}"), |b| {
            b.iter(|| black_box(pipeline.run(black_box(&bytes), &options)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_boundary_detection, bench_shadow_removal, bench_full_pipeline);
criterion_main!(benches);
