// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end behaviour on synthetic captures.

use flatscan_core::{PipelineConfig, RenderMode, Stage};
use flatscan_document::{BoundaryDetector, Frame, IlluminationNormalizer, Pipeline, QualityGate, RunOptions};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PixelPoint;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A4-proportioned white page, rotated a few degrees, on a dark desk.
fn tilted_page(frame_w: u32, frame_h: u32, page_w: f32, page_h: f32, degrees: f32) -> RgbImage {
    let mut img = RgbImage::from_pixel(frame_w, frame_h, Rgb([35, 32, 30]));
    let (cx, cy) = (frame_w as f32 / 2.0, frame_h as f32 / 2.0);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let corners = [
        (-page_w / 2.0, -page_h / 2.0),
        (page_w / 2.0, -page_h / 2.0),
        (page_w / 2.0, page_h / 2.0),
        (-page_w / 2.0, page_h / 2.0),
    ]
    .map(|(x, y)| {
        PixelPoint::new(
            (cx + x * cos - y * sin).round() as i32,
            (cy + x * sin + y * cos).round() as i32,
        )
    });
    draw_polygon_mut(&mut img, &corners, Rgb([238, 236, 230]));
    img
}

#[test]
fn scenario_a_tilted_page_is_found_and_straightened() {
    init_tracing();
    let (page_w, page_h) = (440.0, 622.0);
    let frame = Frame::Color(tilted_page(600, 800, page_w, page_h, 3.0));

    let quad = BoundaryDetector::default()
        .detect(&frame)
        .expect("page outline should be detected");
    let ratio = quad.order().area() as f64 / frame.area() as f64;
    assert!(ratio > 0.5, "area ratio {ratio:.3}");

    let bytes = frame.to_png_bytes().unwrap();
    let out = Pipeline::default().run(&bytes, &RunOptions::default());
    assert!(out.success, "error: {:?}", out.error);
    assert!(out.corners.is_some());

    let expected = page_w / page_h;
    let actual = out.width as f32 / out.height as f32;
    assert!(
        (actual - expected).abs() / expected < 0.10,
        "aspect {actual:.3} vs {expected:.3}"
    );

    let decoded = Frame::from_bytes(out.output.as_deref().unwrap()).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (out.width, out.height));
}

#[test]
fn scenario_b_page_filling_frame_uses_full_frame() {
    init_tracing();
    let frame = Frame::Color(RgbImage::from_pixel(640, 480, Rgb([250, 250, 250])));
    assert!(BoundaryDetector::default().detect(&frame).is_none());

    let bytes = frame.to_png_bytes().unwrap();
    let out = Pipeline::default().run(&bytes, &RunOptions::default());
    assert!(out.success);
    assert!(out.corners.is_none());
    assert_eq!((out.width, out.height), (640, 480));
    assert!(out.stages.entry(Stage::BoundaryDetection).unwrap().fallback_used);
    assert!(out.stages.any_fallback());
}

#[test]
fn scenario_c_directional_shadow_is_flattened() {
    init_tracing();
    let (w, h) = (400u32, 300u32);
    let input = GrayImage::from_fn(w, h, |x, y| {
        let text = y % 20 < 3 && x % 40 < 30;
        Luma([match (x >= w / 2, text) {
            (false, false) => 215,
            (false, true) => 45,
            (true, false) => 105,
            (true, true) => 25,
        }])
    });
    let halves = |img: &GrayImage| {
        let mut sums = [0f64; 2];
        for (x, _, p) in img.enumerate_pixels() {
            sums[(x >= w / 2) as usize] += p.0[0] as f64;
        }
        let n = (w / 2 * h) as f64;
        (sums[0] - sums[1]).abs() / n
    };

    let output = IlluminationNormalizer::default().remove_shadows(&input);
    let (before, after) = (halves(&input), halves(&output));
    assert!(after <= before * 0.5, "before {before:.1}, after {after:.1}");
}

#[test]
fn scenario_d_low_resolution_is_unacceptable() {
    init_tracing();
    let sharp = GrayImage::from_fn(320, 240, |x, y| {
        Luma([if (x / 5 + y / 5) % 2 == 0 { 40 } else { 210 }])
    });
    let report = QualityGate::default().assess(&Frame::Gray(sharp));
    assert!(report.sharpness.acceptable);
    assert!(!report.resolution.acceptable);
    assert!(!report.acceptable);
    assert!(!report.recommendations.is_empty());
}

#[test]
fn scenario_e_malformed_input_reports_error() {
    init_tracing();
    let pipeline = Pipeline::default();

    for bytes in [&b""[..], &b"\x89PNG\r\n\x1a\n truncated"[..], &[0u8; 64][..]] {
        let out = pipeline.run(bytes, &RunOptions::default());
        assert!(!out.success);
        assert!(out.output.is_none());
        assert!(out.error.is_some());
    }
}

#[test]
fn grayscale_mode_with_quality_gate() {
    init_tracing();
    let frame = Frame::Color(tilted_page(600, 800, 440.0, 622.0, -2.0));
    let options = RunOptions {
        mode: RenderMode::Grayscale,
        quality_gate_enabled: true,
        ..RunOptions::default()
    };
    let out = Pipeline::default().run_frame(frame, &options);
    assert!(out.success);
    let quality = out.quality.as_ref().expect("quality requested");
    assert!(quality.document.visible);

    let json = out.report_json().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["success"], true);
    assert!(parsed["stages"]["entries"].as_array().unwrap().len() >= 7);
}

#[test]
fn aggressive_profile_pipeline_runs() {
    init_tracing();
    let config = PipelineConfig::builder()
        .shadow_profile(flatscan_core::config::ShadowProfile::Aggressive)
        .build()
        .unwrap();
    let frame = Frame::Color(tilted_page(480, 640, 352.0, 498.0, 1.5));
    let out = Pipeline::new(config).unwrap().run_frame(frame, &RunOptions::default());
    assert!(out.success);
    assert!(out.width > 300 && out.height > 440);
}
