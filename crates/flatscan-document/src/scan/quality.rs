// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture quality assessment — sharpness, focus, exposure, resolution and
// page visibility for a raw frame, before any processing.

use image::GrayImage;
use imageproc::filter::laplacian_filter;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use flatscan_core::config::{BoundaryConfig, QualityConfig};
use flatscan_core::types::{QualityMeasurements, QualityReport};
use tracing::{debug, info, instrument};

use crate::image::Frame;
use crate::scan::boundary::BoundaryDetector;

/// Scores a raw frame. Assessment never fails: a frame that cannot be
/// measured gets the worst-case report.
#[derive(Debug, Clone, Default)]
pub struct QualityGate {
    config: QualityConfig,
    detector: BoundaryDetector,
}

impl QualityGate {
    /// The page-visibility check reuses the outline detector, so both take
    /// the same boundary settings.
    pub fn new(config: QualityConfig, boundary: BoundaryConfig) -> Self {
        Self {
            config,
            detector: BoundaryDetector::new(boundary),
        }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    #[instrument(skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub fn assess(&self, frame: &Frame) -> QualityReport {
        if frame.is_empty() {
            debug!("Empty frame; reporting worst case");
            return QualityReport::worst_case(frame.width(), frame.height(), &self.config);
        }

        let gray = frame.to_gray();
        let (brightness_mean, brightness_stddev) = mean_and_stddev(&gray);
        let document_area_ratio = self
            .detector
            .detect_single_pass(frame)
            .map(|quad| quad.order().area() as f64 / frame.area() as f64);

        let measurements = QualityMeasurements {
            sharpness: laplacian_variance(&gray),
            focus: mean_gradient_magnitude(&gray),
            brightness_mean,
            brightness_stddev,
            width: frame.width(),
            height: frame.height(),
            document_area_ratio,
        };
        debug!(?measurements, "Quality measured");

        let report = QualityReport::evaluate(measurements, &self.config);
        info!(
            acceptable = report.acceptable,
            failed = report.failed_checks.len(),
            "Quality assessed"
        );
        report
    }
}

/// Variance of the discrete Laplacian; low for defocused or smeared images.
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let laplacian = laplacian_filter(gray);
    let values: Vec<f64> = laplacian.pixels().map(|p| p.0[0] as f64).collect();
    variance(&values)
}

/// Mean Sobel gradient magnitude.
pub fn mean_gradient_magnitude(gray: &GrayImage) -> f64 {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let n = (gray.width() as u64 * gray.height() as u64).max(1) as f64;
    let total: f64 = gx
        .pixels()
        .zip(gy.pixels())
        .map(|(x, y)| {
            let (x, y) = (x.0[0] as f64, y.0[0] as f64);
            (x * x + y * y).sqrt()
        })
        .sum();
    total / n
}

fn mean_and_stddev(gray: &GrayImage) -> (f64, f64) {
    let values: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    (mean, variance(&values).sqrt())
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n
}
