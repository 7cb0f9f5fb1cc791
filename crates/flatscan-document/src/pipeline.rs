// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline orchestration — decode, assess, locate, straighten, clean and
// encode one captured frame, recording what each stage did.

use std::time::Instant;

use flatscan_core::config::PipelineConfig;
use flatscan_core::error::FlatscanError;
use flatscan_core::guidance::{HumanGuidance, humanize_error};
use flatscan_core::types::{
    OrderedCorners, Quadrilateral, QualityReport, RenderMode, RunId, Stage, StageReport,
    StageReportBuilder,
};
use imageproc::filter::median_filter;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::image::Frame;
use crate::scan::{
    BoundaryDetector, DocumentEnhancer, IlluminationNormalizer, PerspectiveRectifier, QualityGate,
};

/// Per-call switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Locate and straighten the page. Off when the caller already supplies
    /// a cropped page.
    pub detect_boundary: bool,
    pub mode: RenderMode,
    /// Score the raw frame first. Advisory only: a poor score never stops
    /// processing.
    pub quality_gate_enabled: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            detect_boundary: true,
            mode: RenderMode::Document,
            quality_gate_enabled: false,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub success: bool,
    /// Encoded output image; absent when the run failed.
    #[serde(skip)]
    pub output: Option<Vec<u8>>,
    /// Present only when the quality gate was enabled.
    pub quality: Option<QualityReport>,
    pub stages: StageReport,
    pub error: Option<String>,
    /// What the user can do about `error`.
    pub guidance: Option<HumanGuidance>,
    /// Page corners in input-frame coordinates, when a page was found and
    /// straightened.
    pub corners: Option<OrderedCorners>,
    /// Dimensions of the output image.
    pub width: u32,
    pub height: u32,
}

impl PipelineOutput {
    pub fn run_id(&self) -> RunId {
        self.stages.run_id()
    }

    /// Everything but the image bytes, as pretty-printed JSON.
    pub fn report_json(&self) -> Result<String, FlatscanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn failed(stages: StageReport, quality: Option<QualityReport>, err: &FlatscanError) -> Self {
        Self {
            success: false,
            output: None,
            quality,
            stages,
            error: Some(err.to_string()),
            guidance: Some(humanize_error(err)),
            corners: None,
            width: 0,
            height: 0,
        }
    }
}

/// The document-normalisation pipeline. Holds configuration only; every run
/// works on its own copy of the frame, so one pipeline can serve concurrent
/// callers.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    quality: QualityGate,
    detector: BoundaryDetector,
    rectifier: PerspectiveRectifier,
    illumination: IlluminationNormalizer,
    enhancer: DocumentEnhancer,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, FlatscanError> {
        config.validate()?;
        Ok(Self {
            quality: QualityGate::new(config.quality.clone(), config.boundary.clone()),
            detector: BoundaryDetector::new(config.boundary.clone()),
            rectifier: PerspectiveRectifier::new(),
            illumination: IlluminationNormalizer::new(config.illumination.clone()),
            enhancer: DocumentEnhancer::new(config.enhance.clone()),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Decode `bytes` and process them.
    ///
    /// Only undecodable or empty input (and a failure to encode the result)
    /// makes the run unsuccessful; every other problem is recorded as a stage
    /// fallback and processing continues.
    pub fn run(&self, bytes: &[u8], options: &RunOptions) -> PipelineOutput {
        let run_id = RunId::new();
        let _span = info_span!("pipeline_run", %run_id, mode = ?options.mode).entered();
        let mut stages = StageReport::builder(run_id);

        let started = Instant::now();
        match Frame::from_bytes(bytes) {
            Ok(frame) => {
                stages.success(Stage::Decode, started.elapsed());
                self.process(frame, options, stages)
            }
            Err(err) => {
                warn!(%err, len = bytes.len(), "Input could not be decoded");
                stages.failure(Stage::Decode, started.elapsed(), err.to_string());
                PipelineOutput::failed(stages.finish(), None, &err)
            }
        }
    }

    /// Process an already decoded frame.
    pub fn run_frame(&self, frame: Frame, options: &RunOptions) -> PipelineOutput {
        let run_id = RunId::new();
        let _span = info_span!("pipeline_run", %run_id, mode = ?options.mode).entered();
        let stages = StageReport::builder(run_id);
        self.process(frame, options, stages)
    }

    fn process(
        &self,
        frame: Frame,
        options: &RunOptions,
        mut stages: StageReportBuilder,
    ) -> PipelineOutput {
        if frame.is_empty() {
            let err = FlatscanError::EmptyFrame;
            warn!("Input frame has zero area");
            stages.failure(Stage::Decode, Default::default(), err.to_string());
            return PipelineOutput::failed(stages.finish(), None, &err);
        }
        info!(width = frame.width(), height = frame.height(), "Processing frame");

        let quality = options.quality_gate_enabled.then(|| {
            let started = Instant::now();
            let report = self.quality.assess(&frame);
            stages.success(Stage::QualityGate, started.elapsed());
            if !report.acceptable {
                warn!(issues = ?report.failed_checks, "Frame quality below thresholds; continuing");
            }
            report
        });

        let (page, corners) = if options.detect_boundary {
            self.locate_and_rectify(frame, &mut stages)
        } else {
            (frame, None)
        };

        let started = Instant::now();
        let gray = page.into_gray();
        stages.success(Stage::Grayscale, started.elapsed());

        let radius = self.config.denoise.radius;
        let gray = if radius > 0 {
            let started = Instant::now();
            let denoised = median_filter(&gray, radius, radius);
            stages.success(Stage::Denoise, started.elapsed());
            denoised
        } else {
            gray
        };

        let started = Instant::now();
        let gray = match self.illumination.try_remove_shadows(&gray) {
            Ok(flat) => {
                stages.success(Stage::IlluminationNormalization, started.elapsed());
                flat
            }
            Err(err) => {
                warn!(%err, "Shadow removal fell back to pass-through");
                stages.fallback(Stage::IlluminationNormalization, started.elapsed(), err.to_string());
                gray
            }
        };

        let started = Instant::now();
        let rendered = match self.enhancer.try_enhance(&gray, options.mode) {
            Ok(out) => {
                stages.success(Stage::Enhancement, started.elapsed());
                out
            }
            Err(err) => {
                warn!(%err, "Enhancement fell back to pass-through");
                stages.fallback(Stage::Enhancement, started.elapsed(), err.to_string());
                gray
            }
        };

        let started = Instant::now();
        let result = Frame::Gray(rendered);
        match result.encode(self.config.output) {
            Ok(bytes) => {
                stages.success(Stage::Encode, started.elapsed());
                let stages = stages.finish();
                info!(
                    width = result.width(),
                    height = result.height(),
                    bytes = bytes.len(),
                    fallback = stages.any_fallback(),
                    elapsed_ms = stages.total_elapsed().as_millis() as u64,
                    "Pipeline run complete"
                );
                PipelineOutput {
                    success: true,
                    output: Some(bytes),
                    quality,
                    stages,
                    error: None,
                    guidance: None,
                    corners,
                    width: result.width(),
                    height: result.height(),
                }
            }
            Err(err) => {
                warn!(%err, "Output encoding failed");
                stages.failure(Stage::Encode, started.elapsed(), err.to_string());
                PipelineOutput::failed(stages.finish(), quality, &err)
            }
        }
    }

    /// Boundary detection and rectification. Either stage falling back
    /// leaves the full frame in play.
    fn locate_and_rectify(
        &self,
        frame: Frame,
        stages: &mut StageReportBuilder,
    ) -> (Frame, Option<OrderedCorners>) {
        let started = Instant::now();
        let quad = self.detector.detect(&frame);
        match &quad {
            Some(_) => stages.success(Stage::BoundaryDetection, started.elapsed()),
            None => {
                warn!("No page outline found; using the full frame");
                stages.fallback(
                    Stage::BoundaryDetection,
                    started.elapsed(),
                    "no page outline found",
                );
            }
        }

        self.rectify_detected(frame, quad, stages)
    }

    /// Rectify to a detected outline, or keep the full frame when there is
    /// none or the warp cannot be built.
    fn rectify_detected(
        &self,
        frame: Frame,
        quad: Option<Quadrilateral>,
        stages: &mut StageReportBuilder,
    ) -> (Frame, Option<OrderedCorners>) {
        let started = Instant::now();
        let Some(quad) = quad else {
            stages.fallback(Stage::Rectification, started.elapsed(), "full frame used");
            return (frame, None);
        };
        match self.rectifier.try_rectify(&frame, &quad) {
            Ok(page) => {
                stages.success(Stage::Rectification, started.elapsed());
                (page, Some(quad.order()))
            }
            Err(err) => {
                warn!(%err, "Rectification fell back to the full frame");
                stages.fallback(Stage::Rectification, started.elapsed(), err.to_string());
                (frame, None)
            }
        }
    }
}
