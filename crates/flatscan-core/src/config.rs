// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration. Every tunable threshold lives here with its
// default; stages never hard-code their own constants.

use serde::{Deserialize, Serialize};

use crate::error::FlatscanError;
use crate::types::OutputFormat;

/// Thresholds for the advisory quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
    /// Laplacian variance below this marks the frame blurry.
    pub blur_threshold: f64,
    /// Mean Sobel magnitude below this marks the frame out of focus.
    pub focus_threshold: f64,
    /// Mean intensity below this is "too dark".
    pub min_brightness: f64,
    /// Mean intensity above this is "too bright". Tuned empirically.
    pub max_brightness: f64,
    pub min_width: u32,
    pub min_height: u32,
    /// Page outline must cover at least this share of the frame to count as
    /// visible.
    pub min_document_area_ratio: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            blur_threshold: 100.0,
            focus_threshold: 50.0,
            min_brightness: 30.0,
            max_brightness: 220.0,
            min_width: 640,
            min_height: 480,
            min_document_area_ratio: 0.10,
        }
    }
}

/// Parameters for page-outline detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryConfig {
    /// Detection runs on a copy scaled by this factor.
    pub downscale: f32,
    /// Gaussian kernel size applied before edge detection.
    pub blur_kernel: u32,
    /// Canny (low, high) pairs, tried in order until one yields a page.
    pub canny_thresholds: Vec<(f32, f32)>,
    /// How many of the largest contours are examined per attempt.
    pub max_candidates: usize,
    /// Polygon approximation tolerance as a fraction of contour perimeter.
    pub approx_epsilon_ratio: f64,
    /// Minimum page area as a fraction of the (downscaled) frame area.
    pub min_area_ratio: f32,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            downscale: 0.25,
            blur_kernel: 5,
            canny_thresholds: vec![(30.0, 100.0), (50.0, 150.0), (75.0, 200.0)],
            max_candidates: 10,
            approx_epsilon_ratio: 0.02,
            min_area_ratio: 0.10,
        }
    }
}

/// How aggressively page-sized shadows are suppressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowProfile {
    /// Closing kernel clamped to `[31, 127]`.
    #[default]
    Document,
    /// Closing kernel clamped to `[31, 151]`.
    Aggressive,
}

impl ShadowProfile {
    /// Inclusive `(min, max)` bounds for the closing kernel size.
    pub fn kernel_bounds(&self) -> (u32, u32) {
        match self {
            Self::Document => (31, 127),
            Self::Aggressive => (31, 151),
        }
    }
}

/// Parameters for background estimation and shadow removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlluminationConfig {
    /// Longest side of the copy the background is estimated on.
    pub max_working_side: u32,
    /// Closing kernel size is the working copy's longest side over this.
    pub kernel_divisor: u32,
    pub profile: ShadowProfile,
    /// Background values at or below this leave the pixel untouched.
    pub min_background: u8,
    /// Extra blur applied after upscaling the background estimate.
    pub upscale_blur_kernel: u32,
}

impl Default for IlluminationConfig {
    fn default() -> Self {
        Self {
            max_working_side: 800,
            kernel_divisor: 8,
            profile: ShadowProfile::Document,
            min_background: 10,
            upscale_blur_kernel: 31,
        }
    }
}

/// Parameters for the final rendering step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhanceConfig {
    // -- document mode --
    /// Percentiles used as black and white points for the contrast stretch.
    pub stretch_percentiles: (u8, u8),
    /// Adaptive threshold block is the longest side over this.
    pub block_divisor: u32,
    pub block_min: u32,
    pub block_max: u32,
    /// Subtracted from the local mean before comparing. Tuned empirically.
    pub threshold_offset: i32,
    /// Components smaller than `max(min_component_area, h*w/component_area_divisor)`
    /// are treated as speckle.
    pub min_component_area: u32,
    pub component_area_divisor: u32,

    // -- grayscale mode --
    pub clahe_tiles: u32,
    pub clahe_clip_limit: f32,
    /// Brighten so this percentile lands on `brighten_target`...
    pub brighten_percentile: u8,
    /// ...but only when it currently sits below the target.
    pub brighten_target: u8,
    pub gamma: f32,
    pub unsharp_sigma: f32,
    /// Weight of the sharp image; the blurred copy gets `1 - unsharp_amount`.
    pub unsharp_amount: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            stretch_percentiles: (2, 98),
            block_divisor: 25,
            block_min: 51,
            block_max: 251,
            threshold_offset: 15,
            min_component_area: 25,
            component_area_divisor: 100_000,
            clahe_tiles: 8,
            clahe_clip_limit: 2.0,
            brighten_percentile: 95,
            brighten_target: 250,
            gamma: 0.85,
            unsharp_sigma: 5.0,
            unsharp_amount: 1.5,
        }
    }
}

/// Median-filter denoising applied after grayscale conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiseConfig {
    /// Filter radius in pixels; 0 disables the stage.
    pub radius: u32,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self { radius: 1 }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub quality: QualityConfig,
    pub boundary: BoundaryConfig,
    pub illumination: IlluminationConfig,
    pub enhance: EnhanceConfig,
    pub denoise: DenoiseConfig,
    pub output: OutputFormat,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Check every value is in a range the stages can work with.
    pub fn validate(&self) -> Result<(), FlatscanError> {
        let invalid = |msg: String| Err(FlatscanError::InvalidConfig(msg));

        let b = &self.boundary;
        if !(b.downscale > 0.0 && b.downscale <= 1.0) {
            return invalid(format!("downscale must be in (0, 1], got {}", b.downscale));
        }
        if b.blur_kernel == 0 || b.blur_kernel % 2 == 0 {
            return invalid(format!("blur kernel must be odd, got {}", b.blur_kernel));
        }
        if b.canny_thresholds.is_empty() {
            return invalid("at least one Canny threshold pair is required".into());
        }
        if let Some((lo, hi)) = b.canny_thresholds.iter().find(|(lo, hi)| lo > hi) {
            return invalid(format!("Canny low threshold {lo} exceeds high threshold {hi}"));
        }
        if b.max_candidates == 0 {
            return invalid("max_candidates must be at least 1".into());
        }
        if !(b.approx_epsilon_ratio > 0.0) {
            return invalid("approx_epsilon_ratio must be positive".into());
        }
        if !(b.min_area_ratio > 0.0 && b.min_area_ratio <= 1.0) {
            return invalid(format!("page min_area_ratio must be in (0, 1], got {}", b.min_area_ratio));
        }

        let i = &self.illumination;
        if i.max_working_side == 0 || i.kernel_divisor == 0 {
            return invalid("illumination working side and divisor must be non-zero".into());
        }
        if i.upscale_blur_kernel == 0 || i.upscale_blur_kernel % 2 == 0 {
            return invalid(format!(
                "upscale blur kernel must be odd, got {}",
                i.upscale_blur_kernel
            ));
        }

        let e = &self.enhance;
        let (lo, hi) = e.stretch_percentiles;
        if hi > 100 || lo >= hi {
            return invalid(format!("stretch percentiles must satisfy lo < hi <= 100, got ({lo}, {hi})"));
        }
        if e.block_divisor == 0 || e.block_min > e.block_max || e.block_min % 2 == 0 || e.block_max % 2 == 0 {
            return invalid(format!(
                "adaptive block bounds must be odd and ordered, got [{}, {}]",
                e.block_min, e.block_max
            ));
        }
        if e.component_area_divisor == 0 {
            return invalid("component_area_divisor must be non-zero".into());
        }
        if e.clahe_tiles == 0 || e.clahe_clip_limit <= 0.0 {
            return invalid("CLAHE needs at least one tile and a positive clip limit".into());
        }
        if e.brighten_percentile > 100 {
            return invalid(format!("brighten percentile out of range: {}", e.brighten_percentile));
        }
        if e.brighten_target == 0 {
            return invalid("brighten target must be above zero".into());
        }
        if e.gamma <= 0.0 || e.unsharp_sigma <= 0.0 {
            return invalid("gamma and unsharp sigma must be positive".into());
        }

        let q = &self.quality;
        if !(q.min_document_area_ratio > 0.0 && q.min_document_area_ratio <= 1.0) {
            return invalid(format!(
                "min_document_area_ratio must be in (0, 1], got {}",
                q.min_document_area_ratio
            ));
        }
        if q.min_brightness > q.max_brightness {
            return invalid(format!(
                "brightness bounds inverted: {} > {}",
                q.min_brightness, q.max_brightness
            ));
        }

        if let OutputFormat::Jpeg { quality } = self.output {
            if !(1..=100).contains(&quality) {
                return invalid(format!("JPEG quality must be 1-100, got {quality}"));
            }
        }

        Ok(())
    }
}

/// Builder for [`PipelineConfig`]. Unset values keep their defaults.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Laplacian variance below which a frame is blurry.
    #[must_use]
    pub fn blur_threshold(mut self, threshold: f64) -> Self {
        self.config.quality.blur_threshold = threshold;
        self
    }

    /// Mean gradient magnitude below which a frame is out of focus.
    #[must_use]
    pub fn focus_threshold(mut self, threshold: f64) -> Self {
        self.config.quality.focus_threshold = threshold;
        self
    }

    /// Acceptable mean-brightness window.
    #[must_use]
    pub fn brightness_bounds(mut self, min: f64, max: f64) -> Self {
        self.config.quality.min_brightness = min;
        self.config.quality.max_brightness = max;
        self
    }

    #[must_use]
    pub fn min_resolution(mut self, width: u32, height: u32) -> Self {
        self.config.quality.min_width = width;
        self.config.quality.min_height = height;
        self
    }

    /// Scale factor applied before outline detection.
    #[must_use]
    pub fn detection_downscale(mut self, factor: f32) -> Self {
        self.config.boundary.downscale = factor;
        self
    }

    /// Replace the Canny escalation sequence.
    #[must_use]
    pub fn canny_thresholds(mut self, pairs: Vec<(f32, f32)>) -> Self {
        self.config.boundary.canny_thresholds = pairs;
        self
    }

    #[must_use]
    pub fn min_page_area_ratio(mut self, ratio: f32) -> Self {
        self.config.boundary.min_area_ratio = ratio;
        self
    }

    #[must_use]
    pub fn shadow_profile(mut self, profile: ShadowProfile) -> Self {
        self.config.illumination.profile = profile;
        self
    }

    #[must_use]
    pub fn shadow_kernel_divisor(mut self, divisor: u32) -> Self {
        self.config.illumination.kernel_divisor = divisor;
        self
    }

    #[must_use]
    pub fn threshold_offset(mut self, offset: i32) -> Self {
        self.config.enhance.threshold_offset = offset;
        self
    }

    /// Floor for the speckle-removal area.
    #[must_use]
    pub fn min_component_area(mut self, area: u32) -> Self {
        self.config.enhance.min_component_area = area;
        self
    }

    #[must_use]
    pub fn gamma(mut self, gamma: f32) -> Self {
        self.config.enhance.gamma = gamma;
        self
    }

    /// Median-filter radius; 0 disables denoising.
    #[must_use]
    pub fn denoise_radius(mut self, radius: u32) -> Self {
        self.config.denoise.radius = radius;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output = format;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<PipelineConfig, FlatscanError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
