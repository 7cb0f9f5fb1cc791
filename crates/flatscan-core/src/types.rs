// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Flatscan document pipeline.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::QualityConfig;
use crate::guidance::humanize_issue;

/// Unique identifier for a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Final rendering style produced by the enhancer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Pure black-and-white output tuned for printing and OCR.
    #[default]
    Document,
    /// Natural-looking grayscale output tuned for on-screen preview.
    Grayscale,
}

/// Encoding used for the pipeline's output image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Lossy JPEG with the given quality (1-100).
    Jpeg { quality: u8 },
    /// Lossless PNG.
    Png,
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jpeg { quality: 95 }
    }
}

// -- Geometry -----------------------------------------------------------------

/// A 2-D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    fn as_tuple(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

/// Four unordered points describing a candidate document boundary.
///
/// The points live in the coordinate space of the frame they were detected
/// in; [`Quadrilateral::scaled`] converts between downscaled and full-frame
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quadrilateral {
    pub points: [Point; 4],
}

impl Quadrilateral {
    pub fn new(points: [Point; 4]) -> Self {
        Self { points }
    }

    /// Enclosed area, computed on the canonically ordered corners so that the
    /// order the points were supplied in does not matter.
    pub fn area(&self) -> f32 {
        self.order().area()
    }

    /// Multiply every coordinate by `(sx, sy)`.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self {
            points: self.points.map(|p| Point::new(p.x * sx, p.y * sy)),
        }
    }

    /// Label the four points top-left, top-right, bottom-right, bottom-left.
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest. Top-right
    /// has the smallest `y - x`, bottom-left the largest. Ordering an already
    /// ordered quadrilateral returns the same corners.
    pub fn order(&self) -> OrderedCorners {
        let pts = &self.points;
        let by = |key: fn(&Point) -> f32, want_max: bool| -> Point {
            let mut best = pts[0];
            for p in &pts[1..] {
                let better = if want_max {
                    key(p) > key(&best)
                } else {
                    key(p) < key(&best)
                };
                if better {
                    best = *p;
                }
            }
            best
        };

        OrderedCorners {
            top_left: by(|p| p.x + p.y, false),
            top_right: by(|p| p.y - p.x, false),
            bottom_right: by(|p| p.x + p.y, true),
            bottom_left: by(|p| p.y - p.x, true),
        }
    }
}

/// A quadrilateral with labelled corners in the fixed order
/// top-left, top-right, bottom-right, bottom-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderedCorners {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_right: Point,
    pub bottom_left: Point,
}

impl OrderedCorners {
    /// Corners as an array in TL, TR, BR, BL order.
    pub fn to_array(&self) -> [Point; 4] {
        [
            self.top_left,
            self.top_right,
            self.bottom_right,
            self.bottom_left,
        ]
    }

    /// Corners as `(x, y)` tuples in TL, TR, BR, BL order.
    pub fn to_tuples(&self) -> [(f32, f32); 4] {
        self.to_array().map(|p| p.as_tuple())
    }

    /// Drop the labels again.
    pub fn to_quadrilateral(&self) -> Quadrilateral {
        Quadrilateral::new(self.to_array())
    }

    /// Shoelace area of the polygon TL → TR → BR → BL.
    pub fn area(&self) -> f32 {
        let pts = self.to_array();
        let mut area = 0.0f32;
        for i in 0..4 {
            let j = (i + 1) % 4;
            area += pts[i].x * pts[j].y;
            area -= pts[j].x * pts[i].y;
        }
        area.abs() / 2.0
    }

    /// Output size of the rectified page: the longer of each pair of
    /// opposite edges, rounded down.
    pub fn target_size(&self) -> (u32, u32) {
        let width = self
            .bottom_right
            .distance(&self.bottom_left)
            .max(self.top_right.distance(&self.top_left));
        let height = self
            .top_right
            .distance(&self.bottom_right)
            .max(self.top_left.distance(&self.bottom_left));
        (width.max(0.0).floor() as u32, height.max(0.0).floor() as u32)
    }

    /// Whether the polygon TL → TR → BR → BL has no crossing edges and no
    /// repeated corner.
    pub fn is_simple(&self) -> bool {
        let p = self.to_array();
        for i in 0..4 {
            for j in (i + 1)..4 {
                if p[i].distance(&p[j]) < f32::EPSILON {
                    return false;
                }
            }
        }
        // Only non-adjacent edge pairs can cross in a quadrilateral.
        !segments_cross(p[0], p[1], p[2], p[3]) && !segments_cross(p[1], p[2], p[3], p[0])
    }
}

/// Proper intersection test for segments `a1-a2` and `b1-b2`.
fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    fn orient(p: Point, q: Point, r: Point) -> f32 {
        (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x)
    }
    let d1 = orient(b1, b2, a1);
    let d2 = orient(b1, b2, a2);
    let d3 = orient(a1, a2, b1);
    let d4 = orient(a1, a2, b2);
    ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
}

// -- Quality report -------------------------------------------------------------

/// A single failed quality check, declared in recommendation priority order
/// (blur, lighting, resolution, framing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityIssue {
    Blurry,
    OutOfFocus,
    TooDark,
    TooBright,
    LowResolution,
    DocumentNotFound,
}

impl std::fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Blurry => "image is blurry",
            Self::OutOfFocus => "image is out of focus",
            Self::TooDark => "image is too dark",
            Self::TooBright => "image is too bright",
            Self::LowResolution => "image resolution is too low",
            Self::DocumentNotFound => "document outline not detected",
        };
        f.write_str(text)
    }
}

/// Laplacian-variance sharpness measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SharpnessCheck {
    pub score: f64,
    pub threshold: f64,
    pub acceptable: bool,
}

/// Mean Sobel gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusCheck {
    pub score: f64,
    pub threshold: f64,
    pub acceptable: bool,
}

/// Grayscale intensity statistics. `stddev` is reported as contrast only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BrightnessCheck {
    pub mean: f64,
    pub stddev: f64,
    pub too_dark: bool,
    pub too_bright: bool,
    pub acceptable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionCheck {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub acceptable: bool,
}

/// Whether a page outline could be found. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocumentCheck {
    pub visible: bool,
    pub confidence: f64,
}

/// Raw measurements gathered by the quality gate before any verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityMeasurements {
    pub sharpness: f64,
    pub focus: f64,
    pub brightness_mean: f64,
    pub brightness_stddev: f64,
    pub width: u32,
    pub height: u32,
    /// Area of the detected page outline divided by the frame area, if one
    /// was found.
    pub document_area_ratio: Option<f64>,
}

/// Verdict on a raw frame. Built once by [`QualityReport::evaluate`] and not
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub sharpness: SharpnessCheck,
    pub focus: FocusCheck,
    pub brightness: BrightnessCheck,
    pub resolution: ResolutionCheck,
    pub document: DocumentCheck,
    /// Sharp, focused, neither too dark nor too bright, and large enough.
    pub acceptable: bool,
    /// Failed checks in priority order.
    pub failed_checks: Vec<QualityIssue>,
    /// Human-readable issue descriptions, one per failed check.
    pub issues: Vec<String>,
    /// What the user should change, one per failed check.
    pub recommendations: Vec<String>,
}

impl QualityReport {
    /// Apply the configured thresholds to a set of measurements.
    pub fn evaluate(m: QualityMeasurements, config: &QualityConfig) -> Self {
        let sharpness = SharpnessCheck {
            score: m.sharpness,
            threshold: config.blur_threshold,
            acceptable: m.sharpness >= config.blur_threshold,
        };
        let focus = FocusCheck {
            score: m.focus,
            threshold: config.focus_threshold,
            acceptable: m.focus >= config.focus_threshold,
        };
        let too_dark = m.brightness_mean < config.min_brightness;
        let too_bright = m.brightness_mean > config.max_brightness;
        let brightness = BrightnessCheck {
            mean: m.brightness_mean,
            stddev: m.brightness_stddev,
            too_dark,
            too_bright,
            acceptable: !too_dark && !too_bright,
        };
        let resolution = ResolutionCheck {
            width: m.width,
            height: m.height,
            min_width: config.min_width,
            min_height: config.min_height,
            acceptable: m.width >= config.min_width && m.height >= config.min_height,
        };
        let document = match m.document_area_ratio {
            Some(ratio) if ratio >= config.min_document_area_ratio => DocumentCheck {
                visible: true,
                confidence: ratio.min(1.0),
            },
            _ => DocumentCheck {
                visible: false,
                confidence: 0.0,
            },
        };

        let mut failed_checks = Vec::new();
        if !sharpness.acceptable {
            failed_checks.push(QualityIssue::Blurry);
        }
        if !focus.acceptable {
            failed_checks.push(QualityIssue::OutOfFocus);
        }
        if too_dark {
            failed_checks.push(QualityIssue::TooDark);
        }
        if too_bright {
            failed_checks.push(QualityIssue::TooBright);
        }
        if !resolution.acceptable {
            failed_checks.push(QualityIssue::LowResolution);
        }
        if !document.visible {
            failed_checks.push(QualityIssue::DocumentNotFound);
        }
        failed_checks.sort();

        let issues = failed_checks
            .iter()
            .map(|issue| match issue {
                QualityIssue::Blurry => format!(
                    "{issue} (sharpness {:.1} < {:.1})",
                    sharpness.score, sharpness.threshold
                ),
                QualityIssue::OutOfFocus => {
                    format!("{issue} (focus {:.1} < {:.1})", focus.score, focus.threshold)
                }
                QualityIssue::TooDark | QualityIssue::TooBright => {
                    format!("{issue} (mean brightness {:.1})", brightness.mean)
                }
                QualityIssue::LowResolution => format!(
                    "{issue} ({}x{} < {}x{})",
                    resolution.width, resolution.height, resolution.min_width, resolution.min_height
                ),
                QualityIssue::DocumentNotFound => issue.to_string(),
            })
            .collect();
        let recommendations = failed_checks
            .iter()
            .map(|issue| humanize_issue(*issue).suggestion)
            .collect();

        let acceptable = sharpness.acceptable
            && focus.acceptable
            && brightness.acceptable
            && resolution.acceptable;

        Self {
            sharpness,
            focus,
            brightness,
            resolution,
            document,
            acceptable,
            failed_checks,
            issues,
            recommendations,
        }
    }

    /// Report for a frame that could not be measured at all: every score is
    /// zero, so every gating check fails.
    pub fn worst_case(width: u32, height: u32, config: &QualityConfig) -> Self {
        Self::evaluate(
            QualityMeasurements {
                sharpness: 0.0,
                focus: 0.0,
                brightness_mean: 0.0,
                brightness_stddev: 0.0,
                width,
                height,
                document_area_ratio: None,
            },
            config,
        )
    }
}

// -- Stage report ---------------------------------------------------------------

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    QualityGate,
    BoundaryDetection,
    Rectification,
    Grayscale,
    Denoise,
    IlluminationNormalization,
    Enhancement,
    Encode,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::QualityGate => "quality_gate",
            Self::BoundaryDetection => "boundary_detection",
            Self::Rectification => "rectification",
            Self::Grayscale => "grayscale",
            Self::Denoise => "denoise",
            Self::IlluminationNormalization => "illumination_normalization",
            Self::Enhancement => "enhancement",
            Self::Encode => "encode",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one stage in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub stage: Stage,
    pub success: bool,
    pub elapsed: Duration,
    /// The stage could not run its primary path and passed its input through
    /// (or used a documented default) instead.
    pub fallback_used: bool,
    /// Why the fallback was taken, when it was.
    pub note: Option<String>,
}

/// Ordered record of every stage executed in a run. Only
/// [`StageReportBuilder::finish`] creates one, so a finished report cannot
/// be extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    run_id: RunId,
    started_at: DateTime<Utc>,
    entries: Vec<StageEntry>,
}

impl StageReport {
    pub fn builder(run_id: RunId) -> StageReportBuilder {
        StageReportBuilder {
            run_id,
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn entries(&self) -> &[StageEntry] {
        &self.entries
    }

    /// First entry recorded for `stage`, if it ran.
    pub fn entry(&self, stage: Stage) -> Option<&StageEntry> {
        self.entries.iter().find(|e| e.stage == stage)
    }

    /// Whether any stage fell back.
    pub fn any_fallback(&self) -> bool {
        self.entries.iter().any(|e| e.fallback_used)
    }

    /// Sum of all stage timings.
    pub fn total_elapsed(&self) -> Duration {
        self.entries.iter().map(|e| e.elapsed).sum()
    }
}

/// Mutable accumulator the orchestrator appends to while a run is in flight.
#[derive(Debug)]
pub struct StageReportBuilder {
    run_id: RunId,
    started_at: DateTime<Utc>,
    entries: Vec<StageEntry>,
}

impl StageReportBuilder {
    /// Record a stage that ran its primary path.
    pub fn success(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push(StageEntry {
            stage,
            success: true,
            elapsed,
            fallback_used: false,
            note: None,
        });
    }

    /// Record a stage that completed via its fallback path.
    pub fn fallback(&mut self, stage: Stage, elapsed: Duration, note: impl Into<String>) {
        self.entries.push(StageEntry {
            stage,
            success: true,
            elapsed,
            fallback_used: true,
            note: Some(note.into()),
        });
    }

    /// Record a stage that failed outright and aborted the run.
    pub fn failure(&mut self, stage: Stage, elapsed: Duration, note: impl Into<String>) {
        self.entries.push(StageEntry {
            stage,
            success: false,
            elapsed,
            fallback_used: false,
            note: Some(note.into()),
        });
    }

    pub fn finish(self) -> StageReport {
        StageReport {
            run_id: self.run_id,
            started_at: self.started_at,
            entries: self.entries,
        }
    }
}
