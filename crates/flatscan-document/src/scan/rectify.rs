// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective rectification — warps the detected page quadrilateral into a
// fronto-parallel rectangle.

use image::{Luma, Rgb};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use flatscan_core::error::FlatscanError;
use flatscan_core::{OrderedCorners, Quadrilateral};
use tracing::{debug, info, instrument, warn};

use crate::image::Frame;

/// How far a corner may sit outside the frame, as a fraction of its longest
/// side. Detected outlines hug the frame edge, but never run far past it.
const CORNER_TOLERANCE: f32 = 0.05;

/// Largest output side, as a multiple of the frame's longest side.
const MAX_TARGET_SCALE: u32 = 2;

/// Crops and straightens a document given its four corners.
#[derive(Debug, Clone, Copy, Default)]
pub struct PerspectiveRectifier;

impl PerspectiveRectifier {
    pub fn new() -> Self {
        Self
    }

    /// Rectify `frame` to the page outlined by `quad`.
    ///
    /// Without a quadrilateral the frame is returned unchanged. If the
    /// corners are degenerate or the homography cannot be solved, the frame
    /// is also returned unchanged.
    pub fn rectify(&self, frame: &Frame, quad: Option<&Quadrilateral>) -> Frame {
        let Some(quad) = quad else {
            return frame.clone();
        };
        match self.try_rectify(frame, quad) {
            Ok(rectified) => rectified,
            Err(err) => {
                warn!(%err, "Perspective rectification failed; returning frame unchanged");
                frame.clone()
            }
        }
    }

    /// Rectify, reporting why the warp could not be computed.
    ///
    /// The output is `w × h` where `w` is the longer of the top and bottom
    /// edges and `h` the longer of the left and right edges, so a page shot
    /// at an angle is never under-cropped.
    #[instrument(skip(self, frame, quad), fields(width = frame.width(), height = frame.height()))]
    pub fn try_rectify(&self, frame: &Frame, quad: &Quadrilateral) -> Result<Frame, FlatscanError> {
        if frame.is_empty() {
            return Err(FlatscanError::EmptyFrame);
        }

        let corners = quad.order();
        validate_corners(&corners, frame.width(), frame.height())?;

        let (out_w, out_h) = corners.target_size();
        let max_side = frame.width().max(frame.height()).saturating_mul(MAX_TARGET_SCALE);
        if out_w < 2 || out_h < 2 || out_w > max_side || out_h > max_side {
            return Err(FlatscanError::DegenerateQuadrilateral(format!(
                "target size {out_w}x{out_h} is outside 2..={max_side}"
            )));
        }
        debug!(
            top_left = ?corners.top_left,
            top_right = ?corners.top_right,
            bottom_right = ?corners.bottom_right,
            bottom_left = ?corners.bottom_left,
            out_w,
            out_h,
            "Ordered page corners"
        );

        let (right, bottom) = ((out_w - 1) as f32, (out_h - 1) as f32);
        let dest: [(f32, f32); 4] = [
            (0.0, 0.0),       // top-left
            (right, 0.0),     // top-right
            (right, bottom),  // bottom-right
            (0.0, bottom),    // bottom-left
        ];

        // from_control_points computes the mapping from the page corners to
        // the output rectangle.
        let projection = Projection::from_control_points(corners.to_tuples(), dest)
            .ok_or(FlatscanError::SingularHomography)?;

        let rectified = match frame {
            Frame::Color(img) => {
                let mut out = image::RgbImage::new(out_w, out_h);
                warp_into(img, &projection, Interpolation::Bilinear, Rgb([255, 255, 255]), &mut out);
                Frame::Color(out)
            }
            Frame::Gray(img) => {
                let mut out = image::GrayImage::new(out_w, out_h);
                warp_into(img, &projection, Interpolation::Bilinear, Luma([255]), &mut out);
                Frame::Gray(out)
            }
        };

        info!(out_w, out_h, "Perspective rectification applied");
        Ok(rectified)
    }
}

/// Reject corner sets no homography can sensibly map to a rectangle, and
/// corners lying well outside a `width × height` frame.
fn validate_corners(corners: &OrderedCorners, width: u32, height: u32) -> Result<(), FlatscanError> {
    let points = corners.to_array();
    if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(FlatscanError::DegenerateQuadrilateral("non-finite corner".into()));
    }
    let margin = width.max(height) as f32 * CORNER_TOLERANCE;
    let (max_x, max_y) = (width as f32 + margin, height as f32 + margin);
    if let Some(p) = points
        .iter()
        .find(|p| p.x < -margin || p.y < -margin || p.x > max_x || p.y > max_y)
    {
        return Err(FlatscanError::DegenerateQuadrilateral(format!(
            "corner ({}, {}) lies outside the {width}x{height} frame",
            p.x, p.y
        )));
    }
    if !corners.is_simple() {
        return Err(FlatscanError::DegenerateQuadrilateral(
            "corners do not form a simple polygon".into(),
        ));
    }
    if corners.area() < 1.0 {
        return Err(FlatscanError::DegenerateQuadrilateral("zero area".into()));
    }
    Ok(())
}
