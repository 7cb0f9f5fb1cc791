// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page outline detection — finds the quadrilateral a photographed document
// occupies, using edge detection on a downscaled copy of the frame.

use image::imageops::{self, FilterType};
use image::GrayImage;
use imageproc::contours::{BorderType, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::morphology::dilate;
use flatscan_core::config::BoundaryConfig;
use flatscan_core::{Point, Quadrilateral};
use tracing::{debug, info, instrument};

use crate::image::Frame;
use crate::scan::filters::blur_with_kernel;

/// Smallest downscaled side that still leaves room for a page outline.
const MIN_WORKING_SIDE: u32 = 16;

/// Locates the document quadrilateral in a frame.
///
/// ## Pipeline
///
/// 1. Downscale by `config.downscale` and convert to grayscale
/// 2. Gaussian blur to suppress sensor noise
/// 3. For each Canny threshold pair, in order:
///    - detect edges and dilate them (3×3) to close small gaps
///    - extract outer contours and keep the largest few
///    - approximate each with a polygon; the first four-sided one covering
///      enough of the frame wins
/// 4. Scale the winning corners back to full-frame coordinates
///
/// Finding nothing is a normal outcome: callers process the full frame.
#[derive(Debug, Clone, Default)]
pub struct BoundaryDetector {
    config: BoundaryConfig,
}

impl BoundaryDetector {
    pub fn new(config: BoundaryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Search with every configured threshold pair.
    #[instrument(skip(self, frame), fields(width = frame.width(), height = frame.height()))]
    pub fn detect(&self, frame: &Frame) -> Option<Quadrilateral> {
        self.detect_with(frame, &self.config.canny_thresholds)
    }

    /// Search with the first threshold pair only. Cheap enough for the
    /// quality gate's visibility check.
    pub fn detect_single_pass(&self, frame: &Frame) -> Option<Quadrilateral> {
        let first = self.config.canny_thresholds.first().copied()?;
        self.detect_with(frame, &[first])
    }

    fn detect_with(&self, frame: &Frame, thresholds: &[(f32, f32)]) -> Option<Quadrilateral> {
        let (w, h) = (frame.width(), frame.height());
        let small_w = ((w as f32 * self.config.downscale).round() as u32).min(w);
        let small_h = ((h as f32 * self.config.downscale).round() as u32).min(h);
        if small_w < MIN_WORKING_SIDE || small_h < MIN_WORKING_SIDE {
            debug!(small_w, small_h, "Frame too small for outline detection");
            return None;
        }

        let gray = frame.to_gray();
        let small = if (small_w, small_h) == (w, h) {
            gray
        } else {
            imageops::resize(&gray, small_w, small_h, FilterType::Triangle)
        };
        let blurred = blur_with_kernel(&small, self.config.blur_kernel);
        let min_area = small_w as f32 * small_h as f32 * self.config.min_area_ratio;

        for (attempt, &(low, high)) in thresholds.iter().enumerate() {
            let Some(quad) = self.find_page(&blurred, low, high, min_area) else {
                debug!(attempt, low, high, "No page outline at this threshold");
                continue;
            };

            // Back to full-frame coordinates using the exact per-axis ratio.
            let full = quad.scaled(w as f32 / small_w as f32, h as f32 / small_h as f32);
            info!(attempt, low, high, area = full.area(), "Page outline detected");
            return Some(full);
        }

        debug!("No page outline found after all thresholds");
        None
    }

    /// One detection attempt on an already blurred, downscaled image.
    fn find_page(&self, blurred: &GrayImage, low: f32, high: f32, min_area: f32) -> Option<Quadrilateral> {
        let edges = canny(blurred, low, high);
        let closed = dilate(&edges, Norm::LInf, 1);

        let mut candidates: Vec<(f32, Vec<Point>)> = find_contours::<i32>(&closed)
            .into_iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| {
                let points: Vec<Point> = c
                    .points
                    .iter()
                    .map(|p| Point::new(p.x as f32, p.y as f32))
                    .collect();
                (polygon_area(&points), points)
            })
            .collect();
        candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        debug!(contours = candidates.len(), low, high, "Outer contours extracted");

        for (area, points) in candidates.iter().take(self.config.max_candidates) {
            if points.len() < 4 {
                continue;
            }
            let epsilon = self.config.approx_epsilon_ratio * perimeter(points) as f64;
            let polygon = approximate_closed_polygon(points, epsilon as f32);
            if polygon.len() != 4 {
                continue;
            }
            let quad_area = polygon_area(&polygon);
            debug!(contour_area = area, quad_area, min_area, "Four-sided candidate");
            if quad_area > min_area {
                return Some(Quadrilateral::new([polygon[0], polygon[1], polygon[2], polygon[3]]));
            }
        }
        None
    }
}

// -- Polygon helpers ----------------------------------------------------------

/// Shoelace area of a closed polygon.
fn polygon_area(points: &[Point]) -> f32 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0f64;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x as f64 * points[j].y as f64;
        area -= points[j].x as f64 * points[i].y as f64;
    }
    (area.abs() / 2.0) as f32
}

/// Length of a closed polyline.
fn perimeter(points: &[Point]) -> f32 {
    let n = points.len();
    (0..n).map(|i| points[i].distance(&points[(i + 1) % n])).sum()
}

/// Distance from `p` to the segment `a-b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 <= f32::EPSILON {
        return p.distance(&a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&Point::new(a.x + t * dx, a.y + t * dy))
}

/// Douglas–Peucker on an open chain; both endpoints are always kept.
fn simplify_chain(chain: &[Point], epsilon: f32, out: &mut Vec<Point>) {
    let Some((&first, rest)) = chain.split_first() else {
        return;
    };
    let Some(&last) = rest.last() else {
        out.push(first);
        return;
    };

    let mut max_dist = 0.0f32;
    let mut split = 0usize;
    for (i, &p) in chain.iter().enumerate().take(chain.len() - 1).skip(1) {
        let d = segment_distance(p, first, last);
        if d > max_dist {
            max_dist = d;
            split = i;
        }
    }

    if max_dist > epsilon {
        simplify_chain(&chain[..=split], epsilon, out);
        out.pop();
        simplify_chain(&chain[split..], epsilon, out);
    } else {
        out.push(first);
        out.push(last);
    }
}

/// Approximate a closed contour with a polygon whose vertices deviate from
/// the contour by at most `epsilon`.
///
/// The contour is split at the point farthest from its start, each half is
/// simplified separately, and a final pass drops vertices that became
/// redundant because the start point was not a true corner.
fn approximate_closed_polygon(points: &[Point], epsilon: f32) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let start = points[0];
    let far = points
        .iter()
        .enumerate()
        .max_by(|a, b| {
            a.1.distance(&start)
                .partial_cmp(&b.1.distance(&start))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map_or(0, |(i, _)| i);
    if far == 0 {
        return vec![start];
    }

    let mut polygon = Vec::new();
    simplify_chain(&points[..=far], epsilon, &mut polygon);
    polygon.pop();

    let mut back_half: Vec<Point> = points[far..].to_vec();
    back_half.push(start);
    simplify_chain(&back_half, epsilon, &mut polygon);
    polygon.pop();

    // Drop vertices lying within epsilon of the segment joining neighbours.
    loop {
        let n = polygon.len();
        if n <= 3 {
            break;
        }
        let redundant = (0..n).find(|&i| {
            let prev = polygon[(i + n - 1) % n];
            let next = polygon[(i + 1) % n];
            segment_distance(polygon[i], prev, next) <= epsilon
        });
        match redundant {
            Some(i) => {
                polygon.remove(i);
            }
            None => break,
        }
    }
    polygon
}
