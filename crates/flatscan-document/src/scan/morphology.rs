// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Grayscale morphology with large elliptical and small rectangular
// structuring elements, and connected-component speckle removal.
//
// Pixels outside the image never contribute to a dilation or erosion.
// The ellipse is applied as horizontal spans with running extrema, since a
// full `Mask::disk` at page-sized radii visits every element per pixel.

use std::collections::VecDeque;

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode};
use imageproc::region_labelling::{Connectivity, connected_components};

/// Which extremum a morphological pass takes over its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extremum {
    /// Dilation.
    Max,
    /// Erosion.
    Min,
}

impl Extremum {
    fn identity(self) -> u8 {
        match self {
            Self::Max => 0,
            Self::Min => 255,
        }
    }

    fn pick(self, a: u8, b: u8) -> u8 {
        match self {
            Self::Max => a.max(b),
            Self::Min => a.min(b),
        }
    }

    /// Whether `candidate` makes `incumbent` irrelevant for every later window.
    fn supersedes(self, candidate: u8, incumbent: u8) -> bool {
        match self {
            Self::Max => candidate >= incumbent,
            Self::Min => candidate <= incumbent,
        }
    }
}

// -- Elliptical structuring element -------------------------------------------

/// Half-width of each row of a `ksize × ksize` ellipse, indexed by
/// `dy + radius`.
fn ellipse_half_widths(ksize: u32) -> Vec<usize> {
    let r = (ksize / 2) as i64;
    if r == 0 {
        return vec![0];
    }
    let r2 = (r * r) as f64;
    (-r..=r)
        .map(|dy| ((r as f64) * ((r2 - (dy * dy) as f64) / r2).sqrt()).round() as usize)
        .collect()
}

/// Running extremum over a centred window of `2 * half + 1` samples.
fn sliding_extremum(row: &[u8], half: usize, op: Extremum, out: &mut [u8]) {
    let n = row.len();
    let mut window: VecDeque<usize> = VecDeque::with_capacity(n.min(2 * half + 1));
    let mut next = 0usize;

    for x in 0..n {
        let hi = (x + half).min(n - 1);
        while next <= hi {
            while let Some(&back) = window.back() {
                if op.supersedes(row[next], row[back]) {
                    window.pop_back();
                } else {
                    break;
                }
            }
            window.push_back(next);
            next += 1;
        }
        let lo = x.saturating_sub(half);
        while let Some(&front) = window.front() {
            if front < lo {
                window.pop_front();
            } else {
                break;
            }
        }
        out[x] = window.front().map_or(row[x], |&i| row[i]);
    }
}

/// Dilate or erode with an elliptical element.
///
/// The ellipse is decomposed into horizontal spans: each distinct span width
/// is applied once per image row with a running extremum, and output rows
/// combine the pre-filtered rows above and below them.
fn ellipse_pass(image: &GrayImage, ksize: u32, op: Extremum) -> GrayImage {
    let (w, h) = (image.width() as usize, image.height() as usize);
    if w == 0 || h == 0 {
        return image.clone();
    }

    let spans = ellipse_half_widths(ksize);
    let radius = (spans.len() / 2) as i64;
    let src = image.as_raw();

    // One horizontally filtered copy per distinct span width.
    let max_half = spans.iter().copied().max().unwrap_or(0);
    let mut horizontal: Vec<Option<Vec<u8>>> = vec![None; max_half + 1];
    for &half in &spans {
        if horizontal[half].is_some() {
            continue;
        }
        let mut filtered = vec![0u8; w * h];
        for y in 0..h {
            sliding_extremum(
                &src[y * w..(y + 1) * w],
                half,
                op,
                &mut filtered[y * w..(y + 1) * w],
            );
        }
        horizontal[half] = Some(filtered);
    }

    let mut out = vec![op.identity(); w * h];
    for y in 0..h {
        let dst = &mut out[y * w..(y + 1) * w];
        for (idx, &half) in spans.iter().enumerate() {
            let sy = y as i64 + idx as i64 - radius;
            if sy < 0 || sy >= h as i64 {
                continue;
            }
            let Some(filtered) = horizontal[half].as_ref() else {
                continue;
            };
            let row = &filtered[sy as usize * w..(sy as usize + 1) * w];
            for (d, &s) in dst.iter_mut().zip(row) {
                *d = op.pick(*d, s);
            }
        }
    }

    GrayImage::from_raw(image.width(), image.height(), out).unwrap_or_else(|| image.clone())
}

/// Grayscale closing (dilate, then erode) with a `ksize × ksize` ellipse.
pub(crate) fn close_ellipse(image: &GrayImage, ksize: u32) -> GrayImage {
    let dilated = ellipse_pass(image, ksize, Extremum::Max);
    ellipse_pass(&dilated, ksize, Extremum::Min)
}

// -- 2×2 rectangle ------------------------------------------------------------

/// A 2×2 square anchored at its bottom-right (`trailing == false`) or
/// top-left (`trailing == true`) cell.
fn square2(trailing: bool) -> Mask {
    let anchor = if trailing { 0 } else { 1 };
    Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255u8])), anchor, anchor)
}

// Dilation looks up and left, erosion down and right, so a close or open
// leaves edges where they were.

/// Closing with a 2×2 square: fills dark gaps narrower than two pixels.
pub(crate) fn close_square2(image: &GrayImage) -> GrayImage {
    let dilated = grayscale_dilate(image, &square2(false));
    grayscale_erode(&dilated, &square2(true))
}

/// Opening with a 2×2 square: removes light specks narrower than two pixels.
pub(crate) fn open_square2(image: &GrayImage) -> GrayImage {
    let eroded = grayscale_erode(image, &square2(true));
    grayscale_dilate(&eroded, &square2(false))
}

// -- Connected components -----------------------------------------------------

/// Repaint a black-on-white binary image keeping only the 8-connected black
/// components with at least `min_area` pixels.
pub(crate) fn remove_small_components(binary: &GrayImage, min_area: u32) -> GrayImage {
    let mut ink = binary.clone();
    for pixel in ink.pixels_mut() {
        pixel.0[0] = if pixel.0[0] < 128 { 255 } else { 0 };
    }

    let labels = connected_components(&ink, Connectivity::Eight, Luma([0u8]));
    let label_count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;
    let mut areas = vec![0u32; label_count + 1];
    for pixel in labels.pixels() {
        areas[pixel.0[0] as usize] += 1;
    }

    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        let label = labels.get_pixel(x, y).0[0] as usize;
        if label != 0 && areas[label] >= min_area {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipse_rows_are_symmetric_and_widest_in_the_middle() {
        let spans = ellipse_half_widths(31);
        assert_eq!(spans.len(), 31);
        assert_eq!(spans[15], 15);
        assert_eq!(spans[0], 0);
        assert_eq!(spans[0], spans[30]);
        assert_eq!(spans[5], spans[25]);
    }

    #[test]
    fn sliding_max_matches_brute_force() {
        let row: Vec<u8> = (0..40u32).map(|i| ((i * 37 + 11) % 251) as u8).collect();
        let mut out = vec![0u8; row.len()];
        sliding_extremum(&row, 3, Extremum::Max, &mut out);
        for x in 0..row.len() {
            let lo = x.saturating_sub(3);
            let hi = (x + 3).min(row.len() - 1);
            let expected = *row[lo..=hi].iter().max().unwrap();
            assert_eq!(out[x], expected, "mismatch at {x}");
        }
    }

    #[test]
    fn closing_removes_thin_dark_lines() {
        let mut img = GrayImage::from_pixel(80, 80, Luma([200u8]));
        for y in 10..70 {
            for x in 39..42 {
                img.put_pixel(x, y, Luma([20u8]));
            }
        }
        let closed = close_ellipse(&img, 31);
        assert!(closed.pixels().all(|p| p.0[0] == 200));
    }

    #[test]
    fn closing_preserves_flat_image() {
        let img = GrayImage::from_pixel(50, 40, Luma([77u8]));
        assert_eq!(close_ellipse(&img, 31), img);
    }

    #[test]
    fn square_close_fills_single_pixel_hole() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([255u8]));
        img.put_pixel(5, 5, Luma([0u8]));
        let closed = close_square2(&img);
        assert_eq!(closed.get_pixel(5, 5).0[0], 255);
    }

    #[test]
    fn square_close_keeps_edges_in_place() {
        // Left half dark, right half light; closing must not shift the edge.
        let img = GrayImage::from_fn(12, 6, |x, _| Luma([if x < 6 { 10 } else { 240 }]));
        assert_eq!(close_square2(&img), img);
        assert_eq!(open_square2(&img), img);
    }

    #[test]
    fn square_open_keeps_thick_strokes() {
        let mut img = GrayImage::from_pixel(20, 20, Luma([0u8]));
        // A lone white pixel disappears; a 4x4 white block survives.
        img.put_pixel(2, 2, Luma([255u8]));
        for y in 10..14 {
            for x in 10..14 {
                img.put_pixel(x, y, Luma([255u8]));
            }
        }
        let opened = open_square2(&img);
        assert_eq!(opened.get_pixel(2, 2).0[0], 0);
        assert_eq!(opened.get_pixel(11, 11).0[0], 255);
        assert_eq!(opened.get_pixel(10, 10).0[0], 255);
        assert_eq!(opened.get_pixel(13, 13).0[0], 255);
    }

    #[test]
    fn small_components_are_dropped() {
        let mut img = GrayImage::from_pixel(60, 60, Luma([255u8]));
        // 2x2 speck.
        for (x, y) in [(5, 5), (6, 5), (5, 6), (6, 6)] {
            img.put_pixel(x, y, Luma([0u8]));
        }
        // 10x10 glyph.
        for y in 30..40 {
            for x in 30..40 {
                img.put_pixel(x, y, Luma([0u8]));
            }
        }
        let cleaned = remove_small_components(&img, 25);
        assert_eq!(cleaned.get_pixel(5, 5).0[0], 255);
        assert_eq!(cleaned.get_pixel(35, 35).0[0], 0);
        assert!(cleaned.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn diagonal_pixels_form_one_component() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([255u8]));
        for i in 0..30 {
            img.put_pixel(i + 5, i + 5, Luma([0u8]));
        }
        let cleaned = remove_small_components(&img, 25);
        assert_eq!(cleaned.get_pixel(20, 20).0[0], 0);
    }
}
