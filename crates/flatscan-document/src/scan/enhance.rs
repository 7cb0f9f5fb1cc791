// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Final rendering — turns a shadow-free grayscale page into either a clean
// black-and-white print/OCR image or a natural-looking grayscale preview.

use image::{GrayImage, Luma};
use imageproc::contrast::stretch_contrast;
use imageproc::filter::gaussian_blur_f32;
use imageproc::integral_image::{integral_image, sum_image_pixels};
use imageproc::stats::percentile;
use flatscan_core::RenderMode;
use flatscan_core::config::EnhanceConfig;
use flatscan_core::error::FlatscanError;
use tracing::{debug, info, instrument, warn};

use crate::scan::filters::{apply_lut, force_odd};
use crate::scan::morphology::{close_square2, open_square2, remove_small_components};

/// Renders a shadow-free page in one of the two output modes.
#[derive(Debug, Clone, Default)]
pub struct DocumentEnhancer {
    config: EnhanceConfig,
}

impl DocumentEnhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    /// Enhance, returning the input unchanged if it cannot be processed.
    pub fn enhance(&self, gray: &GrayImage, mode: RenderMode) -> GrayImage {
        match self.try_enhance(gray, mode) {
            Ok(out) => out,
            Err(err) => {
                warn!(%err, ?mode, "Enhancement skipped");
                gray.clone()
            }
        }
    }

    #[instrument(skip(self, gray), fields(width = gray.width(), height = gray.height()))]
    pub fn try_enhance(&self, gray: &GrayImage, mode: RenderMode) -> Result<GrayImage, FlatscanError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(FlatscanError::EmptyFrame);
        }
        let out = match mode {
            RenderMode::Document => self.render_document(gray),
            RenderMode::Grayscale => self.render_grayscale(gray),
        };
        info!(?mode, "Enhancement complete");
        Ok(out)
    }

    // -- Document mode --------------------------------------------------------

    /// Binary rendering:
    ///
    /// 1. Percentile contrast stretch
    /// 2. Local-mean adaptive threshold with a size-proportional block
    /// 3. 2×2 close then open
    /// 4. Drop connected components too small to be ink
    fn render_document(&self, gray: &GrayImage) -> GrayImage {
        let c = &self.config;
        let stretched = stretch_percentiles(gray, c.stretch_percentiles.0, c.stretch_percentiles.1);

        let block = self.block_size(gray.width(), gray.height());
        let binary = adaptive_threshold(&stretched, block / 2, c.threshold_offset);
        let smoothed = open_square2(&close_square2(&binary));

        let min_area = self.min_component_area(gray.width(), gray.height());
        debug!(block, min_area, "Binarising");
        remove_small_components(&smoothed, min_area)
    }

    /// Adaptive threshold block: longest side over the divisor, forced odd,
    /// clamped to the configured bounds.
    pub fn block_size(&self, width: u32, height: u32) -> u32 {
        let c = &self.config;
        force_odd(width.max(height) / c.block_divisor.max(1)).clamp(c.block_min, c.block_max)
    }

    /// Components below this many pixels are speckle.
    pub fn min_component_area(&self, width: u32, height: u32) -> u32 {
        let c = &self.config;
        let relative = (width as u64 * height as u64 / c.component_area_divisor.max(1) as u64) as u32;
        c.min_component_area.max(relative)
    }

    // -- Grayscale mode -------------------------------------------------------

    /// Natural rendering:
    ///
    /// 1. CLAHE for local contrast
    /// 2. Global brighten so the chosen percentile sits at the target
    /// 3. Gamma curve to deepen midtones
    /// 4. Unsharp mask
    fn render_grayscale(&self, gray: &GrayImage) -> GrayImage {
        let c = &self.config;
        let equalized = clahe(gray, c.clahe_tiles, c.clahe_clip_limit);

        let level = percentile(&equalized, c.brighten_percentile);
        let brightened = if level > 0 && level < c.brighten_target {
            let gain = c.brighten_target as f32 / level as f32;
            debug!(level, gain, "Brightening");
            apply_lut(&equalized, &gain_lut(gain))
        } else {
            equalized
        };

        let toned = apply_lut(&brightened, &gamma_lut(c.gamma));
        unsharp_mask(&toned, c.unsharp_sigma, c.unsharp_amount)
    }
}

// -- Contrast helpers ---------------------------------------------------------

/// Map the `low_pct` percentile to black and `high_pct` to white, clipping
/// everything outside. Flat images are returned unchanged.
fn stretch_percentiles(gray: &GrayImage, low_pct: u8, high_pct: u8) -> GrayImage {
    let black = percentile(gray, low_pct);
    let white = percentile(gray, high_pct);
    if white <= black {
        return gray.clone();
    }
    stretch_contrast(gray, black, white, 0, 255)
}

fn gain_lut(gain: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = (i as f32 * gain).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// `255 * (v / 255)^(1 / gamma)`; gamma below one darkens midtones.
fn gamma_lut(gamma: f32) -> [u8; 256] {
    let inv = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = ((i as f32 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// `amount * image + (1 - amount) * blurred`, clamped.
fn unsharp_mask(gray: &GrayImage, sigma: f32, amount: f32) -> GrayImage {
    let blurred = gaussian_blur_f32(gray, sigma);
    let mut out = gray.clone();
    for (pixel, soft) in out.pixels_mut().zip(blurred.pixels()) {
        let v = amount * pixel.0[0] as f32 + (1.0 - amount) * soft.0[0] as f32;
        pixel.0[0] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Contrast-limited adaptive histogram equalisation.
///
/// Each of `tiles × tiles` regions gets its own clipped-histogram lookup
/// table; pixels blend the tables of the four nearest tile centres.
fn clahe(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = (gray.width() as usize, gray.height() as usize);
    let tiles = tiles.max(1) as usize;
    let (tiles_x, tiles_y) = (tiles.min(w), tiles.min(h));
    let (tile_w, tile_h) = (w / tiles_x, h / tiles_y);
    let src = gray.as_raw();

    let mut maps = vec![[0u8; 256]; tiles_x * tiles_y];
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = if tx == tiles_x - 1 { w } else { x0 + tile_w };
            let y1 = if ty == tiles_y - 1 { h } else { y0 + tile_h };
            let tile_pixels = ((x1 - x0) * (y1 - y0)) as u32;

            let mut hist = [0u32; 256];
            for row in y0..y1 {
                for &v in &src[row * w + x0..row * w + x1] {
                    hist[v as usize] += 1;
                }
            }

            // Clip and redistribute the excess evenly.
            let clip = ((clip_limit * tile_pixels as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let per_bin = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += per_bin + u32::from(i < remainder);
            }

            let scale = 255.0 / tile_pixels as f32;
            let mut cumulative = 0u32;
            let map = &mut maps[ty * tiles_x + tx];
            for (i, &count) in hist.iter().enumerate() {
                cumulative += count;
                map[i] = (cumulative as f32 * scale).round().min(255.0) as u8;
            }
        }
    }

    let (tw, th) = (tile_w as f32, tile_h as f32);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = src[y as usize * w + x as usize] as usize;
        let fx = (x as f32 + 0.5) / tw - 0.5;
        let fy = (y as f32 + 0.5) / th - 0.5;

        let tx0 = (fx.floor() as i64).clamp(0, tiles_x as i64 - 1) as usize;
        let tx1 = (fx.floor() as i64 + 1).clamp(0, tiles_x as i64 - 1) as usize;
        let ty0 = (fy.floor() as i64).clamp(0, tiles_y as i64 - 1) as usize;
        let ty1 = (fy.floor() as i64 + 1).clamp(0, tiles_y as i64 - 1) as usize;
        let ax = fx - fx.floor();
        let ay = fy - fy.floor();

        let top = maps[ty0 * tiles_x + tx0][v] as f32 * (1.0 - ax) + maps[ty0 * tiles_x + tx1][v] as f32 * ax;
        let bot = maps[ty1 * tiles_x + tx0][v] as f32 * (1.0 - ax) + maps[ty1 * tiles_x + tx1][v] as f32 * ax;
        Luma([(top * (1.0 - ay) + bot * ay).round().clamp(0.0, 255.0) as u8])
    })
}

// -- Adaptive threshold -------------------------------------------------------

/// Local-mean binarisation: a pixel becomes black when it is darker than the
/// mean of its `(2 * radius + 1)`-square neighbourhood minus `offset`.
fn adaptive_threshold(gray: &GrayImage, radius: u32, offset: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let integral = integral_image::<_, u64>(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(radius), y.saturating_sub(radius));
        let right = x.saturating_add(radius).min(width - 1);
        let bottom = y.saturating_add(radius).min(height - 1);
        let area = u64::from(right - left + 1) * u64::from(bottom - top + 1);
        let local_mean = sum_image_pixels(&integral, left, top, right, bottom)[0] as f64 / area as f64;

        let pixel_val = gray.get_pixel(x, y).0[0] as f64;
        Luma([if pixel_val < local_mean - offset as f64 { 0u8 } else { 255u8 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with a few dark glyph-like bars and scattered speckle.
    fn text_page(w: u32, h: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([235u8]));
        for line in 0..5u32 {
            let y0 = 40 + line * 50;
            for y in y0..y0 + 12 {
                for x in 30..(w - 30) {
                    if (x / 16) % 3 != 2 {
                        img.put_pixel(x, y, Luma([30u8]));
                    }
                }
            }
        }
        // Single-pixel speckle.
        for (x, y) in [(10, 10), (200, 25), (300, 290), (15, 280)] {
            img.put_pixel(x, y, Luma([60u8]));
        }
        img
    }

    #[test]
    fn document_mode_is_pure_binary() {
        let out = DocumentEnhancer::default().enhance(&text_page(400, 300), RenderMode::Document);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn document_mode_keeps_text_and_drops_speckle() {
        let out = DocumentEnhancer::default().enhance(&text_page(400, 300), RenderMode::Document);
        // Inside a glyph bar.
        assert_eq!(out.get_pixel(55, 45).0[0], 0);
        // Isolated speck and empty paper.
        assert_eq!(out.get_pixel(200, 25).0[0], 255);
        assert_eq!(out.get_pixel(380, 20).0[0], 255);
    }

    #[test]
    fn grayscale_mode_preserves_dimensions_and_range() {
        let page = text_page(320, 240);
        let out = DocumentEnhancer::default().enhance(&page, RenderMode::Grayscale);
        assert_eq!(out.dimensions(), page.dimensions());
        // Text should remain darker than paper.
        assert!(out.get_pixel(55, 45).0[0] < out.get_pixel(200, 220).0[0]);
    }

    #[test]
    fn block_size_bounds() {
        let e = DocumentEnhancer::default();
        assert_eq!(e.block_size(400, 300), 51);
        assert_eq!(e.block_size(3000, 4000), 161);
        assert_eq!(e.block_size(10_000, 8000), 251);
    }

    #[test]
    fn min_component_area_scales_with_size() {
        let e = DocumentEnhancer::default();
        assert_eq!(e.min_component_area(400, 300), 25);
        assert_eq!(e.min_component_area(3000, 4000), 120);
    }

    #[test]
    fn stretch_maps_percentiles_to_extremes() {
        let img = GrayImage::from_fn(100, 1, |x, _| Luma([100 + (x as u8 / 2)]));
        let out = stretch_percentiles(&img, 2, 98);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(99, 0).0[0], 255);
    }

    #[test]
    fn flat_image_is_not_stretched() {
        let img = GrayImage::from_pixel(20, 20, Luma([90u8]));
        assert_eq!(stretch_percentiles(&img, 2, 98), img);
    }

    #[test]
    fn gamma_below_one_darkens_midtones() {
        let lut = gamma_lut(0.85);
        assert_eq!(lut[0], 0);
        assert_eq!(lut[255], 255);
        assert!(lut[128] < 128);
    }

    #[test]
    fn clahe_uniform_image_stays_uniform() {
        let img = GrayImage::from_pixel(64, 64, Luma([128u8]));
        let out = clahe(&img, 8, 2.0);
        let first = out.get_pixel(0, 0).0[0];
        assert!(out.pixels().all(|p| p.0[0] == first));
    }

    #[test]
    fn clahe_handles_images_smaller_than_grid() {
        let img = GrayImage::from_fn(5, 3, |x, y| Luma([(x * 40 + y * 10) as u8]));
        let out = clahe(&img, 8, 2.0);
        assert_eq!(out.dimensions(), (5, 3));
    }

    #[test]
    fn adaptive_threshold_separates_ink_from_paper() {
        let mut img = GrayImage::from_pixel(60, 60, Luma([200u8]));
        for y in 25..35 {
            for x in 10..50 {
                img.put_pixel(x, y, Luma([50u8]));
            }
        }
        let out = adaptive_threshold(&img, 15, 15);
        assert_eq!(out.get_pixel(30, 30).0[0], 0);
        assert_eq!(out.get_pixel(30, 5).0[0], 255);
    }

    #[test]
    fn adaptive_threshold_window_is_clipped_at_corners() {
        // A corner pixel sees only the in-bounds part of its window.
        let mut img = GrayImage::from_pixel(8, 8, Luma([200u8]));
        img.put_pixel(0, 0, Luma([150u8]));
        let out = adaptive_threshold(&img, 1, 5);
        // Window {(0,0),(1,0),(0,1),(1,1)} has mean 187.5.
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(7, 7).0[0], 255);
    }

    #[test]
    fn empty_input_is_returned_unchanged() {
        let img = GrayImage::new(0, 0);
        assert!(DocumentEnhancer::default().try_enhance(&img, RenderMode::Document).is_err());
        assert_eq!(DocumentEnhancer::default().enhance(&img, RenderMode::Grayscale), img);
    }
}
