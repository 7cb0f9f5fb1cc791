// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Illumination normalisation — estimates the page's lighting with a large
// morphological closing and divides it out, flattening shadows and
// vignetting.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use flatscan_core::config::IlluminationConfig;
use flatscan_core::error::FlatscanError;
use tracing::{debug, info, instrument, warn};

use crate::scan::filters::{blur_with_kernel, force_odd};
use crate::scan::morphology::close_ellipse;

/// Removes uneven lighting from a grayscale page.
#[derive(Debug, Clone, Default)]
pub struct IlluminationNormalizer {
    config: IlluminationConfig,
}

impl IlluminationNormalizer {
    pub fn new(config: IlluminationConfig) -> Self {
        Self { config }
    }

    /// Shadow-free copy of `gray`. An empty image is returned as-is.
    pub fn remove_shadows(&self, gray: &GrayImage) -> GrayImage {
        match self.try_remove_shadows(gray) {
            Ok(out) => out,
            Err(err) => {
                warn!(%err, "Shadow removal skipped");
                gray.clone()
            }
        }
    }

    /// Estimate the background and divide it out.
    ///
    /// Every output pixel is `original / background * 255` clamped to
    /// `[0, 255]`, except where the background is at or below
    /// `min_background`: those pixels are copied through untouched.
    #[instrument(skip(self, gray), fields(width = gray.width(), height = gray.height()))]
    pub fn try_remove_shadows(&self, gray: &GrayImage) -> Result<GrayImage, FlatscanError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(FlatscanError::EmptyFrame);
        }

        let background = self.estimate_background(gray);
        let floor = self.config.min_background;

        let mut out = gray.clone();
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let bg = background.get_pixel(x, y).0[0];
            if bg > floor {
                let value = pixel.0[0] as f32 / bg as f32 * 255.0;
                *pixel = Luma([value.round().clamp(0.0, 255.0) as u8]);
            }
        }

        info!("Illumination normalised");
        Ok(out)
    }

    /// Smooth estimate of the page's illumination at full resolution.
    pub fn estimate_background(&self, gray: &GrayImage) -> GrayImage {
        let (w, h) = gray.dimensions();
        let longest = w.max(h);
        let scale = (self.config.max_working_side as f32 / longest as f32).min(1.0);

        let working = if scale < 1.0 {
            let sw = ((w as f32 * scale).round() as u32).max(1);
            let sh = ((h as f32 * scale).round() as u32).max(1);
            imageops::resize(gray, sw, sh, FilterType::Triangle)
        } else {
            gray.clone()
        };

        let ksize = self.kernel_size(working.width().max(working.height()));
        debug!(scale, ksize, "Estimating background");

        let closed = close_ellipse(&working, ksize);
        let background = blur_with_kernel(&closed, ksize);

        if scale < 1.0 {
            let upscaled = imageops::resize(&background, w, h, FilterType::Triangle);
            blur_with_kernel(&upscaled, self.config.upscale_blur_kernel)
        } else {
            background
        }
    }

    /// Closing kernel size for a working image whose longest side is
    /// `longest`: `longest / divisor`, forced odd, clamped to the profile's
    /// bounds.
    pub fn kernel_size(&self, longest: u32) -> u32 {
        let (min, max) = self.config.profile.kernel_bounds();
        force_odd(longest / self.config.kernel_divisor.max(1)).clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatscan_core::config::ShadowProfile;

    /// Page with thin text strokes whose right half sits in shadow.
    fn shadowed_page(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let shadow = x >= w / 2;
            let is_text = y % 20 < 3 && (x % 40) < 30;
            let v = match (shadow, is_text) {
                (false, false) => 220,
                (false, true) => 40,
                (true, false) => 110,
                (true, true) => 20,
            };
            Luma([v])
        })
    }

    fn half_means(img: &GrayImage) -> (f64, f64) {
        let (w, h) = img.dimensions();
        let mut sums = [0f64; 2];
        for (x, _, p) in img.enumerate_pixels() {
            sums[(x >= w / 2) as usize] += p.0[0] as f64;
        }
        let n = (w / 2 * h) as f64;
        (sums[0] / n, sums[1] / n)
    }

    #[test]
    fn kernel_size_is_odd_and_clamped() {
        let n = IlluminationNormalizer::default();
        assert_eq!(n.kernel_size(200), 31);
        assert_eq!(n.kernel_size(400), 51);
        assert_eq!(n.kernel_size(800), 101);
        assert_eq!(n.kernel_size(4000), 127);

        let aggressive = IlluminationNormalizer::new(IlluminationConfig {
            profile: ShadowProfile::Aggressive,
            ..IlluminationConfig::default()
        });
        assert_eq!(aggressive.kernel_size(4000), 151);
    }

    #[test]
    fn shadow_difference_shrinks_by_half() {
        let input = shadowed_page(400, 300);
        let (l_in, r_in) = half_means(&input);
        let output = IlluminationNormalizer::default().remove_shadows(&input);
        let (l_out, r_out) = half_means(&output);

        let before = (l_in - r_in).abs();
        let after = (l_out - r_out).abs();
        assert!(after <= before * 0.5, "before {before:.1}, after {after:.1}");
    }

    #[test]
    fn dark_background_passes_through() {
        let mut img = GrayImage::from_pixel(120, 90, Luma([6u8]));
        img.put_pixel(10, 10, Luma([9u8]));
        let out = IlluminationNormalizer::default().remove_shadows(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn large_frames_are_processed_at_full_size() {
        let img = GrayImage::from_fn(1200, 900, |x, _| Luma([(100 + x / 12) as u8]));
        let out = IlluminationNormalizer::default().remove_shadows(&img);
        assert_eq!(out.dimensions(), (1200, 900));
        // A smooth gradient is pure illumination; it should flatten to near white.
        let mean = out.pixels().map(|p| p.0[0] as f64).sum::<f64>() / (1200.0 * 900.0);
        assert!(mean > 235.0, "mean {mean}");
    }

    #[test]
    fn empty_image_is_an_error() {
        let img = GrayImage::new(0, 0);
        assert!(matches!(
            IlluminationNormalizer::default().try_remove_shadows(&img),
            Err(FlatscanError::EmptyFrame)
        ));
        assert_eq!(IlluminationNormalizer::default().remove_shadows(&img), img);
    }
}
