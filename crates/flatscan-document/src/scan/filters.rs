// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Small shared helpers: kernel-size based Gaussian blur, odd kernel sizes
// and lookup-table mapping.

use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// Standard deviation of the Gaussian that fills a `ksize × ksize` kernel.
pub(crate) fn gaussian_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize.max(1) as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian blur parameterised by kernel size rather than sigma.
pub(crate) fn blur_with_kernel(image: &GrayImage, ksize: u32) -> GrayImage {
    if image.width() == 0 || image.height() == 0 {
        return image.clone();
    }
    gaussian_blur_f32(image, gaussian_sigma(ksize).max(0.1))
}

/// Make `value` odd by bumping even numbers up by one.
pub(crate) fn force_odd(value: u32) -> u32 {
    if value % 2 == 0 { value + 1 } else { value }
}

/// Apply a 256-entry lookup table to every pixel.
pub(crate) fn apply_lut(image: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = lut[pixel.0[0] as usize];
    }
    out
}
