// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame — an immutable colour or grayscale raster handed between pipeline
// stages, plus decode/encode helpers built on the `image` crate.

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};
use flatscan_core::OutputFormat;
use flatscan_core::error::FlatscanError;
use tracing::{debug, info, instrument};

/// An 8-bit-per-channel image with either three channels or one.
///
/// Stages never mutate a `Frame`; every operation returns a new one, so the
/// original is always available as a fallback.
///
/// ```ignore
/// let frame = Frame::from_bytes(&jpeg)?;
/// let gray = frame.to_gray();
/// let bytes = Frame::Gray(gray).to_jpeg_bytes(95)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Color(RgbImage),
    Gray(GrayImage),
}

impl Frame {
    // -- Construction ---------------------------------------------------------

    /// Decode raw encoded bytes (JPEG, PNG, etc.). Zero-area images are
    /// rejected as [`FlatscanError::EmptyFrame`].
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, FlatscanError> {
        let img = image::load_from_memory(data)
            .map_err(|err| FlatscanError::Decode(err.to_string()))?;
        debug!(
            width = img.width(),
            height = img.height(),
            "Frame decoded from bytes"
        );
        Self::non_empty(Self::from_dynamic(img))
    }

    /// Load a frame from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, FlatscanError> {
        let img = image::open(path.as_ref()).map_err(|err| {
            FlatscanError::Decode(format!("{}: {}", path.as_ref().display(), err))
        })?;
        info!(width = img.width(), height = img.height(), "Frame loaded");
        Self::non_empty(Self::from_dynamic(img))
    }

    /// Wrap an already-decoded image. Luma images stay single-channel; every
    /// other layout (alpha, 16-bit, float) is flattened to 8-bit RGB.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(gray) => Self::Gray(gray),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
                Self::Gray(image.to_luma8())
            }
            DynamicImage::ImageRgb8(rgb) => Self::Color(rgb),
            other => Self::Color(other.to_rgb8()),
        }
    }

    fn non_empty(frame: Self) -> Result<Self, FlatscanError> {
        if frame.is_empty() {
            Err(FlatscanError::EmptyFrame)
        } else {
            Ok(frame)
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        match self {
            Self::Color(img) => img.width(),
            Self::Gray(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Color(img) => img.height(),
            Self::Gray(img) => img.height(),
        }
    }

    /// Number of channels: 3 for colour, 1 for grayscale.
    pub fn channels(&self) -> u8 {
        match self {
            Self::Color(_) => 3,
            Self::Gray(_) => 1,
        }
    }

    /// Pixel area.
    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Grayscale copy of the frame (a plain clone when already grayscale).
    pub fn to_gray(&self) -> GrayImage {
        match self {
            Self::Color(img) => image::imageops::grayscale(img),
            Self::Gray(img) => img.clone(),
        }
    }

    /// Consume the frame, converting to grayscale only if needed.
    pub fn into_gray(self) -> GrayImage {
        match self {
            Self::Color(img) => image::imageops::grayscale(&img),
            Self::Gray(img) => img,
        }
    }

    pub fn to_dynamic(&self) -> DynamicImage {
        match self {
            Self::Color(img) => DynamicImage::ImageRgb8(img.clone()),
            Self::Gray(img) => DynamicImage::ImageLuma8(img.clone()),
        }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode with the given output format.
    pub fn encode(&self, format: OutputFormat) -> Result<Vec<u8>, FlatscanError> {
        match format {
            OutputFormat::Jpeg { quality } => self.to_jpeg_bytes(quality),
            OutputFormat::Png => self.to_png_bytes(),
        }
    }

    /// Encode the frame as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, FlatscanError> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.to_dynamic()
            .write_to(&mut cursor, ImageFormat::Png)
            .map_err(|err| FlatscanError::Encode(format!("PNG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Encode the frame as JPEG bytes with the given quality (1-100).
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, FlatscanError> {
        let mut buffer = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        let result = match self {
            Self::Color(img) => img.write_with_encoder(encoder),
            Self::Gray(img) => img.write_with_encoder(encoder),
        };
        result.map_err(|err| FlatscanError::Encode(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Write the frame to a file. The format is inferred from the extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), FlatscanError> {
        self.to_dynamic().save(path.as_ref()).map_err(|err| {
            FlatscanError::Encode(format!(
                "failed to save frame to {}: {}",
                path.as_ref().display(),
                err
            ))
        })
    }
}

impl From<GrayImage> for Frame {
    fn from(img: GrayImage) -> Self {
        Self::Gray(img)
    }
}

impl From<RgbImage> for Frame {
    fn from(img: RgbImage) -> Self {
        Self::Color(img)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbaImage};

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let err = Frame::from_bytes(b"definitely not an image").unwrap_err();
        assert!(matches!(err, FlatscanError::Decode(_)));
    }

    #[test]
    fn empty_bytes_fail_to_decode() {
        assert!(Frame::from_bytes(&[]).is_err());
    }

    #[test]
    fn png_round_trip_keeps_gray_pixels() {
        let mut img = GrayImage::from_pixel(16, 8, Luma([200u8]));
        img.put_pixel(3, 4, Luma([7u8]));
        let frame = Frame::Gray(img);

        let bytes = frame.to_png_bytes().unwrap();
        let back = Frame::from_bytes(&bytes).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn jpeg_encoding_preserves_dimensions() {
        let frame = Frame::Color(RgbImage::from_pixel(40, 30, Rgb([10, 120, 240])));
        let bytes = frame.to_jpeg_bytes(95).unwrap();
        let back = Frame::from_bytes(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (40, 30));
        assert_eq!(back.channels(), 3);
    }

    #[test]
    fn rgba_input_is_flattened_to_rgb() {
        let rgba = RgbaImage::from_pixel(4, 4, image::Rgba([1, 2, 3, 255]));
        let frame = Frame::from_dynamic(DynamicImage::ImageRgba8(rgba));
        assert_eq!(frame.channels(), 3);
        match frame {
            Frame::Color(img) => assert_eq!(img.get_pixel(0, 0), &Rgb([1, 2, 3])),
            Frame::Gray(_) => panic!("expected colour frame"),
        }
    }

    #[test]
    fn save_and_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        let frame = Frame::Gray(GrayImage::from_pixel(12, 9, Luma([90u8])));

        frame.save(&path).unwrap();
        let loaded = Frame::open(&path).unwrap();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn zero_area_frame_reports_empty() {
        let frame = Frame::Gray(GrayImage::new(0, 10));
        assert!(frame.is_empty());
        assert_eq!(frame.area(), 0);
    }
}
