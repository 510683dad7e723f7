//! Decoded rasters and their canonical RGB8 form.
//!
//! Fingerprints are computed over pixels, never over container bytes, so an
//! image re-encoded losslessly (PNG to BMP, PNG to PNG with different
//! compression) keeps its fingerprint.

use std::borrow::Cow;

#[cfg(feature = "decode")]
use image::DynamicImage;

use crate::error::{ImageIpError, Result};

/// Only 8-bit channels are accepted.
pub const SUPPORTED_BIT_DEPTH: u8 = 8;

/// A fully decoded, row-major raster with 1 (gray), 3 (RGB) or 4 (RGBA)
/// channels of 8 bits each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Create a buffer of 8-bit channels.
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Result<Self> {
        Self::from_raw_parts(width, height, channels, SUPPORTED_BIT_DEPTH, data)
    }

    /// Create an RGB8 buffer.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        Self::new(width, height, 3, data)
    }

    /// Create a buffer, validating channel count, bit depth and length.
    pub fn from_raw_parts(
        width: u32,
        height: u32,
        channels: u8,
        bit_depth: u8,
        data: Vec<u8>,
    ) -> Result<Self> {
        if !matches!(channels, 1 | 3 | 4) {
            return Err(ImageIpError::UnsupportedPixelFormat(format!(
                "{channels} channels (expected 1, 3 or 4)"
            )));
        }
        if bit_depth != SUPPORTED_BIT_DEPTH {
            return Err(ImageIpError::UnsupportedPixelFormat(format!(
                "{bit_depth} bits per channel (expected {SUPPORTED_BIT_DEPTH})"
            )));
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or_else(|| {
                ImageIpError::UnsupportedPixelFormat(format!(
                    "{width}x{height} raster is too large"
                ))
            })?;
        if data.len() != expected {
            return Err(ImageIpError::UnsupportedPixelFormat(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == 4
    }

    /// Pixel bytes in RGB8 order with any alpha channel removed.
    ///
    /// Gray pixels are replicated into all three channels.
    pub fn canonical_rgb(&self) -> Cow<'_, [u8]> {
        match self.channels {
            3 => Cow::Borrowed(&self.data),
            1 => Cow::Owned(self.data.iter().flat_map(|&v| [v, v, v]).collect()),
            _ => Cow::Owned(
                self.data
                    .chunks_exact(self.channels as usize)
                    .flat_map(|px| px.iter().take(3).copied())
                    .collect(),
            ),
        }
    }

    /// Channel values of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        let range = self.pixel_range(x, y)?;
        self.data.get(range)
    }

    /// Overwrite the pixel at `(x, y)`; `value` must hold one byte per channel.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: &[u8]) -> Result<()> {
        if value.len() != self.channels as usize {
            return Err(ImageIpError::UnsupportedPixelFormat(format!(
                "pixel value has {} channels, buffer has {}",
                value.len(),
                self.channels
            )));
        }
        let range = self.pixel_range(x, y).ok_or_else(|| {
            ImageIpError::UnsupportedPixelFormat(format!(
                "pixel ({x}, {y}) outside {}x{} raster",
                self.width, self.height
            ))
        })?;
        self.data[range].copy_from_slice(value);
        Ok(())
    }

    fn pixel_range(&self, x: u32, y: u32) -> Option<std::ops::Range<usize>> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let channels = self.channels as usize;
        let start = (y as usize * self.width as usize + x as usize) * channels;
        Some(start..start + channels)
    }
}

/// Transparency class of an image, deciding which signing path it takes.
///
/// `NoAlpha` images are signed. `HasAlpha` images are left untouched by the
/// signer and handed to the caller's file-attribute tagging instead, so
/// transparency is never flattened away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    HasAlpha,
    NoAlpha,
}

impl ImageClass {
    #[cfg(feature = "decode")]
    pub fn of(image: &DynamicImage) -> Self {
        if image.color().has_alpha() {
            Self::HasAlpha
        } else {
            Self::NoAlpha
        }
    }

    pub fn of_pixels(pixels: &PixelBuffer) -> Self {
        if pixels.has_alpha() {
            Self::HasAlpha
        } else {
            Self::NoAlpha
        }
    }
}

/// Decode container bytes (JPEG, PNG, GIF, WebP, BMP, TIFF).
#[cfg(feature = "decode")]
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| ImageIpError::UnsupportedImageFormat(format!("Failed to decode image: {e}")))
}

/// Decode container bytes straight to a [`PixelBuffer`].
#[cfg(feature = "decode")]
pub fn decode_pixels(bytes: &[u8]) -> Result<PixelBuffer> {
    let image = decode_image(bytes)?;
    PixelBuffer::from_image(&image)
}

#[cfg(feature = "decode")]
impl PixelBuffer {
    /// Convert a decoded image, reducing other layouts and depths to 8-bit
    /// gray, RGB or RGBA.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(buf) => Self::new(width, height, 1, buf.as_raw().clone()),
            DynamicImage::ImageRgb8(buf) => Self::new(width, height, 3, buf.as_raw().clone()),
            DynamicImage::ImageRgba8(buf) => Self::new(width, height, 4, buf.as_raw().clone()),
            other if other.color().has_alpha() => {
                Self::new(width, height, 4, other.to_rgba8().into_raw())
            }
            other => Self::new(width, height, 3, other.to_rgb8().into_raw()),
        }
    }
}
