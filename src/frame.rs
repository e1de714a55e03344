//! Video frames as they move through the tick loop.
//!
//! - `Frame`: one decoded frame, owned by the tick that read it.
//! - `DisplayImage`: the RGBA conversion handed to the window.
//!
//! A `Frame` is never retained across ticks. The controller reads it, writes it
//! to the cache (live mode only), converts it for display and drops it.

use anyhow::{anyhow, Result};

use crate::ingest::normalize;

/// Pixel layouts produced by the supported sources.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red. The camera and cache default.
    Bgr24,
    Rgb24,
    /// Packed 4:2:2, two pixels per four bytes.
    Yuyv,
    /// Planar luma followed by interleaved 2x2 chroma.
    Nv12,
}

impl PixelFormat {
    pub(crate) fn to_tag(self) -> u8 {
        match self {
            PixelFormat::Bgr24 => 0,
            PixelFormat::Rgb24 => 1,
            PixelFormat::Yuyv => 2,
            PixelFormat::Nv12 => 3,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PixelFormat::Bgr24),
            1 => Ok(PixelFormat::Rgb24),
            2 => Ok(PixelFormat::Yuyv),
            3 => Ok(PixelFormat::Nv12),
            other => Err(anyhow!("unknown pixel format tag {}", other)),
        }
    }
}

/// One decoded video frame.
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Position of this frame within the source since it was last opened.
    pub sequence: u64,
}

impl Frame {
    /// Build a frame, validating that `data` matches the dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self> {
        let expected = normalize::expected_len(width, height, format)?;
        if data.len() != expected {
            return Err(anyhow!(
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            format,
            sequence,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Convert into the window's pixel format.
    pub fn to_display(&self) -> Result<DisplayImage> {
        let rgba = normalize::to_rgba(&self.data, self.width, self.height, self.format)?;
        let image = image::RgbaImage::from_raw(self.width, self.height, rgba)
            .ok_or_else(|| anyhow!("rgba buffer does not match {}x{}", self.width, self.height))?;
        Ok(DisplayImage {
            image,
            sequence: self.sequence,
        })
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// RGBA image ready for the display panel.
#[derive(Clone, Debug)]
pub struct DisplayImage {
    image: image::RgbaImage,
    pub sequence: u64,
}

impl DisplayImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Row-major RGBA8 bytes.
    pub fn as_rgba(&self) -> &[u8] {
        self.image.as_raw()
    }
}
