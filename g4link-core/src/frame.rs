//! Frame types shared by the capture, conversion and transport stages.
//!
//! [`RawImage`] is whatever a capture backend or image decoder hands us:
//! any size, any supported pixel layout. [`Frame`] is the panel-sized 8-bit
//! grayscale grid the quantizer consumes, and [`LevelMatrix`] is the
//! quantizer's 4-bit output.
//!
//! Resizing to the panel happens while building a [`Frame`], never after
//! quantization, so every later stage can rely on 640×480.

use std::time::Instant;

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LinkError};
use crate::panel::{PANEL_HEIGHT, PANEL_PIXELS, PANEL_WIDTH};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 1 byte per pixel, already grayscale.
    Gray8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (DXGI default).
    Bgra8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }

    /// 8-bit luma of one pixel using ITU-R 601 weights.
    ///
    /// Integer form of `0.299 R + 0.587 G + 0.114 B`, rounded.
    pub fn luma(self, px: &[u8]) -> u8 {
        let (r, g, b) = match self {
            PixelFormat::Gray8 => return px[0],
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => (px[0], px[1], px[2]),
            PixelFormat::Bgra8 => (px[2], px[1], px[0]),
        };
        ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
    }
}

// ── Region ───────────────────────────────────────────────────────

/// Capture rectangle in desktop coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A panel-sized region anchored at the desktop origin.
    pub const fn panel() -> Self {
        Self::new(0, 0, PANEL_WIDTH, PANEL_HEIGHT)
    }

    /// Reject empty regions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidRegion {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::panel()
    }
}

// ── FitMode ──────────────────────────────────────────────────────

/// How a source that is not 640×480 is brought to panel size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FitMode {
    /// Resize to exactly 640×480, ignoring aspect ratio.
    #[default]
    Stretch,
    /// Scale to fit inside the panel and pad with black, centered.
    Letterbox,
}

// ── RawImage ─────────────────────────────────────────────────────

/// An uncompressed bitmap as produced by a capture backend.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may exceed `width * bytes_per_pixel` (DXGI pads rows).
#[derive(Debug, Clone)]
pub struct RawImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row pitch in **bytes**.
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl RawImage {
    /// Wrap a tightly packed buffer (stride = width × bpp).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self, LinkError> {
        let stride = width * format.bytes_per_pixel() as u32;
        let expected = stride as usize * height as usize;
        if data.len() != expected {
            return Err(ConfigError::FrameSize {
                expected,
                actual: data.len(),
            }
            .into());
        }
        Ok(Self {
            width,
            height,
            stride,
            format,
            data,
            timestamp: Instant::now(),
        })
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.stride as usize;
        &self.data[start..end]
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        &self.data[offset..offset + bpp]
    }

    /// Convert to an 8-bit grayscale image at native size.
    pub fn to_gray(&self) -> GrayImage {
        let bpp = self.format.bytes_per_pixel();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            let row = &self.row(y)[..self.width as usize * bpp];
            out.extend(row.chunks_exact(bpp).map(|px| self.format.luma(px)));
        }
        // Length is width*height by construction.
        GrayImage::from_raw(self.width, self.height, out).unwrap_or_default()
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A panel-sized grid of 8-bit intensity samples, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    samples: Vec<u8>,
}

impl Frame {
    /// Wrap panel-sized grayscale samples.
    pub fn from_samples(samples: Vec<u8>) -> Result<Self, ConfigError> {
        if samples.len() != PANEL_PIXELS {
            return Err(ConfigError::FrameSize {
                expected: PANEL_PIXELS,
                actual: samples.len(),
            });
        }
        Ok(Self { samples })
    }

    /// A frame where every sample has the same intensity.
    pub fn filled(value: u8) -> Self {
        Self {
            samples: vec![value; PANEL_PIXELS],
        }
    }

    /// Build a frame from a raw capture, resizing when needed.
    pub fn from_raw(raw: &RawImage, fit: FitMode) -> Self {
        Self::from_gray(raw.to_gray(), fit)
    }

    /// Build a frame from a decoded image file.
    pub fn from_image(img: &DynamicImage, fit: FitMode) -> Self {
        Self::from_gray(img.to_luma8(), fit)
    }

    fn from_gray(gray: GrayImage, fit: FitMode) -> Self {
        let sized = fit_to_panel(gray, fit);
        Self {
            samples: sized.into_raw(),
        }
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    /// One row of samples.
    pub fn row(&self, y: u32) -> &[u8] {
        let w = PANEL_WIDTH as usize;
        let start = y as usize * w;
        &self.samples[start..start + w]
    }
}

/// Bring an arbitrary grayscale image to exactly 640×480.
fn fit_to_panel(gray: GrayImage, fit: FitMode) -> GrayImage {
    if gray.dimensions() == (PANEL_WIDTH, PANEL_HEIGHT) {
        return gray;
    }
    match fit {
        FitMode::Stretch => imageops::resize(&gray, PANEL_WIDTH, PANEL_HEIGHT, FilterType::Lanczos3),
        FitMode::Letterbox => {
            let (w, h) = gray.dimensions();
            let scale = f64::min(
                PANEL_WIDTH as f64 / w as f64,
                PANEL_HEIGHT as f64 / h as f64,
            );
            let nw = ((w as f64 * scale).round() as u32).clamp(1, PANEL_WIDTH);
            let nh = ((h as f64 * scale).round() as u32).clamp(1, PANEL_HEIGHT);
            let scaled = imageops::resize(&gray, nw, nh, FilterType::Lanczos3);

            let mut canvas = GrayImage::new(PANEL_WIDTH, PANEL_HEIGHT);
            let x = (PANEL_WIDTH - nw) / 2;
            let y = (PANEL_HEIGHT - nh) / 2;
            imageops::overlay(&mut canvas, &scaled, x as i64, y as i64);
            canvas
        }
    }
}

// ── LevelMatrix ──────────────────────────────────────────────────

/// Panel-sized grid of 4-bit levels (0..=15), row-major, one per byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelMatrix {
    levels: Vec<u8>,
}

impl LevelMatrix {
    /// Wrap a panel-sized level buffer. Values above 15 are masked.
    pub fn from_levels(mut levels: Vec<u8>) -> Result<Self, ConfigError> {
        if levels.len() != PANEL_PIXELS {
            return Err(ConfigError::FrameSize {
                expected: PANEL_PIXELS,
                actual: levels.len(),
            });
        }
        for v in &mut levels {
            *v &= 0x0F;
        }
        Ok(Self { levels })
    }

    /// Levels produced by the quantizer from a panel-sized frame.
    pub(crate) fn from_quantized(levels: Vec<u8>) -> Self {
        debug_assert_eq!(levels.len(), PANEL_PIXELS);
        Self { levels }
    }

    /// All levels, row-major.
    pub fn levels(&self) -> &[u8] {
        &self.levels
    }

    /// Levels of one row.
    pub fn row(&self, y: u32) -> &[u8] {
        let w = PANEL_WIDTH as usize;
        let start = y as usize * w;
        &self.levels[start..start + w]
    }

    /// Levels of `count` consecutive rows starting at `start`.
    pub fn rows(&self, start: u16, count: u16) -> &[u8] {
        let w = PANEL_WIDTH as usize;
        &self.levels[start as usize * w..(start as usize + count as usize) * w]
    }
}

// ── Tests ────────────────────────────────────────────────────────
