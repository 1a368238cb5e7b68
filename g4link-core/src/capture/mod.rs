//! Frame sources.
//!
//! A [`Capturer`] turns a desktop rectangle into a [`RawImage`]. Backends:
//!
//! | Backend         | Source                                          |
//! |-----------------|-------------------------------------------------|
//! | [`DxgiCapturer`]| DXGI Desktop Duplication (Windows only)         |
//! | [`StillImage`]  | A decoded image file, cropped to the region     |
//!
//! Backends that cannot run on this platform fail construction with
//! [`LinkError::Capability`].

pub mod dxgi;
pub mod still;

pub use dxgi::DxgiCapturer;
pub use still::StillImage;

use crate::error::LinkError;
use crate::frame::{RawImage, Region};

/// Source of raw bitmaps for the stream loop.
pub trait Capturer: Send {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Grab the pixels inside `region`.
    fn grab(&mut self, region: Region) -> Result<RawImage, LinkError>;
}

impl<C: Capturer + ?Sized> Capturer for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn grab(&mut self, region: Region) -> Result<RawImage, LinkError> {
        (**self).grab(region)
    }
}

/// Intersect `region` with a `width × height` surface.
///
/// Returns `(x, y, w, h)` in surface coordinates, or `None` when the region
/// lies entirely outside.
pub(crate) fn clip(region: Region, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x0 = region.x.max(0) as i64;
    let y0 = region.y.max(0) as i64;
    let x1 = (region.x as i64 + region.width as i64).min(width as i64);
    let y1 = (region.y as i64 + region.height as i64).min(height as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
}

/// Copy the clipped rectangle out of `src` into a tightly packed image.
pub(crate) fn crop(src: &RawImage, region: Region) -> Result<RawImage, LinkError> {
    let (x, y, w, h) = clip(region, src.width, src.height).ok_or_else(|| {
        LinkError::Other(format!(
            "region {}x{}+{}+{} lies outside the {}x{} source",
            region.width, region.height, region.x, region.y, src.width, src.height,
        ))
    })?;
    if (x, y, w, h) == (0, 0, src.width, src.height) {
        return Ok(src.clone());
    }

    let bpp = src.format.bytes_per_pixel();
    let mut data = Vec::with_capacity(w as usize * h as usize * bpp);
    for row in y..y + h {
        let start = x as usize * bpp;
        data.extend_from_slice(&src.row(row)[start..start + w as usize * bpp]);
    }
    let mut out = RawImage::packed(w, h, src.format, data)?;
    out.timestamp = src.timestamp;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    #[test]
    fn clip_inside_and_outside() {
        assert_eq!(clip(Region::new(10, 20, 30, 40), 100, 100), Some((10, 20, 30, 40)));
        assert_eq!(clip(Region::new(-10, -10, 30, 30), 100, 100), Some((0, 0, 20, 20)));
        assert_eq!(clip(Region::new(90, 90, 30, 30), 100, 100), Some((90, 90, 10, 10)));
        assert_eq!(clip(Region::new(200, 0, 30, 30), 100, 100), None);
    }

    #[test]
    fn crop_copies_the_rectangle() {
        // 4x2 gray ramp.
        let src = RawImage::packed(4, 2, PixelFormat::Gray8, vec![0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
        let out = crop(&src, Region::new(1, 0, 2, 2)).unwrap();
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.data, vec![1, 2, 5, 6]);
    }

    #[test]
    fn crop_outside_fails() {
        let src = RawImage::packed(4, 2, PixelFormat::Gray8, vec![0; 8]).unwrap();
        assert!(crop(&src, Region::new(10, 10, 2, 2)).is_err());
    }
}
