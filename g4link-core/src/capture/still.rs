//! Image-file frame source.

use std::path::Path;

use image::DynamicImage;

use crate::capture::{Capturer, clip, crop};
use crate::error::LinkError;
use crate::frame::{PixelFormat, RawImage, Region};

/// Serves a decoded image as if it were the desktop.
///
/// When the requested region fits inside the image it is cropped out;
/// otherwise the whole image is returned and resized later.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: RawImage,
}

impl StillImage {
    /// Decode an image file (PNG, JPEG, BMP, GIF).
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let path = path.as_ref();
        let img = image::open(path)
            .map_err(|e| LinkError::Image(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "decoded image");
        Ok(Self::from_image(&img))
    }

    /// Wrap an already decoded image.
    pub fn from_image(img: &DynamicImage) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self {
            image: RawImage {
                width,
                height,
                stride: width * 3,
                format: PixelFormat::Rgb8,
                data: rgb.into_raw(),
                timestamp: std::time::Instant::now(),
            },
        }
    }

    /// Wrap a raw bitmap.
    pub fn from_raw(image: RawImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RawImage {
        &self.image
    }
}

impl Capturer for StillImage {
    fn name(&self) -> &'static str {
        "still-image"
    }

    fn grab(&mut self, region: Region) -> Result<RawImage, LinkError> {
        region.validate()?;
        let fits = clip(region, self.image.width, self.image.height)
            .is_some_and(|(_, _, w, h)| w == region.width && h == region.height);
        if fits {
            crop(&self.image, region)
        } else {
            Ok(self.image.clone())
        }
    }
}
