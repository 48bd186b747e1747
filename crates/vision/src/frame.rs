//! Captured screen frames.

use std::sync::Arc;

use image::GrayImage;

use crate::geometry::Rect;
use crate::VisionError;

/// One grayscale screen capture. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<GrayImage>,
}

impl Frame {
    pub fn new(image: GrayImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Decode an encoded image (PNG or JPEG) to grayscale.
    pub fn decode(bytes: &[u8]) -> Result<Self, VisionError> {
        let image = image::load_from_memory(bytes)?.to_luma8();
        Ok(Self::new(image))
    }

    /// A uniform frame, mostly useful as a placeholder.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(GrayImage::new(width, height))
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width(), self.height())
    }

    /// Copy out the part of the frame inside `rect` (clipped to bounds).
    pub fn crop(&self, rect: Rect) -> Option<GrayImage> {
        let r = rect.clamp_to(self.width(), self.height())?;
        Some(image::imageops::crop_imm(self.image.as_ref(), r.x, r.y, r.width, r.height).to_image())
    }
}
