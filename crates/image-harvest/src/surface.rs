//! Off-screen drawing surface used to snapshot and re-encode images.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::codec::{self, ImageKind};
use crate::types::{HarvestError, HarvestResult};

/// An RGBA canvas. Resizing clears it, like setting a canvas' width/height.
#[derive(Debug, Clone)]
pub struct Surface {
    canvas: RgbaImage,
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface {
    pub fn new() -> Self {
        Self {
            canvas: RgbaImage::new(0, 0),
        }
    }

    /// Wrap an existing pixel buffer, e.g. a canvas element's contents.
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self { canvas: pixels }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Reset to a transparent canvas of the given size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.canvas = RgbaImage::new(width, height);
    }

    /// Size the surface to the image's natural dimensions and draw it.
    pub fn draw(&mut self, img: &DynamicImage) {
        let (w, h) = img.dimensions();
        self.resize(w, h);
        imageops::overlay(&mut self.canvas, &img.to_rgba8(), 0, 0);
    }

    /// Size the surface to `width`×`height` and draw `frame` stretched to fill it.
    pub fn draw_scaled(&mut self, frame: &RgbaImage, width: u32, height: u32) {
        self.resize(width, height);
        if frame.dimensions() == (width, height) {
            imageops::overlay(&mut self.canvas, frame, 0, 0);
        } else if width > 0 && height > 0 {
            let scaled = imageops::resize(frame, width, height, FilterType::Triangle);
            imageops::overlay(&mut self.canvas, &scaled, 0, 0);
        }
    }

    /// True when the pixels match a freshly cleared canvas of the same size.
    pub fn is_blank(pixels: &RgbaImage) -> bool {
        pixels.as_raw().iter().all(|&b| b == 0)
    }

    pub fn encode(&self, kind: ImageKind) -> HarvestResult<Vec<u8>> {
        let (w, h) = self.dimensions();
        if w == 0 || h == 0 {
            return Err(HarvestError::InvalidInput(
                "Cannot encode an empty surface".to_string(),
            ));
        }
        codec::encode(&DynamicImage::ImageRgba8(self.canvas.clone()), kind)
    }

    pub fn to_data_url(&self, kind: ImageKind) -> HarvestResult<String> {
        let kind = match kind {
            ImageKind::Jpeg => ImageKind::Jpeg,
            _ => ImageKind::Png,
        };
        Ok(codec::to_data_url(&self.encode(kind)?, kind))
    }
}
