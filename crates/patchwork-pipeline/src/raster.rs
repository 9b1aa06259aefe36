//! The raster value type returned by slide reads.
//!
//! A region read always yields RGBA. Callers convert explicitly to the
//! layout they need: RGB for tiles written to disk, single-channel for
//! mask rasters.

use image::{GrayImage, Rgb, RgbImage, RgbaImage};

use crate::types::Dimensions;

/// An RGBA raster read from a slide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster(RgbaImage);

impl Raster {
    /// Wrap an RGBA image.
    #[must_use]
    pub const fn new(image: RgbaImage) -> Self {
        Self(image)
    }

    /// A fully transparent raster of the given size.
    #[must_use]
    pub fn transparent(size: Dimensions) -> Self {
        Self(RgbaImage::new(size.width, size.height))
    }

    /// Opaque raster from an RGB image.
    #[must_use]
    pub fn from_rgb(image: &RgbImage) -> Self {
        Self(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            image::Rgba([r, g, b, 255])
        }))
    }

    /// Opaque raster with every channel set to the gray value.
    #[must_use]
    pub fn from_gray(image: &GrayImage) -> Self {
        Self(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let v = image.get_pixel(x, y).0[0];
            image::Rgba([v, v, v, 255])
        }))
    }

    /// Raster width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.0.width()
    }

    /// Raster height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.0.height()
    }

    /// Raster dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.0.width(), self.0.height())
    }

    /// Borrow the underlying RGBA pixels.
    #[must_use]
    pub const fn as_rgba(&self) -> &RgbaImage {
        &self.0
    }

    /// Consume the raster and return the RGBA pixels.
    #[must_use]
    pub fn into_rgba(self) -> RgbaImage {
        self.0
    }

    /// Drop the alpha channel without compositing.
    #[must_use = "returns the RGB conversion"]
    pub fn to_rgb(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let [r, g, b, _] = self.0.get_pixel(x, y).0;
            Rgb([r, g, b])
        })
    }

    /// Luminance conversion, ignoring alpha.
    ///
    /// Mask rasters carry the label in every color channel, so the
    /// luminance of a mask pixel is its label value.
    #[must_use = "returns the grayscale conversion"]
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.0)
    }

    /// Number of pixels whose luminance is nonzero.
    #[must_use]
    pub fn count_nonzero(&self) -> u64 {
        self.to_gray().pixels().filter(|p| p.0[0] != 0).count() as u64
    }

    /// RGB copy with every channel multiplied by 255 (saturating), so
    /// a `0`/`1` label mask becomes black and white.
    #[must_use = "returns the intensified RGB image"]
    pub fn to_visible_mask(&self) -> RgbImage {
        RgbImage::from_fn(self.width(), self.height(), |x, y| {
            let [r, g, b, _] = self.0.get_pixel(x, y).0;
            Rgb([
                r.saturating_mul(255),
                g.saturating_mul(255),
                b.saturating_mul(255),
            ])
        })
    }
}

impl From<RgbaImage> for Raster {
    fn from(image: RgbaImage) -> Self {
        Self(image)
    }
}
