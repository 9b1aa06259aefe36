//! Tissue segmentation: separate stained tissue from slide background.
//!
//! Runs on a coarse pyramid level that fits in memory:
//!
//! 1. RGB to 8-bit HSV (hue halved into `[0, 180)`).
//! 2. Inclusive per-channel band threshold into a binary mask.
//! 3. Closing with a square element (fills holes, merges nearby blobs).
//! 4. Opening with a smaller square element (removes specks).
//! 5. Bounding boxes of the external components.
//!
//! The opened mask is kept: the samplers test tile centers against it
//! as a cheap background rejection.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::morphology::Mask;
use imageproc::rect::Rect;

use crate::config::{ChannelOrder, SegmentationProfile};
use crate::contour;
use crate::raster::Raster;
use crate::types::BoundingBox;

/// Mask value marking tissue.
pub const TISSUE: u8 = 255;

/// Color used to outline boxes in overlays.
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// Output of [`segment`].
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Binary tissue mask after closing and opening (255 = tissue).
    pub mask: GrayImage,
    /// One box per external tissue component, in mask coordinates.
    pub boxes: Vec<BoundingBox>,
}

/// Convert one RGB pixel to 8-bit HSV.
///
/// `H` is degrees halved (`[0, 180)`), `S` and `V` span `[0, 255]`.
#[must_use]
#[allow(
    clippy::many_single_char_names,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    if v == min {
        return [0, 0, v];
    }

    let diff = f32::from(v - min);
    let s = (diff * 255.0 / f32::from(v)).round();

    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let degrees = if v == r {
        60.0 * (gf - bf) / diff
    } else if v == g {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    let degrees = if degrees < 0.0 {
        degrees + 360.0
    } else {
        degrees
    };
    let h = (degrees / 2.0).round() % 180.0;

    [h as u8, s as u8, v]
}

/// Binary mask of pixels whose HSV value lies in the profile's band.
#[must_use]
pub fn threshold_hsv(raster: &Raster, profile: &SegmentationProfile) -> GrayImage {
    let rgba = raster.as_rgba();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [c0, c1, c2, _] = rgba.get_pixel(x, y).0;
        let hsv = match profile.channel_order {
            ChannelOrder::Bgr => rgb_to_hsv(c2, c1, c0),
            ChannelOrder::Rgb => rgb_to_hsv(c0, c1, c2),
        };
        if profile.band.contains(hsv) {
            Luma([TISSUE])
        } else {
            Luma([0])
        }
    })
}

/// Square structuring element of side `size`, anchored at `size / 2`.
fn square_element(size: u8) -> Mask {
    let side = u32::from(size.max(1));
    let element = GrayImage::from_pixel(side, side, Luma([255]));
    Mask::from_image(&element, size / 2, size / 2)
}

/// Morphological closing with a `size`×`size` square.
#[must_use]
pub fn close(mask: &GrayImage, size: u8) -> GrayImage {
    imageproc::morphology::grayscale_close(mask, &square_element(size))
}

/// Morphological opening with a `size`×`size` square.
#[must_use]
pub fn open(mask: &GrayImage, size: u8) -> GrayImage {
    imageproc::morphology::grayscale_open(mask, &square_element(size))
}

/// Cleaned binary tissue mask (threshold, close, open).
#[must_use]
pub fn tissue_mask(raster: &Raster, profile: &SegmentationProfile) -> GrayImage {
    let band = threshold_hsv(raster, profile);
    let closed = close(&band, profile.closing_size);
    open(&closed, profile.opening_size)
}

/// Segment tissue and box every external component.
///
/// Never fails: a slide with no tissue yields an empty box list.
#[must_use]
pub fn segment(raster: &Raster, profile: &SegmentationProfile) -> Segmentation {
    let mask = tissue_mask(raster, profile);
    let boxes = contour::bounding_boxes(&mask);
    tracing::debug!(
        width = mask.width(),
        height = mask.height(),
        boxes = boxes.len(),
        "segmented tissue"
    );
    Segmentation { mask, boxes }
}

/// Copy of `raster` with every box outlined (2 px) for inspection.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn draw_boxes(raster: &Raster, boxes: &[BoundingBox]) -> RgbImage {
    let mut canvas = raster.to_rgb();
    for b in boxes.iter().filter(|b| b.width > 0 && b.height > 0) {
        let inner = Rect::at(b.x as i32, b.y as i32).of_size(b.width, b.height);
        let outer = Rect::at(b.x as i32 - 1, b.y as i32 - 1).of_size(b.width + 2, b.height + 2);
        imageproc::drawing::draw_hollow_rect_mut(&mut canvas, inner, OVERLAY_COLOR);
        imageproc::drawing::draw_hollow_rect_mut(&mut canvas, outer, OVERLAY_COLOR);
    }
    canvas
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    /// Pink-purple stain, inside both bands in either channel order.
    const STAIN: Rgba<u8> = Rgba([200, 120, 160, 255]);
    const GLASS: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn slide_with_blob(size: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> Raster {
        Raster::new(RgbaImage::from_fn(size, size, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                STAIN
            } else {
                GLASS
            }
        }))
    }

    #[test]
    fn primary_colors_have_expected_hue() {
        assert_eq!(rgb_to_hsv(255, 0, 0), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 255, 0), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(0, 0, 255), [120, 255, 255]);
    }

    #[test]
    fn gray_has_no_saturation() {
        assert_eq!(rgb_to_hsv(128, 128, 128), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(0, 0, 0), [0, 0, 0]);
    }

    #[test]
    fn magenta_wraps_into_upper_hue_range() {
        // 300 degrees -> 150.
        assert_eq!(rgb_to_hsv(255, 0, 255)[0], 150);
    }

    #[test]
    fn stain_is_inside_both_profiles() {
        let raster = slide_with_blob(4, 0, 0, 4, 4);
        for profile in [SegmentationProfile::TISSUE, SegmentationProfile::CONTOUR] {
            let band = threshold_hsv(&raster, &profile);
            assert!(band.pixels().all(|p| p.0[0] == TISSUE));
        }
    }

    #[test]
    fn glass_and_black_are_background() {
        let raster = Raster::new(RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 { GLASS } else { Rgba([0, 0, 0, 0]) }
        }));
        let band = threshold_hsv(&raster, &SegmentationProfile::TISSUE);
        assert!(band.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn channel_order_changes_hue() {
        let raster = Raster::new(RgbaImage::from_pixel(1, 1, Rgba([10, 10, 200, 255])));
        let mut profile = SegmentationProfile::TISSUE;
        profile.band.lower = [100, 0, 0];
        profile.band.upper = [140, 255, 255];
        profile.channel_order = ChannelOrder::Rgb;
        assert_eq!(threshold_hsv(&raster, &profile).get_pixel(0, 0).0[0], TISSUE);
        profile.channel_order = ChannelOrder::Bgr;
        assert_eq!(threshold_hsv(&raster, &profile).get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn single_blob_gives_one_box() {
        let raster = slide_with_blob(256, 50, 50, 150, 150);
        let seg = segment(&raster, &SegmentationProfile::TISSUE);
        assert_eq!(seg.boxes.len(), 1, "boxes: {:?}", seg.boxes);
        let b = seg.boxes[0];
        assert!(b.x.abs_diff(50) <= 2, "x = {}", b.x);
        assert!(b.y.abs_diff(50) <= 2, "y = {}", b.y);
        assert!(b.width.abs_diff(100) <= 2, "width = {}", b.width);
        assert!(b.height.abs_diff(100) <= 2, "height = {}", b.height);
    }

    #[test]
    fn opening_removes_specks() {
        let raster = slide_with_blob(64, 30, 30, 32, 32);
        let seg = segment(&raster, &SegmentationProfile::TISSUE);
        assert!(seg.boxes.is_empty(), "boxes: {:?}", seg.boxes);
        assert!(seg.mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn closing_merges_close_blobs() {
        let raster = Raster::new(RgbaImage::from_fn(128, 128, |x, y| {
            let left = (20..50).contains(&x);
            let right = (55..85).contains(&x);
            if (left || right) && (20..60).contains(&y) {
                STAIN
            } else {
                GLASS
            }
        }));
        let seg = segment(&raster, &SegmentationProfile::TISSUE);
        assert_eq!(seg.boxes.len(), 1, "boxes: {:?}", seg.boxes);
    }

    #[test]
    fn closing_fills_small_holes() {
        let raster = Raster::new(RgbaImage::from_fn(128, 128, |x, y| {
            let inside = (20..100).contains(&x) && (20..100).contains(&y);
            let hole = (55..60).contains(&x) && (55..60).contains(&y);
            if inside && !hole { STAIN } else { GLASS }
        }));
        let mask = tissue_mask(&raster, &SegmentationProfile::TISSUE);
        assert_eq!(mask.get_pixel(57, 57).0[0], TISSUE);
    }

    #[test]
    fn tissue_on_edge_gives_a_box() {
        let raster = slide_with_blob(64, 0, 20, 24, 44);
        let seg = segment(&raster, &SegmentationProfile::CONTOUR);
        assert_eq!(seg.boxes.len(), 1, "boxes: {:?}", seg.boxes);
        let b = seg.boxes[0];
        assert_eq!(b.x, 0);
        assert!(b.width.abs_diff(24) <= 2, "width = {}", b.width);
        assert!(b.y.abs_diff(20) <= 2, "y = {}", b.y);
    }

    #[test]
    fn all_tissue_slide_is_one_full_box() {
        let raster = Raster::new(RgbaImage::from_pixel(48, 32, STAIN));
        let seg = segment(&raster, &SegmentationProfile::TISSUE);
        assert_eq!(seg.boxes, vec![BoundingBox::new(0, 0, 48, 32)]);
        assert!(seg.mask.pixels().all(|p| p.0[0] == TISSUE));
    }

    #[test]
    fn blank_slide_has_no_boxes() {
        let raster = Raster::new(RgbaImage::from_pixel(64, 64, GLASS));
        let seg = segment(&raster, &SegmentationProfile::CONTOUR);
        assert!(seg.boxes.is_empty());
    }

    #[test]
    fn overlay_outlines_box() {
        let raster = Raster::new(RgbaImage::from_pixel(32, 32, GLASS));
        let overlay = draw_boxes(&raster, &[BoundingBox::new(4, 4, 10, 10)]);
        assert_eq!(*overlay.get_pixel(4, 4), OVERLAY_COLOR);
        assert_eq!(*overlay.get_pixel(3, 3), OVERLAY_COLOR);
        assert_eq!(overlay.get_pixel(8, 8).0, [255, 255, 255]);
    }
}
