//! Bounding boxes of connected components in a binary mask.
//!
//! Borders are traced with `imageproc::contours::find_contours`
//! (Suzuki-Abe border following). Only outermost outer borders are
//! kept: holes and components nested inside holes belong to the region
//! that encloses them.
//!
//! The tracer reports a component touching the raster edge as a hole,
//! so the mask is traced inside a one-pixel background frame and the
//! points are shifted back.

use image::GrayImage;
use imageproc::contours::{BorderType, Contour};
use imageproc::point::Point;

use crate::types::BoundingBox;

/// Outer borders of top-level foreground components.
///
/// Every nonzero pixel is foreground.
#[must_use]
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<u32>> {
    let mut framed = GrayImage::new(
        mask.width().saturating_add(2),
        mask.height().saturating_add(2),
    );
    image::imageops::replace(&mut framed, mask, 1, 1);
    imageproc::contours::find_contours::<u32>(&framed)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|mut c| {
            for p in &mut c.points {
                p.x = p.x.saturating_sub(1);
                p.y = p.y.saturating_sub(1);
            }
            c
        })
        .collect()
}

/// Smallest axis-aligned rectangle containing every point, with
/// inclusive pixel extent.
#[must_use]
pub fn bounding_rect(points: &[Point<u32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox::new(
        min_x,
        min_y,
        max_x - min_x + 1,
        max_y - min_y + 1,
    ))
}

/// One bounding box per top-level connected component of `mask`.
#[must_use]
pub fn bounding_boxes(mask: &GrayImage) -> Vec<BoundingBox> {
    external_contours(mask)
        .iter()
        .filter_map(|c| bounding_rect(&c.points))
        .collect()
}

/// Bounding boxes of annotated regions in a label mask, where every
/// nonzero label is foreground.
///
/// Used to locate tumor regions directly from the ground truth instead
/// of from tissue color.
#[must_use]
pub fn boxes_from_label_mask(labels: &GrayImage) -> Vec<BoundingBox> {
    bounding_boxes(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(img: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, v: u8) {
        for y in y0..y1 {
            for x in x0..x1 {
                img.put_pixel(x, y, image::Luma([v]));
            }
        }
    }

    #[test]
    fn empty_mask_has_no_boxes() {
        assert!(bounding_boxes(&GrayImage::new(16, 16)).is_empty());
    }

    #[test]
    fn rectangle_box_is_inclusive() {
        let mut img = GrayImage::new(20, 20);
        fill(&mut img, 5, 6, 15, 12, 255);
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(5, 6, 10, 6)]);
    }

    #[test]
    fn single_pixel_is_one_by_one() {
        let mut img = GrayImage::new(8, 8);
        img.put_pixel(3, 4, image::Luma([1]));
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(3, 4, 1, 1)]);
    }

    #[test]
    fn two_components_give_two_boxes() {
        let mut img = GrayImage::new(40, 20);
        fill(&mut img, 2, 2, 8, 8, 255);
        fill(&mut img, 20, 5, 30, 15, 255);
        let mut boxes = bounding_boxes(&img);
        boxes.sort_by_key(|b| b.x);
        assert_eq!(
            boxes,
            vec![BoundingBox::new(2, 2, 6, 6), BoundingBox::new(20, 5, 10, 10)]
        );
    }

    #[test]
    fn island_inside_hole_is_not_external() {
        let mut img = GrayImage::new(30, 30);
        fill(&mut img, 2, 2, 28, 28, 255);
        fill(&mut img, 6, 6, 24, 24, 0);
        fill(&mut img, 12, 12, 16, 16, 255);
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(2, 2, 26, 26)]);
    }

    #[test]
    fn label_values_count_as_foreground() {
        let mut img = GrayImage::new(10, 10);
        fill(&mut img, 1, 1, 4, 3, 1);
        assert_eq!(
            boxes_from_label_mask(&img),
            vec![BoundingBox::new(1, 1, 3, 2)]
        );
    }

    #[test]
    fn component_on_edge_is_kept() {
        let mut img = GrayImage::new(32, 32);
        fill(&mut img, 0, 4, 5, 20, 255);
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(0, 4, 5, 16)]);
    }

    #[test]
    fn component_in_far_corner_is_kept() {
        let mut img = GrayImage::new(32, 32);
        fill(&mut img, 24, 28, 32, 32, 1);
        assert_eq!(
            boxes_from_label_mask(&img),
            vec![BoundingBox::new(24, 28, 8, 4)]
        );
    }

    #[test]
    fn full_mask_is_one_box() {
        let img = GrayImage::from_pixel(17, 9, image::Luma([255]));
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(0, 0, 17, 9)]);
    }

    #[test]
    fn edge_ring_keeps_outer_extent() {
        let mut img = GrayImage::from_pixel(20, 20, image::Luma([255]));
        fill(&mut img, 4, 4, 16, 16, 0);
        assert_eq!(bounding_boxes(&img), vec![BoundingBox::new(0, 0, 20, 20)]);
    }

    #[test]
    fn bounding_rect_of_nothing_is_none() {
        assert!(bounding_rect(&[]).is_none());
    }
}
