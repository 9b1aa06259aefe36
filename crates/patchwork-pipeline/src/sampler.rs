//! Grid sampling of tile coordinates inside a bounding box.
//!
//! A box found at the segmentation level is mapped to level 0 and
//! covered with a tile-stride grid. Each grid origin is tested against
//! the low-resolution masks through [`Scale`]: tissue presence at the
//! tile center, tumor content over the tile's mask window at its
//! corner. Survivors are optionally capped by a random quota.

use image::GrayImage;
use rand::Rng;

use crate::scale::Scale;
use crate::types::{BoundingBox, Dimensions, OutOfBounds, TileCoord};

/// Level-0 tile origins covering `bbox`, row-major.
///
/// Origins step by the tile size from the box's level-0 start while
/// they are below its level-0 end, so the last row and column may
/// overhang the box.
#[must_use]
pub fn grid(bbox: BoundingBox, scale: Scale, tile: Dimensions) -> Vec<TileCoord> {
    if tile.width == 0 || tile.height == 0 {
        return Vec::new();
    }
    let start = scale.box_start(bbox);
    let end = scale.box_end(bbox);
    let xs: Vec<u32> = (start.x..end.x).step_by(tile.width as usize).collect();
    (start.y..end.y)
        .step_by(tile.height as usize)
        .flat_map(|y| xs.iter().map(move |&x| TileCoord::new(x, y)))
        .collect()
}

/// Acceptance test applied to a grid origin.
#[derive(Debug, Clone, Copy)]
pub enum Predicate<'a> {
    /// Tissue mask at the tile center differs from background.
    TissuePresent(&'a GrayImage),
    /// Mean tumor-mask value over the tile window exceeds background.
    TumorPositive(&'a GrayImage),
    /// Mean tumor-mask value over the tile window equals background.
    TumorFree(&'a GrayImage),
}

/// Result of sampling one bounding box.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxSample {
    /// Grid origins considered.
    pub candidates: usize,
    /// Origins that passed every predicate, before the quota.
    pub passed: usize,
    /// Origins kept, in grid order.
    pub accepted: Vec<TileCoord>,
}

/// Sum and pixel count of `mask` over a window, clipped to the raster.
fn window_sum(mask: &GrayImage, corner: TileCoord, size: Dimensions) -> (u64, u64) {
    let x_end = corner.x.saturating_add(size.width).min(mask.width());
    let y_end = corner.y.saturating_add(size.height).min(mask.height());
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in corner.y..y_end {
        for x in corner.x..x_end {
            sum += u64::from(mask.get_pixel(x, y).0[0]);
            count += 1;
        }
    }
    (sum, count)
}

/// Mask value at `point`, or the offending point if it is off-raster.
pub(crate) fn pixel_at(mask: &GrayImage, point: TileCoord) -> Result<u8, OutOfBounds> {
    if point.x < mask.width() && point.y < mask.height() {
        Ok(mask.get_pixel(point.x, point.y).0[0])
    } else {
        Err(OutOfBounds {
            x: point.x,
            y: point.y,
            width: mask.width(),
            height: mask.height(),
        })
    }
}

/// Grid sampler for one segmentation level and tile size.
#[derive(Debug, Clone)]
pub struct Sampler<'a> {
    scale: Scale,
    tile: Dimensions,
    background: u8,
    predicates: Vec<Predicate<'a>>,
    quota: Option<usize>,
}

impl<'a> Sampler<'a> {
    /// Sampler accepting every grid origin.
    #[must_use]
    pub const fn new(scale: Scale, tile: Dimensions, background: u8) -> Self {
        Self {
            scale,
            tile,
            background,
            predicates: Vec::new(),
            quota: None,
        }
    }

    /// Add a predicate. Predicates run in insertion order and stop at
    /// the first rejection.
    #[must_use]
    pub fn with_predicate(mut self, predicate: Predicate<'a>) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Keep at most `quota` accepted origins per box.
    #[must_use]
    pub const fn with_quota(mut self, quota: usize) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Whether `origin` passes every predicate.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] if a tile center falls outside the
    /// tissue mask.
    pub fn accepts(&self, origin: TileCoord) -> Result<bool, OutOfBounds> {
        for predicate in &self.predicates {
            let pass = match *predicate {
                Predicate::TissuePresent(mask) => {
                    let center = self.scale.tile_center(origin, self.tile);
                    pixel_at(mask, center)? != self.background
                }
                Predicate::TumorPositive(mask) => {
                    let (sum, n) = self.window(mask, origin);
                    n > 0 && sum > u64::from(self.background) * n
                }
                Predicate::TumorFree(mask) => {
                    let (sum, n) = self.window(mask, origin);
                    n > 0 && sum == u64::from(self.background) * n
                }
            };
            if !pass {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn window(&self, mask: &GrayImage, origin: TileCoord) -> (u64, u64) {
        let corner = self.scale.point_from_level0(origin);
        window_sum(mask, corner, self.scale.window(self.tile))
    }

    /// Sample `bbox`.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] if any candidate's center lies outside
    /// the tissue mask. The caller skips the whole box.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        bbox: BoundingBox,
        rng: &mut R,
    ) -> Result<BoxSample, OutOfBounds> {
        let candidates = grid(bbox, self.scale, self.tile);
        let mut passed = Vec::new();
        for &origin in &candidates {
            if self.accepts(origin)? {
                passed.push(origin);
            }
        }
        let passed_count = passed.len();
        let accepted = match self.quota {
            Some(quota) if passed.len() > quota => quota_sample(&passed, quota, rng),
            _ => passed,
        };
        Ok(BoxSample {
            candidates: candidates.len(),
            passed: passed_count,
            accepted,
        })
    }
}

/// Uniform sample of `amount` items without replacement, kept in
/// their original order.
pub fn quota_sample<T: Copy, R: Rng + ?Sized>(
    items: &[T],
    amount: usize,
    rng: &mut R,
) -> Vec<T> {
    if amount >= items.len() {
        return items.to_vec();
    }
    let mut picked = rand::seq::index::sample(rng, items.len(), amount).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| items[i]).collect()
}
