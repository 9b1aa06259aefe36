//! Hard-example mining: pixel scans of a classifier heatmap.
//!
//! Every segmentation-level pixel inside a tissue box is a candidate
//! tile origin. A pixel qualifies when the heatmap and the ground truth
//! disagree in the way the rule looks for; the extractor then reads the
//! tile's ground-truth window at full resolution and applies
//! [`ScanRule::window_accepts`] before writing.

use image::GrayImage;

use crate::sampler::pixel_at;
use crate::scale::Scale;
use crate::types::{BoundingBox, ExtractionMode, Heatmap, OutOfBounds, TileCoord};

/// Disagreement between classifier and ground truth to harvest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanRule {
    /// Confident tumor prediction on a tumor slide where the ground
    /// truth is normal and the whole tile window is tumor-free.
    FalsePositiveTumor,
    /// Confident tumor prediction anywhere on a normal slide.
    FalsePositiveNormal,
    /// Missed tumor: ground truth is tumor but the prediction is below
    /// threshold, and most of the tile window is tumor.
    FalseNegativeTumor,
}

impl ScanRule {
    /// Rule used by a pixel-scan mode, or `None` for grid modes.
    #[must_use]
    pub const fn for_mode(mode: ExtractionMode) -> Option<Self> {
        match mode {
            ExtractionMode::HardNegativeFromTumor => Some(Self::FalsePositiveTumor),
            ExtractionMode::HardNegativeFromNormal => Some(Self::FalsePositiveNormal),
            ExtractionMode::HardPositiveFromTumor => Some(Self::FalseNegativeTumor),
            ExtractionMode::PositiveFromTumor
            | ExtractionMode::NegativeFromNormal
            | ExtractionMode::NegativeFromTumor => None,
        }
    }

    /// Whether the rule checks the full-resolution ground-truth window.
    #[must_use]
    pub const fn reads_mask_window(self) -> bool {
        !matches!(self, Self::FalsePositiveNormal)
    }

    /// Decide on a tile from its ground-truth window.
    ///
    /// `nonzero` counts tumor pixels among `area` window pixels.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn window_accepts(self, nonzero: u64, area: u64, min_tumor_fraction: f64) -> bool {
        match self {
            Self::FalsePositiveTumor => nonzero == 0,
            Self::FalsePositiveNormal => true,
            Self::FalseNegativeTumor => nonzero as f64 >= area as f64 * min_tumor_fraction,
        }
    }
}

/// One qualifying pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPixel {
    /// Segmentation-level row.
    pub row: u32,
    /// Segmentation-level column.
    pub col: u32,
    /// Level-0 tile origin `(col * factor, row * factor)`.
    pub origin: TileCoord,
}

/// Rasters a pixel scan reads, all at the segmentation level.
#[derive(Debug, Clone, Copy)]
pub struct PixelScan<'a> {
    /// Tissue-presence mask.
    pub tissue: &'a GrayImage,
    /// Classifier probabilities.
    pub heatmap: &'a Heatmap,
    /// Tumor label mask. `None` on normal slides, which read as
    /// background everywhere.
    pub ground_truth: Option<&'a GrayImage>,
    /// Probability at or above which a pixel is predicted tumor.
    pub threshold: f32,
    /// Background value of the masks.
    pub background: u8,
    /// Segmentation level.
    pub scale: Scale,
}

impl PixelScan<'_> {
    /// Pixels of `bbox` that qualify under `rule`, row by row.
    ///
    /// # Errors
    ///
    /// Returns [`OutOfBounds`] if the box reaches past any of the
    /// rasters.
    pub fn candidates(
        &self,
        bbox: BoundingBox,
        rule: ScanRule,
    ) -> Result<Vec<ScanPixel>, OutOfBounds> {
        let mut hits = Vec::new();
        for row in bbox.y..bbox.y_end() {
            for col in bbox.x..bbox.x_end() {
                let point = TileCoord::new(col, row);
                if pixel_at(self.tissue, point)? == self.background {
                    continue;
                }
                let prob = self.probability(point)?;
                let truth = match self.ground_truth {
                    Some(gt) => pixel_at(gt, point)?,
                    None => self.background,
                };
                let predicted = prob >= self.threshold;
                let tumor = truth != self.background;
                let hit = match rule {
                    ScanRule::FalsePositiveTumor => predicted && !tumor,
                    ScanRule::FalsePositiveNormal => predicted,
                    ScanRule::FalseNegativeTumor => !predicted && tumor,
                };
                if hit {
                    hits.push(ScanPixel {
                        row,
                        col,
                        origin: self.scale.point_to_level0(point),
                    });
                }
            }
        }
        Ok(hits)
    }

    fn probability(&self, point: TileCoord) -> Result<f32, OutOfBounds> {
        if point.x < self.heatmap.width() && point.y < self.heatmap.height() {
            Ok(self.heatmap.get_pixel(point.x, point.y).0[0])
        } else {
            Err(OutOfBounds {
                x: point.x,
                y: point.y,
                width: self.heatmap.width(),
                height: self.heatmap.height(),
            })
        }
    }
}
