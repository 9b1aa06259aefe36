//! Extraction configuration.
//!
//! Every threshold the pipeline uses lives in [`ExtractionConfig`], an
//! immutable value handed to each component. Several configurations
//! (different tile sizes per experiment, say) can coexist in one
//! process.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, ExtractError};

/// Order in which the color channels of a slide raster are read before
/// the HSV conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChannelOrder {
    /// Read the raster's first channel as blue. Reproduces tile sets
    /// generated by converting RGBA slide reads with a BGR formula.
    #[default]
    Bgr,
    /// Read channels in their natural order.
    Rgb,
}

/// Inclusive per-channel HSV band (8-bit hue in `[0, 180)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBand {
    /// Lower bound for H, S, V.
    pub lower: [u8; 3],
    /// Upper bound for H, S, V.
    pub upper: [u8; 3],
}

impl HsvBand {
    /// Band used to build the tissue-presence mask.
    pub const TISSUE: Self = Self {
        lower: [20, 20, 20],
        upper: [200, 200, 200],
    };

    /// Stricter band used to find tissue bounding boxes.
    pub const CONTOUR: Self = Self {
        lower: [40, 40, 40],
        upper: [200, 200, 200],
    };

    /// Whether every channel of `hsv` lies inside the band.
    #[must_use]
    pub fn contains(self, hsv: [u8; 3]) -> bool {
        hsv.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(&v, (&lo, &hi))| lo <= v && v <= hi)
    }
}

/// Parameters of one tissue segmentation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationProfile {
    /// Pixels inside this band are tissue.
    pub band: HsvBand,
    /// Channel order of the input raster.
    pub channel_order: ChannelOrder,
    /// Side of the square closing element (fills holes, merges blobs).
    pub closing_size: u8,
    /// Side of the square opening element (removes specks).
    pub opening_size: u8,
}

impl SegmentationProfile {
    /// Default closing element side.
    pub const DEFAULT_CLOSING_SIZE: u8 = 20;
    /// Default opening element side.
    pub const DEFAULT_OPENING_SIZE: u8 = 5;

    /// Tissue-presence profile.
    pub const TISSUE: Self = Self {
        band: HsvBand::TISSUE,
        channel_order: ChannelOrder::Bgr,
        closing_size: Self::DEFAULT_CLOSING_SIZE,
        opening_size: Self::DEFAULT_OPENING_SIZE,
    };

    /// Bounding-box profile.
    pub const CONTOUR: Self = Self {
        band: HsvBand::CONTOUR,
        channel_order: ChannelOrder::Bgr,
        closing_size: Self::DEFAULT_CLOSING_SIZE,
        opening_size: Self::DEFAULT_OPENING_SIZE,
    };

    fn validate(&self, name: &str) -> Result<(), ExtractError> {
        if self.closing_size == 0 || self.opening_size == 0 {
            return Err(ExtractError::InvalidConfig(format!(
                "{name}: structuring elements must be at least 1 pixel"
            )));
        }
        if self
            .band
            .lower
            .iter()
            .zip(self.band.upper.iter())
            .any(|(lo, hi)| lo > hi)
        {
            return Err(ExtractError::InvalidConfig(format!(
                "{name}: HSV lower bound exceeds upper bound"
            )));
        }
        Ok(())
    }
}

/// Configuration for tile extraction.
///
/// Construct with [`Default`] and override fields, or deserialize from
/// JSON. Call [`validate`](Self::validate) before use;
/// [`PatchExtractor::new`](crate::PatchExtractor::new) does so.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Tile width in level-0 pixels (also the horizontal grid stride).
    pub patch_width: u32,
    /// Tile height in level-0 pixels (also the vertical grid stride).
    pub patch_height: u32,
    /// Mask value meaning background / no tumor.
    pub pixel_black: u8,
    /// Quota of negative tiles per bounding box.
    pub max_negative_patches_per_box: usize,
    /// Heatmap probability at or above which a pixel counts as tumor.
    pub tumor_prob_threshold: f32,
    /// Fraction of a mask tile that must be tumor for hard-positive mining.
    pub hard_positive_min_tumor_fraction: f64,
    /// Pyramid level tiles are read at.
    pub extraction_level: u32,
    /// Finest pyramid level segmentation may use (memory bound).
    pub max_segmentation_level: u32,
    /// Segmentation used for tissue-presence tests in pixel scans.
    pub tissue_profile: SegmentationProfile,
    /// Segmentation used for bounding boxes and grid tissue tests.
    pub contour_profile: SegmentationProfile,
    /// Seed for quota sampling. `None` draws from the OS.
    pub seed: Option<u64>,
    /// Filename prefix for pixel-scan positive tiles.
    pub positive_prefix: String,
    /// Filename prefix for pixel-scan negative tiles.
    pub negative_prefix: String,
}

impl ExtractionConfig {
    /// Default tile side.
    pub const DEFAULT_PATCH_SIZE: u32 = 256;
    /// Default background value.
    pub const DEFAULT_PIXEL_BLACK: u8 = 0;
    /// Default negative quota per box.
    pub const DEFAULT_MAX_NEGATIVE_PATCHES_PER_BOX: usize = 100;
    /// Default heatmap decision threshold.
    pub const DEFAULT_TUMOR_PROB_THRESHOLD: f32 = 0.90;
    /// Default tumor fraction for hard-positive mining.
    pub const DEFAULT_HARD_POSITIVE_MIN_TUMOR_FRACTION: f64 = 0.85;
    /// Default extraction level.
    pub const DEFAULT_EXTRACTION_LEVEL: u32 = 0;
    /// Default cap on the segmentation level.
    pub const DEFAULT_MAX_SEGMENTATION_LEVEL: u32 = 5;

    /// Tile size as dimensions.
    #[must_use]
    pub const fn patch_size(&self) -> Dimensions {
        Dimensions::new(self.patch_width, self.patch_height)
    }

    /// Check invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidConfig`] naming the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.patch_width == 0 || self.patch_height == 0 {
            return Err(ExtractError::InvalidConfig(
                "patch size must be nonzero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.tumor_prob_threshold) {
            return Err(ExtractError::InvalidConfig(format!(
                "tumor_prob_threshold must lie in [0, 1], got {}",
                self.tumor_prob_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.hard_positive_min_tumor_fraction) {
            return Err(ExtractError::InvalidConfig(format!(
                "hard_positive_min_tumor_fraction must lie in [0, 1], got {}",
                self.hard_positive_min_tumor_fraction
            )));
        }
        if self.extraction_level > crate::Scale::MAX_LEVEL
            || self.max_segmentation_level > crate::Scale::MAX_LEVEL
        {
            return Err(ExtractError::InvalidConfig(format!(
                "pyramid levels are limited to {}",
                crate::Scale::MAX_LEVEL
            )));
        }
        self.tissue_profile.validate("tissue_profile")?;
        self.contour_profile.validate("contour_profile")?;
        Ok(())
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            patch_width: Self::DEFAULT_PATCH_SIZE,
            patch_height: Self::DEFAULT_PATCH_SIZE,
            pixel_black: Self::DEFAULT_PIXEL_BLACK,
            max_negative_patches_per_box: Self::DEFAULT_MAX_NEGATIVE_PATCHES_PER_BOX,
            tumor_prob_threshold: Self::DEFAULT_TUMOR_PROB_THRESHOLD,
            hard_positive_min_tumor_fraction: Self::DEFAULT_HARD_POSITIVE_MIN_TUMOR_FRACTION,
            extraction_level: Self::DEFAULT_EXTRACTION_LEVEL,
            max_segmentation_level: Self::DEFAULT_MAX_SEGMENTATION_LEVEL,
            tissue_profile: SegmentationProfile::TISSUE,
            contour_profile: SegmentationProfile::CONTOUR,
            seed: None,
            positive_prefix: String::new(),
            negative_prefix: String::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ExtractionConfig::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_constants() {
        let config = ExtractionConfig::default();
        assert_eq!(config.patch_size(), Dimensions::new(256, 256));
        assert_eq!(config.pixel_black, 0);
        assert_eq!(config.max_negative_patches_per_box, 100);
        assert!((config.tumor_prob_threshold - 0.90).abs() < f32::EPSILON);
        assert!((config.hard_positive_min_tumor_fraction - 0.85).abs() < f64::EPSILON);
        assert_eq!(config.tissue_profile.band, HsvBand::TISSUE);
        assert_eq!(config.contour_profile.band, HsvBand::CONTOUR);
        assert!(config.seed.is_none());
    }

    #[test]
    fn zero_patch_size_is_rejected() {
        let config = ExtractionConfig {
            patch_height: 0,
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ExtractError::InvalidConfig(_))
        ));
    }

    #[test]
    fn threshold_outside_unit_interval_is_rejected() {
        let config = ExtractionConfig {
            tumor_prob_threshold: 1.5,
            ..ExtractionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_band_is_rejected() {
        let mut config = ExtractionConfig::default();
        config.contour_profile.band.lower = [201, 0, 0];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("contour_profile"));
    }

    #[test]
    fn band_contains_is_inclusive() {
        assert!(HsvBand::TISSUE.contains([20, 20, 20]));
        assert!(HsvBand::TISSUE.contains([200, 200, 200]));
        assert!(!HsvBand::TISSUE.contains([19, 100, 100]));
        assert!(!HsvBand::CONTOUR.contains([30, 100, 100]));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: ExtractionConfig =
            serde_json::from_str(r#"{"patch_width": 128, "seed": 7}"#).unwrap();
        assert_eq!(config.patch_width, 128);
        assert_eq!(config.patch_height, 256);
        assert_eq!(config.seed, Some(7));
    }

    #[test]
    fn config_serde_round_trip() {
        let config = ExtractionConfig {
            patch_width: 299,
            max_negative_patches_per_box: 12,
            seed: Some(42),
            negative_prefix: "fp_".to_string(),
            ..ExtractionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: ExtractionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
