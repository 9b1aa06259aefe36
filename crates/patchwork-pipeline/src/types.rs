//! Shared types for the patchwork tile extraction pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference binary
/// masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage`, the pixel layout every written tile uses.
pub use image::RgbImage;

/// Re-export `RgbaImage`, the layout slide regions are read in.
pub use image::RgbaImage;

/// Classifier probability grid aligned with the segmentation-level
/// tissue mask. One `f32` in `[0, 1]` per pixel.
pub type Heatmap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Dimensions of a grayscale raster.
    #[must_use]
    pub fn of_gray(image: &GrayImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned rectangle around one detected tissue (or tumor)
/// component, in the coordinate space of the segmentation level.
///
/// `width` and `height` count pixels inclusively, so a single-pixel
/// component has a `1x1` box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Create a new bounding box.
    #[must_use]
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    #[must_use]
    pub const fn x_end(self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    #[must_use]
    pub const fn y_end(self) -> u32 {
        self.y.saturating_add(self.height)
    }

    /// Pixel count covered by the box.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// Tile origin in level-0 pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    /// Horizontal position (level-0 pixels from the left edge).
    pub x: u32,
    /// Vertical position (level-0 pixels from the top edge).
    pub y: u32,
}

impl TileCoord {
    /// Create a new tile coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The slide origin.
    pub const ORIGIN: Self = Self::new(0, 0);
}

/// Training label of a written tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileLabel {
    /// Tile overlaps annotated tumor.
    Positive,
    /// Tile shows normal tissue only.
    Negative,
}

impl TileLabel {
    /// Directory name used for this label in the output layout.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for TileLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Running tile counter for one extraction run.
///
/// Owned by the caller, passed into an extraction call and handed back
/// (advanced) in its report. Never shared between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchIndex(u64);

impl PatchIndex {
    /// Start counting at `value`.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Current value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Advance by one successful write.
    pub const fn advance(&mut self) {
        self.0 += 1;
    }

    /// Number of writes between `start` and `self`.
    #[must_use]
    pub const fn since(self, start: Self) -> u64 {
        self.0.saturating_sub(start.0)
    }
}

impl fmt::Display for PatchIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The six ways tiles are harvested from a slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Grid tiles overlapping annotated tumor, plus their mask tiles.
    PositiveFromTumor,
    /// Quota-capped grid tiles of tissue on a normal slide.
    NegativeFromNormal,
    /// Quota-capped grid tiles of tissue with no tumor at all.
    NegativeFromTumor,
    /// Pixel scan for classifier false positives on a tumor slide.
    HardNegativeFromTumor,
    /// Pixel scan for classifier positives on a normal slide.
    HardNegativeFromNormal,
    /// Pixel scan for classifier false negatives on a tumor slide.
    HardPositiveFromTumor,
}

impl ExtractionMode {
    /// Every mode, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::PositiveFromTumor,
        Self::NegativeFromNormal,
        Self::NegativeFromTumor,
        Self::HardNegativeFromTumor,
        Self::HardNegativeFromNormal,
        Self::HardPositiveFromTumor,
    ];

    /// Whether the mode reads a ground-truth mask slide.
    #[must_use]
    pub const fn requires_mask(self) -> bool {
        matches!(
            self,
            Self::PositiveFromTumor
                | Self::NegativeFromTumor
                | Self::HardNegativeFromTumor
                | Self::HardPositiveFromTumor
        )
    }

    /// Whether the mode scans a classifier heatmap pixel by pixel.
    #[must_use]
    pub const fn requires_heatmap(self) -> bool {
        matches!(
            self,
            Self::HardNegativeFromTumor | Self::HardNegativeFromNormal | Self::HardPositiveFromTumor
        )
    }

    /// Label every tile of this mode is written under.
    #[must_use]
    pub const fn label(self) -> TileLabel {
        match self {
            Self::PositiveFromTumor | Self::HardPositiveFromTumor => TileLabel::Positive,
            Self::NegativeFromNormal
            | Self::NegativeFromTumor
            | Self::HardNegativeFromTumor
            | Self::HardNegativeFromNormal => TileLabel::Negative,
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PositiveFromTumor => "positive-from-tumor",
            Self::NegativeFromNormal => "negative-from-normal",
            Self::NegativeFromTumor => "negative-from-tumor",
            Self::HardNegativeFromTumor => "hard-negative-from-tumor",
            Self::HardNegativeFromNormal => "hard-negative-from-normal",
            Self::HardPositiveFromTumor => "hard-positive-from-tumor",
        };
        f.write_str(name)
    }
}

/// Errors raised by the image access layer.
#[derive(Debug, thiserror::Error)]
pub enum SlideError {
    /// The file could not be decoded as a slide.
    #[error("unsupported slide format for {path}: {reason}")]
    UnsupportedFormat {
        /// Path of the rejected file.
        path: String,
        /// Decoder message.
        reason: String,
    },

    /// A pyramid level beyond the slide's level count was requested.
    #[error("pyramid level {level} out of range (slide has {level_count} levels)")]
    LevelOutOfRange {
        /// Requested level.
        level: u32,
        /// Levels the slide actually has.
        level_count: u32,
    },
}

/// A sampled point fell outside the raster it was tested against.
///
/// Happens when mask and slide pyramids disagree in size. The box that
/// produced it is skipped; the slide continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("point ({x}, {y}) lies outside the {width}x{height} raster")]
pub struct OutOfBounds {
    /// Column of the offending point.
    pub x: u32,
    /// Row of the offending point.
    pub y: u32,
    /// Raster width.
    pub width: u32,
    /// Raster height.
    pub height: u32,
}

/// Errors raised while writing a tile.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The destination could not be created or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tile could not be encoded.
    #[error("failed to encode tile: {0}")]
    Encode(#[from] image::ImageError),
}

/// Errors that abort extraction for one slide.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The slide (or its mask) could not be read.
    #[error(transparent)]
    Slide(#[from] SlideError),

    /// The mode needs a ground-truth mask slide and none was given.
    #[error("{0} requires a tumor mask slide")]
    MissingMask(ExtractionMode),

    /// The mode needs a probability heatmap and none was given.
    #[error("{0} requires a probability heatmap")]
    MissingHeatmap(ExtractionMode),

    /// The heatmap grid does not match the segmentation raster.
    #[error("heatmap is {heatmap} but the segmentation level is {expected}")]
    HeatmapMismatch {
        /// Heatmap dimensions.
        heatmap: Dimensions,
        /// Segmentation-level dimensions.
        expected: Dimensions,
    },

    /// Extraction configuration is invalid.
    #[error("invalid extraction configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled before segmentation finished.
    #[error("extraction cancelled")]
    Cancelled,
}
