//! Image access layer: pyramidal slides.
//!
//! [`Slide`] is the only view of a whole-slide image the pipeline
//! needs: level count, per-level dimensions, and region reads addressed
//! by a level-0 origin. [`PyramidSlide`] implements it over an
//! in-memory image by repeatedly halving the base level, which is
//! enough for thumbnails, tests, and moderately sized scans. Readers for
//! vendor formats implement the same trait.
//!
//! Slides release their resources on drop; there is no close call.

use std::fmt;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::raster::Raster;
use crate::scale::Scale;
use crate::types::{Dimensions, SlideError, TileCoord};

/// A multi-resolution slide.
pub trait Slide {
    /// Identifier used in tile names and logs (the file stem).
    fn name(&self) -> &str;

    /// Number of pyramid levels. Level 0 is native resolution.
    fn level_count(&self) -> u32;

    /// Dimensions of `level`.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::LevelOutOfRange`] if the level does not exist.
    fn level_dimensions(&self, level: u32) -> Result<Dimensions, SlideError>;

    /// Read `size` pixels of `level`, starting at the level-0 position
    /// `origin`. Pixels outside the level read as transparent black.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::LevelOutOfRange`] if the level does not exist.
    fn read_region(
        &self,
        origin: TileCoord,
        level: u32,
        size: Dimensions,
    ) -> Result<Raster, SlideError>;

    /// Read an entire level.
    ///
    /// # Errors
    ///
    /// Returns [`SlideError::LevelOutOfRange`] if the level does not exist.
    fn read_level(&self, level: u32) -> Result<Raster, SlideError> {
        let size = self.level_dimensions(level)?;
        self.read_region(TileCoord::ORIGIN, level, size)
    }

    /// Coarsest level.
    fn coarsest_level(&self) -> u32 {
        self.level_count().saturating_sub(1)
    }
}

/// Resampling filter used when building pyramid levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PyramidFilter {
    /// Nearest-neighbor: keeps label values intact. Use for masks.
    Nearest,
    /// Bilinear interpolation: smooth thumbnails of stained tissue.
    #[default]
    Triangle,
}

impl PyramidFilter {
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
        }
    }
}

impl fmt::Display for PyramidFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
        }
    }
}

/// How far to halve a base image when building a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PyramidOptions {
    /// Stop once the longest axis of a level is at most this many pixels.
    pub min_extent: u32,
    /// Upper bound on the number of levels, including level 0.
    pub max_levels: u32,
    /// Resampling filter.
    pub filter: PyramidFilter,
}

impl PyramidOptions {
    /// Default stopping extent.
    pub const DEFAULT_MIN_EXTENT: u32 = 512;
    /// Default level cap.
    pub const DEFAULT_MAX_LEVELS: u32 = 10;

    /// Options for label masks (nearest-neighbor resampling).
    #[must_use]
    pub fn for_mask() -> Self {
        Self {
            filter: PyramidFilter::Nearest,
            ..Self::default()
        }
    }
}

impl Default for PyramidOptions {
    fn default() -> Self {
        Self {
            min_extent: Self::DEFAULT_MIN_EXTENT,
            max_levels: Self::DEFAULT_MAX_LEVELS,
            filter: PyramidFilter::default(),
        }
    }
}

/// In-memory slide pyramid. Level `k` is level `k - 1` halved
/// (truncating), so `W_k == W_0 >> k` for every level.
#[derive(Debug, Clone)]
pub struct PyramidSlide {
    name: String,
    levels: Vec<RgbaImage>,
}

impl PyramidSlide {
    /// Build a pyramid from a level-0 image.
    #[must_use]
    pub fn from_image(name: impl Into<String>, base: RgbaImage, options: PyramidOptions) -> Self {
        let max_levels = options.max_levels.max(1) as usize;
        let mut levels = vec![base];
        while levels.len() < max_levels {
            let Some(last) = levels.last() else { break };
            let (w, h) = last.dimensions();
            if w.max(h) <= options.min_extent || w < 2 || h < 2 {
                break;
            }
            let next = image::imageops::resize(
                last,
                w / 2,
                h / 2,
                options.filter.to_image_filter(),
            );
            levels.push(next);
        }
        Self {
            name: name.into(),
            levels,
        }
    }

    /// Build a slide from explicit levels. Level `k` must be level 0
    /// halved `k` times for coordinates to line up.
    #[must_use]
    pub fn from_levels(name: impl Into<String>, levels: Vec<RgbaImage>) -> Self {
        Self {
            name: name.into(),
            levels,
        }
    }

    fn level(&self, level: u32) -> Result<&RgbaImage, SlideError> {
        self.levels
            .get(level as usize)
            .ok_or(SlideError::LevelOutOfRange {
                level,
                level_count: self.level_count(),
            })
    }
}

impl Slide for PyramidSlide {
    fn name(&self) -> &str {
        &self.name
    }

    #[allow(clippy::cast_possible_truncation)]
    fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    fn level_dimensions(&self, level: u32) -> Result<Dimensions, SlideError> {
        let img = self.level(level)?;
        Ok(Dimensions::new(img.width(), img.height()))
    }

    fn read_region(
        &self,
        origin: TileCoord,
        level: u32,
        size: Dimensions,
    ) -> Result<Raster, SlideError> {
        let img = self.level(level)?;
        let start = Scale::new(level).point_from_level0(origin);
        let mut out = RgbaImage::new(size.width, size.height);
        if start.x >= img.width() || start.y >= img.height() {
            return Ok(Raster::new(out));
        }
        let w = size.width.min(img.width() - start.x);
        let h = size.height.min(img.height() - start.y);
        let inside = image::imageops::crop_imm(img, start.x, start.y, w, h).to_image();
        image::imageops::replace(&mut out, &inside, 0, 0);
        Ok(Raster::new(out))
    }
}
