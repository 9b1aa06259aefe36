//! patchwork-pipeline: tissue segmentation and training-tile sampling
//! for whole-slide pathology images (sans-IO).
//!
//! A slide is read at a coarse pyramid level, segmented into tissue
//! regions, and each region is covered with tile coordinates that are
//! filtered against tissue, tumor, and classifier rasters:
//!
//! slide level -> HSV threshold -> close/open -> boxes ->
//! grid or pixel scan -> level-0 tiles -> sink.
//!
//! This crate reads pixels only through the [`Slide`] trait and writes
//! only through the [`TileSink`] trait. Decoding files, writing
//! directories, and batch scheduling live in `patchwork-io` and the
//! `patchwork` binary.

pub mod cancel;
pub mod config;
pub mod contour;
pub mod extract;
pub mod mining;
pub mod raster;
pub mod report;
pub mod sampler;
pub mod scale;
pub mod segment;
pub mod sink;
pub mod slide;
pub mod types;

pub use cancel::CancelToken;
pub use config::{ChannelOrder, ExtractionConfig, HsvBand, SegmentationProfile};
pub use extract::{PatchExtractor, SlideInputs, load_tumor_mask, segmentation_level, slide_rng};
pub use mining::{PixelScan, ScanPixel, ScanRule};
pub use raster::Raster;
pub use report::{BatchReport, ExtractionReport, SlideFailure};
pub use sampler::{BoxSample, Predicate, Sampler};
pub use scale::Scale;
pub use segment::{Segmentation, segment};
pub use sink::{MemorySink, TileFormat, TileSink, WrittenTile};
pub use slide::{PyramidFilter, PyramidOptions, PyramidSlide, Slide};
pub use types::{
    BoundingBox, Dimensions, ExtractError, ExtractionMode, GrayImage, Heatmap, OutOfBounds,
    PatchIndex, RgbImage, RgbaImage, SinkError, SlideError, TileCoord, TileLabel,
};
