//! Patch extraction: boxes to coordinates to tiles.
//!
//! Every mode shares one skeleton. The slide is read at its
//! segmentation level, boxes are found (tissue segmentation, or the
//! tumor label mask for positives), coordinates inside each box are
//! accepted by the grid sampler or by a heatmap pixel scan, and each
//! accepted tile is read at the extraction level and handed to the
//! sink. The caller's [`PatchIndex`] advances once per tissue tile
//! written and comes back in the report.

use std::hash::Hasher;
use std::time::Instant;

use image::GrayImage;
use rand::SeedableRng;
use rand::rngs::StdRng;
use siphasher::sip::SipHasher13;

use crate::cancel::CancelToken;
use crate::config::ExtractionConfig;
use crate::contour;
use crate::mining::{PixelScan, ScanRule};
use crate::raster::Raster;
use crate::report::ExtractionReport;
use crate::sampler::{Predicate, Sampler};
use crate::scale::Scale;
use crate::segment::{self, Segmentation};
use crate::sink::{TileFormat, TileSink};
use crate::slide::Slide;
use crate::types::{
    Dimensions, ExtractError, ExtractionMode, Heatmap, PatchIndex, SlideError, TileCoord,
    TileLabel,
};

/// Rasters available for one slide.
#[derive(Clone, Copy)]
pub struct SlideInputs<'a> {
    /// The slide tiles are cut from.
    pub slide: &'a dyn Slide,
    /// Tumor label mask slide, aligned with `slide` at level 0.
    pub mask: Option<&'a dyn Slide>,
    /// Classifier heatmap at the slide's segmentation level.
    pub heatmap: Option<&'a Heatmap>,
}

impl<'a> SlideInputs<'a> {
    /// Inputs for a slide with no mask and no heatmap.
    #[must_use]
    pub const fn new(slide: &'a dyn Slide) -> Self {
        Self {
            slide,
            mask: None,
            heatmap: None,
        }
    }

    /// Attach a tumor mask slide.
    #[must_use]
    pub const fn with_mask(mut self, mask: &'a dyn Slide) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Attach a classifier heatmap.
    #[must_use]
    pub const fn with_heatmap(mut self, heatmap: &'a Heatmap) -> Self {
        self.heatmap = Some(heatmap);
        self
    }
}

/// Level segmentation runs on: the coarsest level, capped at
/// `max_level`.
#[must_use]
pub fn segmentation_level(slide: &dyn Slide, max_level: u32) -> u32 {
    slide.coarsest_level().min(max_level)
}

/// Read a tumor mask slide at its own segmentation level and resample
/// it (nearest neighbor) to `target`, the slide's segmentation-level
/// size, so mask and tissue rasters share one coordinate space.
///
/// # Errors
///
/// Returns [`SlideError`] if the mask level cannot be read.
pub fn load_tumor_mask(
    mask: &dyn Slide,
    target: Dimensions,
    max_level: u32,
) -> Result<GrayImage, SlideError> {
    let level = segmentation_level(mask, max_level);
    let labels = mask.read_level(level)?.to_gray();
    if Dimensions::of_gray(&labels) == target {
        return Ok(labels);
    }
    tracing::debug!(
        mask = mask.name(),
        from = %Dimensions::of_gray(&labels),
        to = %target,
        "resampling tumor mask"
    );
    Ok(image::imageops::resize(
        &labels,
        target.width,
        target.height,
        image::imageops::FilterType::Nearest,
    ))
}

/// Random source for quota sampling on one slide.
///
/// With a seed, the generator depends only on the seed and the slide
/// name, so slides sample identically whatever order a batch visits
/// them in.
#[must_use]
pub fn slide_rng(seed: Option<u64>, slide: &str) -> StdRng {
    match seed {
        Some(seed) => {
            let mut hasher = SipHasher13::new_with_keys(seed, 0);
            hasher.write(slide.as_bytes());
            StdRng::seed_from_u64(hasher.finish())
        }
        None => StdRng::from_os_rng(),
    }
}

/// Extracts labeled tiles from slides under one configuration.
#[derive(Debug, Clone)]
pub struct PatchExtractor {
    config: ExtractionConfig,
    cancel: CancelToken,
}

impl PatchExtractor {
    /// Validate `config` and build an extractor.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidConfig`] if the configuration is
    /// inconsistent.
    pub fn new(config: ExtractionConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Poll `cancel` during extraction.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Run `mode` on one slide, writing tiles to `sink`.
    ///
    /// Boxes that reach outside a raster are skipped and counted. Tiles
    /// the sink rejects are logged and counted. A cancel token tripped
    /// mid-run stops the slide and sets
    /// [`ExtractionReport::cancelled`]; tiles already written stay.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::MissingMask`] / [`ExtractError::MissingHeatmap`]
    ///   if the mode needs an input that was not given.
    /// - [`ExtractError::Cancelled`] if the token was already tripped.
    /// - [`ExtractError::HeatmapMismatch`] if the heatmap does not match
    ///   the segmentation level.
    /// - [`ExtractError::Slide`] if a slide level cannot be read.
    pub fn extract(
        &self,
        mode: ExtractionMode,
        inputs: SlideInputs<'_>,
        sink: &mut dyn TileSink,
        index: PatchIndex,
    ) -> Result<ExtractionReport, ExtractError> {
        let started = Instant::now();
        let config = &self.config;
        if mode.requires_mask() && inputs.mask.is_none() {
            return Err(ExtractError::MissingMask(mode));
        }
        if mode.requires_heatmap() && inputs.heatmap.is_none() {
            return Err(ExtractError::MissingHeatmap(mode));
        }
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let slide = inputs.slide;
        let level = segmentation_level(slide, config.max_segmentation_level);
        let scale = Scale::new(level);
        let thumbnail = slide.read_level(level)?;
        let seg_size = thumbnail.dimensions();
        tracing::debug!(
            slide = slide.name(),
            %mode,
            level,
            size = %seg_size,
            "read segmentation level"
        );

        let ground_truth = match inputs.mask {
            Some(mask) if mode.requires_mask() => Some(load_tumor_mask(
                mask,
                seg_size,
                config.max_segmentation_level,
            )?),
            _ => None,
        };

        let mut run = Run {
            slide,
            sink,
            cancel: &self.cancel,
            index,
            level: config.extraction_level,
            tile: config.patch_size(),
            report: ExtractionReport::new(slide.name(), mode, level, index),
        };

        match ScanRule::for_mode(mode) {
            None => self.extract_grid(
                mode,
                &thumbnail,
                ground_truth.as_ref(),
                inputs.mask,
                scale,
                &mut run,
            )?,
            Some(rule) => {
                let heatmap = inputs.heatmap.ok_or(ExtractError::MissingHeatmap(mode))?;
                let heatmap_size = Dimensions::new(heatmap.width(), heatmap.height());
                if heatmap_size != seg_size {
                    return Err(ExtractError::HeatmapMismatch {
                        heatmap: heatmap_size,
                        expected: seg_size,
                    });
                }
                let tissue = segment::tissue_mask(&thumbnail, &config.tissue_profile);
                let scan = PixelScan {
                    tissue: &tissue,
                    heatmap,
                    ground_truth: ground_truth.as_ref(),
                    threshold: config.tumor_prob_threshold,
                    background: config.pixel_black,
                    scale,
                };
                self.extract_scan(mode, rule, &thumbnail, &scan, inputs.mask, &mut run)?;
            }
        }

        let mut report = run.report;
        report.patch_index = run.index;
        report.duration = started.elapsed();
        tracing::info!(
            slide = %report.slide,
            %mode,
            boxes = report.boxes_found,
            skipped = report.boxes_skipped,
            accepted = report.accepted,
            written = report.tiles_written(),
            failures = report.write_failures,
            cancelled = report.cancelled,
            "extracted slide"
        );
        Ok(report)
    }

    fn extract_grid(
        &self,
        mode: ExtractionMode,
        thumbnail: &Raster,
        ground_truth: Option<&GrayImage>,
        mask_slide: Option<&dyn Slide>,
        scale: Scale,
        run: &mut Run<'_>,
    ) -> Result<(), ExtractError> {
        let config = &self.config;
        let tile = config.patch_size();
        let base = Sampler::new(scale, tile, config.pixel_black);

        let segmentation: Segmentation;
        let (boxes, sampler) = if mode == ExtractionMode::PositiveFromTumor {
            let labels = ground_truth.ok_or(ExtractError::MissingMask(mode))?;
            (
                contour::boxes_from_label_mask(labels),
                base.with_predicate(Predicate::TumorPositive(labels)),
            )
        } else {
            segmentation = segment::segment(thumbnail, &config.contour_profile);
            let mut sampler = base
                .with_predicate(Predicate::TissuePresent(&segmentation.mask))
                .with_quota(config.max_negative_patches_per_box);
            if mode == ExtractionMode::NegativeFromTumor {
                let labels = ground_truth.ok_or(ExtractError::MissingMask(mode))?;
                sampler = sampler.with_predicate(Predicate::TumorFree(labels));
            }
            (segmentation.boxes.clone(), sampler)
        };

        let slide = run.slide;
        let label = mode.label();
        let with_mask_tiles = mode == ExtractionMode::PositiveFromTumor;
        let mut rng = slide_rng(config.seed, slide.name());
        run.report.boxes_found = boxes.len();

        'boxes: for bbox in boxes {
            if run.check_cancelled() {
                break;
            }
            let sample = match sampler.sample(bbox, &mut rng) {
                Ok(sample) => sample,
                Err(err) => {
                    tracing::warn!(slide = slide.name(), %bbox, %err, "skipping box");
                    run.report.boxes_skipped += 1;
                    continue;
                }
            };
            tracing::debug!(
                slide = slide.name(),
                %bbox,
                candidates = sample.candidates,
                passed = sample.passed,
                kept = sample.accepted.len(),
                "sampled box"
            );
            run.report.boxes_processed += 1;
            run.report.candidates += sample.candidates;
            run.report.accepted += sample.accepted.len();

            for origin in sample.accepted {
                if run.check_cancelled() {
                    break 'boxes;
                }
                let name = format!("{}_{}_{}", slide.name(), origin.x, origin.y);
                let written = run.write_tissue(label, &name, TileFormat::Jpeg, origin)?;
                if written && with_mask_tiles {
                    let mask = mask_slide.ok_or(ExtractError::MissingMask(mode))?;
                    let mask_tile = mask
                        .read_region(origin, config.extraction_level, tile)?
                        .to_visible_mask();
                    let mask_name = format!("{name}_mask");
                    if run.write(label, &mask_name, TileFormat::Jpeg, &mask_tile, origin) {
                        run.report.masks_written += 1;
                    }
                }
            }
        }
        Ok(())
    }

    fn extract_scan(
        &self,
        mode: ExtractionMode,
        rule: ScanRule,
        thumbnail: &Raster,
        scan: &PixelScan<'_>,
        mask_slide: Option<&dyn Slide>,
        run: &mut Run<'_>,
    ) -> Result<(), ExtractError> {
        let config = &self.config;
        let boxes = segment::segment(thumbnail, &config.contour_profile).boxes;
        let mask_slide = if rule.reads_mask_window() {
            Some(mask_slide.ok_or(ExtractError::MissingMask(mode))?)
        } else {
            None
        };

        let slide = run.slide;
        let label = mode.label();
        let prefix = match label {
            TileLabel::Positive => &config.positive_prefix,
            TileLabel::Negative => &config.negative_prefix,
        };
        let tile = config.patch_size();
        run.report.boxes_found = boxes.len();

        'boxes: for bbox in boxes {
            if run.check_cancelled() {
                break;
            }
            let hits = match scan.candidates(bbox, rule) {
                Ok(hits) => hits,
                Err(err) => {
                    tracing::warn!(slide = slide.name(), %bbox, %err, "skipping box");
                    run.report.boxes_skipped += 1;
                    continue;
                }
            };
            tracing::debug!(
                slide = slide.name(),
                %bbox,
                hits = hits.len(),
                "scanned box"
            );
            run.report.boxes_processed += 1;
            run.report.candidates += usize::try_from(bbox.area()).unwrap_or(usize::MAX);

            for hit in hits {
                if run.check_cancelled() {
                    break 'boxes;
                }
                if let Some(mask) = mask_slide {
                    let nonzero = mask
                        .read_region(hit.origin, config.extraction_level, tile)?
                        .count_nonzero();
                    if !rule.window_accepts(
                        nonzero,
                        tile.area(),
                        config.hard_positive_min_tumor_fraction,
                    ) {
                        continue;
                    }
                }
                run.report.accepted += 1;
                let name = format!("{prefix}{}_{}", slide.name(), run.index);
                run.write_tissue(label, &name, TileFormat::Png, hit.origin)?;
            }
        }
        Ok(())
    }
}

/// Mutable state of one extraction call.
struct Run<'r> {
    slide: &'r dyn Slide,
    sink: &'r mut dyn TileSink,
    cancel: &'r CancelToken,
    index: PatchIndex,
    level: u32,
    tile: Dimensions,
    report: ExtractionReport,
}

impl Run<'_> {
    fn check_cancelled(&mut self) -> bool {
        if self.cancel.is_cancelled() {
            if !self.report.cancelled {
                tracing::info!(slide = self.slide.name(), "extraction cancelled");
            }
            self.report.cancelled = true;
        }
        self.report.cancelled
    }

    /// Hand one tile to the sink. Failures are logged and counted.
    fn write(
        &mut self,
        label: TileLabel,
        name: &str,
        format: TileFormat,
        tile: &image::RgbImage,
        origin: TileCoord,
    ) -> bool {
        match self.sink.write_tile(label, name, format, tile) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(
                    slide = self.slide.name(),
                    x = origin.x,
                    y = origin.y,
                    %err,
                    "failed to write tile"
                );
                self.report.write_failures += 1;
                false
            }
        }
    }

    /// Read and write the slide tile at `origin`, advancing the index
    /// on success.
    fn write_tissue(
        &mut self,
        label: TileLabel,
        name: &str,
        format: TileFormat,
        origin: TileCoord,
    ) -> Result<bool, SlideError> {
        let tile = self
            .slide
            .read_region(origin, self.level, self.tile)?
            .to_rgb();
        if !self.write(label, name, format, &tile, origin) {
            return Ok(false);
        }
        self.report.record_write(label);
        self.index.advance();
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::{Luma, Rgba, RgbaImage};

    use super::*;
    use crate::config::SegmentationProfile;
    use crate::sink::MemorySink;
    use crate::slide::PyramidSlide;
    use crate::types::SinkError;

    const STAIN: Rgba<u8> = Rgba([200, 120, 160, 255]);
    const GLASS: Rgba<u8> = Rgba([255, 255, 255, 255]);

    /// Morphology disabled so synthetic blobs keep their exact extent.
    fn exact_config(tile: u32) -> ExtractionConfig {
        let exact = |profile: SegmentationProfile| SegmentationProfile {
            closing_size: 1,
            opening_size: 1,
            ..profile
        };
        ExtractionConfig {
            patch_width: tile,
            patch_height: tile,
            tissue_profile: exact(SegmentationProfile::TISSUE),
            contour_profile: exact(SegmentationProfile::CONTOUR),
            seed: Some(7),
            ..ExtractionConfig::default()
        }
    }

    /// Single-level slide with stain in `[lo, hi)` on both axes.
    fn block_slide(name: &str, size: u32, lo: u32, hi: u32) -> PyramidSlide {
        let img = RgbaImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                STAIN
            } else {
                GLASS
            }
        });
        PyramidSlide::from_levels(name, vec![img])
    }

    fn label_slide(name: &str, size: u32, tumor: impl Fn(u32, u32) -> bool) -> PyramidSlide {
        let img = RgbaImage::from_fn(size, size, |x, y| {
            let v = u8::from(tumor(x, y));
            Rgba([v, v, v, 255])
        });
        PyramidSlide::from_levels(name, vec![img])
    }

    struct FailingSink;

    impl TileSink for FailingSink {
        fn write_tile(
            &mut self,
            _label: TileLabel,
            _name: &str,
            _format: TileFormat,
            _tile: &image::RgbImage,
        ) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::other("disk full")))
        }
    }

    #[test]
    fn segmentation_level_is_capped() {
        let slide = PyramidSlide::from_levels("s", vec![RgbaImage::new(1, 1); 9]);
        assert_eq!(slide.coarsest_level(), 8);
        assert_eq!(segmentation_level(&slide, 5), 5);
        assert_eq!(segmentation_level(&slide, 10), 8);
    }

    #[test]
    fn tumor_mask_is_resampled_to_target() {
        let mask = label_slide("m", 16, |x, _| x >= 8);
        let labels = load_tumor_mask(&mask, Dimensions::new(32, 32), 5).unwrap();
        assert_eq!(Dimensions::of_gray(&labels), Dimensions::new(32, 32));
        assert_eq!(labels.get_pixel(0, 0).0[0], 0);
        assert_eq!(labels.get_pixel(31, 31).0[0], 1);
    }

    #[test]
    fn slide_rng_depends_on_seed_and_name() {
        use rand::Rng;
        let a: u64 = slide_rng(Some(1), "a").random();
        let again: u64 = slide_rng(Some(1), "a").random();
        let other: u64 = slide_rng(Some(1), "b").random();
        assert_eq!(a, again);
        assert_ne!(a, other);
    }

    #[test]
    fn missing_inputs_are_reported() {
        let slide = block_slide("s", 32, 8, 24);
        let extractor = PatchExtractor::new(exact_config(8)).unwrap();
        let mut sink = MemorySink::new();
        let err = extractor
            .extract(
                ExtractionMode::PositiveFromTumor,
                SlideInputs::new(&slide),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingMask(_)));

        let err = extractor
            .extract(
                ExtractionMode::HardNegativeFromNormal,
                SlideInputs::new(&slide),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::MissingHeatmap(_)));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ExtractionConfig {
            patch_width: 0,
            ..ExtractionConfig::default()
        };
        assert!(matches!(
            PatchExtractor::new(config),
            Err(ExtractError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_from_normal_names_tiles_by_origin() {
        let slide = block_slide("normal_001", 64, 16, 48);
        let extractor = PatchExtractor::new(exact_config(16)).unwrap();
        let mut sink = MemorySink::new();
        let report = extractor
            .extract(
                ExtractionMode::NegativeFromNormal,
                SlideInputs::new(&slide),
                &mut sink,
                PatchIndex::new(5),
            )
            .unwrap();
        assert_eq!(report.boxes_found, 1);
        assert_eq!(report.candidates, 4);
        assert_eq!(report.negative_written, 4);
        assert_eq!(report.patch_index, PatchIndex::new(9));
        assert_eq!(
            sink.names(TileLabel::Negative),
            vec![
                "normal_001_16_16.jpg",
                "normal_001_32_16.jpg",
                "normal_001_16_32.jpg",
                "normal_001_32_32.jpg",
            ]
        );
        assert!(sink.tiles.iter().all(|t| t.image.dimensions() == (16, 16)));
    }

    #[test]
    fn positive_tiles_come_with_visible_masks() {
        let slide = block_slide("tumor_001", 64, 0, 64);
        let mask = label_slide("tumor_001_mask", 64, |x, y| {
            (16..32).contains(&x) && (16..32).contains(&y)
        });
        let extractor = PatchExtractor::new(exact_config(16)).unwrap();
        let mut sink = MemorySink::new();
        let report = extractor
            .extract(
                ExtractionMode::PositiveFromTumor,
                SlideInputs::new(&slide).with_mask(&mask),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap();
        assert_eq!(report.positive_written, 1);
        assert_eq!(report.masks_written, 1);
        assert_eq!(report.patch_index, PatchIndex::new(1));
        assert_eq!(
            sink.names(TileLabel::Positive),
            vec!["tumor_001_16_16.jpg", "tumor_001_16_16_mask.jpg"]
        );
        assert!(sink.tiles[1].image.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn write_failures_are_counted_and_do_not_advance_index() {
        let slide = block_slide("s", 64, 16, 48);
        let extractor = PatchExtractor::new(exact_config(16)).unwrap();
        let report = extractor
            .extract(
                ExtractionMode::NegativeFromNormal,
                SlideInputs::new(&slide),
                &mut FailingSink,
                PatchIndex::new(3),
            )
            .unwrap();
        assert_eq!(report.write_failures, 4);
        assert_eq!(report.tiles_written(), 0);
        assert_eq!(report.patch_index, PatchIndex::new(3));
    }

    #[test]
    fn cancelled_token_stops_before_reading() {
        let slide = block_slide("s", 64, 16, 48);
        let token = CancelToken::new();
        token.cancel();
        let extractor = PatchExtractor::new(exact_config(16))
            .unwrap()
            .with_cancel(token);
        let mut sink = MemorySink::new();
        let err = extractor
            .extract(
                ExtractionMode::NegativeFromNormal,
                SlideInputs::new(&slide),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
        assert!(sink.tiles.is_empty());
    }

    #[test]
    fn hard_positive_scan_writes_one_tile_per_pixel() {
        // 4x4 tissue box at level 0, heatmap below threshold, mask
        // windows fully tumor.
        let slide = block_slide("tumor_002", 32, 8, 12);
        let mask = label_slide("tumor_002_mask", 32, |_, _| true);
        let heatmap = Heatmap::from_pixel(32, 32, Luma([0.1]));
        let config = ExtractionConfig {
            positive_prefix: "fn_".to_string(),
            ..exact_config(8)
        };
        let extractor = PatchExtractor::new(config).unwrap();
        let mut sink = MemorySink::new();
        let report = extractor
            .extract(
                ExtractionMode::HardPositiveFromTumor,
                SlideInputs::new(&slide)
                    .with_mask(&mask)
                    .with_heatmap(&heatmap),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap();
        assert_eq!(report.boxes_found, 1);
        assert_eq!(report.candidates, 16);
        assert_eq!(report.positive_written, 16);
        let names = sink.names(TileLabel::Positive);
        assert_eq!(names[0], "fn_tumor_002_0.png");
        assert_eq!(names[15], "fn_tumor_002_15.png");
    }

    #[test]
    fn hard_negative_from_tumor_requires_clean_window() {
        let slide = block_slide("tumor_003", 32, 8, 12);
        // Tumor only near the far corner: windows of pixels close to it
        // see tumor and are rejected.
        let mask = label_slide("tumor_003_mask", 32, |x, y| x >= 17 && y >= 17);
        let heatmap = Heatmap::from_pixel(32, 32, Luma([0.95]));
        let extractor = PatchExtractor::new(exact_config(8)).unwrap();
        let mut sink = MemorySink::new();
        let report = extractor
            .extract(
                ExtractionMode::HardNegativeFromTumor,
                SlideInputs::new(&slide)
                    .with_mask(&mask)
                    .with_heatmap(&heatmap),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap();
        // Pixel (col, row) reads window [col, col + 8); it is clean
        // unless both col and row exceed 9.
        assert_eq!(report.negative_written, 16 - 4);
    }

    #[test]
    fn heatmap_must_match_segmentation_level() {
        let slide = block_slide("s", 32, 8, 12);
        let heatmap = Heatmap::from_pixel(16, 16, Luma([0.95]));
        let extractor = PatchExtractor::new(exact_config(8)).unwrap();
        let mut sink = MemorySink::new();
        let err = extractor
            .extract(
                ExtractionMode::HardNegativeFromNormal,
                SlideInputs::new(&slide).with_heatmap(&heatmap),
                &mut sink,
                PatchIndex::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ExtractError::HeatmapMismatch { .. }));
    }
}
