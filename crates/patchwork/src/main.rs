//! patchwork: build tumor and normal tile datasets from whole-slide images.
//!
//! Three subcommands cover the dataset workflow:
//!
//! - `masks` rasterizes ASAP XML annotations into label masks
//! - `extract` runs one extraction mode over a directory of slides
//! - `segment` writes a tissue box overlay for one slide, for tuning
//!
//! # Usage
//!
//! ```text
//! patchwork masks --annotations xml/ --slides tif/ --out masks/
//! patchwork extract --mode positive-from-tumor --slides tif/ --masks masks/ --out tiles/
//! patchwork segment --slide tif/tumor_001.tif --overlay tumor_001.png
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use patchwork_io::{
    ANNOTATION_EXTENSIONS, DatasetDriver, DirectorySink, LabelMap, RASTER_EXTENSIONS, convert_all,
    discover, mask_jobs, open_slide, pair,
};
use patchwork_pipeline::{
    CancelToken, ExtractionConfig, ExtractionMode, PatchExtractor, PyramidOptions, Slide,
    segment, segment::draw_boxes, segmentation_level,
};

/// Tumor tile dataset builder for whole-slide images.
#[derive(Parser)]
#[command(name = "patchwork", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract training tiles from every slide in a directory.
    Extract(ExtractArgs),
    /// Rasterize XML annotations into label masks.
    Masks(MasksArgs),
    /// Segment one slide and write its bounding boxes as an overlay.
    Segment(SegmentArgs),
}

#[derive(clap::Args)]
struct ExtractArgs {
    /// Extraction mode.
    #[arg(long, value_enum)]
    mode: Mode,

    /// Directory of slide rasters.
    #[arg(long)]
    slides: PathBuf,

    /// Directory of tumor label masks, paired with slides by file stem.
    #[arg(long)]
    masks: Option<PathBuf>,

    /// Directory of classifier heatmaps, paired with slides by file stem.
    #[arg(long)]
    heatmaps: Option<PathBuf>,

    /// Output root; tiles go to `positive/` and `negative/` below it.
    #[arg(long)]
    out: PathBuf,

    /// Extraction config as a JSON file.
    ///
    /// Flags below override the matching fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Tile side in level-0 pixels.
    #[arg(long)]
    patch_size: Option<u32>,

    /// Negative tiles kept per bounding box.
    #[arg(long)]
    max_negative_per_box: Option<usize>,

    /// Heatmap probability at or above which a pixel is tumor.
    #[arg(long)]
    threshold: Option<f32>,

    /// Seed for negative sampling (random when absent).
    #[arg(long)]
    seed: Option<u64>,

    /// Smallest pyramid level extent when building levels from a raster.
    #[arg(long, default_value_t = PyramidOptions::default().min_extent)]
    min_extent: u32,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    jobs: usize,

    /// Stop starting new work after this many seconds.
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Print the batch report as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(clap::Args)]
struct MasksArgs {
    /// Directory of ASAP XML annotation files.
    #[arg(long)]
    annotations: PathBuf,

    /// Directory of slides the masks must match in size.
    #[arg(long)]
    slides: PathBuf,

    /// Output directory for `<stem>.png` masks.
    #[arg(long)]
    out: PathBuf,

    /// Annotation group naming scheme.
    #[arg(long, value_enum, default_value_t = Scheme::Camelyon16)]
    scheme: Scheme,

    /// Worker threads (0 = one per core).
    #[arg(long, default_value_t = 0)]
    jobs: usize,
}

#[derive(clap::Args)]
struct SegmentArgs {
    /// Slide raster.
    #[arg(long)]
    slide: PathBuf,

    /// PNG file for the box overlay.
    #[arg(long)]
    overlay: PathBuf,

    /// Finest level segmentation may use.
    #[arg(long, default_value_t = ExtractionConfig::DEFAULT_MAX_SEGMENTATION_LEVEL)]
    level: u32,

    /// Smallest pyramid level extent when building levels from a raster.
    #[arg(long, default_value_t = PyramidOptions::default().min_extent)]
    min_extent: u32,
}

/// Extraction mode selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Grid tiles over annotated tumor, with mask tiles.
    PositiveFromTumor,
    /// Sampled tissue tiles from a normal slide.
    NegativeFromNormal,
    /// Sampled tumor-free tissue tiles from a tumor slide.
    NegativeFromTumor,
    /// Classifier false positives on a tumor slide.
    HardNegativeFromTumor,
    /// Classifier positives on a normal slide.
    HardNegativeFromNormal,
    /// Classifier false negatives on a tumor slide.
    HardPositiveFromTumor,
}

impl From<Mode> for ExtractionMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::PositiveFromTumor => Self::PositiveFromTumor,
            Mode::NegativeFromNormal => Self::NegativeFromNormal,
            Mode::NegativeFromTumor => Self::NegativeFromTumor,
            Mode::HardNegativeFromTumor => Self::HardNegativeFromTumor,
            Mode::HardNegativeFromNormal => Self::HardNegativeFromNormal,
            Mode::HardPositiveFromTumor => Self::HardPositiveFromTumor,
        }
    }
}

/// Annotation group scheme selection.
#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    /// `_0`, `_1` tumor; `_2` excluded.
    Camelyon16,
    /// `metastases` tumor; `normal` labeled 2.
    Camelyon17,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Extract(args) => run_extract(&args),
        Command::Masks(args) => run_masks(&args),
        Command::Segment(args) => run_segment(&args),
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Build an [`ExtractionConfig`] from `--config` and the override flags.
fn config_from_args(args: &ExtractArgs) -> Result<ExtractionConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ExtractionConfig::default(),
    };
    if let Some(size) = args.patch_size {
        config.patch_width = size;
        config.patch_height = size;
    }
    if let Some(quota) = args.max_negative_per_box {
        config.max_negative_patches_per_box = quota;
    }
    if let Some(threshold) = args.threshold {
        config.tumor_prob_threshold = threshold;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    Ok(config)
}

fn discover_dir(dir: &Path, extensions: &[&str]) -> Result<BTreeMap<String, PathBuf>> {
    discover(dir, extensions).with_context(|| format!("listing {}", dir.display()))
}

fn run_extract(args: &ExtractArgs) -> Result<ExitCode> {
    let mode = ExtractionMode::from(args.mode);
    let config = config_from_args(args)?;
    let cancel = args
        .deadline_secs
        .map_or_else(CancelToken::new, |secs| {
            CancelToken::with_timeout(Duration::from_secs(secs))
        });
    let extractor = PatchExtractor::new(config)?.with_cancel(cancel);

    if mode.requires_mask() && args.masks.is_none() {
        bail!("mode {mode} needs --masks");
    }
    if mode.requires_heatmap() && args.heatmaps.is_none() {
        bail!("mode {mode} needs --heatmaps");
    }
    let slides = discover_dir(&args.slides, RASTER_EXTENSIONS)?;
    let masks = args
        .masks
        .as_deref()
        .map(|dir| discover_dir(dir, RASTER_EXTENSIONS))
        .transpose()?;
    let heatmaps = args
        .heatmaps
        .as_deref()
        .map(|dir| discover_dir(dir, RASTER_EXTENSIONS))
        .transpose()?;
    let jobs = pair(&slides, masks.as_ref(), heatmaps.as_ref());
    if jobs.is_empty() {
        bail!("no slides in {} with matching inputs", args.slides.display());
    }
    tracing::info!(found = slides.len(), paired = jobs.len(), "discovered slides");

    let sink = DirectorySink::create(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;
    let driver = DatasetDriver::new(extractor, mode, sink).with_pyramid(PyramidOptions {
        min_extent: args.min_extent,
        ..PyramidOptions::default()
    });
    let batch = driver.run(&jobs, args.jobs)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    } else {
        println!("{}", batch.report());
    }
    Ok(if batch.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_masks(args: &MasksArgs) -> Result<ExitCode> {
    let labels = match args.scheme {
        Scheme::Camelyon16 => LabelMap::camelyon16(),
        Scheme::Camelyon17 => LabelMap::camelyon17(),
    };
    let annotations = discover_dir(&args.annotations, ANNOTATION_EXTENSIONS)?;
    let slides = discover_dir(&args.slides, RASTER_EXTENSIONS)?;
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("creating {}", args.out.display()))?;

    let jobs = mask_jobs(&annotations, &slides, &args.out);
    let results = convert_all(&jobs, &labels, args.jobs)?;
    let mut failed = 0_usize;
    for (job, result) in jobs.iter().zip(results) {
        if let Err(err) = result {
            tracing::error!(slide = %job.stem, %err, "mask conversion failed");
            failed += 1;
        }
    }
    println!(
        "Masks written: {} of {} ({} annotation files without a slide)",
        jobs.len() - failed,
        jobs.len(),
        annotations.len() - jobs.len(),
    );
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn run_segment(args: &SegmentArgs) -> Result<ExitCode> {
    let options = PyramidOptions {
        min_extent: args.min_extent,
        ..PyramidOptions::default()
    };
    let slide = open_slide(&args.slide, options)?;
    let level = segmentation_level(&slide, args.level);
    let thumbnail = slide.read_level(level)?;
    let segmentation = segment(&thumbnail, &ExtractionConfig::default().contour_profile);
    let overlay = draw_boxes(&thumbnail, &segmentation.boxes);
    overlay
        .save(&args.overlay)
        .with_context(|| format!("writing {}", args.overlay.display()))?;

    println!(
        "{}: level {level} ({}), {} tissue boxes",
        slide.name(),
        thumbnail.dimensions(),
        segmentation.boxes.len(),
    );
    for bbox in &segmentation.boxes {
        println!(
            "  x={} y={} w={} h={}",
            bbox.x, bbox.y, bbox.width, bbox.height
        );
    }
    Ok(ExitCode::SUCCESS)
}
