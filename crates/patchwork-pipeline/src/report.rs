//! Per-slide and per-batch extraction reports.
//!
//! Every skipped box, failed write, and cancellation is counted here so
//! a run can be audited after the fact. Reports serialize to JSON for
//! the CLI's `--json` output and format as plain text for humans.
//!
//! Durations are serialized as fractional seconds (`f64`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ExtractionMode, PatchIndex, TileLabel};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| serde::de::Error::custom("duration must be finite and non-negative"))
    }
}

/// Outcome of one extraction call on one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    /// Slide identifier (file stem).
    pub slide: String,
    /// Mode that ran.
    pub mode: ExtractionMode,
    /// Pyramid level segmentation ran on.
    pub segmentation_level: u32,
    /// Bounding boxes found.
    pub boxes_found: usize,
    /// Boxes sampled or scanned to completion.
    pub boxes_processed: usize,
    /// Boxes skipped because a point fell outside a raster.
    pub boxes_skipped: usize,
    /// Grid origins or scan pixels considered.
    pub candidates: usize,
    /// Origins accepted for writing.
    pub accepted: usize,
    /// Positive tiles written.
    pub positive_written: u64,
    /// Negative tiles written.
    pub negative_written: u64,
    /// Mask tiles written alongside positives.
    pub masks_written: u64,
    /// Tiles the sink failed to store.
    pub write_failures: u64,
    /// Whether the run stopped early on a cancel token.
    pub cancelled: bool,
    /// Patch index handed in.
    pub start_index: PatchIndex,
    /// Patch index after the run; pass it to the next call.
    pub patch_index: PatchIndex,
    /// Wall-clock duration.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ExtractionReport {
    /// Empty report for a run starting at `start_index`.
    #[must_use]
    pub fn new(
        slide: impl Into<String>,
        mode: ExtractionMode,
        segmentation_level: u32,
        start_index: PatchIndex,
    ) -> Self {
        Self {
            slide: slide.into(),
            mode,
            segmentation_level,
            boxes_found: 0,
            boxes_processed: 0,
            boxes_skipped: 0,
            candidates: 0,
            accepted: 0,
            positive_written: 0,
            negative_written: 0,
            masks_written: 0,
            write_failures: 0,
            cancelled: false,
            start_index,
            patch_index: start_index,
            duration: Duration::ZERO,
        }
    }

    /// Tissue tiles written (mask tiles excluded).
    #[must_use]
    pub const fn tiles_written(&self) -> u64 {
        self.positive_written + self.negative_written
    }

    pub(crate) const fn record_write(&mut self, label: TileLabel) {
        match label {
            TileLabel::Positive => self.positive_written += 1,
            TileLabel::Negative => self.negative_written += 1,
        }
    }

    /// One-line summary for logs and the CLI.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} [{}] level {}: {} boxes ({} skipped), {}/{} accepted, {} positive, {} negative, {} masks",
            self.slide,
            self.mode,
            self.segmentation_level,
            self.boxes_found,
            self.boxes_skipped,
            self.accepted,
            self.candidates,
            self.positive_written,
            self.negative_written,
            self.masks_written,
        );
        if self.write_failures > 0 {
            line.push_str(&format!(", {} write failures", self.write_failures));
        }
        if self.cancelled {
            line.push_str(", cancelled");
        }
        line.push_str(&format!(" in {:.3}s", self.duration.as_secs_f64()));
        line
    }
}

/// A slide that could not be processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideFailure {
    /// Slide identifier.
    pub slide: String,
    /// Rendered error.
    pub error: String,
}

/// Reports for every slide of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Slides that ran, in slide order.
    pub slides: Vec<ExtractionReport>,
    /// Slides that failed before producing a report.
    pub failures: Vec<SlideFailure>,
    /// Wall-clock duration of the batch.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl BatchReport {
    /// Tissue tiles written across all slides.
    #[must_use]
    pub fn tiles_written(&self) -> u64 {
        self.slides.iter().map(ExtractionReport::tiles_written).sum()
    }

    /// Write failures across all slides.
    #[must_use]
    pub fn write_failures(&self) -> u64 {
        self.slides.iter().map(|r| r.write_failures).sum()
    }

    /// Multi-line human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Extraction Report\n{}", "=".repeat(60)));
        for slide in &self.slides {
            lines.push(slide.summary());
        }
        for failure in &self.failures {
            lines.push(format!("{}: FAILED: {}", failure.slide, failure.error));
        }
        lines.push("-".repeat(60));
        lines.push(format!(
            "{} slides, {} failed, {} tiles written, {} write failures in {:.3}s",
            self.slides.len(),
            self.failures.len(),
            self.tiles_written(),
            self.write_failures(),
            self.duration.as_secs_f64(),
        ));
        lines.join("\n")
    }
}
