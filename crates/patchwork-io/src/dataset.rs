//! Batch extraction over paired slide files.
//!
//! Each slide is decoded, extracted, and released on its own worker.
//! Workers share nothing mutable: every slide gets a fresh patch index
//! and its own sink handle, and its random sampling depends only on the
//! configured seed and the slide stem. A slide that fails is recorded
//! in the batch report and the rest of the batch carries on.

use std::time::Instant;

use patchwork_pipeline::{
    BatchReport, ExtractError, ExtractionMode, ExtractionReport, PatchExtractor, PatchIndex,
    PyramidOptions, SlideFailure, SlideInputs,
};
use rayon::prelude::*;

use crate::pairing::SlideJob;
use crate::sink::DirectorySink;
use crate::slide_file::{load_heatmap, open_mask, open_slide};

/// Errors that stop a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// The worker pool could not be started.
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Runs one extraction mode over many slides.
#[derive(Debug, Clone)]
pub struct DatasetDriver {
    extractor: PatchExtractor,
    mode: ExtractionMode,
    sink: DirectorySink,
    pyramid: PyramidOptions,
}

impl DatasetDriver {
    /// Driver writing `mode` tiles through `sink`.
    #[must_use]
    pub fn new(extractor: PatchExtractor, mode: ExtractionMode, sink: DirectorySink) -> Self {
        Self {
            extractor,
            mode,
            sink,
            pyramid: PyramidOptions::default(),
        }
    }

    /// How decoded slides are turned into pyramids.
    #[must_use]
    pub const fn with_pyramid(mut self, pyramid: PyramidOptions) -> Self {
        self.pyramid = pyramid;
        self
    }

    /// Extract one slide, starting its patch index at zero. Masks and
    /// heatmaps are decoded only if the mode reads them.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] if a file cannot be decoded or the
    /// extraction itself fails.
    pub fn extract_one(&self, job: &SlideJob) -> Result<ExtractionReport, ExtractError> {
        let slide = open_slide(&job.slide, self.pyramid)?;
        let mask = job
            .mask
            .as_deref()
            .filter(|_| self.mode.requires_mask())
            .map(|path| open_mask(path, self.pyramid))
            .transpose()?;
        let heatmap = job
            .heatmap
            .as_deref()
            .filter(|_| self.mode.requires_heatmap())
            .map(load_heatmap)
            .transpose()?;

        let mut inputs = SlideInputs::new(&slide);
        if let Some(mask) = &mask {
            inputs = inputs.with_mask(mask);
        }
        if let Some(heatmap) = &heatmap {
            inputs = inputs.with_heatmap(heatmap);
        }
        let mut sink = self.sink.clone();
        self.extractor
            .extract(self.mode, inputs, &mut sink, PatchIndex::default())
    }

    /// Extract every job on a pool of `threads` workers (0 = one per
    /// core). Reports come back in job order.
    ///
    /// # Errors
    ///
    /// Returns [`DatasetError::Pool`] if the pool cannot be built.
    pub fn run(&self, jobs: &[SlideJob], threads: usize) -> Result<BatchReport, DatasetError> {
        let started = Instant::now();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        tracing::info!(
            slides = jobs.len(),
            mode = %self.mode,
            threads = pool.current_num_threads(),
            "starting batch"
        );
        let results: Vec<_> = pool.install(|| {
            jobs.par_iter()
                .map(|job| (job, self.extract_one(job)))
                .collect()
        });

        let mut batch = BatchReport::default();
        for (job, result) in results {
            match result {
                Ok(report) => batch.slides.push(report),
                Err(err) => {
                    tracing::error!(slide = %job.stem, %err, "slide failed");
                    batch.failures.push(SlideFailure {
                        slide: job.stem.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        batch.duration = started.elapsed();
        Ok(batch)
    }
}
