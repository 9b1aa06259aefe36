//! Opening slide, mask, and heatmap files.
//!
//! Any raster the `image` crate decodes (TIFF, PNG, JPEG, BMP) is
//! loaded whole and turned into an in-memory pyramid. Decoder errors of
//! every kind surface as [`SlideError::UnsupportedFormat`] so a batch
//! can skip the slide and continue.

use std::path::Path;

use image::{ImageReader, RgbaImage};
use patchwork_pipeline::{Heatmap, PyramidOptions, PyramidSlide, SlideError};

use crate::pairing::file_stem;

fn unsupported(path: &Path, reason: impl ToString) -> SlideError {
    SlideError::UnsupportedFormat {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn decode(path: &Path) -> Result<image::DynamicImage, SlideError> {
    let mut reader = ImageReader::open(path)
        .map_err(|e| unsupported(path, e))?
        .with_guessed_format()
        .map_err(|e| unsupported(path, e))?;
    // Slides are far beyond the default allocation limit.
    reader.no_limits();
    reader.decode().map_err(|e| unsupported(path, e))
}

/// Decode a raster file to RGBA.
///
/// # Errors
///
/// Returns [`SlideError::UnsupportedFormat`] if the file cannot be read
/// or decoded.
pub fn decode_rgba(path: &Path) -> Result<RgbaImage, SlideError> {
    Ok(decode(path)?.to_rgba8())
}

/// Open a slide as a pyramid named after its file stem.
///
/// # Errors
///
/// Returns [`SlideError::UnsupportedFormat`] if the file cannot be read
/// or decoded.
pub fn open_slide(path: &Path, options: PyramidOptions) -> Result<PyramidSlide, SlideError> {
    let base = decode_rgba(path)?;
    let name = file_stem(path).unwrap_or_else(|| path.display().to_string());
    tracing::debug!(?path, width = base.width(), height = base.height(), "decoded slide");
    Ok(PyramidSlide::from_image(name, base, options))
}

/// Open a tumor label mask. Levels are built with nearest-neighbor
/// resampling so label values survive.
///
/// # Errors
///
/// Returns [`SlideError::UnsupportedFormat`] if the file cannot be read
/// or decoded.
pub fn open_mask(path: &Path, options: PyramidOptions) -> Result<PyramidSlide, SlideError> {
    open_slide(
        path,
        PyramidOptions {
            filter: patchwork_pipeline::PyramidFilter::Nearest,
            ..options
        },
    )
}

/// Load a probability heatmap. 8- and 16-bit grayscale images are
/// scaled to `[0, 1]`; color images are converted to luminance first.
///
/// # Errors
///
/// Returns [`SlideError::UnsupportedFormat`] if the file cannot be read
/// or decoded.
pub fn load_heatmap(path: &Path) -> Result<Heatmap, SlideError> {
    Ok(decode(path)?.to_luma32f())
}
