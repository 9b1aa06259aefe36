//! Matching slides with their masks, heatmaps, and annotations by
//! file stem.
//!
//! A stem is the file name up to its first dot, so `tumor_001.tif`,
//! `tumor_001.mask.png`, and `tumor_001.xml` all share the stem
//! `tumor_001`. Only stems present in every requested collection are
//! processed, in sorted order.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Extensions accepted as slide, mask, or heatmap rasters.
pub const RASTER_EXTENSIONS: &[&str] = &["tif", "tiff", "png", "jpg", "jpeg", "bmp"];

/// Extensions accepted as annotation files.
pub const ANNOTATION_EXTENSIONS: &[&str] = &["xml"];

/// File name up to the first dot.
#[must_use]
pub fn file_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let stem = name.split('.').next().unwrap_or(name);
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Files in `dir` (not recursive) with one of `extensions`, keyed by
/// stem.
///
/// When two files share a stem the lexicographically first path wins
/// and the other is logged.
///
/// # Errors
///
/// Returns any I/O error from listing the directory.
pub fn discover(dir: &Path, extensions: &[&str]) -> io::Result<BTreeMap<String, PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_extension(&path, extensions) {
            paths.push(path);
        }
    }
    paths.sort();

    let mut found = BTreeMap::new();
    for path in paths {
        let Some(stem) = file_stem(&path) else {
            continue;
        };
        if let Some(kept) = found.get(&stem) {
            tracing::warn!(?path, ?kept, "duplicate stem, ignoring file");
            continue;
        }
        found.insert(stem, path);
    }
    Ok(found)
}

/// Files belonging to one slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideJob {
    /// Shared stem.
    pub stem: String,
    /// Slide raster.
    pub slide: PathBuf,
    /// Tumor label mask, if masks were requested.
    pub mask: Option<PathBuf>,
    /// Classifier heatmap, if heatmaps were requested.
    pub heatmap: Option<PathBuf>,
}

/// Intersect collections by stem.
///
/// A `None` collection is not required; a `Some` collection must hold
/// the stem for the slide to be kept.
#[must_use]
pub fn pair(
    slides: &BTreeMap<String, PathBuf>,
    masks: Option<&BTreeMap<String, PathBuf>>,
    heatmaps: Option<&BTreeMap<String, PathBuf>>,
) -> Vec<SlideJob> {
    let lookup = |set: Option<&BTreeMap<String, PathBuf>>, stem: &str| match set {
        None => Some(None),
        Some(set) => set.get(stem).map(|p| Some(p.clone())),
    };
    slides
        .iter()
        .filter_map(|(stem, slide)| {
            Some(SlideJob {
                stem: stem.clone(),
                slide: slide.clone(),
                mask: lookup(masks, stem)?,
                heatmap: lookup(heatmaps, stem)?,
            })
        })
        .collect()
}
