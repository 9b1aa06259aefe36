//! Tile output to a directory tree, one subdirectory per label.

use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbImage};
use patchwork_pipeline::{SinkError, TileFormat, TileLabel, TileSink};

/// Writes tiles to `<root>/positive/` and `<root>/negative/`.
///
/// Cloning is cheap; each parallel worker gets its own clone.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create the label directories under `root`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating the directories.
    pub fn create(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let sink = Self { root: root.into() };
        for label in [TileLabel::Positive, TileLabel::Negative] {
            std::fs::create_dir_all(sink.label_dir(label))?;
        }
        Ok(sink)
    }

    /// Output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory tiles of `label` go to.
    #[must_use]
    pub fn label_dir(&self, label: TileLabel) -> PathBuf {
        self.root.join(label.dir_name())
    }
}

const fn image_format(format: TileFormat) -> ImageFormat {
    match format {
        TileFormat::Jpeg => ImageFormat::Jpeg,
        TileFormat::Png => ImageFormat::Png,
    }
}

impl TileSink for DirectorySink {
    fn write_tile(
        &mut self,
        label: TileLabel,
        name: &str,
        format: TileFormat,
        tile: &RgbImage,
    ) -> Result<(), SinkError> {
        let path = self
            .label_dir(label)
            .join(format!("{name}.{}", format.extension()));
        tile.save_with_format(&path, image_format(format))?;
        Ok(())
    }
}
