//! Destinations for written tiles.
//!
//! The pipeline never touches the filesystem. It hands each accepted
//! tile to a [`TileSink`] together with its label and file name; the
//! I/O crate provides a directory-backed sink, and [`MemorySink`]
//! records tiles for tests and dry runs.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::types::{SinkError, TileLabel};

/// Encoding a tile is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileFormat {
    /// Lossy JPEG (grid-sampled tiles).
    Jpeg,
    /// Lossless PNG (pixel-scan tiles).
    Png,
}

impl TileFormat {
    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Receiver of accepted tiles.
pub trait TileSink {
    /// Persist one tile.
    ///
    /// `name` is the file name without extension; the sink appends
    /// [`TileFormat::extension`].
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the tile could not be stored. The
    /// caller logs the failure and moves on to the next tile.
    fn write_tile(
        &mut self,
        label: TileLabel,
        name: &str,
        format: TileFormat,
        tile: &RgbImage,
    ) -> Result<(), SinkError>;
}

/// Record of one tile handed to a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenTile {
    /// Label directory the tile went to.
    pub label: TileLabel,
    /// File name including extension.
    pub file_name: String,
    /// Tile pixels.
    pub image: RgbImage,
}

/// Sink that keeps every tile in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    /// Tiles in write order.
    pub tiles: Vec<WrittenTile>,
}

impl MemorySink {
    /// Empty sink.
    #[must_use]
    pub const fn new() -> Self {
        Self { tiles: Vec::new() }
    }

    /// File names written under `label`, in write order.
    #[must_use]
    pub fn names(&self, label: TileLabel) -> Vec<&str> {
        self.tiles
            .iter()
            .filter(|t| t.label == label)
            .map(|t| t.file_name.as_str())
            .collect()
    }
}

impl TileSink for MemorySink {
    fn write_tile(
        &mut self,
        label: TileLabel,
        name: &str,
        format: TileFormat,
        tile: &RgbImage,
    ) -> Result<(), SinkError> {
        self.tiles.push(WrittenTile {
            label,
            file_name: format!("{name}.{}", format.extension()),
            image: tile.clone(),
        });
        Ok(())
    }
}
