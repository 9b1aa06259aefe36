//! Coordinate scaling between pyramid levels.
//!
//! Every conversion between level-0 pixels and a down-sampled pyramid
//! level goes through [`Scale`]. Forward and inverse conversions both
//! truncate, so a level-k coordinate survives a round trip through
//! level 0 unchanged and the tumor mask stays aligned with the tile
//! read from the slide.

use serde::{Deserialize, Serialize};

use crate::types::{BoundingBox, Dimensions, TileCoord};

/// Magnification between one pyramid level and level 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scale {
    level: u32,
}

impl Scale {
    /// Highest level whose factor still fits in a `u32`.
    pub const MAX_LEVEL: u32 = 31;

    /// Scale for pyramid `level`, clamped to [`Self::MAX_LEVEL`].
    #[must_use]
    pub const fn new(level: u32) -> Self {
        let level = if level > Self::MAX_LEVEL {
            Self::MAX_LEVEL
        } else {
            level
        };
        Self { level }
    }

    /// The identity scale (level 0).
    pub const NATIVE: Self = Self::new(0);

    /// Pyramid level this scale converts from.
    #[must_use]
    pub const fn level(self) -> u32 {
        self.level
    }

    /// Magnification factor `2^level`.
    #[must_use]
    pub const fn factor(self) -> u32 {
        1 << self.level
    }

    /// Level-k coordinate to level 0: `c * 2^level`, saturating.
    #[must_use]
    pub const fn to_level0(self, c: u32) -> u32 {
        c.saturating_mul(self.factor())
    }

    /// Level-0 coordinate to level k: `floor(c / 2^level)`.
    #[must_use]
    pub const fn from_level0(self, c: u32) -> u32 {
        c >> self.level
    }

    /// Level-0 point to level k.
    #[must_use]
    pub const fn point_from_level0(self, p: TileCoord) -> TileCoord {
        TileCoord::new(self.from_level0(p.x), self.from_level0(p.y))
    }

    /// Level-k point to level 0.
    #[must_use]
    pub const fn point_to_level0(self, p: TileCoord) -> TileCoord {
        TileCoord::new(self.to_level0(p.x), self.to_level0(p.y))
    }

    /// Level-k position of the center of a level-0 tile.
    ///
    /// The half size is truncated before the sum, then the sum is
    /// truncated by the level factor.
    #[must_use]
    pub const fn tile_center(self, origin: TileCoord, tile: Dimensions) -> TileCoord {
        TileCoord::new(
            self.from_level0(origin.x.saturating_add(tile.width / 2)),
            self.from_level0(origin.y.saturating_add(tile.height / 2)),
        )
    }

    /// Level-k extent of a level-0 tile. May be zero on either axis
    /// when the tile is smaller than the factor.
    #[must_use]
    pub const fn window(self, tile: Dimensions) -> Dimensions {
        Dimensions::new(self.from_level0(tile.width), self.from_level0(tile.height))
    }

    /// Level-0 start corner of a level-k box.
    #[must_use]
    pub const fn box_start(self, b: BoundingBox) -> TileCoord {
        TileCoord::new(self.to_level0(b.x), self.to_level0(b.y))
    }

    /// Level-0 exclusive end corner of a level-k box.
    #[must_use]
    pub const fn box_end(self, b: BoundingBox) -> TileCoord {
        TileCoord::new(self.to_level0(b.x_end()), self.to_level0(b.y_end()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factor_is_power_of_two() {
        assert_eq!(Scale::new(0).factor(), 1);
        assert_eq!(Scale::new(5).factor(), 32);
        assert_eq!(Scale::new(7).factor(), 128);
    }

    #[test]
    fn level_is_clamped() {
        assert_eq!(Scale::new(40).level(), Scale::MAX_LEVEL);
    }

    #[test]
    fn from_level0_truncates() {
        let s = Scale::new(5);
        assert_eq!(s.from_level0(31), 0);
        assert_eq!(s.from_level0(32), 1);
        assert_eq!(s.from_level0(63), 1);
        assert_eq!(s.from_level0(64), 2);
    }

    #[test]
    fn round_trip_is_identity() {
        for level in 0..=12 {
            let s = Scale::new(level);
            for c in [0_u32, 1, 2, 3, 7, 100, 255, 1000, 4097, 65_535] {
                assert_eq!(s.from_level0(s.to_level0(c)), c, "level {level}, c {c}");
            }
        }
    }

    #[test]
    fn to_level0_saturates() {
        assert_eq!(Scale::new(4).to_level0(u32::MAX / 2), u32::MAX);
    }

    #[test]
    fn tile_center_uses_half_tile() {
        let s = Scale::new(5);
        let center = s.tile_center(TileCoord::new(3200, 1600), Dimensions::new(256, 256));
        // (3200 + 128) / 32 = 104, (1600 + 128) / 32 = 54
        assert_eq!(center, TileCoord::new(104, 54));
    }

    #[test]
    fn window_shrinks_with_level() {
        assert_eq!(
            Scale::new(5).window(Dimensions::new(256, 256)),
            Dimensions::new(8, 8)
        );
        assert_eq!(
            Scale::new(9).window(Dimensions::new(256, 256)),
            Dimensions::new(0, 0)
        );
    }

    #[test]
    fn box_corners_scale_to_level0() {
        let s = Scale::new(2);
        let b = BoundingBox::new(10, 20, 5, 6);
        assert_eq!(s.box_start(b), TileCoord::new(40, 80));
        assert_eq!(s.box_end(b), TileCoord::new(60, 104));
    }
}
