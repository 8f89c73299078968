//! Tile-relative world positions.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::tile::{HALF_TILE, TILE_SIZE, TileCoord};

/// A position on the route: a tile plus a local offset from the tile center.
///
/// In canonical form the local `x` and `z` lie in `[-1024, 1024)`. `y` is the
/// absolute elevation in meters and never wraps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldPosition {
    pub tile: TileCoord,
    pub location: Vec3,
}

impl WorldPosition {
    /// Creates a position and normalizes it into canonical form.
    pub fn new(tile: TileCoord, location: Vec3) -> Self {
        let mut pos = Self { tile, location };
        pos.normalize();
        pos
    }

    /// Moves any local offset at or beyond ±1024 m into tile increments.
    pub fn normalize(&mut self) {
        let dx = ((self.location.x + HALF_TILE) / TILE_SIZE).floor() as i32;
        let dz = ((self.location.z + HALF_TILE) / TILE_SIZE).floor() as i32;
        if dx != 0 {
            self.tile.x += dx;
            self.location.x -= dx as f32 * TILE_SIZE;
        }
        if dz != 0 {
            self.tile.z += dz;
            self.location.z -= dz as f32 * TILE_SIZE;
        }
    }

    /// Returns a normalized copy.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// This position expressed as an offset from the center of `origin`.
    ///
    /// This is how positions become camera-relative: tile deltas are turned
    /// into meters and added to the local offset.
    pub fn relative_to(&self, origin: TileCoord) -> Vec3 {
        Vec3::new(
            self.location.x + (self.tile.x - origin.x) as f32 * TILE_SIZE,
            self.location.y,
            self.location.z + (self.tile.z - origin.z) as f32 * TILE_SIZE,
        )
    }

    /// Vector from `other` to `self` in meters.
    pub fn delta_from(&self, other: &WorldPosition) -> Vec3 {
        self.relative_to(other.tile) - other.location
    }

    /// Squared distance between two positions in meters.
    pub fn distance_squared(&self, other: &WorldPosition) -> f32 {
        self.delta_from(other).length_squared()
    }

    /// Returns the position moved by a vector in meters, normalized.
    #[must_use]
    pub fn translated(&self, delta: Vec3) -> Self {
        Self::new(self.tile, self.location + delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_moves_offsets_into_tiles() {
        let pos = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(1024.0, 5.0, -1025.0));
        assert_eq!(pos.tile, TileCoord::new(1, -1));
        assert!((pos.location.x + 1024.0).abs() < 1e-3);
        assert!((pos.location.z - 1023.0).abs() < 1e-3);
        assert_eq!(pos.location.y, 5.0);
    }

    #[test]
    fn test_normalize_keeps_canonical_unchanged() {
        let pos = WorldPosition::new(TileCoord::new(7, -3), Vec3::new(-1024.0, 0.0, 1023.5));
        assert_eq!(pos.tile, TileCoord::new(7, -3));
        assert_eq!(pos.location, Vec3::new(-1024.0, 0.0, 1023.5));
    }

    #[test]
    fn test_normalize_multiple_tiles() {
        let pos = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(5000.0, 0.0, -5000.0));
        assert_eq!(pos.tile, TileCoord::new(2, -2));
        assert!((pos.location.x - 904.0).abs() < 1e-3);
        assert!((pos.location.z + 904.0).abs() < 1e-3);
    }

    #[test]
    fn test_relative_to_subtracts_tile_deltas() {
        let pos = WorldPosition::new(TileCoord::new(3, 4), Vec3::new(10.0, 1.0, -20.0));
        let rel = pos.relative_to(TileCoord::new(2, 5));
        assert_eq!(rel, Vec3::new(2058.0, 1.0, -2068.0));
    }

    #[test]
    fn test_distance_across_tile_boundary() {
        let a = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(1023.0, 0.0, 0.0));
        let b = WorldPosition::new(TileCoord::new(1, 0), Vec3::new(-1023.0, 0.0, 0.0));
        assert!((a.distance_squared(&b) - 4.0).abs() < 1e-3);
    }
}
