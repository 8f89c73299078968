//! Tile grid constants, tile coordinates, and square tile rings.

use serde::{Deserialize, Serialize};

/// Edge length of one route tile in meters.
pub const TILE_SIZE: f32 = 2048.0;

/// Half of [`TILE_SIZE`]. Local offsets are kept in `[-HALF_TILE, HALF_TILE)`.
pub const HALF_TILE: f32 = 1024.0;

/// Integer address of a 2048 m route tile.
///
/// `x` grows to the east, `z` grows to the north.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: i32,
    pub z: i32,
}

impl TileCoord {
    /// Creates a tile coordinate.
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Returns the coordinate offset by `(dx, dz)` tiles.
    #[must_use]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            z: self.z + dz,
        }
    }

    /// Chebyshev distance in tiles (the ring index this tile sits on).
    pub fn chebyshev(self, other: TileCoord) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    /// Squared Euclidean distance in tiles.
    pub fn distance_sq(self, other: TileCoord) -> i64 {
        let dx = i64::from(self.x - other.x);
        let dz = i64::from(self.z - other.z);
        dx * dx + dz * dz
    }

    /// Snaps this coordinate down onto a grid of `size` tiles.
    ///
    /// Floor division, so negative coordinates snap away from zero:
    /// `-1` on a grid of 8 becomes `-8`.
    #[must_use]
    pub fn snap(self, size: i32) -> Self {
        debug_assert!(size > 0);
        Self {
            x: self.x.div_euclid(size) * size,
            z: self.z.div_euclid(size) * size,
        }
    }
}

/// Number of whole tiles needed to cover `distance_m` meters: `ceil(distance / 2048)`.
pub fn tile_radius(distance_m: f32) -> i32 {
    if distance_m <= 0.0 {
        return 0;
    }
    (distance_m / TILE_SIZE).ceil() as i32
}

/// All tiles within `radius` tiles (Chebyshev) of `center`: a `(2r+1)²` square.
///
/// The result is ordered nearest-first, ties broken by coordinate, so loading
/// in iteration order fills in the tiles around the camera before the edges.
pub fn tile_ring(center: TileCoord, radius: i32) -> Vec<TileCoord> {
    let radius = radius.max(0);
    let side = (2 * radius + 1) as usize;
    let mut tiles = Vec::with_capacity(side * side);
    for dz in -radius..=radius {
        for dx in -radius..=radius {
            tiles.push(center.offset(dx, dz));
        }
    }
    tiles.sort_by_key(|t| (t.distance_sq(center), *t));
    tiles
}

/// Like [`tile_ring`], but on a coarse grid whose cells are `align` tiles wide.
///
/// The center is snapped onto the grid first and `radius` (in fine tiles) is
/// rounded up to whole coarse cells. Used for the distant-mountain tile set.
pub fn aligned_tile_ring(center: TileCoord, radius: i32, align: i32) -> Vec<TileCoord> {
    let align = align.max(1);
    let base = center.snap(align);
    let steps = (radius.max(0) + align - 1) / align;
    let mut tiles = Vec::new();
    for dz in -steps..=steps {
        for dx in -steps..=steps {
            tiles.push(base.offset(dx * align, dz * align));
        }
    }
    tiles.sort_by_key(|t| (t.distance_sq(center), *t));
    tiles
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_radius_rounds_up() {
        assert_eq!(tile_radius(0.0), 0);
        assert_eq!(tile_radius(1.0), 1);
        assert_eq!(tile_radius(2048.0), 1);
        assert_eq!(tile_radius(2049.0), 2);
        assert_eq!(tile_radius(40_000.0), 20);
    }

    #[test]
    fn test_ring_has_square_count() {
        let center = TileCoord::new(-5012, 14987);
        for r in 0..4 {
            let ring = tile_ring(center, r);
            let side = (2 * r + 1) as usize;
            assert_eq!(ring.len(), side * side);
            assert!(ring.iter().all(|t| t.chebyshev(center) <= r));
        }
    }

    #[test]
    fn test_ring_is_nearest_first() {
        let center = TileCoord::new(3, 3);
        let ring = tile_ring(center, 2);
        assert_eq!(ring[0], center);
        for pair in ring.windows(2) {
            assert!(pair[0].distance_sq(center) <= pair[1].distance_sq(center));
        }
    }

    #[test]
    fn test_snap_negative_floors() {
        assert_eq!(TileCoord::new(-1, 7).snap(8), TileCoord::new(-8, 0));
        assert_eq!(TileCoord::new(-8, 8).snap(8), TileCoord::new(-8, 8));
        assert_eq!(TileCoord::new(5, -3).snap(2), TileCoord::new(4, -4));
    }

    #[test]
    fn test_aligned_ring_on_grid() {
        let center = TileCoord::new(13, -3);
        let ring = aligned_tile_ring(center, 20, 8);
        // 20 tiles rounds up to 3 coarse steps each way.
        assert_eq!(ring.len(), 49);
        for t in &ring {
            assert_eq!(t.x.rem_euclid(8), 0, "x not aligned: {t:?}");
            assert_eq!(t.z.rem_euclid(8), 0, "z not aligned: {t:?}");
        }
        assert!(ring.contains(&TileCoord::new(8, -8)));
    }
}
