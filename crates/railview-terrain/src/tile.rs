//! Terrain tiles: elevation samples, hidden-vertex flags and patch flags.
//!
//! A tile of `size` route tiles per side starts at the minimum corner of route
//! tile `coord` and holds `sample_count²` elevation samples. Sample `x` grows
//! with route `x` and sample `z` with route `z`. Each cell between four samples
//! is split into two triangles along the diagonal picked by [`Diagonal::for_cell`].

use glam::Vec2;
use railview_coords::{HALF_TILE, TILE_SIZE, TileCoord, WorldPosition};
use serde::{Deserialize, Serialize};

use crate::error::TerrainError;

/// Cells per patch side. A patch has `PATCH_CELLS + 1` vertices per side.
pub const PATCH_CELLS: usize = 16;

/// Physical tile sizes tried by a tile manager, finest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileSizes {
    /// Dense terrain: 1×1 or 2×2 route tiles.
    HiRes,
    /// Distant mountains: 8×8 or 16×16 route tiles.
    LoRes,
}

impl TileSizes {
    pub const fn sizes(self) -> &'static [i32] {
        match self {
            TileSizes::HiRes => &[1, 2],
            TileSizes::LoRes => &[8, 16],
        }
    }
}

/// Tile contents as stored in the route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileData {
    pub sample_count: usize,
    /// Elevation of a zero sample, meters.
    pub floor: f32,
    /// Meters per sample unit.
    pub scale: f32,
    /// Row-major samples, `z * sample_count + x`.
    pub elevations: Vec<u16>,
    /// Indices of samples that are cut out of the mesh (tunnel mouths).
    #[serde(default)]
    pub hidden: Vec<u32>,
    /// Indices of patches with nothing to draw, `pz * patches + px`.
    #[serde(default)]
    pub disabled_patches: Vec<u32>,
    #[serde(default)]
    pub water_level: Option<f32>,
}

impl TileData {
    /// A level tile at `height` meters.
    pub fn flat(sample_count: usize, height: f32) -> Self {
        Self::from_fn(sample_count, height, 1.0, |_, _| 0)
    }

    /// A tile whose raw samples come from `sample(x, z)`.
    pub fn from_fn(
        sample_count: usize,
        floor: f32,
        scale: f32,
        mut sample: impl FnMut(usize, usize) -> u16,
    ) -> Self {
        let mut elevations = Vec::with_capacity(sample_count * sample_count);
        for z in 0..sample_count {
            for x in 0..sample_count {
                elevations.push(sample(x, z));
            }
        }
        Self {
            sample_count,
            floor,
            scale,
            elevations,
            hidden: Vec::new(),
            disabled_patches: Vec::new(),
            water_level: None,
        }
    }
}

/// Which diagonal splits a terrain cell into two triangles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Diagonal {
    /// From `(x, z)` to `(x + 1, z + 1)`.
    NwSe,
    /// From `(x + 1, z)` to `(x, z + 1)`.
    NeSw,
}

impl Diagonal {
    /// Split for the cell whose minimum corner is sample `(x, z)`.
    ///
    /// Mesh generation and elevation queries both go through here so a point
    /// always lands on the triangle that is actually drawn.
    pub fn for_cell(x: i64, z: i64) -> Self {
        if (x & 1) == (z & 1) {
            Diagonal::NwSe
        } else {
            Diagonal::NeSw
        }
    }

    /// Triangles as indices into `[nw, ne, sw, se]`, clockwise seen from above.
    pub const fn triangles(self) -> [[usize; 3]; 2] {
        match self {
            Diagonal::NwSe => [[0, 1, 3], [0, 3, 2]],
            Diagonal::NeSw => [[0, 1, 2], [1, 3, 2]],
        }
    }

    /// Elevation at fractions `(ux, uz)` of the cell with corner elevations
    /// `[nw, ne, sw, se]`.
    pub fn interpolate(self, corners: [f32; 4], ux: f32, uz: f32) -> f32 {
        let [nw, ne, sw, se] = corners;
        match self {
            Diagonal::NwSe if ux > uz => nw + (ne - nw) * ux + (se - ne) * uz,
            Diagonal::NwSe => nw + (se - sw) * ux + (sw - nw) * uz,
            Diagonal::NeSw if ux + uz < 1.0 => nw + (ne - nw) * ux + (sw - nw) * uz,
            Diagonal::NeSw => se + (sw - se) * (1.0 - ux) + (ne - se) * (1.0 - uz),
        }
    }
}

/// A loaded terrain tile.
#[derive(Clone, Debug)]
pub struct Tile {
    coord: TileCoord,
    size: i32,
    sample_count: usize,
    floor: f32,
    scale: f32,
    elevations: Vec<u16>,
    hidden: Vec<bool>,
    patch_enabled: Vec<bool>,
    water_level: Option<f32>,
}

impl Tile {
    /// Validates `data` and builds the tile at snapped coordinate `coord`.
    pub fn from_data(coord: TileCoord, size: i32, data: TileData) -> Result<Self, TerrainError> {
        let n = data.sample_count;
        if n == 0 || n % PATCH_CELLS != 0 {
            return Err(TerrainError::PatchAlignment {
                coord,
                sample_count: n,
                cells: PATCH_CELLS,
            });
        }
        if data.elevations.len() != n * n {
            return Err(TerrainError::SampleCount {
                coord,
                expected: n * n,
                actual: data.elevations.len(),
            });
        }

        let mut hidden = vec![false; n * n];
        for index in data.hidden {
            if let Some(flag) = hidden.get_mut(index as usize) {
                *flag = true;
            }
        }
        let patches = n / PATCH_CELLS;
        let mut patch_enabled = vec![true; patches * patches];
        for index in data.disabled_patches {
            if let Some(flag) = patch_enabled.get_mut(index as usize) {
                *flag = false;
            }
        }

        Ok(Self {
            coord,
            size,
            sample_count: n,
            floor: data.floor,
            scale: data.scale,
            elevations: data.elevations,
            hidden,
            patch_enabled,
            water_level: data.water_level,
        })
    }

    pub fn coord(&self) -> TileCoord {
        self.coord
    }

    /// Route tiles per side.
    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Distance between neighbouring samples, meters.
    pub fn sample_size(&self) -> f32 {
        self.size as f32 * TILE_SIZE / self.sample_count as f32
    }

    pub fn patches_per_side(&self) -> usize {
        self.sample_count / PATCH_CELLS
    }

    pub fn water_level(&self) -> Option<f32> {
        self.water_level
    }

    /// Whether route tile `tile` lies inside this tile's extent.
    pub fn contains(&self, tile: TileCoord) -> bool {
        (self.coord.x..self.coord.x + self.size).contains(&tile.x)
            && (self.coord.z..self.coord.z + self.size).contains(&tile.z)
    }

    /// Elevation of sample `(x, z)`, clamped onto the grid.
    pub fn elevation(&self, x: i64, z: i64) -> f32 {
        let (x, z) = self.clamp(x, z);
        self.floor + self.scale * f32::from(self.elevations[z * self.sample_count + x])
    }

    pub fn is_in_grid(&self, x: i64, z: i64) -> bool {
        let n = self.sample_count as i64;
        (0..n).contains(&x) && (0..n).contains(&z)
    }

    pub fn is_vertex_hidden(&self, x: i64, z: i64) -> bool {
        self.is_in_grid(x, z) && self.hidden[z as usize * self.sample_count + x as usize]
    }

    pub fn is_patch_enabled(&self, px: usize, pz: usize) -> bool {
        let patches = self.patches_per_side();
        px < patches && pz < patches && self.patch_enabled[pz * patches + px]
    }

    /// Whether any vertex of patch `(px, pz)` is hidden.
    pub fn patch_has_holes(&self, px: usize, pz: usize) -> bool {
        let (x0, z0) = ((px * PATCH_CELLS) as i64, (pz * PATCH_CELLS) as i64);
        (0..=PATCH_CELLS as i64).any(|dz| {
            (0..=PATCH_CELLS as i64).any(|dx| self.is_vertex_hidden(x0 + dx, z0 + dz))
        })
    }

    /// Route position of sample `(x, z)` at zero elevation. Works off the grid too.
    pub fn sample_position(&self, x: i64, z: i64) -> WorldPosition {
        let size = self.sample_size();
        WorldPosition::new(
            self.coord,
            glam::Vec3::new(
                x as f32 * size - HALF_TILE,
                0.0,
                z as f32 * size - HALF_TILE,
            ),
        )
    }

    /// Continuous sample coordinates of `position`.
    pub fn sample_coords(&self, position: &WorldPosition) -> Vec2 {
        let local = position.relative_to(self.coord);
        Vec2::new(local.x + HALF_TILE, local.z + HALF_TILE) / self.sample_size()
    }

    fn clamp(&self, x: i64, z: i64) -> (usize, usize) {
        let max = self.sample_count as i64 - 1;
        (x.clamp(0, max) as usize, z.clamp(0, max) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_from_data_validates_sample_count() {
        let mut data = TileData::flat(16, 0.0);
        data.elevations.pop();
        assert!(matches!(
            Tile::from_data(TileCoord::new(0, 0), 1, data),
            Err(TerrainError::SampleCount { expected: 256, actual: 255, .. })
        ));
        assert!(matches!(
            Tile::from_data(TileCoord::new(0, 0), 1, TileData::flat(10, 0.0)),
            Err(TerrainError::PatchAlignment { .. })
        ));
    }

    #[test]
    fn test_contains_covers_size() {
        let tile = Tile::from_data(TileCoord::new(-2, 4), 2, TileData::flat(16, 0.0)).unwrap();
        assert!(tile.contains(TileCoord::new(-2, 4)));
        assert!(tile.contains(TileCoord::new(-1, 5)));
        assert!(!tile.contains(TileCoord::new(0, 4)));
        assert!(!tile.contains(TileCoord::new(-2, 3)));
    }

    #[test]
    fn test_sample_coords_inverse_of_sample_position() {
        let tile = Tile::from_data(TileCoord::new(3, -1), 1, TileData::flat(32, 0.0)).unwrap();
        assert_eq!(tile.sample_size(), 64.0);
        let position = tile.sample_position(5, 31);
        let coords = tile.sample_coords(&position);
        assert!((coords - Vec2::new(5.0, 31.0)).length() < 1e-4);
        // One sample past the edge lands on the next route tile.
        let beyond = tile.sample_position(32, 0);
        assert_eq!(beyond.tile, TileCoord::new(4, -1));
        assert!((beyond.location - Vec3::new(-HALF_TILE, 0.0, -HALF_TILE)).length() < 1e-3);
    }

    #[test]
    fn test_diagonal_parity() {
        assert_eq!(Diagonal::for_cell(0, 0), Diagonal::NwSe);
        assert_eq!(Diagonal::for_cell(1, 1), Diagonal::NwSe);
        assert_eq!(Diagonal::for_cell(1, 0), Diagonal::NeSw);
        assert_eq!(Diagonal::for_cell(2, 7), Diagonal::NeSw);
    }

    #[test]
    fn test_interpolate_hits_corners() {
        let corners = [1.0, 2.0, 3.0, 4.0];
        for diagonal in [Diagonal::NwSe, Diagonal::NeSw] {
            assert!((diagonal.interpolate(corners, 0.0, 0.0) - 1.0).abs() < 1e-6);
            assert!((diagonal.interpolate(corners, 1.0, 0.0) - 2.0).abs() < 1e-6);
            assert!((diagonal.interpolate(corners, 0.0, 1.0) - 3.0).abs() < 1e-6);
            assert!((diagonal.interpolate(corners, 1.0, 1.0) - 4.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hidden_vertices_mark_patch() {
        let mut data = TileData::flat(32, 0.0);
        // Sample (20, 3) belongs to patch (1, 0).
        data.hidden.push(3 * 32 + 20);
        data.disabled_patches.push(3);
        let tile = Tile::from_data(TileCoord::new(0, 0), 1, data).unwrap();
        assert!(tile.is_vertex_hidden(20, 3));
        assert!(tile.patch_has_holes(1, 0));
        assert!(!tile.patch_has_holes(0, 1));
        assert!(!tile.is_patch_enabled(1, 1));
        assert!(tile.is_patch_enabled(0, 1));
    }
}
