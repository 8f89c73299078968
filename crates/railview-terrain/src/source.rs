//! Where tile data comes from.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use railview_coords::{TILE_SIZE, TileCoord};
use rustc_hash::FxHashMap;

use crate::error::TerrainError;
use crate::tile::TileData;

/// Supplies raw tile data by snapped coordinate and size.
pub trait TileSource: Send + Sync {
    /// `Ok(None)` when the route has no tile of that size there.
    fn load(&self, coord: TileCoord, size: i32) -> Result<Option<TileData>, TerrainError>;
}

/// File name of a terrain tile, e.g. `t-000012+000003_2.ron`.
pub fn tile_file_name(coord: TileCoord, size: i32) -> String {
    format!("t{:+07}{:+07}_{size}.ron", coord.x, coord.z)
}

/// Reads RON tiles from the `terrain` directory of a route.
#[derive(Clone, Debug)]
pub struct RonTileSource {
    directory: PathBuf,
}

impl RonTileSource {
    pub fn new(route: &Path) -> Self {
        Self {
            directory: route.join("terrain"),
        }
    }

    pub fn path_for(&self, coord: TileCoord, size: i32) -> PathBuf {
        self.directory.join(tile_file_name(coord, size))
    }
}

impl TileSource for RonTileSource {
    fn load(&self, coord: TileCoord, size: i32) -> Result<Option<TileData>, TerrainError> {
        let path = self.path_for(coord, size);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(TerrainError::ReadError { path, source }),
        };
        let data = ron::from_str(&contents).map_err(|source| TerrainError::ParseError {
            path: path.clone(),
            source,
        })?;
        Ok(Some(data))
    }
}

/// In-memory tiles, for tests and generated routes.
#[derive(Debug, Default)]
pub struct MemoryTileSource {
    tiles: Mutex<FxHashMap<(TileCoord, i32), TileData>>,
    loads: AtomicUsize,
}

impl MemoryTileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, coord: TileCoord, size: i32, data: TileData) {
        self.tiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert((coord, size), data);
    }

    /// Number of `load` calls served so far, hits and misses alike.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl TileSource for MemoryTileSource {
    fn load(&self, coord: TileCoord, size: i32) -> Result<Option<TileData>, TerrainError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .tiles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&(coord, size))
            .cloned())
    }
}

/// Synthesises rolling hills everywhere. Used when no route directory is given.
#[derive(Clone, Copy, Debug)]
pub struct GeneratedTileSource {
    pub sample_count: usize,
    /// Peak-to-trough height of the hills, meters.
    pub relief: f32,
    /// Distance between hill crests, meters.
    pub wavelength: f32,
}

impl Default for GeneratedTileSource {
    fn default() -> Self {
        Self {
            sample_count: 64,
            relief: 40.0,
            wavelength: 3000.0,
        }
    }
}

impl GeneratedTileSource {
    /// Height of the generated surface at route meters `(x, z)`.
    pub fn height_at(&self, x: f32, z: f32) -> f32 {
        let k = std::f32::consts::TAU / self.wavelength.max(1.0);
        let wave = (x * k).sin() * (z * k * 0.7).cos();
        self.relief * 0.5 * (wave + 1.0)
    }
}

impl TileSource for GeneratedTileSource {
    fn load(&self, coord: TileCoord, size: i32) -> Result<Option<TileData>, TerrainError> {
        let n = self.sample_count;
        let spacing = size as f32 * TILE_SIZE / n as f32;
        let origin_x = (coord.x as f32 - 0.5) * TILE_SIZE;
        let origin_z = (coord.z as f32 - 0.5) * TILE_SIZE;
        // Centimetre resolution.
        let scale = 0.01;
        let data = TileData::from_fn(n, 0.0, scale, |x, z| {
            let height = self.height_at(origin_x + x as f32 * spacing, origin_z + z as f32 * spacing);
            (height / scale).round().clamp(0.0, f32::from(u16::MAX)) as u16
        });
        Ok(Some(data))
    }
}
