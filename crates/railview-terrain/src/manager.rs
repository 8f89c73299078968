//! Tile manager: snapping, progressive sizes, the bounded cache, and elevation queries.

use std::sync::{Arc, Mutex};

use railview_coords::{Published, TileCoord, WorldPosition};
use tracing::{debug, warn};

use crate::cache::SpatialTileCache;
use crate::error::TerrainError;
use crate::source::TileSource;
use crate::tile::{Diagonal, Tile, TileSizes};

/// Loads terrain tiles of one resolution and answers elevation queries.
///
/// Only the loader thread calls [`load`](Self::load). Every change to the cache
/// is published as a fresh tile list, so queries from other threads see a
/// complete snapshot without taking the cache lock.
pub struct TileManager {
    source: Arc<dyn TileSource>,
    sizes: TileSizes,
    cache: Mutex<SpatialTileCache<(TileCoord, i32), Arc<Tile>>>,
    tiles: Published<Vec<Arc<Tile>>>,
}

impl TileManager {
    pub fn new(source: Arc<dyn TileSource>, sizes: TileSizes, capacity: usize) -> Self {
        Self {
            source,
            sizes,
            cache: Mutex::new(SpatialTileCache::new(capacity)),
            tiles: Published::new(Vec::new()),
        }
    }

    pub fn sizes(&self) -> TileSizes {
        self.sizes
    }

    /// Current tile list.
    pub fn tiles(&self) -> Arc<Vec<Arc<Tile>>> {
        self.tiles.load()
    }

    /// Makes sure the physical tile covering route tile `tile` is cached.
    ///
    /// A cached tile only has its recency refreshed. Otherwise each size is
    /// tried finest first. A miss is logged as a warning only when the tile
    /// was expected to be `visible`; routes legitimately have gaps.
    pub fn load(&self, tile: TileCoord, visible: bool) -> Result<Option<Arc<Tile>>, TerrainError> {
        let mut cache = self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        for &size in self.sizes.sizes() {
            let key = (tile.snap(size), size);
            if cache.touch(&key) {
                return Ok(cache.get(&key).cloned());
            }
        }

        let mut failure = None;
        for &size in self.sizes.sizes() {
            let snapped = tile.snap(size);
            let data = match self.source.load(snapped, size) {
                Ok(Some(data)) => data,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Terrain tile {snapped:?} size {size}: {e}");
                    failure = Some(e);
                    continue;
                }
            };
            let loaded = match Tile::from_data(snapped, size, data) {
                Ok(loaded) => Arc::new(loaded),
                Err(e) => {
                    warn!("Terrain tile {snapped:?} size {size}: {e}");
                    failure = Some(e);
                    continue;
                }
            };
            for ((coord, size), _) in cache.insert((snapped, size), Arc::clone(&loaded)) {
                debug!("Evicted terrain tile {coord:?} size {size}");
            }
            self.tiles.publish(cache.values().cloned().collect());
            debug!("Loaded terrain tile {snapped:?} size {size} for {tile:?}");
            return Ok(Some(loaded));
        }

        if let Some(e) = failure {
            return Err(e);
        }
        if visible {
            warn!("No terrain tile covers {tile:?}");
        } else {
            debug!("No terrain tile covers {tile:?}");
        }
        Ok(None)
    }

    /// The loaded tile covering route tile `tile`, if any.
    pub fn get_tile(&self, tile: TileCoord) -> Option<Arc<Tile>> {
        find_tile(&self.tiles.load(), self.sizes, tile)
    }

    /// Ground elevation at `position`, or 0 where no tile is loaded.
    ///
    /// The cell is split along the same diagonal the terrain mesh uses.
    pub fn get_elevation(&self, position: &WorldPosition) -> f32 {
        let tiles = self.tiles.load();
        let Some(tile) = find_tile(&tiles, self.sizes, position.tile) else {
            return 0.0;
        };
        let coords = tile.sample_coords(position);
        let (x, z) = (coords.x.floor() as i64, coords.y.floor() as i64);
        let (ux, uz) = (coords.x - x as f32, coords.y - z as f32);
        let corners = [
            sample_elevation(&tiles, self.sizes, &tile, x, z),
            sample_elevation(&tiles, self.sizes, &tile, x + 1, z),
            sample_elevation(&tiles, self.sizes, &tile, x, z + 1),
            sample_elevation(&tiles, self.sizes, &tile, x + 1, z + 1),
        ];
        Diagonal::for_cell(x, z).interpolate(corners, ux, uz)
    }

    /// Elevation of sample `(x, z)` of `tile`, which may lie off its grid.
    ///
    /// Off-grid samples are looked up in the neighbouring tile when it is
    /// loaded, and clamped to the nearest edge sample when it is not.
    pub fn get_elevation_at(&self, tile: &Tile, x: i64, z: i64) -> f32 {
        sample_elevation(&self.tiles.load(), self.sizes, tile, x, z)
    }
}

fn find_tile(tiles: &[Arc<Tile>], sizes: TileSizes, tile: TileCoord) -> Option<Arc<Tile>> {
    sizes.sizes().iter().find_map(|&size| {
        let snapped = tile.snap(size);
        tiles
            .iter()
            .find(|t| t.size() == size && t.coord() == snapped)
            .cloned()
    })
}

fn sample_elevation(tiles: &[Arc<Tile>], sizes: TileSizes, tile: &Tile, x: i64, z: i64) -> f32 {
    if tile.is_in_grid(x, z) {
        return tile.elevation(x, z);
    }
    let position = tile.sample_position(x, z);
    if let Some(neighbour) = find_tile(tiles, sizes, position.tile)
        && (neighbour.coord(), neighbour.size()) != (tile.coord(), tile.size())
    {
        let coords = neighbour.sample_coords(&position).round();
        return neighbour.elevation(coords.x as i64, coords.y as i64);
    }
    tile.elevation(x, z)
}
