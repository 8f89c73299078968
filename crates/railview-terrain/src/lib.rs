//! Terrain streaming for Railview.
//!
//! Terrain comes in tiles of elevation samples, cut into 16×16-cell patches
//! that are drawn as separate primitives. A [`TileManager`] owns a bounded
//! cache of tiles at one resolution and answers elevation queries; the
//! [`TerrainStreamer`] keeps a dense set of tiles around the camera and, when
//! enabled, a coarse distant-mountain set on an 8-tile grid.

mod cache;
mod error;
mod manager;
mod primitive;
mod source;
mod streamer;
mod tile;

pub use cache::{DEFAULT_TILE_CACHE_CAPACITY, SpatialTileCache};
pub use error::TerrainError;
pub use manager::TileManager;
pub use primitive::{SharedPatchIndices, TerrainPrimitive, TerrainVertex, WaterPrimitive};
pub use source::{GeneratedTileSource, MemoryTileSource, RonTileSource, TileSource, tile_file_name};
pub use streamer::{TerrainLoadReport, TerrainSettings, TerrainStreamer, TerrainTile};
pub use tile::{Diagonal, PATCH_CELLS, Tile, TileData, TileSizes};
