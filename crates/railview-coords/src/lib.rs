//! Route coordinate system for Railview.
//!
//! Routes are divided into 2048 m square tiles addressed by integer `(x, z)`
//! coordinates. Positions are a tile coordinate plus a local offset from the
//! tile center, which keeps f32 precision usable anywhere on a route. This crate
//! also hosts the small synchronisation primitives shared by the streamers:
//! a cooperative cancellation flag and an atomically published snapshot cell.

mod file_name;
mod position;
mod sync;
mod tile;

pub use file_name::{parse_world_file_name, world_file_name};
pub use position::WorldPosition;
pub use sync::{CancelFlag, Published};
pub use tile::{HALF_TILE, TILE_SIZE, TileCoord, aligned_tile_ring, tile_radius, tile_ring};
