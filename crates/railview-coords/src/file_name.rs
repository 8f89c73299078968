//! Per-tile world file naming: `w{±x:6}{±z:6}.w`.

use crate::tile::TileCoord;

/// Returns the world file name for a tile, e.g. `w-005012+014987.w`.
pub fn world_file_name(tile: TileCoord) -> String {
    format!("w{:+07}{:+07}.w", tile.x, tile.z)
}

/// Parses a world file name back into its tile coordinate.
///
/// Returns `None` for anything not produced by [`world_file_name`].
pub fn parse_world_file_name(name: &str) -> Option<TileCoord> {
    let body = name.strip_prefix('w')?.strip_suffix(".w")?;
    if body.len() != 14 || !body.is_ascii() {
        return None;
    }
    let (x, z) = body.split_at(7);
    if !x.starts_with(['+', '-']) || !z.starts_with(['+', '-']) {
        return None;
    }
    Some(TileCoord::new(x.parse().ok()?, z.parse().ok()?))
}
