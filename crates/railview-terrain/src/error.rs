//! Terrain loading errors.

use std::path::PathBuf;

use railview_coords::TileCoord;

/// Errors that can occur while reading or validating a terrain tile.
#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    /// The tile file exists but could not be read.
    #[error("failed to read terrain tile {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tile file is not valid RON.
    #[error("failed to parse terrain tile {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    /// The elevation grid does not hold `sample_count²` samples.
    #[error("terrain tile {coord:?} has {actual} samples, expected {expected}")]
    SampleCount {
        coord: TileCoord,
        expected: usize,
        actual: usize,
    },

    /// The sample count cannot be cut into whole patches.
    #[error("terrain tile {coord:?} sample count {sample_count} is not a positive multiple of {cells}")]
    PatchAlignment {
        coord: TileCoord,
        sample_count: usize,
        cells: usize,
    },
}
