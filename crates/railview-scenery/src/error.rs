//! World file and scenery object errors.

use std::path::PathBuf;

/// A whole world file could not be read. The tile is loaded empty instead.
#[derive(Debug, thiserror::Error)]
pub enum WorldFileError {
    /// The file exists but could not be read.
    #[error("failed to read world file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid placement list.
    #[error("failed to parse world file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// One placement record could not be turned into a scenery object.
///
/// These are logged and the object is skipped; the rest of the tile loads.
#[derive(Debug, thiserror::Error)]
pub enum SceneryObjectError {
    /// The shape library has no shape at this path.
    #[error("shape `{path}` not found")]
    MissingShape { path: String },

    /// The shape exists but could not be loaded.
    #[error("shape `{path}` could not be loaded: {reason}")]
    InvalidShape { path: String, reason: String },

    /// A track placement names a track shape the database does not know.
    #[error("unknown track shape {index}")]
    UnknownTrackShape { index: u32 },

    /// A signal head refers to a sub-object the shape does not have.
    #[error("signal head {head} is outside the {parts} parts of `{path}`")]
    InvalidSignalHead { path: String, head: u32, parts: usize },

    /// A procedurally built object came out with no geometry.
    #[error("{what} produced no geometry")]
    EmptyGeometry { what: &'static str },
}
