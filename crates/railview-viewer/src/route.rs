//! Opening a route: per-tile sources and the track shape table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use railview_scenery::{MemoryTrackDatabase, RonWorldFileSource, TrackDatabase, WorldFileSource};
use railview_terrain::{GeneratedTileSource, RonTileSource, TileSource};
use railview_track::DtrackData;
use serde::Deserialize;
use tracing::info;

use crate::demo::{DemoWorldFileSource, demo_track_database};

/// Where terrain, world files and track data come from.
#[derive(Clone)]
pub struct RouteSources {
    pub terrain: Arc<dyn TileSource>,
    pub world_files: Arc<dyn WorldFileSource>,
    pub tracks: Arc<dyn TrackDatabase>,
}

impl RouteSources {
    /// The generated demo route.
    pub fn generated() -> Self {
        let terrain = GeneratedTileSource::default();
        Self {
            terrain: Arc::new(terrain),
            world_files: Arc::new(DemoWorldFileSource::new(terrain)),
            tracks: Arc::new(demo_track_database()),
        }
    }

    /// A route directory on disk.
    pub fn open(route: &Path) -> Result<Self, RouteError> {
        Ok(Self {
            terrain: Arc::new(RonTileSource::new(route)),
            world_files: Arc::new(RonWorldFileSource::new(route)),
            tracks: Arc::new(load_track_database(route)?),
        })
    }
}

/// Track shapes available to a route, read from `track_shapes.ron`.
///
/// Interlocking state is not persisted; every switch and signal on a route
/// loaded from disk is drawn in its default position.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct TrackShapeTable {
    #[serde(default)]
    pub shapes: Vec<TrackShapeEntry>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TrackShapeEntry {
    pub index: u32,
    pub sections: Vec<DtrackData>,
}

#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

pub fn track_shapes_path(route: &Path) -> PathBuf {
    route.join("track_shapes.ron")
}

/// Builds the track database of the route at `route`.
///
/// A route without a shape table gets an empty database.
pub fn load_track_database(route: &Path) -> Result<MemoryTrackDatabase, RouteError> {
    let path = track_shapes_path(route);
    let mut database = MemoryTrackDatabase::new();
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(database),
        Err(source) => return Err(RouteError::ReadError { path, source }),
    };
    let table: TrackShapeTable =
        ron::from_str(&contents).map_err(|source| RouteError::ParseError { path: path.clone(), source })?;
    info!("Loaded {} track shapes from {}", table.shapes.len(), path.display());
    for entry in table.shapes {
        database.insert_track_shape(entry.index, entry.sections);
    }
    Ok(database)
}
