//! Where world files come from.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use railview_coords::{TileCoord, world_file_name};
use rustc_hash::FxHashMap;

use crate::error::WorldFileError;
use crate::record::WorldFileData;

/// Supplies the placement list of a tile.
pub trait WorldFileSource: Send + Sync {
    /// `Ok(None)` when the route has no world file for the tile.
    fn load(&self, tile: TileCoord) -> Result<Option<WorldFileData>, WorldFileError>;
}

/// Reads RON placement lists from the `world` directory of a route.
#[derive(Clone, Debug)]
pub struct RonWorldFileSource {
    directory: PathBuf,
}

impl RonWorldFileSource {
    pub fn new(route: &Path) -> Self {
        Self {
            directory: route.join("world"),
        }
    }

    pub fn path_for(&self, tile: TileCoord) -> PathBuf {
        self.directory.join(world_file_name(tile))
    }
}

impl WorldFileSource for RonWorldFileSource {
    fn load(&self, tile: TileCoord) -> Result<Option<WorldFileData>, WorldFileError> {
        let path = self.path_for(tile);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(WorldFileError::ReadError { path, source }),
        };
        let data = ron::from_str(&contents).map_err(|source| WorldFileError::ParseError {
            path: path.clone(),
            source,
        })?;
        Ok(Some(data))
    }
}

/// In-memory world files, for tests and generated routes.
#[derive(Debug, Default)]
pub struct MemoryWorldFileSource {
    files: Mutex<FxHashMap<TileCoord, WorldFileData>>,
    loads: AtomicUsize,
}

impl MemoryWorldFileSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tile: TileCoord, data: WorldFileData) {
        self.files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(tile, data);
    }

    /// Number of `load` calls served so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }
}

impl WorldFileSource for MemoryWorldFileSource {
    fn load(&self, tile: TileCoord) -> Result<Option<WorldFileData>, WorldFileError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .files
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&tile)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Placement, PlacementRecord};
    use glam::Vec3;

    #[test]
    fn test_ron_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = RonWorldFileSource::new(dir.path());
        let tile = TileCoord::new(-5012, 14987);
        assert!(source.load(tile).unwrap().is_none());

        let data = WorldFileData {
            records: vec![PlacementRecord::Static {
                placement: Placement::new(7, Vec3::new(1.0, 2.0, 3.0)),
                shape: "barn.s".to_string(),
            }],
        };
        std::fs::create_dir_all(dir.path().join("world")).unwrap();
        std::fs::write(source.path_for(tile), ron::ser::to_string(&data).unwrap()).unwrap();
        assert!(source.path_for(tile).ends_with("w-005012+014987.w"));
        assert_eq!(source.load(tile).unwrap(), Some(data));
    }

    #[test]
    fn test_ron_source_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = RonWorldFileSource::new(dir.path());
        std::fs::create_dir_all(dir.path().join("world")).unwrap();
        std::fs::write(source.path_for(TileCoord::new(0, 0)), "(records: [Bogus()])").unwrap();
        assert!(matches!(
            source.load(TileCoord::new(0, 0)),
            Err(WorldFileError::ParseError { .. })
        ));
    }
}
