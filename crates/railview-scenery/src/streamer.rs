//! Streaming of world files around the camera.

use std::sync::{Arc, Mutex};

use railview_coords::{CancelFlag, Published, TileCoord, tile_radius, tile_ring};
use railview_render::RenderFrame;
use tracing::debug;

use crate::context::{SceneryContext, TextureMemory};
use crate::source::WorldFileSource;
use crate::world_file::{TextureLoadStatus, WorldFile};

/// What one streaming tick changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SceneryLoadReport {
    pub loaded: usize,
    pub reused: usize,
    pub unloaded: usize,
    pub cancelled: bool,
    pub night_textures_loaded: usize,
    pub night_textures_deferred: usize,
}

/// Keeps the loaded world files in step with the camera tile.
///
/// [`load`](Self::load) runs on the loader thread; the render thread reads
/// the published list in [`prepare_frame`](Self::prepare_frame).
pub struct SceneryStreamer {
    context: SceneryContext,
    source: Arc<dyn WorldFileSource>,
    memory: Arc<dyn TextureMemory>,
    world_files: Published<Vec<Arc<WorldFile>>>,
    last_tile: Mutex<Option<TileCoord>>,
}

impl SceneryStreamer {
    pub fn new(context: SceneryContext, source: Arc<dyn WorldFileSource>, memory: Arc<dyn TextureMemory>) -> Self {
        Self {
            context,
            source,
            memory,
            world_files: Published::new(Vec::new()),
            last_tile: Mutex::new(None),
        }
    }

    pub fn context(&self) -> &SceneryContext {
        &self.context
    }

    pub fn world_files(&self) -> Arc<Vec<Arc<WorldFile>>> {
        self.world_files.load()
    }

    /// One loader tick for a camera on `camera_tile`.
    ///
    /// The tile set is only rebuilt when the camera changed tile since the
    /// last completed pass. Night textures are retried on every tick while
    /// the sun is below the threshold.
    pub fn load(&self, camera_tile: TileCoord, sun_elevation: f32, cancel: &CancelFlag) -> SceneryLoadReport {
        let mut report = SceneryLoadReport::default();
        let changed = {
            let last = self.last_tile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            *last != Some(camera_tile)
        };
        if changed {
            report = self.load_ring(camera_tile, cancel);
            if !report.cancelled {
                *self.last_tile.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(camera_tile);
            }
        }

        let settings = &self.context.settings;
        if settings.conditional_night_textures && sun_elevation < settings.night_sun_elevation {
            for world_file in self.world_files.load().iter() {
                if cancel.is_cancelled() {
                    break;
                }
                match world_file.load_night_textures(&self.context, self.memory.as_ref()) {
                    TextureLoadStatus::Loaded => report.night_textures_loaded += 1,
                    TextureLoadStatus::Deferred => report.night_textures_deferred += 1,
                    TextureLoadStatus::NotNeeded => {}
                }
            }
        }
        report
    }

    fn load_ring(&self, camera_tile: TileCoord, cancel: &CancelFlag) -> SceneryLoadReport {
        let ring = tile_ring(camera_tile, tile_radius(self.context.settings.viewing_distance));
        let current = self.world_files.load();
        let mut next: Vec<Arc<WorldFile>> = Vec::with_capacity(ring.len());
        let mut report = SceneryLoadReport::default();

        for &tile in &ring {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if let Some(existing) = current.iter().find(|w| w.tile() == tile) {
                next.push(Arc::clone(existing));
                report.reused += 1;
                continue;
            }
            let visible = tile.chebyshev(camera_tile) <= 1;
            match WorldFile::load(tile, self.source.as_ref(), &self.context, cancel, visible) {
                Some(world_file) => {
                    next.push(Arc::new(world_file));
                    report.loaded += 1;
                }
                None => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        let mut leaving = Vec::new();
        for world_file in current.iter() {
            if next.iter().any(|w| Arc::ptr_eq(w, world_file)) {
                continue;
            }
            if report.cancelled {
                next.push(Arc::clone(world_file));
            } else {
                leaving.push(Arc::clone(world_file));
            }
        }

        self.world_files.publish(next);
        for world_file in &leaving {
            world_file.unload();
        }
        report.unloaded = leaving.len();

        debug!(
            "Scenery around {camera_tile:?}: {} loaded, {} reused, {} unloaded{}",
            report.loaded,
            report.reused,
            report.unloaded,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    /// Registers every loaded world file with `frame`.
    pub fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        for world_file in self.world_files.load().iter() {
            world_file.prepare_frame(frame, elapsed);
        }
    }
}
