//! The headless frame loop.
//!
//! A [`Viewer`] owns the streamers, the loader thread and the render frame.
//! Every call to [`Viewer::frame`] moves the camera along the line, asks the
//! loader for the tiles around it, composes a frame and plays it back into a
//! [`RecordingBackend`].

use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use railview_config::Config;
use railview_coords::{TileCoord, WorldPosition};
use railview_render::{
    BufferAllocator, Camera, DrawLog, FrameStats, HeadlessMaterialLibrary, HeadlessShadowMapMaterial,
    MaterialLibrary, RecordingBackend, RenderFrame,
};
use railview_scenery::{
    FixedTextureMemory, NullSoundSink, PlaceholderShapeLibrary, SceneryContext, SceneryStreamer, TextureMemory,
};
use railview_terrain::TerrainStreamer;
use tracing::{debug, info, warn};

use crate::error::ViewerError;
use crate::loader::{LoadCompleted, LoaderProcess};
use crate::route::RouteSources;
use crate::settings::{frame_settings, scenery_settings, terrain_settings};

/// Camera speed along the line, meters per second.
pub const CAMERA_SPEED_MPS: f32 = 25.0;
/// Eye height above the ground, meters.
pub const EYE_HEIGHT_M: f32 = 4.0;
/// Length of a simulated day, seconds.
pub const DAY_LENGTH_S: f64 = 600.0;
/// Frames between loader requests while the camera stays on one tile.
pub const LOAD_INTERVAL_FRAMES: u64 = 60;

/// Direction toward the sun `elapsed` seconds into the run.
///
/// The run starts mid-morning; the sun crosses the horizon twice per
/// [`DAY_LENGTH_S`].
pub fn sun_direction(elapsed: f64) -> Vec3 {
    let angle = (TAU * elapsed / DAY_LENGTH_S + 0.6) as f32;
    Vec3::new(angle.cos(), angle.sin(), 0.35).normalize()
}

pub struct Viewer {
    config: Config,
    start: TileCoord,
    log: DrawLog,
    backend: RecordingBackend,
    frame: RenderFrame,
    camera: Camera,
    terrain: Arc<TerrainStreamer>,
    scenery: Arc<SceneryStreamer>,
    loader: LoaderProcess,
    frames: u64,
}

impl Viewer {
    /// Builds the streamers for `sources` and starts the loader thread.
    pub fn new(
        config: &Config,
        sources: RouteSources,
        allocator: Arc<dyn BufferAllocator>,
        start: TileCoord,
    ) -> Result<Self, ViewerError> {
        let log = DrawLog::default();
        let materials: Arc<dyn MaterialLibrary> = Arc::new(HeadlessMaterialLibrary::new(log.clone()));

        let terrain = Arc::new(TerrainStreamer::new(
            terrain_settings(config),
            sources.terrain,
            Arc::clone(&allocator),
            Arc::clone(&materials),
        ));
        let context = SceneryContext {
            settings: scenery_settings(config),
            shapes: Arc::new(
                PlaceholderShapeLibrary::new(Arc::clone(&materials), Arc::clone(&allocator)).with_night_textures(),
            ),
            tracks: sources.tracks,
            sounds: Arc::new(NullSoundSink),
            materials,
            allocator,
            terrain: Some(Arc::clone(terrain.tile_manager())),
        };
        let memory: Arc<dyn TextureMemory> = Arc::new(FixedTextureMemory::new(0));
        let scenery = Arc::new(SceneryStreamer::new(context, sources.world_files, memory));
        let loader =
            LoaderProcess::spawn(Arc::clone(&terrain), Arc::clone(&scenery)).map_err(ViewerError::LoaderSpawn)?;

        let frame = RenderFrame::new(
            frame_settings(config),
            Arc::new(HeadlessShadowMapMaterial::new(log.clone())),
        );

        let mut viewer = Self {
            config: config.clone(),
            start,
            backend: RecordingBackend::new(log.clone()),
            log,
            frame,
            camera: Camera::default(),
            terrain,
            scenery,
            loader,
            frames: 0,
        };
        viewer.camera = viewer.camera_at(0.0);
        Ok(viewer)
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn scenery(&self) -> &SceneryStreamer {
        &self.scenery
    }

    /// Requests the tiles around the start position and waits for them.
    pub fn load_initial(&mut self, timeout: Duration) -> Option<LoadCompleted> {
        if !self.loader.request(self.camera.tile(), sun_direction(0.0).y) {
            return None;
        }
        let done = self.loader.wait(timeout)?;
        self.log_load(&done);
        // The eye height can only be resolved once the ground is in.
        self.camera = self.camera_at(0.0);
        Some(done)
    }

    /// Composes and draws one frame at `elapsed` seconds into the run.
    pub fn frame(&mut self, elapsed: f64) -> FrameStats {
        self.camera = self.camera_at(elapsed);
        let sun = sun_direction(elapsed);
        let tile = self.camera.tile();
        if self.loader.last_requested() != Some(tile) || self.frames % LOAD_INTERVAL_FRAMES == 0 {
            self.loader.request(tile, sun.y);
        }
        for done in self.loader.completed() {
            self.log_load(&done);
        }

        self.frame.clear();
        self.frame.set_camera(&self.camera);
        self.frame.prepare_frame(elapsed, sun);
        self.terrain.prepare_frame(&mut self.frame);
        self.scenery.prepare_frame(&mut self.frame, elapsed);
        self.frame.sort();
        self.frame.draw(&mut self.backend);
        let events = self.log.take();

        let stats = self.frame.stats();
        if self.config.debug.frame_stats {
            debug!(
                "Frame {}: {} items, {} culled, {} shadow casters, {} state changes, {} render calls, {} events",
                self.frames,
                stats.total_items(),
                stats.culled,
                stats.shadow_items.iter().sum::<usize>(),
                stats.state_changes,
                stats.render_calls,
                events.len()
            );
        }
        self.frames += 1;
        stats
    }

    /// Applies a reloaded config.
    ///
    /// Frame and camera settings take effect at once. Streaming settings are
    /// fixed for the lifetime of the streamers.
    pub fn apply_config(&mut self, config: Config) {
        if terrain_settings(&config) != terrain_settings(&self.config)
            || scenery_settings(&config) != scenery_settings(&self.config)
        {
            warn!("Streaming settings changed; restart the viewer to apply them");
        }
        let settings = frame_settings(&config);
        if &settings != self.frame.settings() {
            info!("Rebuilding render frame for new settings");
            self.frame = RenderFrame::new(
                settings,
                Arc::new(HeadlessShadowMapMaterial::new(self.log.clone())),
            );
        }
        self.config = config;
    }

    fn camera_at(&self, elapsed: f64) -> Camera {
        let travelled = (f64::from(CAMERA_SPEED_MPS) * elapsed) as f32;
        let mut position = WorldPosition::new(self.start, Vec3::new(travelled, 0.0, 0.0));
        position.location.y = self.terrain.tile_manager().get_elevation(&position) + EYE_HEIGHT_M;

        let mut camera = Camera::looking_at(position, Vec3::new(1.0, -0.05, 0.0));
        camera.fov_y = self.config.render.viewing_fov_deg.to_radians();
        camera.far = self.config.render.viewing_distance_m;
        camera.distant_far = self.config.render.far_viewing_distance_m;
        camera
    }

    fn log_load(&self, done: &LoadCompleted) {
        if done.cancelled() {
            debug!("Load pass for {:?} was cancelled", done.camera);
            return;
        }
        info!(
            "Loaded around {:?} in {:?}: terrain {}+{}, scenery {}+{}, {} world files unloaded",
            done.camera,
            done.duration,
            done.terrain.loaded,
            done.terrain.reused,
            done.scenery.loaded,
            done.scenery.reused,
            done.scenery.unloaded
        );
    }
}
