//! One tile's worth of scenery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use railview_coords::{CancelFlag, TileCoord};
use railview_render::RenderFrame;
use railview_track::SuperElevationBuilder;
use tracing::{debug, warn};

use crate::context::{SceneryContext, SharedShape, SoundSink, TextureMemory};
use crate::error::SceneryObjectError;
use crate::forest::ForestPatch;
use crate::instancing::collapse_instances;
use crate::objects::{
    AnimatedShape, CarSpawnerDef, ControlKind, ControlledShape, SceneryObject, SignalShape, SpeedPostShape,
    StaticShape, TextLabel, TransferDecal, tile_position,
};
use crate::record::{Placement, PlacementRecord};
use crate::source::WorldFileSource;
use crate::track::{SuperElevatedTrack, WireSpan};

/// Keyframes per second for hazard animations.
const HAZARD_FRAME_RATE: f32 = 2.0;

/// Outcome of a night texture load attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureLoadStatus {
    Loaded,
    /// Texture memory is over the threshold; try again later.
    Deferred,
    /// Nothing to load, or already loaded.
    NotNeeded,
}

/// Objects decoded from records, before instancing.
#[derive(Default)]
struct Decoded {
    statics: Vec<StaticShape>,
    objects: Vec<Box<dyn SceneryObject>>,
    car_spawners: Vec<CarSpawnerDef>,
}

/// The scenery objects of one tile.
///
/// Built on the loader thread and shared with the render thread once
/// complete. [`unload`](Self::unload) releases the objects and may be called
/// any number of times.
pub struct WorldFile {
    tile: TileCoord,
    objects: Mutex<Vec<Box<dyn SceneryObject>>>,
    car_spawners: Vec<CarSpawnerDef>,
    night_shapes: Vec<Arc<SharedShape>>,
    night_textures_loaded: AtomicBool,
    skipped: usize,
    sounds: Arc<dyn SoundSink>,
    unloaded: AtomicBool,
}

impl std::fmt::Debug for WorldFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldFile")
            .field("tile", &self.tile)
            .field("objects", &self.object_count())
            .field("skipped", &self.skipped)
            .field("unloaded", &self.is_unloaded())
            .finish()
    }
}

impl WorldFile {
    /// A tile with nothing on it.
    pub fn empty(tile: TileCoord, context: &SceneryContext) -> Self {
        Self::assemble(tile, Decoded::default(), 0, context)
    }

    /// Load the scenery of `tile`.
    ///
    /// A missing or unreadable world file gives an empty tile, with a warning
    /// only when the tile is `visible`. Objects that fail to build are logged
    /// and skipped. Returns `None` when `cancel` is raised part way through.
    pub fn load(
        tile: TileCoord,
        source: &dyn WorldFileSource,
        context: &SceneryContext,
        cancel: &CancelFlag,
        visible: bool,
    ) -> Option<Self> {
        let data = match source.load(tile) {
            Ok(Some(data)) => data,
            Ok(None) => {
                if visible {
                    warn!("No world file for visible tile {tile:?}");
                }
                return Some(Self::empty(tile, context));
            }
            Err(e) => {
                if visible {
                    warn!("{e}");
                }
                return Some(Self::empty(tile, context));
            }
        };

        let mut decoded = Decoded::default();
        let mut skipped = 0;
        for record in &data.records {
            if cancel.is_cancelled() {
                let partial = Self::assemble(tile, decoded, skipped, context);
                partial.unload();
                return None;
            }
            if let Err(e) = decode(tile, record, context, &mut decoded) {
                warn!(
                    "Skipped {} {} on {tile:?}: {e}",
                    record.kind(),
                    record.placement().uid
                );
                skipped += 1;
            }
        }

        let world_file = Self::assemble(tile, decoded, skipped, context);
        debug!(
            "World file {tile:?}: {} objects, {} skipped",
            world_file.object_count(),
            skipped
        );
        Some(world_file)
    }

    fn assemble(tile: TileCoord, decoded: Decoded, skipped: usize, context: &SceneryContext) -> Self {
        let Decoded {
            statics,
            mut objects,
            car_spawners,
        } = decoded;
        if context.settings.model_instancing {
            let (singles, instances) = collapse_instances(tile, statics);
            objects.extend(singles.into_iter().map(|s| Box::new(s) as Box<dyn SceneryObject>));
            objects.extend(instances.into_iter().map(|s| Box::new(s) as Box<dyn SceneryObject>));
        } else {
            objects.extend(statics.into_iter().map(|s| Box::new(s) as Box<dyn SceneryObject>));
        }

        let mut night_shapes: Vec<Arc<SharedShape>> = Vec::new();
        for shape in objects.iter().filter_map(|o| o.shape()) {
            if shape.night_textures && !night_shapes.iter().any(|s| Arc::ptr_eq(s, shape)) {
                night_shapes.push(Arc::clone(shape));
            }
        }

        let world_file = Self {
            tile,
            objects: Mutex::new(objects),
            car_spawners,
            night_shapes,
            night_textures_loaded: AtomicBool::new(false),
            skipped,
            sounds: Arc::clone(&context.sounds),
            unloaded: AtomicBool::new(false),
        };
        if !context.settings.conditional_night_textures {
            world_file.load_night_shapes(context);
        }
        world_file
    }

    fn objects(&self) -> MutexGuard<'_, Vec<Box<dyn SceneryObject>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tile(&self) -> TileCoord {
        self.tile
    }

    pub fn object_count(&self) -> usize {
        self.objects().len()
    }

    /// Names of the loaded objects, in draw order.
    pub fn object_names(&self) -> Vec<&'static str> {
        self.objects().iter().map(|o| o.name()).collect()
    }

    /// Records that failed to build.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    pub fn car_spawners(&self) -> &[CarSpawnerDef] {
        &self.car_spawners
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    pub fn night_textures_loaded(&self) -> bool {
        self.night_textures_loaded.load(Ordering::Acquire)
    }

    /// Registers every object with `frame`.
    pub fn prepare_frame(&self, frame: &mut RenderFrame, elapsed: f64) {
        for object in self.objects().iter() {
            object.prepare_frame(frame, elapsed);
        }
    }

    /// Release the objects and drop the tile's sounds. Later calls do nothing.
    pub fn unload(&self) {
        if self.unloaded.swap(true, Ordering::AcqRel) {
            return;
        }
        self.objects().clear();
        self.sounds.remove_tile_sounds(self.tile);
    }

    /// Load night textures for the shapes on this tile unless texture memory
    /// is already at the threshold or the textures would not fit the budget.
    pub fn load_night_textures(&self, context: &SceneryContext, memory: &dyn TextureMemory) -> TextureLoadStatus {
        if self.night_shapes.is_empty() || self.night_textures_loaded() || self.is_unloaded() {
            return TextureLoadStatus::NotNeeded;
        }
        let used = memory.used_bytes();
        let needed: u64 = self
            .night_shapes
            .iter()
            .map(|shape| context.shapes.night_texture_bytes(shape))
            .sum();
        let settings = &context.settings;
        let over_budget = used.saturating_add(needed) > settings.texture_memory_budget;
        if used >= settings.texture_memory_threshold || over_budget {
            debug!(
                "Deferring night textures for {:?}: {used} bytes in use, {needed} needed",
                self.tile
            );
            return TextureLoadStatus::Deferred;
        }
        self.load_night_shapes(context);
        TextureLoadStatus::Loaded
    }

    fn load_night_shapes(&self, context: &SceneryContext) {
        for shape in &self.night_shapes {
            if let Err(e) = context.shapes.load_night_textures(shape) {
                warn!("Night textures for `{}`: {e}", shape.path);
            }
        }
        self.night_textures_loaded.store(true, Ordering::Release);
    }
}

fn static_shape(
    tile: TileCoord,
    placement: &Placement,
    path: &str,
    context: &SceneryContext,
) -> Result<StaticShape, SceneryObjectError> {
    let shape = context.shapes.shape(path)?;
    Ok(StaticShape::new(shape, tile, placement, context.settings.viewing_distance))
}

fn push(decoded: &mut Decoded, object: impl SceneryObject + 'static) {
    decoded.objects.push(Box::new(object));
}

/// Build the objects for one record.
fn decode(
    tile: TileCoord,
    record: &PlacementRecord,
    context: &SceneryContext,
    decoded: &mut Decoded,
) -> Result<(), SceneryObjectError> {
    match record {
        PlacementRecord::Track {
            placement,
            shape,
            track_shape,
        } => {
            let sections = context
                .tracks
                .track_shape(*track_shape)
                .ok_or(SceneryObjectError::UnknownTrackShape { index: *track_shape })?;
            if let Some(junction) = context.tracks.junction(placement.uid) {
                let inner = static_shape(tile, placement, shape, context)?;
                push(decoded, ControlledShape::new(inner, junction, ControlKind::Switch));
            } else if SuperElevationBuilder::new(context.settings.track.clone()).is_banked(&sections) {
                push(decoded, SuperElevatedTrack::new(tile, placement, &sections, context)?);
            } else {
                decoded.statics.push(static_shape(tile, placement, shape, context)?);
            }
            if context.settings.wire_enabled {
                push(decoded, WireSpan::new(tile, placement, &sections, context)?);
            }
        }
        PlacementRecord::DynamicTrack { placement, sections } => {
            push(decoded, SuperElevatedTrack::new(tile, placement, sections, context)?);
            if context.settings.wire_enabled {
                push(decoded, WireSpan::new(tile, placement, sections, context)?);
            }
        }
        PlacementRecord::Forest {
            placement,
            texture,
            area,
            population,
            tree_size,
        } => {
            push(
                decoded,
                ForestPatch::new(tile, placement, texture, *area, *population, *tree_size, context)?,
            );
        }
        PlacementRecord::Signal {
            placement,
            shape,
            heads,
        } => {
            let inner = static_shape(tile, placement, shape, context)?;
            let state = context.tracks.signal(placement.uid);
            push(decoded, SignalShape::new(inner, heads, state, context.materials.as_ref())?);
        }
        PlacementRecord::Transfer {
            placement,
            texture,
            width,
            height,
        } => {
            push(decoded, TransferDecal::new(tile, placement, texture, *width, *height, context)?);
        }
        PlacementRecord::LevelCrossing { placement, shape } => {
            let inner = static_shape(tile, placement, shape, context)?;
            match context.tracks.level_crossing(placement.uid) {
                Some(state) => push(decoded, ControlledShape::new(inner, state, ControlKind::LevelCrossing)),
                None => push(decoded, inner),
            }
        }
        PlacementRecord::Hazard { placement, shape } => {
            let inner = static_shape(tile, placement, shape, context)?;
            push(decoded, AnimatedShape::new(inner, HAZARD_FRAME_RATE).named("hazard"));
        }
        PlacementRecord::SpeedPost {
            placement,
            shape,
            limits,
        } => {
            let inner = static_shape(tile, placement, shape, context)?;
            push(decoded, SpeedPostShape::new(inner, limits, context.materials.as_ref()));
        }
        PlacementRecord::CarSpawner {
            placement,
            list,
            frequency,
        } => {
            decoded.car_spawners.push(CarSpawnerDef {
                uid: placement.uid,
                location: placement.world_position(tile),
                list: list.clone(),
                frequency: *frequency,
            });
        }
        PlacementRecord::Siding { placement, name } | PlacementRecord::Platform { placement, name } => {
            push(
                decoded,
                TextLabel::new(
                    tile_position(tile, placement.position),
                    name.clone(),
                    context.materials.as_ref(),
                    placement.view_distance.unwrap_or(context.settings.viewing_distance),
                ),
            );
        }
        PlacementRecord::Static { placement, shape } => {
            decoded.statics.push(static_shape(tile, placement, shape, context)?);
        }
        PlacementRecord::Animated {
            placement,
            shape,
            frame_rate,
        } => {
            let inner = static_shape(tile, placement, shape, context)?;
            push(decoded, AnimatedShape::new(inner, *frame_rate));
        }
        PlacementRecord::Pickup { placement, shape } => {
            let inner = static_shape(tile, placement, shape, context)?;
            match context.tracks.pickup(placement.uid) {
                Some(state) => push(decoded, ControlledShape::new(inner, state, ControlKind::Pickup)),
                None => push(decoded, inner),
            }
        }
    }
    Ok(())
}
