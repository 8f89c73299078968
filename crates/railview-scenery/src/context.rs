//! Collaborators a world file is loaded against.
//!
//! Shape parsing, the track database, audio and texture accounting live
//! outside this crate. They are reached through the traits here and bundled
//! into a [`SceneryContext`] that the streamer hands to every tile load.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec3};
use railview_coords::TileCoord;
use railview_render::{BufferAllocator, Material, MaterialKind, MaterialLibrary, MeshBuffer, RenderPrimitive};
use railview_terrain::TileManager;
use railview_track::{DtrackData, TrackBuildSettings, TrackMesh};
use rustc_hash::FxHashMap;

use crate::error::SceneryObjectError;

/// One drawable piece of a shape.
#[derive(Clone)]
pub struct ShapePart {
    pub material: Arc<dyn Material>,
    pub primitive: Arc<dyn RenderPrimitive>,
    /// Rest pose relative to the shape origin.
    pub transform: Mat4,
    /// Animation poses replacing `transform`, one per keyframe.
    pub keyframes: Vec<Mat4>,
}

impl ShapePart {
    /// Pose at fractional keyframe `frame`, clamped to the available keyframes.
    pub fn transform_at(&self, frame: f32) -> Mat4 {
        match self.keyframes.len() {
            0 => self.transform,
            1 => self.keyframes[0],
            n => {
                let frame = frame.clamp(0.0, (n - 1) as f32);
                let index = (frame.floor() as usize).min(n - 2);
                let t = frame - index as f32;
                let (scale_a, rotation_a, translation_a) =
                    self.keyframes[index].to_scale_rotation_translation();
                let (scale_b, rotation_b, translation_b) =
                    self.keyframes[index + 1].to_scale_rotation_translation();
                Mat4::from_scale_rotation_translation(
                    scale_a.lerp(scale_b, t),
                    rotation_a.slerp(rotation_b, t),
                    translation_a.lerp(translation_b, t),
                )
            }
        }
    }

    pub fn is_animated(&self) -> bool {
        self.keyframes.len() > 1
    }
}

impl fmt::Debug for ShapePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapePart")
            .field("material", &self.material.name())
            .field("keyframes", &self.keyframes.len())
            .finish()
    }
}

/// A loaded shape, shared by every placement that uses it.
#[derive(Debug)]
pub struct SharedShape {
    pub path: String,
    pub parts: Vec<ShapePart>,
    /// Bounding radius around the shape origin, meters.
    pub radius: f32,
    /// The shape has textures that only load after dark.
    pub night_textures: bool,
}

/// Resolves shape paths to loaded shapes.
pub trait ShapeLibrary: Send + Sync {
    /// Implementations should return the same `Arc` for repeated paths.
    fn shape(&self, path: &str) -> Result<Arc<SharedShape>, SceneryObjectError>;

    /// Load the night variants of the shape's textures.
    fn load_night_textures(&self, shape: &SharedShape) -> Result<(), SceneryObjectError>;

    /// Texture memory the night variants of `shape` will take once loaded.
    fn night_texture_bytes(&self, _shape: &SharedShape) -> u64 {
        0
    }
}

/// Live two-position state set by the simulation: junction points, crossing
/// gates, pickup spouts.
#[derive(Debug, Default)]
pub struct ControlState {
    engaged: AtomicBool,
}

impl ControlState {
    pub fn new(engaged: bool) -> Self {
        Self {
            engaged: AtomicBool::new(engaged),
        }
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Relaxed)
    }

    pub fn set_engaged(&self, engaged: bool) {
        self.engaged.store(engaged, Ordering::Relaxed);
    }
}

/// Which heads of a signal are lit, one bit per head.
#[derive(Debug, Default)]
pub struct SignalState {
    lit_heads: AtomicU32,
}

impl SignalState {
    pub fn new(lit_heads: u32) -> Self {
        Self {
            lit_heads: AtomicU32::new(lit_heads),
        }
    }

    pub fn is_lit(&self, head: usize) -> bool {
        head < 32 && self.lit_heads.load(Ordering::Relaxed) & (1 << head) != 0
    }

    pub fn set_lit_heads(&self, mask: u32) {
        self.lit_heads.store(mask, Ordering::Relaxed);
    }
}

/// Track layout and live interlocking state for the route.
pub trait TrackDatabase: Send + Sync {
    /// Subsections of a track shape, `None` for unknown indices.
    fn track_shape(&self, index: u32) -> Option<Vec<DtrackData>>;

    /// Junction state for a switch placement.
    fn junction(&self, uid: u32) -> Option<Arc<ControlState>>;

    fn level_crossing(&self, uid: u32) -> Option<Arc<ControlState>>;

    fn pickup(&self, uid: u32) -> Option<Arc<ControlState>>;

    fn signal(&self, uid: u32) -> Option<Arc<SignalState>>;
}

/// Track database held in maps, filled before it is shared.
#[derive(Debug, Default)]
pub struct MemoryTrackDatabase {
    track_shapes: FxHashMap<u32, Vec<DtrackData>>,
    junctions: FxHashMap<u32, Arc<ControlState>>,
    level_crossings: FxHashMap<u32, Arc<ControlState>>,
    pickups: FxHashMap<u32, Arc<ControlState>>,
    signals: FxHashMap<u32, Arc<SignalState>>,
}

impl MemoryTrackDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_track_shape(&mut self, index: u32, sections: Vec<DtrackData>) {
        self.track_shapes.insert(index, sections);
    }

    pub fn insert_junction(&mut self, uid: u32, state: Arc<ControlState>) {
        self.junctions.insert(uid, state);
    }

    pub fn insert_level_crossing(&mut self, uid: u32, state: Arc<ControlState>) {
        self.level_crossings.insert(uid, state);
    }

    pub fn insert_pickup(&mut self, uid: u32, state: Arc<ControlState>) {
        self.pickups.insert(uid, state);
    }

    pub fn insert_signal(&mut self, uid: u32, state: Arc<SignalState>) {
        self.signals.insert(uid, state);
    }
}

impl TrackDatabase for MemoryTrackDatabase {
    fn track_shape(&self, index: u32) -> Option<Vec<DtrackData>> {
        self.track_shapes.get(&index).cloned()
    }

    fn junction(&self, uid: u32) -> Option<Arc<ControlState>> {
        self.junctions.get(&uid).cloned()
    }

    fn level_crossing(&self, uid: u32) -> Option<Arc<ControlState>> {
        self.level_crossings.get(&uid).cloned()
    }

    fn pickup(&self, uid: u32) -> Option<Arc<ControlState>> {
        self.pickups.get(&uid).cloned()
    }

    fn signal(&self, uid: u32) -> Option<Arc<SignalState>> {
        self.signals.get(&uid).cloned()
    }
}

/// Audio side of the simulation.
pub trait SoundSink: Send + Sync {
    /// Drop every sound source registered for `tile`.
    fn remove_tile_sounds(&self, tile: TileCoord);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullSoundSink;

impl SoundSink for NullSoundSink {
    fn remove_tile_sounds(&self, _tile: TileCoord) {}
}

/// Texture memory accounting.
pub trait TextureMemory: Send + Sync {
    fn used_bytes(&self) -> u64;
}

/// Fixed usage figure, for tests and hosts without accounting.
#[derive(Debug, Default)]
pub struct FixedTextureMemory {
    used: AtomicU64,
}

impl FixedTextureMemory {
    pub fn new(used_bytes: u64) -> Self {
        Self {
            used: AtomicU64::new(used_bytes),
        }
    }

    pub fn set_used_bytes(&self, used_bytes: u64) {
        self.used.store(used_bytes, Ordering::Relaxed);
    }
}

impl TextureMemory for FixedTextureMemory {
    fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScenerySettings {
    pub viewing_distance: f32,
    pub model_instancing: bool,
    pub wire_enabled: bool,
    pub track: TrackBuildSettings,
    pub conditional_night_textures: bool,
    /// Night textures load once the sine of the sun elevation drops below this.
    pub night_sun_elevation: f32,
    /// Night texture loads are deferred while usage is at or above this.
    pub texture_memory_threshold: u64,
    /// Total texture memory. A load that would go past it is deferred.
    pub texture_memory_budget: u64,
}

impl Default for ScenerySettings {
    fn default() -> Self {
        Self {
            viewing_distance: 2000.0,
            model_instancing: true,
            wire_enabled: false,
            track: TrackBuildSettings::default(),
            conditional_night_textures: true,
            night_sun_elevation: 0.0,
            texture_memory_threshold: 1536 * 1024 * 1024,
            texture_memory_budget: 2048 * 1024 * 1024,
        }
    }
}

/// Everything a world file load needs besides its own records.
#[derive(Clone)]
pub struct SceneryContext {
    pub settings: ScenerySettings,
    pub shapes: Arc<dyn ShapeLibrary>,
    pub tracks: Arc<dyn TrackDatabase>,
    pub sounds: Arc<dyn SoundSink>,
    pub materials: Arc<dyn MaterialLibrary>,
    pub allocator: Arc<dyn BufferAllocator>,
    /// Ground for forests; trees sit at placement height without it.
    pub terrain: Option<Arc<TileManager>>,
}

impl fmt::Debug for SceneryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneryContext")
            .field("settings", &self.settings)
            .field("terrain", &self.terrain.is_some())
            .finish()
    }
}

/// Geometry-only primitive used for procedural scenery.
#[derive(Debug)]
pub struct MeshPrimitive {
    mesh: MeshBuffer,
    sort_index: i32,
}

impl MeshPrimitive {
    pub fn new(mesh: MeshBuffer) -> Self {
        Self { mesh, sort_index: 0 }
    }

    pub fn with_sort_index(mut self, sort_index: i32) -> Self {
        self.sort_index = sort_index;
        self
    }
}

impl RenderPrimitive for MeshPrimitive {
    fn sort_index(&self) -> i32 {
        self.sort_index
    }

    fn mesh(&self) -> Option<&MeshBuffer> {
        Some(&self.mesh)
    }
}

/// Unit cube shapes for routes without shape files.
///
/// Every path resolves to a 4 m box with a body part and three head parts
/// that slide up by a meter over two keyframes, enough to exercise signals
/// and animated objects.
pub struct PlaceholderShapeLibrary {
    materials: Arc<dyn MaterialLibrary>,
    allocator: Arc<dyn BufferAllocator>,
    shapes: Mutex<FxHashMap<String, Arc<SharedShape>>>,
    night_loads: AtomicUsize,
    night_textures: bool,
}

pub const PLACEHOLDER_PARTS: usize = 4;
/// Night texture size reported for every placeholder shape.
pub const PLACEHOLDER_NIGHT_TEXTURE_BYTES: u64 = 1024 * 1024;

impl PlaceholderShapeLibrary {
    pub fn new(materials: Arc<dyn MaterialLibrary>, allocator: Arc<dyn BufferAllocator>) -> Self {
        Self {
            materials,
            allocator,
            shapes: Mutex::new(FxHashMap::default()),
            night_loads: AtomicUsize::new(0),
            night_textures: false,
        }
    }

    /// Mark every shape as having night textures.
    pub fn with_night_textures(mut self) -> Self {
        self.night_textures = true;
        self
    }

    /// Night texture loads served so far.
    pub fn night_loads(&self) -> usize {
        self.night_loads.load(Ordering::Relaxed)
    }

    fn build(&self, path: &str) -> SharedShape {
        let mesh = box_mesh(Vec3::splat(2.0));
        let primitive: Arc<dyn RenderPrimitive> =
            Arc::new(MeshPrimitive::new(mesh.upload(self.allocator.as_ref(), path)));
        let material = self.materials.material(MaterialKind::Scenery, path, false);
        let mut parts = vec![ShapePart {
            material: Arc::clone(&material),
            primitive: Arc::clone(&primitive),
            transform: Mat4::IDENTITY,
            keyframes: Vec::new(),
        }];
        for head in 1..PLACEHOLDER_PARTS {
            let rest = Mat4::from_translation(Vec3::new(0.0, 4.0 + head as f32, 0.0))
                * Mat4::from_scale(Vec3::splat(0.25));
            parts.push(ShapePart {
                material: Arc::clone(&material),
                primitive: Arc::clone(&primitive),
                transform: rest,
                keyframes: vec![rest, Mat4::from_translation(Vec3::Y) * rest],
            });
        }
        SharedShape {
            path: path.to_string(),
            parts,
            radius: 8.0,
            night_textures: self.night_textures,
        }
    }
}

impl ShapeLibrary for PlaceholderShapeLibrary {
    fn shape(&self, path: &str) -> Result<Arc<SharedShape>, SceneryObjectError> {
        if path.is_empty() {
            return Err(SceneryObjectError::MissingShape {
                path: path.to_string(),
            });
        }
        let mut shapes = self.shapes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(shape) = shapes.get(path) {
            return Ok(Arc::clone(shape));
        }
        let shape = Arc::new(self.build(path));
        shapes.insert(path.to_string(), Arc::clone(&shape));
        Ok(shape)
    }

    fn load_night_textures(&self, _shape: &SharedShape) -> Result<(), SceneryObjectError> {
        self.night_loads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn night_texture_bytes(&self, shape: &SharedShape) -> u64 {
        if shape.night_textures { PLACEHOLDER_NIGHT_TEXTURE_BYTES } else { 0 }
    }
}

/// Axis-aligned box with its base on the origin, faces wound clockwise from outside.
pub(crate) fn box_mesh(half_extents: Vec3) -> TrackMesh {
    let h = half_extents;
    let size = Vec3::new(h.x, 2.0 * h.y, h.z);
    let corner = |x: f32, y: f32, z: f32| Vec3::new(x * size.x, y * size.y, z * size.z);
    let mut mesh = TrackMesh::default();
    // Top, bottom, then the four sides.
    mesh.append_quad(
        [corner(-1.0, 1.0, -1.0), corner(1.0, 1.0, -1.0), corner(1.0, 1.0, 1.0), corner(-1.0, 1.0, 1.0)],
        Vec3::Y,
    );
    mesh.append_quad(
        [corner(-1.0, 0.0, 1.0), corner(1.0, 0.0, 1.0), corner(1.0, 0.0, -1.0), corner(-1.0, 0.0, -1.0)],
        Vec3::NEG_Y,
    );
    mesh.append_quad(
        [corner(-1.0, 1.0, 1.0), corner(1.0, 1.0, 1.0), corner(1.0, 0.0, 1.0), corner(-1.0, 0.0, 1.0)],
        Vec3::Z,
    );
    mesh.append_quad(
        [corner(1.0, 1.0, -1.0), corner(-1.0, 1.0, -1.0), corner(-1.0, 0.0, -1.0), corner(1.0, 0.0, -1.0)],
        Vec3::NEG_Z,
    );
    mesh.append_quad(
        [corner(1.0, 1.0, 1.0), corner(1.0, 1.0, -1.0), corner(1.0, 0.0, -1.0), corner(1.0, 0.0, 1.0)],
        Vec3::X,
    );
    mesh.append_quad(
        [corner(-1.0, 1.0, -1.0), corner(-1.0, 1.0, 1.0), corner(-1.0, 0.0, 1.0), corner(-1.0, 0.0, -1.0)],
        Vec3::NEG_X,
    );
    mesh
}
