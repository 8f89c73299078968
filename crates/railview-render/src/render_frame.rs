//! The per-frame composer: culling, bucketing, sorting, and submission.
//!
//! Lifecycle of one frame, all on the render thread:
//!
//! 1. [`RenderFrame::clear`]
//! 2. [`RenderFrame::set_camera`] and [`RenderFrame::prepare_frame`]
//! 3. scene objects call [`RenderFrame::add_auto_primitive`] / [`RenderFrame::add_primitive`]
//! 4. [`RenderFrame::sort`]
//! 5. [`RenderFrame::draw`]
//!
//! Opaque items are batched per material inside each sequence. Blended items
//! of a sequence share one list so they can be ordered back-to-front across
//! materials; at draw time that list is split into runs of the same material.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use railview_coords::{TILE_SIZE, WorldPosition};
use rustc_hash::FxHashMap;

use crate::camera::Camera;
use crate::frustum::Frustum;
use crate::material::{
    Material, MaterialId, MaterialKind, ShadowMapMaterial, ShadowMapMode, ViewMatrices,
};
use crate::primitive::{RenderItem, RenderPrimitive, ShapeFlags};
use crate::sequence::{RenderPrimitiveGroup, RenderPrimitiveSequence};
use crate::shadow::ShadowCascades;

/// Blended items closer together than this (meters) are ordered by sort index.
pub const SORT_DISTANCE_EPSILON: f32 = 0.001;

/// Render-target operations the composer drives around material draws.
pub trait FrameBackend {
    /// Bind cascade `cascade` as the depth target and clear it.
    fn begin_shadow_map(&mut self, cascade: usize);

    /// Finish drawing into cascade `cascade`.
    fn end_shadow_map(&mut self, cascade: usize);

    /// Run the separable blur over cascade `cascade`.
    fn blur_shadow_map(&mut self, cascade: usize);

    /// Bind the main color and depth targets and clear them.
    fn begin_main(&mut self);

    /// Called before the first draw of a sequence in a pass.
    fn begin_sequence(&mut self, _sequence: RenderPrimitiveSequence, _distant: bool) {}

    /// Clear depth only, keeping color.
    fn clear_depth(&mut self);

    /// Finish the main view.
    fn end_main(&mut self);
}

/// Frame-level switches derived from the viewer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameSettings {
    pub dynamic_shadows: bool,
    pub shadow_map_count: u32,
    pub shadow_map_distance: f32,
    pub shadow_map_resolution: u32,
    pub shadow_map_blur: bool,
    pub distant_mountains: bool,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            dynamic_shadows: true,
            shadow_map_count: 3,
            shadow_map_distance: 1000.0,
            shadow_map_resolution: 1024,
            shadow_map_blur: false,
            distant_mountains: false,
        }
    }
}

/// Counters describing the last composed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameStats {
    /// Opaque items per sequence (including depth-seeding scenery copies).
    pub opaque_items: [usize; RenderPrimitiveSequence::COUNT],
    /// Blended items per sequence.
    pub blended_items: [usize; RenderPrimitiveSequence::COUNT],
    /// Shadow casters per cascade.
    pub shadow_items: Vec<usize>,
    /// Auto primitives rejected by range or field of view.
    pub culled: usize,
    /// `set_state` calls issued by the last draw.
    pub state_changes: usize,
    /// `render` calls issued by the last draw.
    pub render_calls: usize,
}

impl FrameStats {
    /// Total items queued for the main view.
    pub fn total_items(&self) -> usize {
        self.opaque_items.iter().sum::<usize>() + self.blended_items.iter().sum::<usize>()
    }
}

struct MaterialBatch {
    material: Arc<dyn Material>,
    items: Vec<RenderItem>,
}

/// One sequence: opaque items keyed by material, blended items in one list.
#[derive(Default)]
struct SequenceBucket {
    batches: Vec<MaterialBatch>,
    index: FxHashMap<MaterialId, usize>,
    blended: Vec<RenderItem>,
}

impl SequenceBucket {
    fn push_opaque(&mut self, item: RenderItem) {
        let id = item.material.id();
        match self.index.get(&id) {
            Some(&slot) => self.batches[slot].items.push(item),
            None => {
                self.index.insert(id, self.batches.len());
                self.batches.push(MaterialBatch {
                    material: Arc::clone(&item.material),
                    items: vec![item],
                });
            }
        }
    }

    /// Drops one material that received no items since the last clear.
    fn evict_one_stale(&mut self) {
        let Some(slot) = self.batches.iter().position(|b| b.items.is_empty()) else {
            return;
        };
        let removed = self.batches.swap_remove(slot);
        self.index.remove(&removed.material.id());
        if let Some(moved) = self.batches.get(slot) {
            self.index.insert(moved.material.id(), slot);
        }
    }

    fn clear(&mut self) {
        self.evict_one_stale();
        for batch in &mut self.batches {
            batch.items.clear();
        }
        self.blended.clear();
    }

    fn opaque_len(&self) -> usize {
        self.batches.iter().map(|b| b.items.len()).sum()
    }
}

/// Shadow casters for one cascade, split by shadow shader variant.
#[derive(Default)]
struct ShadowCasters {
    scenery: Vec<RenderItem>,
    forest: Vec<RenderItem>,
    terrain: Vec<RenderItem>,
}

impl ShadowCasters {
    fn clear(&mut self) {
        self.scenery.clear();
        self.forest.clear();
        self.terrain.clear();
    }

    fn len(&self) -> usize {
        self.scenery.len() + self.forest.len() + self.terrain.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Distant,
    Main,
}

/// Collects, sorts, and submits one frame's render items.
pub struct RenderFrame {
    settings: FrameSettings,
    camera: Camera,
    frustum: Frustum,
    matrices: ViewMatrices,
    distant_matrices: ViewMatrices,
    sequences: Vec<SequenceBucket>,
    cascades: Option<ShadowCascades>,
    casters: Vec<ShadowCasters>,
    shadow_material: Arc<dyn ShadowMapMaterial>,
    elapsed: f64,
    culled: usize,
    state_changes: usize,
    render_calls: usize,
}

impl RenderFrame {
    /// Creates an empty frame. Shadow cascades exist only when dynamic shadows are on.
    pub fn new(settings: FrameSettings, shadow_material: Arc<dyn ShadowMapMaterial>) -> Self {
        let cascades = settings.dynamic_shadows.then(|| {
            ShadowCascades::new(
                settings.shadow_map_count.clamp(1, 4),
                settings.shadow_map_distance,
                settings.shadow_map_resolution,
            )
        });
        let cascade_count = cascades.as_ref().map_or(0, ShadowCascades::count);
        let camera = Camera::default();
        let mut frame = Self {
            settings,
            frustum: Frustum::from_view_projection(&camera.view_projection_matrix()),
            camera,
            matrices: ViewMatrices::default(),
            distant_matrices: ViewMatrices::default(),
            sequences: (0..RenderPrimitiveSequence::COUNT)
                .map(|_| SequenceBucket::default())
                .collect(),
            cascades,
            casters: (0..cascade_count).map(|_| ShadowCasters::default()).collect(),
            shadow_material,
            elapsed: 0.0,
            culled: 0,
            state_changes: 0,
            render_calls: 0,
        };
        let camera = frame.camera.clone();
        frame.set_camera(&camera);
        frame
    }

    /// Settings the frame was built with.
    pub fn settings(&self) -> &FrameSettings {
        &self.settings
    }

    /// Reset every bucket for a new frame, keeping allocations.
    ///
    /// At most one material that went unused since the previous clear is
    /// dropped per sequence, so the material maps shrink slowly instead of
    /// churning when objects come and go.
    pub fn clear(&mut self) {
        for bucket in &mut self.sequences {
            bucket.clear();
        }
        for casters in &mut self.casters {
            casters.clear();
        }
        self.culled = 0;
        self.state_changes = 0;
        self.render_calls = 0;
    }

    /// Record the active camera and refresh the view matrices.
    pub fn set_camera(&mut self, camera: &Camera) {
        self.camera = camera.clone();
        self.matrices = ViewMatrices::new(camera.view_matrix(), camera.projection_matrix());
        self.distant_matrices =
            ViewMatrices::new(camera.view_matrix(), camera.distant_projection_matrix());
        self.frustum = Frustum::from_view_projection(&self.matrices.view_projection);
    }

    /// The camera set for this frame.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Main view matrices for this frame.
    pub fn matrices(&self) -> &ViewMatrices {
        &self.matrices
    }

    /// Advance per-frame state: the clock and the shadow cascade alignment.
    ///
    /// `sun_direction` points from the ground toward the sun.
    pub fn prepare_frame(&mut self, elapsed_seconds: f64, sun_direction: Vec3) {
        self.elapsed = elapsed_seconds;
        if let Some(cascades) = &mut self.cascades {
            cascades.prepare(self.camera.location(), self.camera.forward(), sun_direction);
        }
    }

    /// Clock value passed to the last [`RenderFrame::prepare_frame`].
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// The shadow cascades, when dynamic shadows are enabled.
    pub fn cascades(&self) -> Option<&ShadowCascades> {
        self.cascades.as_ref()
    }

    /// Register an object for the main view and, if it casts shadows, the cascades.
    ///
    /// `transform` is relative to the center of `location.tile`; it is moved into
    /// render space here. The object is queued for the main view when it is in
    /// range (always, for an infinite `max_view_distance`) and in the field of
    /// view. Shadow casting is decided independently of main-view visibility.
    /// Returns whether the object was queued for the main view.
    ///
    /// # Panics
    ///
    /// Panics if a shadow caster uses a material that is not scenery, forest, or terrain.
    #[allow(clippy::too_many_arguments)]
    pub fn add_auto_primitive(
        &mut self,
        location: &WorldPosition,
        radius: f32,
        max_view_distance: f32,
        material: &Arc<dyn Material>,
        primitive: &Arc<dyn RenderPrimitive>,
        group: RenderPrimitiveGroup,
        transform: &Mat4,
        flags: ShapeFlags,
    ) -> bool {
        let camera_tile = self.camera.tile();
        let tile_offset = Vec3::new(
            (location.tile.x - camera_tile.x) as f32 * TILE_SIZE,
            0.0,
            (location.tile.z - camera_tile.z) as f32 * TILE_SIZE,
        );
        let render_location = location.location + tile_offset;
        let render_transform = Mat4::from_translation(tile_offset) * *transform;

        let in_range = max_view_distance.is_infinite()
            || self
                .camera
                .in_range(render_location, radius, max_view_distance);
        let visible = in_range && self.frustum.intersects_sphere(render_location, radius, true);
        if visible {
            self.add_primitive(material, primitive, group, render_transform, flags);
        } else {
            self.culled += 1;
        }

        if flags.contains(ShapeFlags::SHADOW_CASTER)
            && let Some(cascades) = &self.cascades
        {
            let kind = material.kind();
            assert!(
                kind.casts_shadows(),
                "material `{}` ({kind:?}) cannot be drawn into a shadow map",
                material.name()
            );
            for (index, casters) in self.casters.iter_mut().enumerate() {
                if !cascades.is_in_shadow_map(index, render_location, radius) {
                    continue;
                }
                let item = RenderItem {
                    material: Arc::clone(material),
                    primitive: Arc::clone(primitive),
                    transform: render_transform,
                    flags,
                };
                match kind {
                    MaterialKind::Forest => casters.forest.push(item),
                    MaterialKind::Terrain => casters.terrain.push(item),
                    _ => casters.scenery.push(item),
                }
            }
        }

        visible
    }

    /// Queue an item for the main view. `transform` is already in render space.
    ///
    /// Blended materials go to the group's blended sequence under the shared
    /// blended list. Blended scenery materials are queued a second time into
    /// the opaque sequence so their fully opaque texels fill the depth buffer
    /// before the blended pass.
    pub fn add_primitive(
        &mut self,
        material: &Arc<dyn Material>,
        primitive: &Arc<dyn RenderPrimitive>,
        group: RenderPrimitiveGroup,
        transform: Mat4,
        flags: ShapeFlags,
    ) {
        let item = RenderItem {
            material: Arc::clone(material),
            primitive: Arc::clone(primitive),
            transform,
            flags,
        };
        if material.blending() {
            let blended = RenderPrimitiveSequence::for_blended(group);
            if material.kind() == MaterialKind::Scenery {
                let opaque = RenderPrimitiveSequence::for_opaque(group);
                self.sequences[opaque.index()].push_opaque(item.clone());
            }
            self.sequences[blended.index()].blended.push(item);
        } else {
            let opaque = RenderPrimitiveSequence::for_opaque(group);
            self.sequences[opaque.index()].push_opaque(item);
        }
    }

    /// Order every blended list back-to-front.
    pub fn sort(&mut self) {
        let viewer = self.camera.location();
        for bucket in &mut self.sequences {
            if bucket.blended.len() > 1 {
                sort_back_to_front(&mut bucket.blended, viewer);
            }
        }
    }

    /// Submit the frame: shadow cascades, then distant mountains, then the main view.
    pub fn draw(&mut self, backend: &mut dyn FrameBackend) {
        let mut counters = DrawCounters::default();

        if let Some(cascades) = &self.cascades {
            for (index, casters) in self.casters.iter().enumerate() {
                let map = cascades.map(index);
                let matrices = ViewMatrices::new(map.light_view, map.light_projection);
                backend.begin_shadow_map(index);
                let material = self.shadow_material.as_ref();
                draw_shadow_pass(material, ShadowMapMode::Normal, &casters.scenery, &matrices, &mut counters);
                draw_shadow_pass(material, ShadowMapMode::Forest, &casters.forest, &matrices, &mut counters);
                draw_shadow_pass(material, ShadowMapMode::Normal, &casters.terrain, &matrices, &mut counters);
                draw_shadow_pass(material, ShadowMapMode::Blocker, &casters.terrain, &matrices, &mut counters);
                backend.end_shadow_map(index);
                if self.settings.shadow_map_blur {
                    backend.blur_shadow_map(index);
                }
            }
        }

        backend.begin_main();
        if self.settings.distant_mountains {
            self.draw_sequences(backend, Pass::Distant, &mut counters);
            backend.clear_depth();
        }
        self.draw_sequences(backend, Pass::Main, &mut counters);
        backend.end_main();

        self.state_changes = counters.state_changes;
        self.render_calls = counters.render_calls;
        log::trace!(
            "frame drawn: {} state changes, {} render calls",
            counters.state_changes,
            counters.render_calls
        );
    }

    fn draw_sequences(&self, backend: &mut dyn FrameBackend, pass: Pass, counters: &mut DrawCounters) {
        let distant_enabled = self.settings.distant_mountains;
        let include = |material: &dyn Material| match pass {
            Pass::Distant => material.kind().is_distant(),
            Pass::Main => !(distant_enabled && material.kind().is_distant()),
        };
        let matrices = match pass {
            Pass::Distant => &self.distant_matrices,
            Pass::Main => &self.matrices,
        };

        let mut previous: Option<Arc<dyn Material>> = None;
        for sequence in RenderPrimitiveSequence::ALL {
            let bucket = &self.sequences[sequence.index()];
            let mut started = false;

            for batch in &bucket.batches {
                if batch.items.is_empty() || !include(batch.material.as_ref()) {
                    continue;
                }
                if !started {
                    backend.begin_sequence(sequence, pass == Pass::Distant);
                    started = true;
                }
                draw_run(&batch.material, &batch.items, matrices, &mut previous, counters);
            }

            for run in MaterialRuns::new(&bucket.blended) {
                if !include(run.material.as_ref()) {
                    continue;
                }
                if !started {
                    backend.begin_sequence(sequence, pass == Pass::Distant);
                    started = true;
                }
                draw_run(run.material, run.items, matrices, &mut previous, counters);
            }
        }
    }

    /// Blended items of `sequence` in their current order.
    pub fn blended_items(&self, sequence: RenderPrimitiveSequence) -> &[RenderItem] {
        &self.sequences[sequence.index()].blended
    }

    /// Opaque items of `sequence` grouped by material, skipping empty materials.
    pub fn opaque_batches(
        &self,
        sequence: RenderPrimitiveSequence,
    ) -> impl Iterator<Item = (&Arc<dyn Material>, &[RenderItem])> {
        self.sequences[sequence.index()]
            .batches
            .iter()
            .filter(|b| !b.items.is_empty())
            .map(|b| (&b.material, b.items.as_slice()))
    }

    /// Materials currently known to `sequence`, including ones with no items this frame.
    pub fn material_count(&self, sequence: RenderPrimitiveSequence) -> usize {
        self.sequences[sequence.index()].batches.len()
    }

    /// Number of casters queued for cascade `cascade`.
    pub fn shadow_caster_count(&self, cascade: usize) -> usize {
        self.casters.get(cascade).map_or(0, ShadowCasters::len)
    }

    /// Statistics for the frame composed so far.
    pub fn stats(&self) -> FrameStats {
        let mut stats = FrameStats {
            shadow_items: self.casters.iter().map(ShadowCasters::len).collect(),
            culled: self.culled,
            state_changes: self.state_changes,
            render_calls: self.render_calls,
            ..FrameStats::default()
        };
        for (i, bucket) in self.sequences.iter().enumerate() {
            stats.opaque_items[i] = bucket.opaque_len();
            stats.blended_items[i] = bucket.blended.len();
        }
        stats
    }
}

#[derive(Default)]
struct DrawCounters {
    state_changes: usize,
    render_calls: usize,
}

fn draw_run(
    material: &Arc<dyn Material>,
    items: &[RenderItem],
    matrices: &ViewMatrices,
    previous: &mut Option<Arc<dyn Material>>,
    counters: &mut DrawCounters,
) {
    material.set_state(previous.as_deref());
    material.render(items, matrices);
    material.reset_state();
    counters.state_changes += 1;
    counters.render_calls += 1;
    *previous = Some(Arc::clone(material));
}

fn draw_shadow_pass(
    material: &dyn ShadowMapMaterial,
    mode: ShadowMapMode,
    items: &[RenderItem],
    matrices: &ViewMatrices,
    counters: &mut DrawCounters,
) {
    if items.is_empty() {
        return;
    }
    material.set_state(mode);
    material.render(items, matrices);
    material.reset_state();
    counters.state_changes += 1;
    counters.render_calls += 1;
}

/// Sort far-to-near by distance from `viewer`; items within
/// [`SORT_DISTANCE_EPSILON`] of the farthest item of their group are ordered
/// by ascending sort index.
///
/// Stable, so equal keys keep submission order and repeated sorts agree.
pub fn sort_back_to_front(items: &mut Vec<RenderItem>, viewer: Vec3) {
    let mut keyed: Vec<(f32, RenderItem)> = items
        .drain(..)
        .map(|item| ((item.location() - viewer).length(), item))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut start = 0;
    while start < keyed.len() {
        let mut end = start + 1;
        while end < keyed.len() && keyed[start].0 - keyed[end].0 < SORT_DISTANCE_EPSILON {
            end += 1;
        }
        if end - start > 1 {
            keyed[start..end].sort_by_key(|(_, item)| item.primitive.sort_index());
        }
        start = end;
    }

    items.extend(keyed.into_iter().map(|(_, item)| item));
}

/// A contiguous run of blended items sharing one material.
pub struct MaterialRun<'a> {
    pub material: &'a Arc<dyn Material>,
    pub items: &'a [RenderItem],
}

/// Splits a sorted blended list into runs of the same material.
pub struct MaterialRuns<'a> {
    items: &'a [RenderItem],
    cursor: usize,
}

impl<'a> MaterialRuns<'a> {
    pub fn new(items: &'a [RenderItem]) -> Self {
        Self { items, cursor: 0 }
    }
}

impl<'a> Iterator for MaterialRuns<'a> {
    type Item = MaterialRun<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.items.len() {
            return None;
        }

        let start = self.cursor;
        let id = self.items[start].material.id();
        while self.cursor < self.items.len() && self.items[self.cursor].material.id() == id {
            self.cursor += 1;
        }

        Some(MaterialRun {
            material: &self.items[start].material,
            items: &self.items[start..self.cursor],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DrawEvent, DrawLog, HeadlessMaterial, HeadlessShadowMapMaterial, RecordingBackend};
    use railview_coords::TileCoord;

    #[derive(Debug)]
    struct TestPrimitive {
        sort_index: i32,
    }

    impl RenderPrimitive for TestPrimitive {
        fn sort_index(&self) -> i32 {
            self.sort_index
        }
    }

    fn primitive(sort_index: i32) -> Arc<dyn RenderPrimitive> {
        Arc::new(TestPrimitive { sort_index })
    }

    fn material(log: &DrawLog, id: u64, name: &str, kind: MaterialKind, blending: bool) -> Arc<dyn Material> {
        Arc::new(HeadlessMaterial::new(MaterialId(id), name, kind, blending, log.clone()))
    }

    fn frame(log: &DrawLog, settings: FrameSettings) -> RenderFrame {
        let mut frame = RenderFrame::new(settings, Arc::new(HeadlessShadowMapMaterial::new(log.clone())));
        frame.set_camera(&Camera::default());
        frame.prepare_frame(0.0, Vec3::new(0.2, 1.0, 0.3));
        frame
    }

    fn no_shadows() -> FrameSettings {
        FrameSettings {
            dynamic_shadows: false,
            ..FrameSettings::default()
        }
    }

    fn at(x: f32, y: f32, z: f32) -> Mat4 {
        Mat4::from_translation(Vec3::new(x, y, z))
    }

    #[test]
    fn test_infinite_view_distance_always_enqueued() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let sky = material(&log, 1, "sky", MaterialKind::Other, false);
        for distance in [10.0f32, 5_000.0, 1.0e6] {
            let location = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, -distance));
            let queued = frame.add_auto_primitive(
                &location,
                1.0,
                f32::INFINITY,
                &sky,
                &primitive(0),
                RenderPrimitiveGroup::World,
                &Mat4::IDENTITY,
                ShapeFlags::empty(),
            );
            assert!(queued, "object at {distance} m was culled");
        }
        assert_eq!(frame.stats().opaque_items[RenderPrimitiveSequence::WorldOpaque.index()], 3);
    }

    #[test]
    fn test_finite_view_distance_culls_far_objects() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let m = material(&log, 1, "shape", MaterialKind::Scenery, false);
        let location = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, -900.0));
        assert!(!frame.add_auto_primitive(&location, 1.0, 500.0, &m, &primitive(0), RenderPrimitiveGroup::World, &Mat4::IDENTITY, ShapeFlags::empty()));
        let behind = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, 100.0));
        assert!(!frame.add_auto_primitive(&behind, 1.0, 500.0, &m, &primitive(0), RenderPrimitiveGroup::World, &Mat4::IDENTITY, ShapeFlags::empty()));
        assert_eq!(frame.stats().culled, 2);
    }

    #[test]
    fn test_auto_primitive_moves_transform_into_camera_tile() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let m = material(&log, 1, "shape", MaterialKind::Scenery, false);
        // Next tile to the north, 100 m past the boundary, straight ahead.
        let location = WorldPosition::new(TileCoord::new(0, -1), Vec3::new(0.0, 0.0, 924.0));
        assert!(frame.add_auto_primitive(&location, 5.0, 4000.0, &m, &primitive(0), RenderPrimitiveGroup::World, &at(0.0, 0.0, 924.0), ShapeFlags::empty()));
        let (_, items) = frame.opaque_batches(RenderPrimitiveSequence::WorldOpaque).next().unwrap();
        assert!((items[0].location() - Vec3::new(0.0, 0.0, -1124.0)).length() < 1e-3);
    }

    #[test]
    fn test_scenery_blended_is_also_queued_opaque() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let scenery = material(&log, 1, "glass", MaterialKind::Scenery, true);
        let particles = material(&log, 2, "smoke", MaterialKind::Other, true);
        frame.add_primitive(&scenery, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -10.0), ShapeFlags::empty());
        frame.add_primitive(&particles, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -20.0), ShapeFlags::empty());

        assert_eq!(frame.blended_items(RenderPrimitiveSequence::WorldBlended).len(), 2);
        let opaque: Vec<_> = frame.opaque_batches(RenderPrimitiveSequence::WorldOpaque).collect();
        assert_eq!(opaque.len(), 1);
        assert_eq!(opaque[0].0.name(), "glass");
    }

    #[test]
    fn test_sort_far_to_near() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let m = material(&log, 1, "smoke", MaterialKind::Other, true);
        for z in [-10.0, -30.0, -20.0] {
            frame.add_primitive(&m, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, z), ShapeFlags::empty());
        }
        frame.sort();
        let zs: Vec<f32> = frame
            .blended_items(RenderPrimitiveSequence::WorldBlended)
            .iter()
            .map(|i| i.location().z)
            .collect();
        assert_eq!(zs, vec![-30.0, -20.0, -10.0]);
    }

    #[test]
    fn test_sort_ties_broken_by_sort_index() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let a = material(&log, 1, "decal-a", MaterialKind::Other, true);
        let b = material(&log, 2, "decal-b", MaterialKind::Other, true);
        frame.add_primitive(&a, &primitive(1), RenderPrimitiveGroup::World, at(0.0, 0.0, -50.0), ShapeFlags::empty());
        frame.add_primitive(&b, &primitive(3), RenderPrimitiveGroup::World, at(0.0, 0.0, -50.0005), ShapeFlags::empty());
        frame.add_primitive(&a, &primitive(2), RenderPrimitiveGroup::World, at(0.0, 0.0, -50.0002), ShapeFlags::empty());
        frame.add_primitive(&b, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -80.0), ShapeFlags::empty());

        for _ in 0..3 {
            frame.sort();
            let order: Vec<i32> = frame
                .blended_items(RenderPrimitiveSequence::WorldBlended)
                .iter()
                .map(|i| i.primitive.sort_index())
                .collect();
            assert_eq!(order, vec![0, 1, 2, 3]);
        }
    }

    #[test]
    fn test_sort_groups_do_not_chain() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let a = material(&log, 1, "decal-a", MaterialKind::Other, true);
        // Each neighbour is within the tie distance, the outer two are not.
        frame.add_primitive(&a, &primitive(1), RenderPrimitiveGroup::World, at(0.0, 0.0, -60.0), ShapeFlags::empty());
        frame.add_primitive(&a, &primitive(3), RenderPrimitiveGroup::World, at(0.0, 0.0, -60.0008), ShapeFlags::empty());
        frame.add_primitive(&a, &primitive(5), RenderPrimitiveGroup::World, at(0.0, 0.0, -60.0016), ShapeFlags::empty());

        frame.sort();
        let order: Vec<i32> = frame
            .blended_items(RenderPrimitiveSequence::WorldBlended)
            .iter()
            .map(|i| i.primitive.sort_index())
            .collect();
        assert_eq!(order, vec![3, 5, 1]);
    }

    #[test]
    fn test_draw_follows_declared_sequence_order() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        // Submit in reverse order, one opaque and one blended item per group.
        for (i, group) in RenderPrimitiveGroup::ALL.iter().rev().enumerate() {
            let opaque = material(&log, i as u64 * 2, &format!("{group:?}-opaque"), MaterialKind::Other, false);
            let blended = material(&log, i as u64 * 2 + 1, &format!("{group:?}-blended"), MaterialKind::Other, true);
            frame.add_primitive(&opaque, &primitive(0), *group, at(0.0, 0.0, -10.0), ShapeFlags::empty());
            frame.add_primitive(&blended, &primitive(0), *group, at(0.0, 0.0, -10.0), ShapeFlags::empty());
        }
        frame.sort();
        let mut backend = RecordingBackend::new(log.clone());
        frame.draw(&mut backend);

        let sequences: Vec<RenderPrimitiveSequence> = log
            .snapshot()
            .iter()
            .filter_map(|e| match e {
                DrawEvent::BeginSequence { sequence, .. } => Some(*sequence),
                _ => None,
            })
            .collect();
        assert_eq!(sequences, RenderPrimitiveSequence::ALL.to_vec());
    }

    #[test]
    fn test_opaque_draws_once_per_material_and_blended_per_run() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let rock = material(&log, 1, "rock", MaterialKind::Other, false);
        let smoke = material(&log, 2, "smoke", MaterialKind::Other, true);
        let steam = material(&log, 3, "steam", MaterialKind::Other, true);
        for z in [-10.0, -20.0, -30.0] {
            frame.add_primitive(&rock, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, z), ShapeFlags::empty());
        }
        // Far-to-near: smoke, smoke, steam, smoke -> three runs.
        frame.add_primitive(&smoke, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -40.0), ShapeFlags::empty());
        frame.add_primitive(&smoke, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -35.0), ShapeFlags::empty());
        frame.add_primitive(&steam, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -25.0), ShapeFlags::empty());
        frame.add_primitive(&smoke, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -15.0), ShapeFlags::empty());
        frame.sort();
        frame.draw(&mut RecordingBackend::new(log.clone()));

        let renders: Vec<(String, usize)> = log
            .snapshot()
            .into_iter()
            .filter_map(|e| match e {
                DrawEvent::Render { material, items, .. } => Some((material, items)),
                _ => None,
            })
            .collect();
        assert_eq!(
            renders,
            vec![
                ("rock".to_string(), 3),
                ("smoke".to_string(), 2),
                ("steam".to_string(), 1),
                ("smoke".to_string(), 1),
            ]
        );
        assert_eq!(frame.stats().state_changes, 4);
    }

    #[test]
    fn test_set_state_receives_previous_material() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let a = material(&log, 1, "a", MaterialKind::Other, false);
        let b = material(&log, 2, "b", MaterialKind::Other, false);
        frame.add_primitive(&a, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        frame.add_primitive(&b, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        frame.draw(&mut RecordingBackend::new(log.clone()));

        let states: Vec<(String, Option<String>)> = log
            .snapshot()
            .into_iter()
            .filter_map(|e| match e {
                DrawEvent::SetState { material, previous } => Some((material, previous)),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![("a".to_string(), None), ("b".to_string(), Some("a".to_string()))]
        );
    }

    #[test]
    fn test_shadow_casters_queued_even_when_invisible() {
        let log = DrawLog::default();
        let mut frame = frame(&log, FrameSettings::default());
        let m = material(&log, 1, "building", MaterialKind::Scenery, false);
        // Behind the camera: not visible, but inside the widest cascade.
        let location = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, 4.0));
        let queued = frame.add_auto_primitive(&location, 1.0, 2000.0, &m, &primitive(0), RenderPrimitiveGroup::World, &at(0.0, 0.0, 4.0), ShapeFlags::SHADOW_CASTER);
        assert!(!queued);
        assert!(frame.shadow_caster_count(2) >= 1);
        assert!(frame.stats().shadow_items.iter().sum::<usize>() >= 1);
    }

    #[test]
    fn test_shadow_passes_precede_main_view() {
        let log = DrawLog::default();
        let settings = FrameSettings {
            shadow_map_blur: true,
            ..FrameSettings::default()
        };
        let mut frame = frame(&log, settings);
        let scenery = material(&log, 1, "house", MaterialKind::Scenery, false);
        let forest = material(&log, 2, "trees", MaterialKind::Forest, false);
        let terrain = material(&log, 3, "ground", MaterialKind::Terrain, false);
        let location = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, -5.0));
        for m in [&terrain, &forest, &scenery] {
            frame.add_auto_primitive(&location, 2.0, 2000.0, m, &primitive(0), RenderPrimitiveGroup::World, &at(0.0, 0.0, -5.0), ShapeFlags::SHADOW_CASTER);
        }
        frame.sort();
        frame.draw(&mut RecordingBackend::new(log.clone()));

        let events = log.snapshot();
        let modes: Vec<ShadowMapMode> = events
            .iter()
            .take_while(|e| !matches!(e, DrawEvent::EndShadowMap(0)))
            .filter_map(|e| match e {
                DrawEvent::ShadowRender { mode, .. } => Some(*mode),
                _ => None,
            })
            .collect();
        assert_eq!(
            modes,
            vec![
                ShadowMapMode::Normal,
                ShadowMapMode::Forest,
                ShadowMapMode::Normal,
                ShadowMapMode::Blocker
            ]
        );
        let begin_main = events.iter().position(|e| *e == DrawEvent::BeginMain).unwrap();
        let last_shadow = events
            .iter()
            .rposition(|e| matches!(e, DrawEvent::BlurShadowMap(_)))
            .unwrap();
        assert!(last_shadow < begin_main);
        assert!(events.contains(&DrawEvent::BlurShadowMap(0)));
    }

    #[test]
    #[should_panic(expected = "cannot be drawn into a shadow map")]
    fn test_non_caster_material_in_shadow_path_panics() {
        let log = DrawLog::default();
        let mut frame = frame(&log, FrameSettings::default());
        let label = material(&log, 1, "label", MaterialKind::Other, false);
        let location = WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 0.0, -5.0));
        frame.add_auto_primitive(&location, 1.0, 100.0, &label, &primitive(0), RenderPrimitiveGroup::Labels, &Mat4::IDENTITY, ShapeFlags::SHADOW_CASTER);
    }

    #[test]
    fn test_distant_pass_draws_first_then_clears_depth() {
        let log = DrawLog::default();
        let settings = FrameSettings {
            dynamic_shadows: false,
            distant_mountains: true,
            ..FrameSettings::default()
        };
        let mut frame = frame(&log, settings);
        let mountains = material(&log, 1, "mountains", MaterialKind::DistantMountain, false);
        let house = material(&log, 2, "house", MaterialKind::Scenery, false);
        frame.add_primitive(&house, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -10.0), ShapeFlags::empty());
        frame.add_primitive(&mountains, &primitive(0), RenderPrimitiveGroup::World, at(0.0, 0.0, -9000.0), ShapeFlags::empty());
        frame.draw(&mut RecordingBackend::new(log.clone()));

        let events = log.snapshot();
        let clear = events.iter().position(|e| *e == DrawEvent::ClearDepth).unwrap();
        let render_of = |name: &str| {
            events
                .iter()
                .position(|e| matches!(e, DrawEvent::Render { material, .. } if material == name))
                .unwrap()
        };
        assert!(render_of("mountains") < clear);
        assert!(render_of("house") > clear);
        let mountain_renders = events
            .iter()
            .filter(|e| matches!(e, DrawEvent::Render { material, .. } if material == "mountains"))
            .count();
        assert_eq!(mountain_renders, 1);
    }

    #[test]
    fn test_clear_evicts_one_stale_material_per_call() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        for id in 0..3 {
            let m = material(&log, id, &format!("m{id}"), MaterialKind::Other, false);
            frame.add_primitive(&m, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        }
        let seq = RenderPrimitiveSequence::WorldOpaque;
        assert_eq!(frame.material_count(seq), 3);
        frame.clear();
        assert_eq!(frame.material_count(seq), 3);
        frame.clear();
        assert_eq!(frame.material_count(seq), 2);
        frame.clear();
        frame.clear();
        assert_eq!(frame.material_count(seq), 0);
        assert_eq!(frame.stats().total_items(), 0);
    }

    #[test]
    fn test_reused_material_after_eviction_batches_correctly() {
        let log = DrawLog::default();
        let mut frame = frame(&log, no_shadows());
        let a = material(&log, 1, "a", MaterialKind::Other, false);
        let b = material(&log, 2, "b", MaterialKind::Other, false);
        frame.add_primitive(&a, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        frame.add_primitive(&b, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        frame.clear();
        frame.clear(); // evicts `a` (swap-removes), `b` moves into slot 0
        frame.add_primitive(&b, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        frame.add_primitive(&b, &primitive(0), RenderPrimitiveGroup::World, Mat4::IDENTITY, ShapeFlags::empty());
        let batches: Vec<_> = frame.opaque_batches(RenderPrimitiveSequence::WorldOpaque).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0.name(), "b");
        assert_eq!(batches[0].1.len(), 2);
    }
}
