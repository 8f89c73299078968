//! Streaming of terrain tiles around the camera.

use std::sync::Arc;

use glam::Mat4;
use railview_coords::{CancelFlag, Published, TileCoord, aligned_tile_ring, tile_radius, tile_ring};
use railview_render::{
    BufferAllocator, Material, MaterialKind, MaterialLibrary, RenderFrame, RenderPrimitive,
    RenderPrimitiveGroup, ShapeFlags,
};
use tracing::{debug, warn};

use crate::cache::DEFAULT_TILE_CACHE_CAPACITY;
use crate::manager::TileManager;
use crate::primitive::{SharedPatchIndices, TerrainPrimitive, WaterPrimitive};
use crate::source::TileSource;
use crate::tile::{Tile, TileSizes};

/// Grid the distant-mountain tile set is aligned to, in route tiles.
const DISTANT_ALIGNMENT: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSettings {
    pub viewing_distance: f32,
    pub far_viewing_distance: f32,
    pub distant_mountains: bool,
    pub tile_cache_capacity: usize,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            viewing_distance: 2000.0,
            far_viewing_distance: 40_000.0,
            distant_mountains: false,
            tile_cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
        }
    }
}

/// What one streaming pass changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TerrainLoadReport {
    pub loaded: usize,
    pub reused: usize,
    pub dropped: usize,
    pub cancelled: bool,
}

impl TerrainLoadReport {
    fn add(&mut self, other: TerrainLoadReport) {
        self.loaded += other.loaded;
        self.reused += other.reused;
        self.dropped += other.dropped;
        self.cancelled |= other.cancelled;
    }
}

/// A loaded tile with its patch geometry.
///
/// All buffers are built before the tile is published; dropping the last
/// reference releases them.
#[derive(Debug)]
pub struct TerrainTile {
    tile: Arc<Tile>,
    patches: Vec<Option<Arc<TerrainPrimitive>>>,
    water: Option<Arc<WaterPrimitive>>,
    material: Arc<dyn Material>,
    water_material: Arc<dyn Material>,
    distant: bool,
}

impl TerrainTile {
    pub fn new(
        tile: Arc<Tile>,
        manager: &TileManager,
        shared: &SharedPatchIndices,
        allocator: &dyn BufferAllocator,
        materials: &dyn MaterialLibrary,
        distant: bool,
    ) -> Self {
        let per_side = tile.patches_per_side();
        let mut patches = Vec::with_capacity(per_side * per_side);
        for pz in 0..per_side {
            for px in 0..per_side {
                let patch = tile
                    .is_patch_enabled(px, pz)
                    .then(|| TerrainPrimitive::new(manager, &tile, px, pz, shared, allocator))
                    .flatten()
                    .map(Arc::new);
                patches.push(patch);
            }
        }

        let water = if distant {
            None
        } else {
            tile.water_level()
                .map(|level| Arc::new(WaterPrimitive::new(&tile, level, allocator)))
        };
        let material = if distant {
            materials.material(MaterialKind::DistantMountain, "distant-mountains", false)
        } else {
            materials.material(MaterialKind::Terrain, "terrain", false)
        };

        Self {
            tile,
            patches,
            water,
            material,
            water_material: materials.material(MaterialKind::Other, "water", true),
            distant,
        }
    }

    pub fn tile(&self) -> &Arc<Tile> {
        &self.tile
    }

    pub fn patch(&self, px: usize, pz: usize) -> Option<&Arc<TerrainPrimitive>> {
        let per_side = self.tile.patches_per_side();
        if px >= per_side || pz >= per_side {
            return None;
        }
        self.patches[pz * per_side + px].as_ref()
    }

    /// Patches with geometry.
    pub fn patch_count(&self) -> usize {
        self.patches.iter().flatten().count()
    }

    pub fn water(&self) -> Option<&Arc<WaterPrimitive>> {
        self.water.as_ref()
    }

    pub fn is_distant(&self) -> bool {
        self.distant
    }

    /// Registers every patch and the water surface with `frame`.
    pub fn prepare_frame(&self, frame: &mut RenderFrame, max_view_distance: f32) {
        let flags = if self.distant {
            ShapeFlags::empty()
        } else {
            ShapeFlags::SHADOW_CASTER
        };
        for patch in self.patches.iter().flatten() {
            let primitive: Arc<dyn RenderPrimitive> = Arc::clone(patch) as Arc<dyn RenderPrimitive>;
            frame.add_auto_primitive(
                patch.center(),
                patch.radius(),
                max_view_distance,
                &self.material,
                &primitive,
                RenderPrimitiveGroup::World,
                &Mat4::from_translation(patch.center().location),
                flags,
            );
        }
        if let Some(water) = &self.water {
            let primitive: Arc<dyn RenderPrimitive> = Arc::clone(water) as Arc<dyn RenderPrimitive>;
            frame.add_auto_primitive(
                water.center(),
                water.radius(),
                max_view_distance,
                &self.water_material,
                &primitive,
                RenderPrimitiveGroup::World,
                &Mat4::from_translation(water.center().location),
                ShapeFlags::empty(),
            );
        }
    }
}

/// Keeps the dense and distant terrain tile sets in step with the camera.
///
/// [`load`](Self::load) runs on the loader thread; the render thread reads the
/// published tile lists in [`prepare_frame`](Self::prepare_frame).
pub struct TerrainStreamer {
    settings: TerrainSettings,
    manager: Arc<TileManager>,
    distant_manager: Option<Arc<TileManager>>,
    allocator: Arc<dyn BufferAllocator>,
    materials: Arc<dyn MaterialLibrary>,
    shared_indices: SharedPatchIndices,
    tiles: Published<Vec<Arc<TerrainTile>>>,
    distant_tiles: Published<Vec<Arc<TerrainTile>>>,
}

impl TerrainStreamer {
    pub fn new(
        settings: TerrainSettings,
        source: Arc<dyn TileSource>,
        allocator: Arc<dyn BufferAllocator>,
        materials: Arc<dyn MaterialLibrary>,
    ) -> Self {
        let manager = Arc::new(TileManager::new(
            Arc::clone(&source),
            TileSizes::HiRes,
            settings.tile_cache_capacity,
        ));
        let distant_manager = settings.distant_mountains.then(|| {
            Arc::new(TileManager::new(source, TileSizes::LoRes, settings.tile_cache_capacity))
        });
        let shared_indices = SharedPatchIndices::new(allocator.as_ref());
        Self {
            settings,
            manager,
            distant_manager,
            allocator,
            materials,
            shared_indices,
            tiles: Published::new(Vec::new()),
            distant_tiles: Published::new(Vec::new()),
        }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Dense tile manager, for elevation queries.
    pub fn tile_manager(&self) -> &Arc<TileManager> {
        &self.manager
    }

    pub fn tiles(&self) -> Arc<Vec<Arc<TerrainTile>>> {
        self.tiles.load()
    }

    pub fn distant_tiles(&self) -> Arc<Vec<Arc<TerrainTile>>> {
        self.distant_tiles.load()
    }

    /// Brings both tile sets in line with a camera on `camera_tile`.
    pub fn load(&self, camera_tile: TileCoord, cancel: &CancelFlag) -> TerrainLoadReport {
        let ring = tile_ring(camera_tile, tile_radius(self.settings.viewing_distance));
        let mut report = self.load_set(&self.manager, &self.tiles, &ring, camera_tile, false, cancel);

        if let Some(distant) = &self.distant_manager
            && !report.cancelled
        {
            let ring = aligned_tile_ring(
                camera_tile,
                tile_radius(self.settings.far_viewing_distance),
                DISTANT_ALIGNMENT,
            );
            report.add(self.load_set(distant, &self.distant_tiles, &ring, camera_tile, true, cancel));
        }

        if report.loaded > 0 || report.dropped > 0 {
            debug!(
                "Terrain around {camera_tile:?}: {} loaded, {} reused, {} dropped",
                report.loaded, report.reused, report.dropped
            );
        }
        report
    }

    fn load_set(
        &self,
        manager: &TileManager,
        published: &Published<Vec<Arc<TerrainTile>>>,
        ring: &[TileCoord],
        camera_tile: TileCoord,
        distant: bool,
        cancel: &CancelFlag,
    ) -> TerrainLoadReport {
        let current = published.load();
        let mut next: Vec<Arc<TerrainTile>> = Vec::with_capacity(ring.len());
        let mut report = TerrainLoadReport::default();

        for &coord in ring {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            if next.iter().any(|t| t.tile().contains(coord)) {
                continue;
            }
            let visible = !distant && coord.chebyshev(camera_tile) <= 1;
            let tile = match manager.load(coord, visible) {
                Ok(Some(tile)) => tile,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to load terrain for {coord:?}: {e}");
                    continue;
                }
            };
            let same = |t: &&Arc<TerrainTile>| {
                t.tile().coord() == tile.coord() && t.tile().size() == tile.size()
            };
            if let Some(existing) = current.iter().find(same) {
                next.push(Arc::clone(existing));
                report.reused += 1;
            } else {
                next.push(Arc::new(TerrainTile::new(
                    tile,
                    manager,
                    &self.shared_indices,
                    self.allocator.as_ref(),
                    self.materials.as_ref(),
                    distant,
                )));
                report.loaded += 1;
            }
        }

        // A cancelled pass drops nothing it did not get to look at.
        for tile in current.iter() {
            if !next.iter().any(|t| Arc::ptr_eq(t, tile)) {
                if report.cancelled {
                    next.push(Arc::clone(tile));
                } else {
                    report.dropped += 1;
                }
            }
        }

        published.publish(next);
        report
    }

    /// Registers the dense and distant tiles with `frame`.
    pub fn prepare_frame(&self, frame: &mut RenderFrame) {
        for tile in self.tiles.load().iter() {
            tile.prepare_frame(frame, self.settings.viewing_distance);
        }
        // Distant tiles are clipped by the distant projection, not the main range.
        for tile in self.distant_tiles.load().iter() {
            tile.prepare_frame(frame, f32::INFINITY);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{GeneratedTileSource, MemoryTileSource};
    use crate::tile::TileData;
    use glam::Vec3;
    use railview_coords::WorldPosition;
    use railview_render::{
        Camera, DrawLog, FrameSettings, HeadlessMaterialLibrary, HeadlessShadowMapMaterial,
        HostBufferAllocator, RenderPrimitiveSequence,
    };

    fn generated() -> Arc<dyn TileSource> {
        Arc::new(GeneratedTileSource {
            sample_count: 16,
            ..GeneratedTileSource::default()
        })
    }

    fn streamer(settings: TerrainSettings, source: Arc<dyn TileSource>, log: &DrawLog) -> TerrainStreamer {
        TerrainStreamer::new(
            settings,
            source,
            Arc::new(HostBufferAllocator),
            Arc::new(HeadlessMaterialLibrary::new(log.clone())),
        )
    }

    fn one_tile_radius() -> TerrainSettings {
        TerrainSettings {
            viewing_distance: 2000.0,
            ..TerrainSettings::default()
        }
    }

    #[test]
    fn test_initial_load_fills_ring() {
        let log = DrawLog::default();
        let streamer = streamer(one_tile_radius(), generated(), &log);
        let report = streamer.load(TileCoord::new(0, 0), &CancelFlag::new());
        assert_eq!(report.loaded, 9);
        assert_eq!(streamer.tiles().len(), 9);
        assert!(streamer.tiles().iter().all(|t| t.patch_count() == 1));
    }

    #[test]
    fn test_one_tile_step_churn() {
        let log = DrawLog::default();
        let streamer = streamer(one_tile_radius(), generated(), &log);
        streamer.load(TileCoord::new(0, 0), &CancelFlag::new());
        let before = streamer.tiles();

        let report = streamer.load(TileCoord::new(1, 0), &CancelFlag::new());
        assert_eq!(report.loaded, 3);
        assert_eq!(report.reused, 6);
        assert_eq!(report.dropped, 3);

        let after = streamer.tiles();
        for tile in after.iter() {
            let x = tile.tile().coord().x;
            assert!((0..=2).contains(&x));
            let kept = before.iter().any(|b| Arc::ptr_eq(b, tile));
            assert_eq!(kept, x <= 1, "tile {:?}", tile.tile().coord());
        }
    }

    #[test]
    fn test_cancelled_pass_keeps_loaded_tiles() {
        let log = DrawLog::default();
        let streamer = streamer(one_tile_radius(), generated(), &log);
        streamer.load(TileCoord::new(0, 0), &CancelFlag::new());

        let cancel = CancelFlag::new();
        cancel.cancel();
        let report = streamer.load(TileCoord::new(5, 5), &cancel);
        assert!(report.cancelled);
        assert_eq!(report.loaded, 0);
        assert_eq!(report.dropped, 0);
        assert_eq!(streamer.tiles().len(), 9);
    }

    #[test]
    fn test_double_size_tiles_are_shared_by_ring() {
        let source = MemoryTileSource::new();
        for x in [-2, 0] {
            for z in [-2, 0] {
                source.insert(TileCoord::new(x, z), 2, TileData::flat(32, 1.0));
            }
        }
        let log = DrawLog::default();
        let streamer = streamer(one_tile_radius(), Arc::new(source), &log);
        let report = streamer.load(TileCoord::new(0, 0), &CancelFlag::new());
        // The 3×3 ring around (0, 0) touches all four 2×2 tiles.
        assert_eq!(report.loaded, 4);
        assert_eq!(streamer.tiles().iter().map(|t| t.patch_count()).sum::<usize>(), 16);
    }

    #[test]
    fn test_distant_ring_on_coarse_grid() {
        let log = DrawLog::default();
        let settings = TerrainSettings {
            distant_mountains: true,
            far_viewing_distance: 20_000.0,
            ..one_tile_radius()
        };
        let streamer = streamer(settings, generated(), &log);
        streamer.load(TileCoord::new(3, 3), &CancelFlag::new());
        let distant = streamer.distant_tiles();
        // Ten tiles rounds up to two 8-tile steps each way.
        assert_eq!(distant.len(), 25);
        assert!(distant.iter().all(|t| t.is_distant() && t.tile().size() == 8));
        assert!(distant.iter().all(|t| t.tile().coord().x % 8 == 0));
    }

    #[test]
    fn test_prepare_frame_registers_terrain_and_water() {
        let source = MemoryTileSource::new();
        let mut data = TileData::flat(16, 0.0);
        data.water_level = Some(-1.0);
        source.insert(TileCoord::new(0, 0), 1, data);
        let log = DrawLog::default();
        let streamer = streamer(one_tile_radius(), Arc::new(source), &log);
        streamer.load(TileCoord::new(0, 0), &CancelFlag::new());

        let mut frame = RenderFrame::new(
            FrameSettings::default(),
            Arc::new(HeadlessShadowMapMaterial::new(log.clone())),
        );
        let camera = Camera::looking_at(
            WorldPosition::new(TileCoord::new(0, 0), Vec3::new(0.0, 50.0, 600.0)),
            Vec3::new(0.0, -0.3, -1.0),
        );
        frame.set_camera(&camera);
        frame.prepare_frame(0.0, Vec3::new(0.3, 1.0, 0.2));
        streamer.prepare_frame(&mut frame);

        let opaque: Vec<_> = frame.opaque_batches(RenderPrimitiveSequence::WorldOpaque).collect();
        assert_eq!(opaque.len(), 1);
        assert_eq!(opaque[0].0.kind(), MaterialKind::Terrain);
        assert_eq!(frame.blended_items(RenderPrimitiveSequence::WorldBlended).len(), 1);
        assert!((0..3).any(|cascade| frame.shadow_caster_count(cascade) > 0));
    }
}
