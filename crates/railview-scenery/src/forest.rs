//! Forest patches: trees scattered over a rectangle and set on the ground.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use railview_coords::{TileCoord, WorldPosition};
use railview_render::{Material, MaterialKind, RenderFrame, RenderPrimitive, RenderPrimitiveGroup, ShapeFlags};
use railview_terrain::TileManager;
use railview_track::TrackMesh;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::context::{MeshPrimitive, SceneryContext};
use crate::error::SceneryObjectError;
use crate::objects::{SceneryObject, tile_position};
use crate::record::Placement;

/// Tree sizes vary by this much either way.
const SIZE_JITTER: f32 = 0.2;

fn scatter_seed(tile: TileCoord, uid: u32) -> u64 {
    let x = tile.x as u32 as u64;
    let z = tile.z as u32 as u64;
    (x << 40) ^ (z << 20) ^ u64::from(uid)
}

/// Tile-local tree positions for a forest placement, ground-clamped when
/// `terrain` is available.
///
/// The scatter only depends on the tile, uid and area, so a patch looks the
/// same every time its tile is streamed in.
pub fn scatter_trees(
    tile: TileCoord,
    placement: &Placement,
    area: Vec2,
    population: u32,
    terrain: Option<&TileManager>,
) -> Vec<Vec3> {
    let mut rng = ChaCha8Rng::seed_from_u64(scatter_seed(tile, placement.uid));
    let half = area * 0.5;
    (0..population)
        .map(|_| {
            let local = Vec3::new(
                rng.random_range(-half.x..=half.x),
                0.0,
                rng.random_range(-half.y..=half.y),
            );
            let mut position = placement.position + placement.rotation * local;
            if let Some(terrain) = terrain {
                position.y = terrain.get_elevation(&WorldPosition::new(tile, position));
            }
            position
        })
        .collect()
}

/// A forest drawn as one mesh of crossed tree billboards.
#[derive(Debug)]
pub struct ForestPatch {
    location: WorldPosition,
    radius: f32,
    view_distance: f32,
    trees: usize,
    material: Arc<dyn Material>,
    primitive: Arc<dyn RenderPrimitive>,
}

impl ForestPatch {
    pub fn new(
        tile: TileCoord,
        placement: &Placement,
        texture: &str,
        area: Vec2,
        population: u32,
        tree_size: Vec2,
        context: &SceneryContext,
    ) -> Result<Self, SceneryObjectError> {
        if population == 0 || tree_size.x <= 0.0 || tree_size.y <= 0.0 {
            return Err(SceneryObjectError::EmptyGeometry { what: "forest" });
        }
        let positions = scatter_trees(tile, placement, area, population, context.terrain.as_deref());

        let mut rng = ChaCha8Rng::seed_from_u64(!scatter_seed(tile, placement.uid));
        let mut mesh = TrackMesh::default();
        for position in &positions {
            let scale = rng.random_range(1.0 - SIZE_JITTER..=1.0 + SIZE_JITTER);
            append_tree(&mut mesh, *position, tree_size * scale);
        }
        let (center, radius) = mesh.bounding_sphere();
        let buffer = mesh.upload(context.allocator.as_ref(), texture);
        debug!("Forest {} on {tile:?}: {} trees", placement.uid, positions.len());

        Ok(Self {
            location: tile_position(tile, center),
            radius,
            view_distance: placement.view_distance.unwrap_or(context.settings.viewing_distance),
            trees: positions.len(),
            material: context.materials.material(MaterialKind::Forest, texture, false),
            primitive: Arc::new(MeshPrimitive::new(buffer)),
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees
    }

    pub fn location(&self) -> &WorldPosition {
        &self.location
    }
}

/// Two upright quads crossed at right angles, standing on `base`.
fn append_tree(mesh: &mut TrackMesh, base: Vec3, size: Vec2) {
    let (hw, h) = (size.x * 0.5, size.y);
    mesh.append_quad(
        [
            base + Vec3::new(-hw, h, 0.0),
            base + Vec3::new(hw, h, 0.0),
            base + Vec3::new(hw, 0.0, 0.0),
            base + Vec3::new(-hw, 0.0, 0.0),
        ],
        Vec3::Z,
    );
    mesh.append_quad(
        [
            base + Vec3::new(0.0, h, hw),
            base + Vec3::new(0.0, h, -hw),
            base + Vec3::new(0.0, 0.0, -hw),
            base + Vec3::new(0.0, 0.0, hw),
        ],
        Vec3::X,
    );
}

impl SceneryObject for ForestPatch {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        frame.add_auto_primitive(
            &self.location,
            self.radius,
            self.view_distance,
            &self.material,
            &self.primitive,
            RenderPrimitiveGroup::World,
            &Mat4::IDENTITY,
            ShapeFlags::SHADOW_CASTER,
        );
    }

    fn name(&self) -> &'static str {
        "forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::tests::{context, frame};
    use railview_render::{DrawLog, RenderPrimitiveSequence};
    use railview_terrain::{MemoryTileSource, TileData, TileSizes};

    fn placement() -> Placement {
        Placement::new(21, Vec3::new(100.0, 3.0, -50.0))
    }

    #[test]
    fn test_scatter_is_deterministic_and_inside_area() {
        let tile = TileCoord::new(4, -2);
        let area = Vec2::new(40.0, 20.0);
        let a = scatter_trees(tile, &placement(), area, 30, None);
        let b = scatter_trees(tile, &placement(), area, 30, None);
        assert_eq!(a, b);
        assert_eq!(a.len(), 30);
        for tree in &a {
            assert!((tree.x - 100.0).abs() <= 20.0);
            assert!((tree.z + 50.0).abs() <= 10.0);
            assert_eq!(tree.y, 3.0);
        }
        let other = scatter_trees(TileCoord::new(5, -2), &placement(), area, 30, None);
        assert_ne!(a, other);
    }

    #[test]
    fn test_trees_sit_on_terrain() {
        let source = MemoryTileSource::new();
        source.insert(TileCoord::new(0, 0), 1, TileData::flat(16, 42.0));
        let manager = TileManager::new(Arc::new(source), TileSizes::HiRes, 4);
        manager.load(TileCoord::new(0, 0), true).unwrap();

        let trees = scatter_trees(TileCoord::new(0, 0), &placement(), Vec2::splat(10.0), 5, Some(&manager));
        assert!(trees.iter().all(|t| (t.y - 42.0).abs() < 1e-4));
    }

    #[test]
    fn test_forest_patch_builds_crossed_quads() {
        let log = DrawLog::default();
        let context = context(&log);
        let forest = ForestPatch::new(
            TileCoord::new(0, 0),
            &Placement::new(2, Vec3::new(0.0, 0.0, -30.0)),
            "trees.ace",
            Vec2::new(30.0, 30.0),
            12,
            Vec2::new(4.0, 8.0),
            &context,
        )
        .unwrap();
        assert_eq!(forest.tree_count(), 12);

        let mut frame = frame(&log);
        forest.prepare_frame(&mut frame, 0.0);
        let batches: Vec<_> = frame.opaque_batches(RenderPrimitiveSequence::WorldOpaque).collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0.kind(), MaterialKind::Forest);
        let mesh = batches[0].1[0].primitive.mesh().unwrap();
        assert_eq!(mesh.triangle_count(), 12 * 4);

        assert!(matches!(
            ForestPatch::new(TileCoord::new(0, 0), &placement(), "t", Vec2::ONE, 0, Vec2::ONE, &context),
            Err(SceneryObjectError::EmptyGeometry { .. })
        ));
    }
}
