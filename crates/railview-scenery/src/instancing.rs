//! Collapsing repeated static shapes into instanced draws.

use std::sync::Arc;

use glam::{Mat4, Vec3};
use railview_coords::{TileCoord, WorldPosition};
use railview_render::{MeshBuffer, RenderFrame, RenderPrimitive, RenderPrimitiveGroup, ShapeFlags};
use rustc_hash::FxHashMap;

use crate::context::SharedShape;
use crate::objects::{SceneryObject, StaticShape, tile_position};

/// Fewer copies than this are drawn one by one.
pub const MIN_INSTANCES: usize = 5;

/// A primitive drawn once per transform in a single call.
#[derive(Debug)]
pub struct InstancedPrimitive {
    inner: Arc<dyn RenderPrimitive>,
    transforms: Vec<Mat4>,
}

impl InstancedPrimitive {
    pub fn new(inner: Arc<dyn RenderPrimitive>, transforms: Vec<Mat4>) -> Self {
        Self { inner, transforms }
    }
}

impl RenderPrimitive for InstancedPrimitive {
    fn sort_index(&self) -> i32 {
        self.inner.sort_index()
    }

    fn mesh(&self) -> Option<&MeshBuffer> {
        self.inner.mesh()
    }

    fn instance_transforms(&self) -> &[Mat4] {
        &self.transforms
    }
}

/// Every copy of one shape on a tile, drawn as one instanced primitive per part.
///
/// Instance transforms are relative to the group center, which is what the
/// frame culls against.
#[derive(Debug)]
pub struct SharedStaticShapeInstance {
    shape: Arc<SharedShape>,
    location: WorldPosition,
    radius: f32,
    view_distance: f32,
    flags: ShapeFlags,
    parts: Vec<Arc<dyn RenderPrimitive>>,
    copies: usize,
}

impl SharedStaticShapeInstance {
    /// `None` when there are fewer than [`MIN_INSTANCES`] copies.
    ///
    /// All copies must use `shape` and sit on `tile`.
    pub fn new(shape: Arc<SharedShape>, tile: TileCoord, copies: &[StaticShape]) -> Option<Self> {
        if copies.len() < MIN_INSTANCES {
            return None;
        }
        let center = copies
            .iter()
            .map(|copy| copy.location().location)
            .sum::<Vec3>()
            / copies.len() as f32;
        let radius = copies
            .iter()
            .map(|copy| copy.location().location.distance(center))
            .fold(0.0_f32, f32::max)
            + shape.radius;
        let view_distance = copies
            .iter()
            .map(StaticShape::view_distance)
            .fold(0.0_f32, f32::max);
        let flags = copies
            .iter()
            .fold(ShapeFlags::empty(), |flags, copy| flags | copy.flags());

        let to_center = Mat4::from_translation(-center);
        let parts = shape
            .parts
            .iter()
            .map(|part| {
                let transforms = copies
                    .iter()
                    .map(|copy| to_center * copy.transform() * part.transform)
                    .collect();
                Arc::new(InstancedPrimitive::new(Arc::clone(&part.primitive), transforms))
                    as Arc<dyn RenderPrimitive>
            })
            .collect();

        Some(Self {
            shape,
            location: tile_position(tile, center),
            radius,
            view_distance,
            flags,
            parts,
            copies: copies.len(),
        })
    }

    pub fn instance_count(&self) -> usize {
        self.copies
    }

    pub fn location(&self) -> &WorldPosition {
        &self.location
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl SceneryObject for SharedStaticShapeInstance {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        let transform = Mat4::from_translation(self.location.location);
        for (part, primitive) in self.shape.parts.iter().zip(&self.parts) {
            frame.add_auto_primitive(
                &self.location,
                self.radius,
                self.view_distance,
                &part.material,
                primitive,
                RenderPrimitiveGroup::World,
                &transform,
                self.flags,
            );
        }
    }

    fn name(&self) -> &'static str {
        "instanced"
    }

    fn shape(&self) -> Option<&Arc<SharedShape>> {
        Some(&self.shape)
    }
}

/// Groups `statics` by shape path and collapses every group of at least
/// [`MIN_INSTANCES`] copies. Smaller groups come back as they were.
pub fn collapse_instances(
    tile: TileCoord,
    statics: Vec<StaticShape>,
) -> (Vec<StaticShape>, Vec<SharedStaticShapeInstance>) {
    let mut groups: FxHashMap<String, Vec<StaticShape>> = FxHashMap::default();
    for shape in statics {
        let path = shape.shape().map(|s| s.path.clone()).unwrap_or_default();
        groups.entry(path).or_default().push(shape);
    }
    let mut groups: Vec<_> = groups.into_iter().collect();
    groups.sort_by(|a, b| a.0.cmp(&b.0));

    let mut singles = Vec::new();
    let mut instances = Vec::new();
    for (_, copies) in groups {
        let shape = copies.first().and_then(|copy| copy.shape()).cloned();
        match shape.and_then(|shape| SharedStaticShapeInstance::new(shape, tile, &copies)) {
            Some(instance) => instances.push(instance),
            None => singles.extend(copies),
        }
    }
    (singles, instances)
}
