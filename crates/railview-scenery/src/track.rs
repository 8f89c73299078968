//! Procedurally built track and overhead wire.

use std::sync::Arc;

use glam::{EulerRot, Mat4};
use railview_coords::{TileCoord, WorldPosition};
use railview_render::{Material, MaterialKind, RenderFrame, RenderPrimitive, RenderPrimitiveGroup, ShapeFlags};
use railview_track::{DtrackData, SuperElevationBuilder, TrackMesh, TrackPose, WireBuilder};

use crate::context::{MeshPrimitive, SceneryContext};
use crate::error::SceneryObjectError;
use crate::objects::{SceneryObject, tile_position};
use crate::record::Placement;

/// Start pose of a section placed by `placement`.
pub fn section_pose(placement: &Placement) -> TrackPose {
    let (heading, _, _) = placement.rotation.to_euler(EulerRot::YXZ);
    TrackPose::new(placement.position, heading)
}

/// An uploaded mesh in tile-local coordinates.
#[derive(Debug)]
struct SectionMesh {
    location: WorldPosition,
    radius: f32,
    view_distance: f32,
    material: Arc<dyn Material>,
    primitive: Arc<dyn RenderPrimitive>,
    triangles: usize,
}

impl SectionMesh {
    fn new(
        mesh: TrackMesh,
        tile: TileCoord,
        material: Arc<dyn Material>,
        context: &SceneryContext,
        what: &'static str,
    ) -> Result<Self, SceneryObjectError> {
        if mesh.is_empty() {
            return Err(SceneryObjectError::EmptyGeometry { what });
        }
        let (center, radius) = mesh.bounding_sphere();
        let buffer = mesh.upload(context.allocator.as_ref(), what);
        Ok(Self {
            location: tile_position(tile, center),
            radius,
            view_distance: context.settings.viewing_distance,
            material,
            primitive: Arc::new(MeshPrimitive::new(buffer)),
            triangles: mesh.triangle_count(),
        })
    }

    fn prepare_frame(&self, frame: &mut RenderFrame, flags: ShapeFlags) {
        frame.add_auto_primitive(
            &self.location,
            self.radius,
            self.view_distance,
            &self.material,
            &self.primitive,
            RenderPrimitiveGroup::World,
            &Mat4::IDENTITY,
            flags,
        );
    }
}

/// Track swept along its subsections, banked through curves.
#[derive(Debug)]
pub struct SuperElevatedTrack {
    mesh: SectionMesh,
}

impl SuperElevatedTrack {
    pub fn new(
        tile: TileCoord,
        placement: &Placement,
        sections: &[DtrackData],
        context: &SceneryContext,
    ) -> Result<Self, SceneryObjectError> {
        let builder = SuperElevationBuilder::new(context.settings.track.clone());
        let mesh = builder.build(sections, section_pose(placement));
        let material = context.materials.material(MaterialKind::Scenery, "track", false);
        Ok(Self {
            mesh: SectionMesh::new(mesh, tile, material, context, "super-elevated track")?,
        })
    }

    pub fn location(&self) -> &WorldPosition {
        &self.mesh.location
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.triangles
    }
}

impl SceneryObject for SuperElevatedTrack {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        self.mesh.prepare_frame(frame, ShapeFlags::SHADOW_CASTER);
    }

    fn name(&self) -> &'static str {
        "super-elevated track"
    }
}

/// Overhead wire above a run of track.
#[derive(Debug)]
pub struct WireSpan {
    mesh: SectionMesh,
}

impl WireSpan {
    pub fn new(
        tile: TileCoord,
        placement: &Placement,
        sections: &[DtrackData],
        context: &SceneryContext,
    ) -> Result<Self, SceneryObjectError> {
        let builder = WireBuilder::new(context.settings.track.clone());
        let mesh = builder.build(sections, section_pose(placement));
        let material = context.materials.material(MaterialKind::Scenery, "overhead-wire", false);
        Ok(Self {
            mesh: SectionMesh::new(mesh, tile, material, context, "overhead wire")?,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.triangles
    }
}

impl SceneryObject for WireSpan {
    fn prepare_frame(&self, frame: &mut RenderFrame, _elapsed: f64) {
        self.mesh.prepare_frame(frame, ShapeFlags::empty());
    }

    fn name(&self) -> &'static str {
        "wire"
    }
}
