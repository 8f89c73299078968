//! Render primitives and the per-frame render item tuple.

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use glam::{Mat4, Vec3};

use crate::buffer::MeshBuffer;
use crate::material::Material;

bitflags! {
    /// Per-shape rendering flags carried on every render item.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ShapeFlags: u32 {
        /// Apply a small depth bias (decals, transfers).
        const AUTO_Z_BIAS = 1 << 0;
        /// Shape can be picked by the user.
        const INTERACTIVE = 1 << 1;
        /// Shape is drawn into the shadow cascades.
        const SHADOW_CASTER = 1 << 2;
    }
}

/// Something a material knows how to draw.
pub trait RenderPrimitive: Send + Sync + fmt::Debug {
    /// Ordering among blended primitives at the same distance. Lower draws first.
    fn sort_index(&self) -> i32 {
        0
    }

    /// Geometry backing this primitive, if it has any.
    fn mesh(&self) -> Option<&MeshBuffer> {
        None
    }

    /// Extra per-copy transforms for instanced primitives.
    ///
    /// Instanced primitives are registered once; the item transform places the
    /// instance group and these are applied on top.
    fn instance_transforms(&self) -> &[Mat4] {
        &[]
    }
}

/// One draw request: immutable for the frame it was created in.
#[derive(Clone)]
pub struct RenderItem {
    pub material: Arc<dyn Material>,
    pub primitive: Arc<dyn RenderPrimitive>,
    /// Transform into camera-tile space.
    pub transform: Mat4,
    pub flags: ShapeFlags,
}

impl RenderItem {
    /// Translation part of the transform.
    pub fn location(&self) -> Vec3 {
        self.transform.w_axis.truncate()
    }
}

impl fmt::Debug for RenderItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderItem")
            .field("material", &self.material.name())
            .field("sort_index", &self.primitive.sort_index())
            .field("location", &self.location())
            .field("flags", &self.flags)
            .finish()
    }
}
