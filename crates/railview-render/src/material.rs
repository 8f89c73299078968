//! Material contracts used by the frame composer.
//!
//! A material owns shader state. The composer brackets every run of items that
//! share a material with `set_state` → `render` → `reset_state`, passing the
//! previously active material so redundant blend-state changes can be skipped.

use std::fmt;
use std::sync::Arc;

use glam::Mat4;

/// Stable identity of a material, used as the opaque batching key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u64);

/// Opaque handle to a texture owned by the material system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Broad material family. The composer only cares about the families that
/// need special handling in the shadow and distant-mountain passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    /// Shapes and track: shadow caster, queued again as opaque when blended.
    Scenery,
    /// Alpha-cutout foliage: shadow caster with its own shadow mode.
    Forest,
    /// Terrain patches: shadow caster and blocker.
    Terrain,
    /// Low resolution terrain drawn under the wide projection.
    DistantMountain,
    /// Sky dome, sun, moon and clouds.
    Sky,
    /// Everything else (labels, lights, particles, overlays).
    Other,
}

impl MaterialKind {
    /// Whether items of this kind may be drawn into a shadow map.
    pub const fn casts_shadows(self) -> bool {
        matches!(self, Self::Scenery | Self::Forest | Self::Terrain)
    }

    /// Whether this kind belongs to the distant-mountain pass.
    pub const fn is_distant(self) -> bool {
        matches!(self, Self::DistantMountain | Self::Sky)
    }
}

/// View, projection, and combined matrices for one pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewMatrices {
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
}

impl ViewMatrices {
    /// Builds the set from a view and projection.
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
        }
    }
}

impl Default for ViewMatrices {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// A renderable material.
pub trait Material: Send + Sync + fmt::Debug {
    /// Batching identity.
    fn id(&self) -> MaterialId;

    /// Human readable name for logs.
    fn name(&self) -> &str;

    /// Material family.
    fn kind(&self) -> MaterialKind;

    /// Whether items drawn with this material are alpha blended.
    fn blending(&self) -> bool;

    /// Bind shader state. `previous` is the material that was active before.
    fn set_state(&self, previous: Option<&dyn Material>);

    /// Draw `items`, all of which use this material.
    fn render(&self, items: &[crate::RenderItem], matrices: &ViewMatrices);

    /// Undo any state `set_state` changed that the next material may not expect.
    fn reset_state(&self);

    /// Texture sampled by the shadow pass for alpha-tested casters.
    fn shadow_texture(&self) -> Option<TextureId> {
        None
    }
}

/// Which shadow shader variant to bind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShadowMapMode {
    /// Opaque scenery casters and terrain.
    Normal,
    /// Alpha-cutout foliage.
    Forest,
    /// Terrain drawn back-face only to stop light leaking under the ground.
    Blocker,
}

/// The single material used for every shadow-cascade draw.
pub trait ShadowMapMaterial: Send + Sync + fmt::Debug {
    /// Bind the variant for `mode`.
    fn set_state(&self, mode: ShadowMapMode);

    /// Draw casters into the currently bound cascade.
    fn render(&self, items: &[crate::RenderItem], matrices: &ViewMatrices);

    /// Release the variant state.
    fn reset_state(&self);
}

/// Owns and deduplicates materials for the lifetime of a renderer.
///
/// Requesting the same `(kind, name, blending)` twice returns the same
/// material, so batching by [`MaterialId`] works across objects.
pub trait MaterialLibrary: Send + Sync {
    fn material(&self, kind: MaterialKind, name: &str, blending: bool) -> Arc<dyn Material>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadow_caster_kinds() {
        assert!(MaterialKind::Scenery.casts_shadows());
        assert!(MaterialKind::Forest.casts_shadows());
        assert!(MaterialKind::Terrain.casts_shadows());
        assert!(!MaterialKind::DistantMountain.casts_shadows());
        assert!(!MaterialKind::Sky.casts_shadows());
        assert!(!MaterialKind::Other.casts_shadows());
    }

    #[test]
    fn test_view_matrices_combined() {
        let view = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let projection = Mat4::from_scale(glam::Vec3::splat(2.0));
        let m = ViewMatrices::new(view, projection);
        assert_eq!(m.view_projection, projection * view);
    }
}
