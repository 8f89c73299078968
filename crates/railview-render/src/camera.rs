//! Viewer camera: tile-relative position, matrices, and visibility queries.
//!
//! Render space is centered on the camera's tile. Everything submitted to the
//! frame is first moved into that space, so f32 precision stays good
//! regardless of where the camera is on the route.

use glam::{Mat4, Quat, Vec3};
use railview_coords::{TileCoord, WorldPosition};

use crate::frustum::Frustum;

/// A perspective camera positioned on the route.
#[derive(Debug, Clone)]
pub struct Camera {
    /// Tile and location within it.
    pub position: WorldPosition,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    /// Width / height.
    pub aspect_ratio: f32,
    /// Near clip plane distance.
    pub near: f32,
    /// Far clip plane distance; also the upper bound for [`Camera::in_range`].
    pub far: f32,
    /// Far clip plane used by the distant-mountain projection.
    pub distant_far: f32,
}

impl Camera {
    /// Creates a camera at `position` looking along `direction`.
    pub fn looking_at(position: WorldPosition, direction: Vec3) -> Self {
        Self {
            position: position.normalized(),
            rotation: rotation_looking_along(direction),
            ..Self::default()
        }
    }

    /// Tile the camera is on; the origin of render space.
    pub fn tile(&self) -> TileCoord {
        self.position.tile
    }

    /// Camera location in render space.
    pub fn location(&self) -> Vec3 {
        self.position.location
    }

    /// Converts a route position into render space.
    pub fn to_render_space(&self, position: &WorldPosition) -> Vec3 {
        position.relative_to(self.tile())
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.location(), self.forward(), self.up())
    }

    /// Reverse-Z perspective projection for the main view.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.far, self.near)
    }

    /// Reverse-Z projection reaching out to [`Camera::distant_far`].
    ///
    /// The near plane is pushed out with the far plane to keep depth precision usable.
    pub fn distant_projection_matrix(&self) -> Mat4 {
        let near = (self.distant_far / 10_000.0).max(self.near);
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.distant_far, near)
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// The right direction vector (+X in camera space).
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Update the aspect ratio.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        self.aspect_ratio = width / height.max(1.0);
    }

    /// Whether a sphere at `location` (render space) is within `max_distance`
    /// horizontally, also bounded by the far plane.
    pub fn in_range(&self, location: Vec3, radius: f32, max_distance: f32) -> bool {
        let limit = max_distance.min(self.far) + radius;
        let d = location - self.location();
        d.x * d.x + d.z * d.z < limit * limit
    }

    /// Whether a sphere at `location` (render space) overlaps the field of view.
    ///
    /// Ignores the far plane; distance is the job of [`Camera::in_range`].
    pub fn in_fov(&self, location: Vec3, radius: f32) -> bool {
        Frustum::from_view_projection(&self.view_projection_matrix())
            .intersects_sphere(location, radius, true)
    }
}

/// Rotation that turns -Z into `direction` while keeping +Y up.
pub fn rotation_looking_along(direction: Vec3) -> Quat {
    let forward = direction.normalize_or(Vec3::NEG_Z);
    let up = if forward.y.abs() > 0.999 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_to_rh(Vec3::ZERO, forward, up);
    Quat::from_mat4(&view.inverse()).normalize()
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: WorldPosition::default(),
            rotation: Quat::IDENTITY,
            fov_y: 45f32.to_radians(),
            aspect_ratio: 16.0 / 9.0,
            near: 0.5,
            far: 2000.0,
            distant_far: 40_000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_camera_looks_down_neg_z() {
        let camera = Camera::default();
        let forward = camera.forward();
        assert!((forward - Vec3::NEG_Z).length() < 1e-6);
    }

    #[test]
    fn test_looking_at_direction() {
        let camera = Camera::looking_at(WorldPosition::default(), Vec3::new(1.0, 0.0, 0.0));
        assert!((camera.forward() - Vec3::X).length() < 1e-4);
        assert!((camera.up() - Vec3::Y).length() < 1e-4);
    }

    #[test]
    fn test_view_matrix_inverse_is_camera_transform() {
        let camera = Camera {
            position: WorldPosition::new(TileCoord::new(3, 4), Vec3::new(10.0, 20.0, 30.0)),
            rotation: Quat::from_rotation_y(FRAC_PI_2),
            ..Camera::default()
        };
        let inv_view = camera.view_matrix().inverse();
        let reconstructed_pos = inv_view.col(3).truncate();
        assert!((reconstructed_pos - camera.location()).length() < 1e-4);
    }

    #[test]
    fn test_in_range_is_horizontal_and_capped_by_far() {
        let camera = Camera::default();
        assert!(camera.in_range(Vec3::new(0.0, 500.0, -100.0), 1.0, 200.0));
        assert!(!camera.in_range(Vec3::new(0.0, 0.0, -300.0), 1.0, 200.0));
        // max_distance beyond the far plane is clamped.
        assert!(!camera.in_range(Vec3::new(0.0, 0.0, -2500.0), 1.0, 10_000.0));
        assert!(camera.in_range(Vec3::new(0.0, 0.0, -1999.5), 1.0, 10_000.0));
    }

    #[test]
    fn test_in_fov() {
        let camera = Camera::default();
        assert!(camera.in_fov(Vec3::new(0.0, 0.0, -50.0), 1.0));
        assert!(!camera.in_fov(Vec3::new(0.0, 0.0, 50.0), 1.0));
        assert!(camera.in_fov(Vec3::new(0.0, 0.0, -30_000.0), 1.0));
    }

    #[test]
    fn test_render_space_relative_to_camera_tile() {
        let camera = Camera {
            position: WorldPosition::new(TileCoord::new(10, 10), Vec3::ZERO),
            ..Camera::default()
        };
        let other = WorldPosition::new(TileCoord::new(11, 9), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(camera.to_render_space(&other), Vec3::new(2049.0, 2.0, -2045.0));
    }
}
