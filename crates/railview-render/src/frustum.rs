//! View frustum planes and bounding-volume tests in camera-tile space.

use glam::{Mat4, Vec3, Vec4};

/// Plane indices into the frustum planes array.
const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// An axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    /// Minimum corner of the bounding box.
    pub min: Vec3,
    /// Maximum corner of the bounding box.
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB from min and max corners.
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Returns the center point of the AABB.
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Returns the half-extents (half-size along each axis).
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Radius of the sphere that encloses the box.
    pub fn bounding_radius(&self) -> f32 {
        self.extents().length()
    }
}

/// A view frustum defined by six inward-pointing planes extracted from
/// the view-projection matrix.
#[derive(Clone, Debug)]
pub struct Frustum {
    /// Six planes: left, right, bottom, top, near, far.
    /// Each `Vec4(a, b, c, d)` where `(a,b,c)` is the normalized inward
    /// normal and `d` is the signed distance term.
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract frustum planes from a combined reverse-Z view-projection matrix
    /// using the Griggs-Hartmann method.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [Vec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Reverse-Z: near maps to z=1 and far to z=0.
        planes[NEAR] = rows[3] - rows[2];
        planes[FAR] = rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Test whether an AABB is at least partially inside the frustum.
    ///
    /// Uses the p-vertex method: for each plane, find the corner of the AABB
    /// furthest along the plane normal. If that corner is behind the plane, the
    /// entire AABB is outside. Conservative near the frustum corners.
    pub fn is_visible(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();
            let p = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);
            if normal.dot(p) + plane.w < 0.0 {
                return false;
            }
        }
        true
    }

    /// Test whether a sphere touches the frustum.
    ///
    /// With `ignore_far` the far plane is skipped, so distance culling can be
    /// left to a separate range check.
    pub fn intersects_sphere(&self, center: Vec3, radius: f32, ignore_far: bool) -> bool {
        let count = if ignore_far { FAR } else { FAR + 1 };
        self.planes[..count]
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_camera_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh(
            std::f32::consts::FRAC_PI_4,
            16.0 / 9.0,
            1000.0, // reverse-Z: far as near param
            0.1,    // reverse-Z: near as far param
        );
        proj * view
    }

    #[test]
    fn test_object_in_front_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -5.0), Vec3::new(1.0, 1.0, -3.0));
        assert!(frustum.is_visible(&aabb));
    }

    #[test]
    fn test_object_behind_camera_not_visible() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 5.0), Vec3::new(1.0, 1.0, 10.0));
        assert!(!frustum.is_visible(&aabb));
    }

    #[test]
    fn test_beyond_far_plane() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let beyond_far = Aabb::new(Vec3::new(0.0, 0.0, -2000.0), Vec3::new(1.0, 1.0, -1500.0));
        assert!(!frustum.is_visible(&beyond_far));
    }

    #[test]
    fn test_sphere_tests() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, -10.0), 1.0, false));
        // Behind the camera but overlapping the near plane.
        assert!(frustum.intersects_sphere(Vec3::new(0.0, 0.0, 0.5), 1.0, false));
        assert!(!frustum.intersects_sphere(Vec3::new(0.0, 0.0, 10.0), 1.0, false));
        // Off to the side.
        assert!(!frustum.intersects_sphere(Vec3::new(500.0, 0.0, -10.0), 5.0, false));
    }

    #[test]
    fn test_sphere_ignore_far() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        let far_away = Vec3::new(0.0, 0.0, -50_000.0);
        assert!(!frustum.intersects_sphere(far_away, 10.0, false));
        assert!(frustum.intersects_sphere(far_away, 10.0, true));
    }

    #[test]
    fn test_aabb_center_and_extents() {
        let aabb = Aabb::new(Vec3::new(-2.0, -3.0, -4.0), Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(aabb.center(), Vec3::ZERO);
        assert_eq!(aabb.extents(), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_planes_normalized() {
        let frustum = Frustum::from_view_projection(&default_camera_vp());
        for plane in &frustum.planes {
            let normal_len = plane.truncate().length();
            assert!(
                (normal_len - 1.0).abs() < 1e-4,
                "plane normal not normalized: {normal_len}"
            );
        }
    }
}
