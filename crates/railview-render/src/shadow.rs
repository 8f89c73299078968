//! Shadow cascades for the sun.
//!
//! Each cascade is a square orthographic view looking down the light
//! direction, centered on a point along the camera's view direction. Cascade 0
//! is nearest and smallest. Two tricks keep the shadows steady:
//!
//! * the light direction only follows the sun once it has moved noticeably, and
//! * cascade centers are snapped to the shadow texel grid in light space.

use std::f32::consts::FRAC_1_SQRT_2;

use glam::{Mat4, Vec3};

/// Dot-product margin under which the sun is considered not to have moved:
/// directions whose dot product differs from 1 by less than 0.001% are equal.
pub const LIGHT_DIRECTION_HYSTERESIS: f32 = 1.0e-5;

/// Nearest distance the cascade split scheme starts from.
const SPLIT_NEAR: f32 = 1.0;

/// Blend between logarithmic (1.0) and linear (0.0) split distribution.
const SPLIT_LAMBDA: f32 = 0.8;

/// One cascade's light-space state for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowMap {
    /// Center of the cascade in render space.
    pub center: Vec3,
    /// Width (and height) of the cascade in meters.
    pub diameter: f32,
    /// Distance along the view direction at which the center is placed.
    pub distance: f32,
    pub light_view: Mat4,
    pub light_projection: Mat4,
    pub light_view_projection: Mat4,
}

/// The full cascade set.
#[derive(Clone, Debug)]
pub struct ShadowCascades {
    resolution: u32,
    /// `(distance, diameter)` per cascade.
    table: Vec<(f32, f32)>,
    /// Light direction (pointing toward the sun) the cascades are aligned to.
    stepped_light: Vec3,
    maps: Vec<ShadowMap>,
}

impl ShadowCascades {
    /// Builds the distance table for `count` cascades covering `distance` meters.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    pub fn new(count: u32, distance: f32, resolution: u32) -> Self {
        assert!(count > 0, "at least one shadow cascade is required");
        let table = cascade_table(count, distance);
        let maps = table
            .iter()
            .map(|&(distance, diameter)| ShadowMap {
                center: Vec3::ZERO,
                diameter,
                distance,
                light_view: Mat4::IDENTITY,
                light_projection: Mat4::IDENTITY,
                light_view_projection: Mat4::IDENTITY,
            })
            .collect();
        Self {
            resolution: resolution.max(1),
            table,
            stepped_light: Vec3::Y,
            maps,
        }
    }

    /// Number of cascades.
    pub fn count(&self) -> usize {
        self.maps.len()
    }

    /// Current state of cascade `index`.
    pub fn map(&self, index: usize) -> &ShadowMap {
        &self.maps[index]
    }

    /// All cascades, nearest first.
    pub fn maps(&self) -> &[ShadowMap] {
        &self.maps
    }

    /// The light direction the cascades are currently aligned to.
    pub fn light_direction(&self) -> Vec3 {
        self.stepped_light
    }

    /// Realign every cascade to the camera and the sun.
    ///
    /// `camera_location` and `view_direction` are in render space;
    /// `sun_direction` points from the ground toward the sun.
    pub fn prepare(&mut self, camera_location: Vec3, view_direction: Vec3, sun_direction: Vec3) {
        let sun = sun_direction.normalize_or(Vec3::Y);
        if self.stepped_light.dot(sun) < 1.0 - LIGHT_DIRECTION_HYSTERESIS {
            self.stepped_light = sun;
        }
        let light = self.stepped_light;

        let up = if light.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
        let align_x = light.cross(up).normalize();
        let align_y = align_x.cross(light).normalize();
        let forward = view_direction.normalize_or(Vec3::NEG_Z);

        for (map, &(distance, diameter)) in self.maps.iter_mut().zip(&self.table) {
            let mut center = camera_location + forward * distance;

            let texel = diameter / self.resolution as f32;
            let adjust_x = ieee_remainder(align_x.dot(center), texel);
            let adjust_y = ieee_remainder(align_y.dot(center), texel);
            center -= align_x * adjust_x + align_y * adjust_y;

            let half = diameter * 0.5;
            let depth = diameter * 2.0;
            let eye = center + light * diameter;
            map.center = center;
            map.light_view = Mat4::look_at_rh(eye, center, up);
            // Reverse-Z, like the main projection.
            map.light_projection = Mat4::orthographic_rh(-half, half, -half, half, depth, 0.0);
            map.light_view_projection = map.light_projection * map.light_view;
        }
    }

    /// Whether a sphere (render space) can throw a shadow into cascade `index`.
    ///
    /// True when the sphere overlaps the cascade's bounding sphere, or when it
    /// lies inside the cylinder running from the cascade toward the light. Both
    /// reach the corners of the square cascade.
    pub fn is_in_shadow_map(&self, index: usize, location: Vec3, radius: f32) -> bool {
        let map = &self.maps[index];
        let reach = map.diameter * FRAC_1_SQRT_2 + radius;
        let offset = location - map.center;
        if offset.length_squared() <= reach * reach {
            return true;
        }

        let along = offset.dot(self.stepped_light);
        if along <= 0.0 {
            return false;
        }
        let from_axis = offset - self.stepped_light * along;
        from_axis.length_squared() <= reach * reach
    }
}

/// `(distance, diameter)` per cascade using the practical split scheme.
///
/// Each cascade's far split `f` sets its diameter to `f` and its center to `f / 2`,
/// so cascade `i` covers the view out to its split.
pub fn cascade_table(count: u32, distance: f32) -> Vec<(f32, f32)> {
    let distance = distance.max(SPLIT_NEAR * 2.0);
    (1..=count)
        .map(|i| {
            let t = i as f32 / count as f32;
            let log = SPLIT_NEAR * (distance / SPLIT_NEAR).powf(t);
            let linear = SPLIT_NEAR + (distance - SPLIT_NEAR) * t;
            let split = SPLIT_LAMBDA * log + (1.0 - SPLIT_LAMBDA) * linear;
            (split * 0.5, split)
        })
        .collect()
}

/// IEEE 754 remainder: `x - y * round_ties_even(x / y)`.
pub fn ieee_remainder(x: f32, y: f32) -> f32 {
    if y == 0.0 {
        return 0.0;
    }
    x - y * (x / y).round_ties_even()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cascades() -> ShadowCascades {
        let mut c = ShadowCascades::new(3, 1000.0, 1024);
        c.prepare(Vec3::ZERO, Vec3::NEG_Z, Vec3::new(0.3, 1.0, 0.2));
        c
    }

    #[test]
    fn test_table_increasing_and_ends_at_distance() {
        let table = cascade_table(4, 1000.0);
        assert_eq!(table.len(), 4);
        for pair in table.windows(2) {
            assert!(pair[0].1 < pair[1].1);
        }
        assert!((table[3].1 - 1000.0).abs() < 1e-2);
    }

    #[test]
    fn test_ieee_remainder() {
        assert!((ieee_remainder(5.0, 2.0) - 1.0).abs() < 1e-6);
        assert!((ieee_remainder(7.0, 2.0) + 1.0).abs() < 1e-6);
        assert!((ieee_remainder(-1.4, 1.0) + 0.4).abs() < 1e-6);
        assert_eq!(ieee_remainder(3.0, 0.0), 0.0);
    }

    #[test]
    fn test_hysteresis_ignores_tiny_sun_motion() {
        let mut c = cascades();
        let before = c.light_direction();
        let nudged = (before + Vec3::new(1e-4, 0.0, 0.0)).normalize();
        c.prepare(Vec3::ZERO, Vec3::NEG_Z, nudged);
        assert_eq!(c.light_direction(), before);

        let moved = (before + Vec3::new(0.2, 0.0, 0.0)).normalize();
        c.prepare(Vec3::ZERO, Vec3::NEG_Z, moved);
        assert!((c.light_direction() - moved).length() < 1e-6);
    }

    #[test]
    fn test_centers_snap_to_texel_grid() {
        let mut a = cascades();
        let mut b = cascades();
        a.prepare(Vec3::new(0.0, 0.0, 0.0), Vec3::NEG_Z, Vec3::new(0.3, 1.0, 0.2));
        // Camera moves a fraction of a texel: centers must not move.
        b.prepare(Vec3::new(0.01, 0.0, 0.0), Vec3::NEG_Z, Vec3::new(0.3, 1.0, 0.2));
        let texel = a.map(2).diameter / 1024.0;
        let delta = a.map(2).center - b.map(2).center;
        let light = a.light_direction();
        let lateral = delta - light * delta.dot(light);
        assert!(lateral.length() < texel * 1.5, "lateral shift {lateral:?}");
    }

    #[test]
    fn test_center_inside_own_cascade() {
        let c = cascades();
        for i in 0..c.count() {
            assert!(c.is_in_shadow_map(i, c.map(i).center, 0.0));
        }
    }

    #[test]
    fn test_caster_toward_light_is_included() {
        let c = cascades();
        let map = c.map(0);
        let toward_light = map.center + c.light_direction() * (map.diameter * 10.0);
        assert!(c.is_in_shadow_map(0, toward_light, 1.0));
        let away_from_light = map.center - c.light_direction() * (map.diameter * 10.0);
        assert!(!c.is_in_shadow_map(0, away_from_light, 1.0));
    }

    #[test]
    fn test_cascade_corner_is_included() {
        let c = cascades();
        let map = c.map(1);
        let light = c.light_direction();
        let right = Vec3::Z.cross(light).normalize();
        let up = light.cross(right);
        let half = map.diameter * 0.5;
        let corner = map.center + (right + up) * (half * 0.95);
        assert!(c.is_in_shadow_map(1, corner, 0.0));
        let beyond = map.center + (right + up) * (half * 1.1);
        assert!(!c.is_in_shadow_map(1, beyond, 0.0));
    }

    #[test]
    fn test_far_sideways_object_excluded() {
        let c = cascades();
        let map = c.map(0);
        let side = map.center + Vec3::new(0.0, 0.0, 1.0).cross(c.light_direction()).normalize() * 500.0;
        assert!(!c.is_in_shadow_map(0, side, 1.0));
    }
}
