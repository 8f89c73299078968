//! Subsection descriptors and the pose they advance.
//!
//! Section-local frame: the subsection starts at the origin heading along +Z,
//! with +Y up. A positive curve angle bends toward +X.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One straight or circular subsection of a track or wire section.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DtrackData {
    pub is_curved: bool,
    /// Arc angle in radians for curves, length in meters for straights.
    pub param1: f32,
    /// Radius in meters for curves; unused for straights.
    pub param2: f32,
}

impl DtrackData {
    pub fn straight(length: f32) -> Self {
        Self {
            is_curved: false,
            param1: length,
            param2: 0.0,
        }
    }

    pub fn curve(angle: f32, radius: f32) -> Self {
        Self {
            is_curved: true,
            param1: angle,
            param2: radius,
        }
    }

    /// Path length along the centerline in meters.
    pub fn length(&self) -> f32 {
        if self.is_curved {
            self.param1.abs() * self.param2
        } else {
            self.param1
        }
    }

    /// Signed heading change across the subsection; zero for straights.
    pub fn angle(&self) -> f32 {
        if self.is_curved { self.param1 } else { 0.0 }
    }

    /// Curve radius, `None` for straights.
    pub fn radius(&self) -> Option<f32> {
        self.is_curved.then_some(self.param2)
    }

    /// Center of curvature in the section-local frame.
    pub fn curve_center(&self) -> Option<Vec3> {
        self.is_curved
            .then(|| Vec3::new(self.param1.signum() * self.param2, 0.0, 0.0))
    }

    /// End point in the section-local frame.
    pub fn end_offset(&self) -> Vec3 {
        match self.curve_center() {
            Some(center) => center + Quat::from_rotation_y(self.param1) * -center,
            None => Vec3::new(0.0, 0.0, self.param1),
        }
    }
}

/// Position and heading on the route.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackPose {
    pub position: Vec3,
    /// Rotation about +Y in radians; zero heads along +Z.
    pub heading: f32,
}

impl TrackPose {
    pub fn new(position: Vec3, heading: f32) -> Self {
        Self { position, heading }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.heading)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    /// Moves a point from the pose's local frame into the parent frame.
    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation() * local
    }

    pub fn transform_vector(&self, local: Vec3) -> Vec3 {
        self.rotation() * local
    }

    /// The pose at the end of `section` when it starts at `self`.
    pub fn advance(&self, section: &DtrackData) -> TrackPose {
        TrackPose {
            position: self.transform_point(section.end_offset()),
            heading: self.heading + section.angle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_quarter_circle_end() {
        let right = DtrackData::curve(FRAC_PI_2, 100.0);
        assert!((right.end_offset() - Vec3::new(100.0, 0.0, 100.0)).length() < 1e-3);
        let left = DtrackData::curve(-FRAC_PI_2, 100.0);
        assert!((left.end_offset() - Vec3::new(-100.0, 0.0, 100.0)).length() < 1e-3);
        assert!((right.length() - 100.0 * FRAC_PI_2).abs() < 1e-3);
    }

    #[test]
    fn test_pose_chains_sections() {
        let sections = [
            DtrackData::straight(50.0),
            DtrackData::curve(FRAC_PI_2, 100.0),
            DtrackData::straight(10.0),
        ];
        let end = sections
            .iter()
            .fold(TrackPose::default(), |pose, section| pose.advance(section));
        assert!((end.position - Vec3::new(110.0, 0.0, 150.0)).length() < 1e-3);
        assert!((end.forward() - Vec3::X).length() < 1e-5);
    }
}
