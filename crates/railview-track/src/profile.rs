//! Cross-section profiles swept along track and wire.
//!
//! Profile coordinates are `(lateral, vertical)` in meters. Looking along the
//! direction of travel (+Z, +Y up) the +X side is on the left. Each polyline
//! is swept on its own; consecutive vertices of a polyline become the sides of
//! a quad strip.

use glam::Vec2;

/// Width of a rail head, meters.
const RAIL_HEAD_WIDTH: f32 = 0.07;
const RAIL_TOP: f32 = 0.325;
const RAIL_BASE: f32 = 0.2;

/// Half width of the thin wire cross.
const WIRE_HALF_WIDTH: f32 = 0.01;

/// Messenger wire height above the contact wire.
pub(crate) const MESSENGER_RISE: f32 = 1.2;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProfileVertex {
    pub position: Vec2,
    pub normal: Vec2,
    /// Texture coordinate across the profile.
    pub u: f32,
}

impl ProfileVertex {
    pub fn new(x: f32, y: f32, nx: f32, ny: f32, u: f32) -> Self {
        Self {
            position: Vec2::new(x, y),
            normal: Vec2::new(nx, ny).normalize_or(Vec2::Y),
            u,
        }
    }
}

/// One strip of the profile.
#[derive(Clone, Debug, PartialEq)]
pub struct Polyline {
    pub name: String,
    pub vertices: Vec<ProfileVertex>,
    /// Texture repeats per meter along the track.
    pub v_per_meter: f32,
}

impl Polyline {
    pub fn new(name: &str, vertices: Vec<ProfileVertex>, v_per_meter: f32) -> Self {
        Self {
            name: name.to_string(),
            vertices,
            v_per_meter,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrackProfile {
    pub polylines: Vec<Polyline>,
}

impl TrackProfile {
    /// Ballast shoulder plus two rails for the given gauge.
    pub fn standard(gauge: f32) -> Self {
        let ballast = Polyline::new(
            "ballast",
            vec![
                ProfileVertex::new(-2.5, -0.2, -0.2, 1.0, 0.0),
                ProfileVertex::new(-1.5, 0.0, 0.0, 1.0, 0.2),
                ProfileVertex::new(1.5, 0.0, 0.0, 1.0, 0.8),
                ProfileVertex::new(2.5, -0.2, 0.2, 1.0, 1.0),
            ],
            0.2,
        );
        let rail = |name: &str, center: f32| {
            let half = RAIL_HEAD_WIDTH * 0.5;
            Polyline::new(
                name,
                vec![
                    ProfileVertex::new(center - half, RAIL_BASE, -1.0, 0.0, 0.0),
                    ProfileVertex::new(center - half, RAIL_TOP, -1.0, 1.0, 0.3),
                    ProfileVertex::new(center + half, RAIL_TOP, 1.0, 1.0, 0.7),
                    ProfileVertex::new(center + half, RAIL_BASE, 1.0, 0.0, 1.0),
                ],
                1.0,
            )
        };
        // Gauge is measured between the inner faces of the rail heads.
        let offset = (gauge + RAIL_HEAD_WIDTH) * 0.5;
        Self {
            polylines: vec![ballast, rail("right-rail", -offset), rail("left-rail", offset)],
        }
    }

    /// A single contact wire at `height` above the rail head.
    pub fn contact_wire(height: f32) -> Self {
        Self {
            polylines: wire_cross("contact", height),
        }
    }

    /// Contact wire plus a messenger wire above it.
    pub fn catenary(height: f32) -> Self {
        let mut polylines = wire_cross("contact", height);
        polylines.extend(wire_cross("messenger", height + MESSENGER_RISE));
        Self { polylines }
    }

    /// Vertices per ring.
    pub fn vertex_count(&self) -> usize {
        self.polylines.iter().map(|p| p.vertices.len()).sum()
    }

    /// Each polyline with the offset of its first vertex within a ring.
    pub fn polyline_offsets(&self) -> impl Iterator<Item = (usize, &Polyline)> {
        self.polylines.iter().scan(0, |offset, polyline| {
            let start = *offset;
            *offset += polyline.vertices.len();
            Some((start, polyline))
        })
    }
}

/// A horizontal and a vertical strip so the wire is visible from any angle.
fn wire_cross(name: &str, height: f32) -> Vec<Polyline> {
    vec![
        Polyline::new(
            &format!("{name}-horizontal"),
            vec![
                ProfileVertex::new(-WIRE_HALF_WIDTH, height, 0.0, -1.0, 0.0),
                ProfileVertex::new(WIRE_HALF_WIDTH, height, 0.0, -1.0, 1.0),
            ],
            0.1,
        ),
        Polyline::new(
            &format!("{name}-vertical"),
            vec![
                ProfileVertex::new(0.0, height - WIRE_HALF_WIDTH, 1.0, 0.0, 0.0),
                ProfileVertex::new(0.0, height + WIRE_HALF_WIDTH, 1.0, 0.0, 1.0),
            ],
            0.1,
        ),
    ]
}
