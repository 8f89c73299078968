//! Sweeping a profile along a subsection.
//!
//! Rings are propagated: ring `i` is ring `i - 1` moved by one fixed station
//! step, then rolled by the change in bank. Nothing is recomputed from the
//! start of the arc, so neighbouring rings always meet exactly.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use railview_render::{BufferAllocator, IndexData, MeshBuffer};

use crate::bank::{BankProfile, BankState};
use crate::dtrack::{DtrackData, TrackPose};
use crate::profile::TrackProfile;

/// Vertex layout for track and wire meshes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TrackVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

static_assertions::const_assert_eq!(std::mem::size_of::<TrackVertex>(), 32);

/// The per-station move in the section-local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StationStep {
    Straight { advance: Vec3 },
    /// Rotate about `center` by `rotation`.
    Curve { center: Vec3, rotation: Quat },
}

impl StationStep {
    /// The step that cuts `section` into `intervals` equal pieces.
    pub fn for_section(section: &DtrackData, intervals: u32) -> Self {
        let n = intervals.max(1) as f32;
        match section.curve_center() {
            Some(center) => StationStep::Curve {
                center,
                rotation: Quat::from_rotation_y(section.param1 / n),
            },
            None => StationStep::Straight {
                advance: Vec3::new(0.0, 0.0, section.param1 / n),
            },
        }
    }

    pub fn apply_point(&self, point: Vec3) -> Vec3 {
        match *self {
            StationStep::Straight { advance } => point + advance,
            StationStep::Curve { center, rotation } => center + rotation * (point - center),
        }
    }

    pub fn apply_vector(&self, vector: Vec3) -> Vec3 {
        match *self {
            StationStep::Straight { .. } => vector,
            StationStep::Curve { rotation, .. } => rotation * vector,
        }
    }
}

/// One cross-section of the swept profile.
#[derive(Clone, Debug, PartialEq)]
pub struct Ring {
    /// Centerline point.
    pub origin: Vec3,
    /// Direction of travel.
    pub tangent: Vec3,
    pub roll: f32,
    /// Distance along the centerline from the start of the subsection.
    pub distance: f32,
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl Ring {
    /// The unbanked first ring at the section origin.
    pub fn initial(profile: &TrackProfile) -> Self {
        let vertices = profile.polylines.iter().flat_map(|p| p.vertices.iter());
        let (positions, normals) = vertices
            .map(|v| {
                (
                    Vec3::new(v.position.x, v.position.y, 0.0),
                    Vec3::new(v.normal.x, v.normal.y, 0.0),
                )
            })
            .unzip();
        Self {
            origin: Vec3::ZERO,
            tangent: Vec3::Z,
            roll: 0.0,
            distance: 0.0,
            positions,
            normals,
        }
    }

    /// Roll the ring about its tangent by `delta` radians.
    pub fn bank(&mut self, delta: f32) {
        if delta == 0.0 {
            return;
        }
        let rotation = Quat::from_axis_angle(self.tangent.normalize(), delta);
        for p in &mut self.positions {
            *p = self.origin + rotation * (*p - self.origin);
        }
        for n in &mut self.normals {
            *n = rotation * *n;
        }
        self.roll += delta;
    }

    /// The next ring: this one moved by `step` and banked toward `target_roll`.
    pub fn advance(
        &self,
        step: &StationStep,
        step_length: f32,
        state: BankState,
        target_roll: f32,
    ) -> (Ring, BankState) {
        let mut next = Ring {
            origin: step.apply_point(self.origin),
            tangent: step.apply_vector(self.tangent),
            roll: self.roll,
            distance: self.distance + step_length,
            positions: self.positions.iter().map(|p| step.apply_point(*p)).collect(),
            normals: self.normals.iter().map(|n| step.apply_vector(*n)).collect(),
        };
        let (state, delta) = state.step(target_roll);
        next.bank(delta);
        (next, state)
    }
}

/// Sweep `profile` along `section` in `intervals` steps, returning `intervals + 1` rings.
pub fn build_ribbon(
    section: &DtrackData,
    profile: &TrackProfile,
    bank: BankProfile,
    intervals: u32,
) -> Vec<Ring> {
    let intervals = intervals.max(1);
    let step = StationStep::for_section(section, intervals);
    let step_length = section.length() / intervals as f32;

    let mut first = Ring::initial(profile);
    let (state, delta) = BankState::LEVEL.step(bank.target_roll(0, intervals));
    first.bank(delta);

    let mut rings = Vec::with_capacity(intervals as usize + 1);
    rings.push(first);
    (1..=intervals).fold(state, |state, station| {
        let previous = &rings[rings.len() - 1];
        let (ring, state) =
            previous.advance(&step, step_length, state, bank.target_roll(station, intervals));
        rings.push(ring);
        state
    });
    rings
}

/// CPU-side mesh for one track or wire section.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackMesh {
    pub vertices: Vec<TrackVertex>,
    pub indices: Vec<u32>,
}

impl TrackMesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append the rings of one subsection, placed by `pose`.
    ///
    /// Each polyline becomes a strip of quads between consecutive rings,
    /// two clockwise triangles per quad.
    pub fn append_ribbon(&mut self, rings: &[Ring], profile: &TrackProfile, pose: &TrackPose, v_offset: f32) {
        if rings.len() < 2 {
            return;
        }
        for (offset, polyline) in profile.polyline_offsets() {
            let width = polyline.vertices.len();
            let base = self.vertices.len() as u32;
            for ring in rings {
                let v = (v_offset + ring.distance) * polyline.v_per_meter;
                for (k, vertex) in polyline.vertices.iter().enumerate() {
                    self.vertices.push(TrackVertex {
                        position: pose.transform_point(ring.positions[offset + k]).to_array(),
                        normal: pose.transform_vector(ring.normals[offset + k]).to_array(),
                        uv: [vertex.u, v],
                    });
                }
            }
            for r in 1..rings.len() as u32 {
                let a = base + (r - 1) * width as u32;
                let b = base + r * width as u32;
                for k in 0..(width as u32).saturating_sub(1) {
                    self.indices.extend_from_slice(&[a + k, a + k + 1, b + k]);
                    self.indices.extend_from_slice(&[a + k + 1, b + k + 1, b + k]);
                }
            }
        }
    }

    /// Append a single quad given its four corners in order.
    pub fn append_quad(&mut self, corners: [Vec3; 4], normal: Vec3) {
        let base = self.vertices.len() as u32;
        let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        for (corner, uv) in corners.iter().zip(uvs) {
            self.vertices.push(TrackVertex {
                position: corner.to_array(),
                normal: normal.to_array(),
                uv,
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 3, base + 1, base + 2, base + 3]);
    }

    /// Center and radius of a sphere containing every vertex.
    pub fn bounding_sphere(&self) -> (Vec3, f32) {
        if self.vertices.is_empty() {
            return (Vec3::ZERO, 0.0);
        }
        let (min, max) = self.vertices.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), v| {
                let p = Vec3::from_array(v.position);
                (min.min(p), max.max(p))
            },
        );
        let center = (min + max) * 0.5;
        (center, (max - center).length())
    }

    /// Upload through `allocator`, using 16-bit indices when they fit.
    pub fn upload(&self, allocator: &dyn BufferAllocator, label: &str) -> MeshBuffer {
        let vertex_bytes: &[u8] = bytemuck::cast_slice(&self.vertices);
        let vertex_count = self.vertices.len() as u32;
        if self.vertices.len() <= u16::MAX as usize + 1 {
            let narrow: Vec<u16> = self.indices.iter().map(|&i| i as u16).collect();
            allocator.create_mesh(label, vertex_bytes, vertex_count, IndexData::U16(&narrow))
        } else {
            allocator.create_mesh(label, vertex_bytes, vertex_count, IndexData::U32(&self.indices))
        }
    }
}
