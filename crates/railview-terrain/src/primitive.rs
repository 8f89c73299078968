//! Terrain patch and water geometry.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use railview_coords::WorldPosition;
use railview_render::{BufferAllocator, IndexBuffer, IndexData, MeshBuffer, RenderPrimitive};
use static_assertions::const_assert_eq;

use crate::manager::TileManager;
use crate::tile::{Diagonal, PATCH_CELLS, Tile};

/// Vertices per patch side.
const PATCH_VERTICES: usize = PATCH_CELLS + 1;

/// Water texture repeats per meter.
const WATER_UV_PER_METER: f32 = 1.0 / 64.0;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TerrainVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

const_assert_eq!(std::mem::size_of::<TerrainVertex>(), 32);

/// Triangle list for one patch, skipping cells that touch a hidden vertex.
///
/// `(x0, z0)` is the sample at the patch's minimum corner; the split of each
/// cell follows its sample coordinates.
pub(crate) fn patch_indices(x0: i64, z0: i64, hidden: impl Fn(i64, i64) -> bool) -> Vec<u16> {
    let vertex = |x: usize, z: usize| (z * PATCH_VERTICES + x) as u16;
    let mut indices = Vec::with_capacity(PATCH_CELLS * PATCH_CELLS * 6);
    for z in 0..PATCH_CELLS {
        for x in 0..PATCH_CELLS {
            let (sx, sz) = (x0 + x as i64, z0 + z as i64);
            if hidden(sx, sz) || hidden(sx + 1, sz) || hidden(sx, sz + 1) || hidden(sx + 1, sz + 1) {
                continue;
            }
            let corners = [vertex(x, z), vertex(x + 1, z), vertex(x, z + 1), vertex(x + 1, z + 1)];
            for triangle in Diagonal::for_cell(sx, sz).triangles() {
                indices.extend(triangle.iter().map(|&corner| corners[corner]));
            }
        }
    }
    indices
}

/// The triangulation shared by every patch without holes.
///
/// Patches are an even number of samples apart, so one buffer built for the
/// patch at the origin splits every whole patch's cells correctly.
#[derive(Clone, Debug)]
pub struct SharedPatchIndices {
    indices: Arc<IndexBuffer>,
}

impl SharedPatchIndices {
    pub fn new(allocator: &dyn BufferAllocator) -> Self {
        let indices = patch_indices(0, 0, |_, _| false);
        Self {
            indices: Arc::new(allocator.create_index_buffer("terrain-patch-shared", IndexData::U16(&indices))),
        }
    }

    pub fn buffer(&self) -> &Arc<IndexBuffer> {
        &self.indices
    }
}

/// One 16×16-cell patch of a terrain tile.
#[derive(Debug)]
pub struct TerrainPrimitive {
    patch: (usize, usize),
    center: WorldPosition,
    radius: f32,
    mesh: MeshBuffer,
}

impl TerrainPrimitive {
    /// Builds patch `(px, pz)` of `tile`. Edge vertices read the neighbouring
    /// tile through `manager` so adjacent tiles meet.
    ///
    /// Returns `None` when every cell of the patch is cut away.
    pub fn new(
        manager: &TileManager,
        tile: &Tile,
        px: usize,
        pz: usize,
        shared: &SharedPatchIndices,
        allocator: &dyn BufferAllocator,
    ) -> Option<Self> {
        let (x0, z0) = ((px * PATCH_CELLS) as i64, (pz * PATCH_CELLS) as i64);
        let spacing = tile.sample_size();
        let height = |x: i64, z: i64| manager.get_elevation_at(tile, x0 + x, z0 + z);

        let mut heights = Vec::with_capacity(PATCH_VERTICES * PATCH_VERTICES);
        for z in 0..PATCH_VERTICES as i64 {
            for x in 0..PATCH_VERTICES as i64 {
                heights.push(height(x, z));
            }
        }
        let average = heights.iter().sum::<f32>() / heights.len() as f32;

        let half = (PATCH_CELLS / 2) as i64;
        let mut center = tile.sample_position(x0 + half, z0 + half);
        center.location.y = average;

        let mut radius = 0.0f32;
        let mut vertices = Vec::with_capacity(heights.len());
        for z in 0..PATCH_VERTICES as i64 {
            for x in 0..PATCH_VERTICES as i64 {
                let position = Vec3::new(
                    (x - half) as f32 * spacing,
                    heights[z as usize * PATCH_VERTICES + x as usize] - average,
                    (z - half) as f32 * spacing,
                );
                let slope = Vec2::new(
                    height(x + 1, z) - height(x - 1, z),
                    height(x, z + 1) - height(x, z - 1),
                ) / (2.0 * spacing);
                let normal = Vec3::new(-slope.x, 1.0, -slope.y).normalize();
                radius = radius.max(position.length());
                vertices.push(TerrainVertex {
                    position: position.to_array(),
                    normal: normal.to_array(),
                    uv: [x as f32 / PATCH_CELLS as f32, z as f32 / PATCH_CELLS as f32],
                });
            }
        }

        let label = format!("terrain-{}-{}-{px}-{pz}", tile.coord().x, tile.coord().z);
        let indices = if tile.patch_has_holes(px, pz) {
            let private = patch_indices(x0, z0, |x, z| tile.is_vertex_hidden(x, z));
            if private.is_empty() {
                return None;
            }
            Arc::new(allocator.create_index_buffer(&format!("{label}-indices"), IndexData::U16(&private)))
        } else {
            Arc::clone(shared.buffer())
        };
        let vertices = Arc::new(allocator.create_vertex_buffer(
            &format!("{label}-vertices"),
            bytemuck::cast_slice(&vertices),
            vertices.len() as u32,
        ));

        Some(Self {
            patch: (px, pz),
            center,
            radius,
            mesh: MeshBuffer { vertices, indices },
        })
    }

    pub fn patch(&self) -> (usize, usize) {
        self.patch
    }

    /// Patch center at the average elevation of its vertices.
    pub fn center(&self) -> &WorldPosition {
        &self.center
    }

    pub fn average_elevation(&self) -> f32 {
        self.center.location.y
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn buffers(&self) -> &MeshBuffer {
        &self.mesh
    }
}

impl RenderPrimitive for TerrainPrimitive {
    fn mesh(&self) -> Option<&MeshBuffer> {
        Some(&self.mesh)
    }
}

/// A flat water surface covering a whole tile.
#[derive(Debug)]
pub struct WaterPrimitive {
    center: WorldPosition,
    radius: f32,
    mesh: MeshBuffer,
}

impl WaterPrimitive {
    pub fn new(tile: &Tile, level: f32, allocator: &dyn BufferAllocator) -> Self {
        let half_samples = (tile.sample_count() / 2) as i64;
        let mut center = tile.sample_position(half_samples, half_samples);
        center.location.y = level;

        let half = tile.sample_size() * half_samples as f32;
        let corner = |x: f32, z: f32| TerrainVertex {
            position: [x * half, 0.0, z * half],
            normal: [0.0, 1.0, 0.0],
            uv: [
                (x + 1.0) * half * WATER_UV_PER_METER,
                (z + 1.0) * half * WATER_UV_PER_METER,
            ],
        };
        let vertices = [corner(-1.0, -1.0), corner(1.0, -1.0), corner(-1.0, 1.0), corner(1.0, 1.0)];
        let indices: Vec<u16> = Diagonal::NeSw
            .triangles()
            .iter()
            .flatten()
            .map(|&corner| corner as u16)
            .collect();

        let label = format!("water-{}-{}", tile.coord().x, tile.coord().z);
        Self {
            center,
            radius: half * std::f32::consts::SQRT_2,
            mesh: allocator.create_mesh(&label, bytemuck::cast_slice(&vertices), 4, IndexData::U16(&indices)),
        }
    }

    pub fn center(&self) -> &WorldPosition {
        &self.center
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }
}

impl RenderPrimitive for WaterPrimitive {
    fn mesh(&self) -> Option<&MeshBuffer> {
        Some(&self.mesh)
    }
}
