//! Vertex and index buffer allocation.
//!
//! Streamed tiles build their buffers on the loader thread before the tile is
//! published, through a [`BufferAllocator`]. The wgpu allocator uploads to a
//! device; the host allocator keeps bytes in memory for headless runs.

use std::sync::Arc;

/// Index element width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Matching wgpu format.
    pub fn to_wgpu(self) -> wgpu::IndexFormat {
        match self {
            IndexFormat::U16 => wgpu::IndexFormat::Uint16,
            IndexFormat::U32 => wgpu::IndexFormat::Uint32,
        }
    }
}

/// Index data that can be either u16 or u32 format.
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    /// Element width of this data.
    pub fn format(&self) -> IndexFormat {
        match self {
            IndexData::U16(_) => IndexFormat::U16,
            IndexData::U32(_) => IndexFormat::U32,
        }
    }

    /// Get the number of indices.
    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(data) => data.len() as u32,
            IndexData::U32(data) => data.len() as u32,
        }
    }

    /// Get the raw byte slice for buffer creation.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(data) => bytemuck::cast_slice(data),
            IndexData::U32(data) => bytemuck::cast_slice(data),
        }
    }
}

/// Where a buffer's bytes live.
#[derive(Debug)]
pub enum BufferBacking {
    /// Kept in host memory.
    Host(Vec<u8>),
    /// Uploaded to a wgpu device.
    Device(wgpu::Buffer),
}

impl BufferBacking {
    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> u64 {
        match self {
            BufferBacking::Host(bytes) => bytes.len() as u64,
            BufferBacking::Device(buffer) => buffer.size(),
        }
    }
}

/// A vertex buffer and its vertex count.
#[derive(Debug)]
pub struct VertexBuffer {
    pub label: String,
    pub vertex_count: u32,
    pub backing: BufferBacking,
}

/// An index buffer and its format.
#[derive(Debug)]
pub struct IndexBuffer {
    pub label: String,
    pub index_count: u32,
    pub format: IndexFormat,
    pub backing: BufferBacking,
}

/// Vertex and index buffers for one mesh. Index buffers may be shared.
#[derive(Clone, Debug)]
pub struct MeshBuffer {
    pub vertices: Arc<VertexBuffer>,
    pub indices: Arc<IndexBuffer>,
}

impl MeshBuffer {
    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.indices.index_count
    }

    /// Number of triangles, assuming a triangle list.
    pub fn triangle_count(&self) -> u32 {
        self.indices.index_count / 3
    }

    /// Whether this mesh uses the given shared index buffer.
    pub fn shares_indices_with(&self, indices: &Arc<IndexBuffer>) -> bool {
        Arc::ptr_eq(&self.indices, indices)
    }

    /// Bind vertex and index buffers to a render pass.
    ///
    /// Host-backed meshes have nothing to bind and are skipped.
    pub fn bind<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        if let (BufferBacking::Device(vertices), BufferBacking::Device(indices)) =
            (&self.vertices.backing, &self.indices.backing)
        {
            render_pass.set_vertex_buffer(0, vertices.slice(..));
            render_pass.set_index_buffer(indices.slice(..), self.indices.format.to_wgpu());
        }
    }
}

/// Creates vertex and index buffers.
pub trait BufferAllocator: Send + Sync {
    /// Create a vertex buffer from raw vertex bytes.
    fn create_vertex_buffer(&self, label: &str, data: &[u8], vertex_count: u32) -> VertexBuffer;

    /// Create an index buffer.
    fn create_index_buffer(&self, label: &str, indices: IndexData) -> IndexBuffer;

    /// Create a complete mesh buffer from vertex and index data.
    fn create_mesh(
        &self,
        label: &str,
        vertices: &[u8],
        vertex_count: u32,
        indices: IndexData,
    ) -> MeshBuffer {
        MeshBuffer {
            vertices: Arc::new(self.create_vertex_buffer(
                &format!("{label}-vertices"),
                vertices,
                vertex_count,
            )),
            indices: Arc::new(self.create_index_buffer(&format!("{label}-indices"), indices)),
        }
    }
}

/// Keeps buffers in host memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostBufferAllocator;

impl BufferAllocator for HostBufferAllocator {
    fn create_vertex_buffer(&self, label: &str, data: &[u8], vertex_count: u32) -> VertexBuffer {
        VertexBuffer {
            label: label.to_string(),
            vertex_count,
            backing: BufferBacking::Host(data.to_vec()),
        }
    }

    fn create_index_buffer(&self, label: &str, indices: IndexData) -> IndexBuffer {
        IndexBuffer {
            label: label.to_string(),
            index_count: indices.count(),
            format: indices.format(),
            backing: BufferBacking::Host(indices.as_bytes().to_vec()),
        }
    }
}

/// Uploads buffers to a wgpu device.
#[derive(Clone, Debug)]
pub struct WgpuBufferAllocator {
    device: wgpu::Device,
}

impl WgpuBufferAllocator {
    /// Create a new buffer allocator with the given device.
    pub fn new(device: wgpu::Device) -> Self {
        Self { device }
    }

    fn create_buffer(&self, label: &str, contents: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
        use wgpu::util::DeviceExt;

        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: usage | wgpu::BufferUsages::COPY_DST,
            })
    }
}

impl BufferAllocator for WgpuBufferAllocator {
    fn create_vertex_buffer(&self, label: &str, data: &[u8], vertex_count: u32) -> VertexBuffer {
        VertexBuffer {
            label: label.to_string(),
            vertex_count,
            backing: BufferBacking::Device(self.create_buffer(
                label,
                data,
                wgpu::BufferUsages::VERTEX,
            )),
        }
    }

    fn create_index_buffer(&self, label: &str, indices: IndexData) -> IndexBuffer {
        IndexBuffer {
            label: label.to_string(),
            index_count: indices.count(),
            format: indices.format(),
            backing: BufferBacking::Device(self.create_buffer(
                label,
                indices.as_bytes(),
                wgpu::BufferUsages::INDEX,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_device() -> Option<wgpu::Device> {
        crate::gpu::init_headless_device().ok().map(|d| d.device)
    }

    #[test]
    fn test_host_mesh_creation_u16() {
        let allocator = HostBufferAllocator;
        let vertices = [0u8; 36];
        let mesh = allocator.create_mesh("test-triangle", &vertices, 3, IndexData::U16(&[0, 1, 2]));

        assert_eq!(mesh.index_count(), 3);
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.indices.format, IndexFormat::U16);
        assert_eq!(mesh.vertices.vertex_count, 3);
        assert_eq!(mesh.vertices.backing.byte_len(), 36);
        assert_eq!(mesh.indices.backing.byte_len(), 6);
        assert_eq!(mesh.vertices.label, "test-triangle-vertices");
    }

    #[test]
    fn test_shared_index_buffer_detected() {
        let allocator = HostBufferAllocator;
        let shared = Arc::new(allocator.create_index_buffer("shared", IndexData::U16(&[0, 1, 2])));
        let mesh = MeshBuffer {
            vertices: Arc::new(allocator.create_vertex_buffer("v", &[0u8; 12], 1)),
            indices: Arc::clone(&shared),
        };
        assert!(mesh.shares_indices_with(&shared));

        let private = allocator.create_mesh("p", &[0u8; 12], 1, IndexData::U16(&[0, 1, 2]));
        assert!(!private.shares_indices_with(&shared));
    }

    #[test]
    fn test_u16_vs_u32_format_selection() {
        let u16_data = IndexData::U16(&[0, 1, 2]);
        let u32_data = IndexData::U32(&[0, 1, 2]);

        assert_eq!(u16_data.format().to_wgpu(), wgpu::IndexFormat::Uint16);
        assert_eq!(u32_data.format().to_wgpu(), wgpu::IndexFormat::Uint32);
        assert_eq!(u16_data.as_bytes().len(), 6);
        assert_eq!(u32_data.as_bytes().len(), 12);
    }

    #[test]
    fn test_wgpu_mesh_creation_u32() {
        let Some(device) = create_test_device() else {
            return;
        };
        let allocator = WgpuBufferAllocator::new(device);
        let mesh = allocator.create_mesh("test-quad", &[0u8; 128], 4, IndexData::U32(&[0, 1, 2, 2, 3, 0]));

        assert_eq!(mesh.index_count(), 6);
        assert_eq!(mesh.indices.format, IndexFormat::U32);
        assert!(matches!(mesh.vertices.backing, BufferBacking::Device(_)));
    }
}
