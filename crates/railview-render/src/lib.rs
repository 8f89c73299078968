//! Frame composition for Railview.
//!
//! Scene objects register draw requests with a [`RenderFrame`] every frame.
//! The frame culls them against the camera and the shadow cascades, buckets
//! them by [`RenderPrimitiveSequence`] and material, sorts blended items
//! back-to-front, and finally submits everything through a [`FrameBackend`]:
//! shadow cascades first, then the optional distant-mountain pass, then the
//! main view in declared sequence order.

pub mod buffer;
pub mod camera;
pub mod frustum;
pub mod gpu;
pub mod headless;
pub mod material;
pub mod primitive;
pub mod render_frame;
pub mod sequence;
pub mod shadow;

pub use buffer::{
    BufferAllocator, BufferBacking, HostBufferAllocator, IndexBuffer, IndexData, IndexFormat,
    MeshBuffer, VertexBuffer, WgpuBufferAllocator,
};
pub use camera::Camera;
pub use frustum::{Aabb, Frustum};
pub use gpu::{HeadlessDevice, RenderContextError, init_headless_device};
pub use headless::{
    DrawEvent, DrawLog, HeadlessMaterial, HeadlessMaterialLibrary, HeadlessShadowMapMaterial,
    RecordingBackend,
};
pub use material::{
    Material, MaterialId, MaterialKind, MaterialLibrary, ShadowMapMaterial, ShadowMapMode,
    TextureId, ViewMatrices,
};
pub use primitive::{RenderItem, RenderPrimitive, ShapeFlags};
pub use render_frame::{FrameBackend, FrameSettings, FrameStats, RenderFrame};
pub use sequence::{RenderPrimitiveGroup, RenderPrimitiveSequence};
pub use shadow::{ShadowCascades, ShadowMap};
