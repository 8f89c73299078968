//! Scenery streaming for Railview.
//!
//! Each route tile has a world file listing its placed objects. A
//! [`WorldFile`] decodes that list into scenery objects: shapes, procedural
//! track and wire, forests, signals, decals and labels. The
//! [`SceneryStreamer`] keeps the world files around the camera loaded and
//! hands night textures to the shape library once the sun goes down.

mod context;
mod error;
mod forest;
mod instancing;
mod objects;
mod record;
mod source;
mod streamer;
mod track;
mod world_file;

pub use context::{
    ControlState, FixedTextureMemory, MemoryTrackDatabase, MeshPrimitive, NullSoundSink,
    PLACEHOLDER_NIGHT_TEXTURE_BYTES, PLACEHOLDER_PARTS, PlaceholderShapeLibrary, SceneryContext, ScenerySettings, ShapeLibrary, ShapePart, SharedShape,
    SignalState, SoundSink, TextureMemory, TrackDatabase,
};
pub use error::{SceneryObjectError, WorldFileError};
pub use forest::{ForestPatch, scatter_trees};
pub use instancing::{InstancedPrimitive, MIN_INSTANCES, SharedStaticShapeInstance, collapse_instances};
pub use objects::{
    AnimatedShape, CarSpawnerDef, ControlKind, ControlledShape, LabelPrimitive, SceneryObject, SignalShape,
    SpeedPostShape, StaticShape, TextLabel, TransferDecal,
};
pub use record::{Placement, PlacementRecord, WorldFileData};
pub use source::{MemoryWorldFileSource, RonWorldFileSource, WorldFileSource};
pub use streamer::{SceneryLoadReport, SceneryStreamer};
pub use track::{SuperElevatedTrack, WireSpan, section_pose};
pub use world_file::{TextureLoadStatus, WorldFile};
