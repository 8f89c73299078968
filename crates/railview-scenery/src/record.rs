//! Placement records: the typed contents of a world file.

use glam::{Mat4, Quat, Vec2, Vec3};
use railview_coords::{TileCoord, WorldPosition};
use railview_track::DtrackData;
use serde::{Deserialize, Serialize};

/// Where an object sits on its tile, shared by every record kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub uid: u32,
    /// Offset from the tile center, meters.
    pub position: Vec3,
    #[serde(default = "identity")]
    pub rotation: Quat,
    /// Draw into the shadow cascades.
    #[serde(default)]
    pub casts_shadow: bool,
    /// Overrides the viewing distance for this object, meters.
    #[serde(default)]
    pub view_distance: Option<f32>,
}

fn identity() -> Quat {
    Quat::IDENTITY
}

impl Placement {
    pub fn new(uid: u32, position: Vec3) -> Self {
        Self {
            uid,
            position,
            rotation: Quat::IDENTITY,
            casts_shadow: false,
            view_distance: None,
        }
    }

    /// Route position on `tile`.
    pub fn world_position(&self, tile: TileCoord) -> WorldPosition {
        WorldPosition::new(tile, self.position)
    }

    /// Tile-local transform of the object.
    pub fn transform(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }
}

/// One object declared by a world file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlacementRecord {
    /// Track from the route's track shape table.
    Track {
        placement: Placement,
        shape: String,
        track_shape: u32,
    },
    /// Track laid out by explicit subsections.
    DynamicTrack {
        placement: Placement,
        sections: Vec<DtrackData>,
    },
    Forest {
        placement: Placement,
        texture: String,
        /// Width and depth of the planted area, meters.
        area: Vec2,
        population: u32,
        /// Tree width and height, meters.
        tree_size: Vec2,
    },
    Signal {
        placement: Placement,
        shape: String,
        /// Shape parts that are signal heads.
        heads: Vec<u32>,
    },
    /// A decal laid on the ground.
    Transfer {
        placement: Placement,
        texture: String,
        width: f32,
        height: f32,
    },
    LevelCrossing {
        placement: Placement,
        shape: String,
    },
    Hazard {
        placement: Placement,
        shape: String,
    },
    SpeedPost {
        placement: Placement,
        shape: String,
        /// Limits shown on the post, km/h.
        limits: Vec<f32>,
    },
    CarSpawner {
        placement: Placement,
        /// Car list the simulation spawns from.
        list: String,
        /// Cars per minute.
        frequency: f32,
    },
    Siding {
        placement: Placement,
        name: String,
    },
    Platform {
        placement: Placement,
        name: String,
    },
    Static {
        placement: Placement,
        shape: String,
    },
    Animated {
        placement: Placement,
        shape: String,
        /// Keyframes per second.
        frame_rate: f32,
    },
    /// Fuel or water pickup.
    Pickup {
        placement: Placement,
        shape: String,
    },
}

impl PlacementRecord {
    pub fn placement(&self) -> &Placement {
        match self {
            PlacementRecord::Track { placement, .. }
            | PlacementRecord::DynamicTrack { placement, .. }
            | PlacementRecord::Forest { placement, .. }
            | PlacementRecord::Signal { placement, .. }
            | PlacementRecord::Transfer { placement, .. }
            | PlacementRecord::LevelCrossing { placement, .. }
            | PlacementRecord::Hazard { placement, .. }
            | PlacementRecord::SpeedPost { placement, .. }
            | PlacementRecord::CarSpawner { placement, .. }
            | PlacementRecord::Siding { placement, .. }
            | PlacementRecord::Platform { placement, .. }
            | PlacementRecord::Static { placement, .. }
            | PlacementRecord::Animated { placement, .. }
            | PlacementRecord::Pickup { placement, .. } => placement,
        }
    }

    /// Short name of the record kind, for log messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PlacementRecord::Track { .. } => "track",
            PlacementRecord::DynamicTrack { .. } => "dynamic track",
            PlacementRecord::Forest { .. } => "forest",
            PlacementRecord::Signal { .. } => "signal",
            PlacementRecord::Transfer { .. } => "transfer",
            PlacementRecord::LevelCrossing { .. } => "level crossing",
            PlacementRecord::Hazard { .. } => "hazard",
            PlacementRecord::SpeedPost { .. } => "speed post",
            PlacementRecord::CarSpawner { .. } => "car spawner",
            PlacementRecord::Siding { .. } => "siding",
            PlacementRecord::Platform { .. } => "platform",
            PlacementRecord::Static { .. } => "static",
            PlacementRecord::Animated { .. } => "animated",
            PlacementRecord::Pickup { .. } => "pickup",
        }
    }
}

/// Contents of one world file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldFileData {
    #[serde(default)]
    pub records: Vec<PlacementRecord>,
}
