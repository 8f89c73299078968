//! A generated route for running the viewer without route files.
//!
//! The line runs east along tile row `z = 0`, laid on the same rolling
//! terrain that [`GeneratedTileSource`] produces. Rows either side get
//! woodland and a few huts. Tiles further out have no world file.

use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Quat, Vec2, Vec3};
use railview_coords::{TILE_SIZE, TileCoord};
use railview_scenery::{
    ControlState, MemoryTrackDatabase, Placement, PlacementRecord, SignalState, WorldFileData, WorldFileError,
    WorldFileSource,
};
use railview_terrain::GeneratedTileSource;
use railview_track::DtrackData;

/// Track shape table index of the plain straight.
pub const STRAIGHT_SHAPE: u32 = 0;
/// Length of the plain straight, meters.
pub const STRAIGHT_LENGTH: f32 = 256.0;

pub const SIGNAL_UID: u32 = 20;
pub const LEVEL_CROSSING_UID: u32 = 30;
pub const PICKUP_UID: u32 = 40;

const POLE_COUNT: u32 = 6;
const POLE_SPACING: f32 = 60.0;
const RAIL_HEIGHT: f32 = 0.3;

/// World files for the generated route.
#[derive(Clone, Debug, Default)]
pub struct DemoWorldFileSource {
    terrain: GeneratedTileSource,
}

impl DemoWorldFileSource {
    pub fn new(terrain: GeneratedTileSource) -> Self {
        Self { terrain }
    }

    fn ground(&self, tile: TileCoord, local: Vec3) -> f32 {
        self.terrain.height_at(
            tile.x as f32 * TILE_SIZE + local.x,
            tile.z as f32 * TILE_SIZE + local.z,
        )
    }

    fn on_ground(&self, uid: u32, tile: TileCoord, x: f32, z: f32) -> Placement {
        let y = self.ground(tile, Vec3::new(x, 0.0, z));
        Placement::new(uid, Vec3::new(x, y, z))
    }

    fn line(&self, tile: TileCoord) -> Vec<PlacementRecord> {
        let east = Quat::from_rotation_y(FRAC_PI_2);
        let mut records = Vec::new();

        let pieces = (TILE_SIZE / STRAIGHT_LENGTH) as u32;
        for i in 0..pieces {
            let x = -0.5 * TILE_SIZE + i as f32 * STRAIGHT_LENGTH;
            let mut placement = self.on_ground(100 + i, tile, x, 0.0);
            placement.position.y += RAIL_HEIGHT;
            placement.rotation = east;
            placement.casts_shadow = true;
            records.push(PlacementRecord::Track {
                placement,
                shape: "a1t256m.s".into(),
                track_shape: STRAIGHT_SHAPE,
            });
        }

        // A banked spur curving away to the north.
        let mut spur = self.on_ground(10, tile, 0.0, -12.0);
        spur.position.y += RAIL_HEIGHT;
        spur.rotation = east;
        spur.casts_shadow = true;
        records.push(PlacementRecord::DynamicTrack {
            placement: spur,
            sections: vec![
                DtrackData::straight(40.0),
                DtrackData::curve(-0.4, 400.0),
                DtrackData::straight(60.0),
            ],
        });

        let mut signal = self.on_ground(SIGNAL_UID, tile, 300.0, 4.0);
        signal.rotation = east;
        records.push(PlacementRecord::Signal {
            placement: signal,
            shape: "home_signal.s".into(),
            heads: vec![1, 2],
        });

        records.push(PlacementRecord::LevelCrossing {
            placement: self.on_ground(LEVEL_CROSSING_UID, tile, -300.0, 0.0),
            shape: "crossing_gate.s".into(),
        });
        records.push(PlacementRecord::Pickup {
            placement: self.on_ground(PICKUP_UID, tile, 520.0, 6.0),
            shape: "water_tower.s".into(),
        });
        records.push(PlacementRecord::SpeedPost {
            placement: self.on_ground(41, tile, -600.0, 3.5),
            shape: "speedpost.s".into(),
            limits: vec![100.0, 60.0],
        });
        records.push(PlacementRecord::Platform {
            placement: self.on_ground(42, tile, 120.0, 5.0),
            name: format!("Halt {}", tile.x),
        });
        records.push(PlacementRecord::Siding {
            placement: self.on_ground(43, tile, -120.0, -8.0),
            name: "Loop".into(),
        });
        records.push(PlacementRecord::Transfer {
            placement: self.on_ground(44, tile, 120.0, 9.0),
            texture: "platform_edge.ace".into(),
            width: 80.0,
            height: 3.0,
        });
        records.push(PlacementRecord::CarSpawner {
            placement: self.on_ground(45, tile, -300.0, 40.0),
            list: "default".into(),
            frequency: 2.0,
        });

        for i in 0..POLE_COUNT {
            let x = -0.5 * POLE_SPACING * POLE_COUNT as f32 + i as f32 * POLE_SPACING;
            records.push(PlacementRecord::Static {
                placement: self.on_ground(200 + i, tile, x, 4.5),
                shape: "telegraph_pole.s".into(),
            });
        }
        records
    }

    fn countryside(&self, tile: TileCoord) -> Vec<PlacementRecord> {
        let mut wood = self.on_ground(1, tile, 200.0, 0.0);
        wood.casts_shadow = true;
        vec![
            PlacementRecord::Forest {
                placement: wood,
                texture: "conifer.ace".into(),
                area: Vec2::new(400.0, 300.0),
                population: 120,
                tree_size: Vec2::new(4.0, 12.0),
            },
            PlacementRecord::Static {
                placement: self.on_ground(2, tile, -400.0, 150.0),
                shape: "farmhouse.s".into(),
            },
            PlacementRecord::Animated {
                placement: self.on_ground(3, tile, -450.0, 180.0),
                shape: "windpump.s".into(),
                frame_rate: 4.0,
            },
            PlacementRecord::Hazard {
                placement: self.on_ground(4, tile, -500.0, 100.0),
                shape: "cow.s".into(),
            },
        ]
    }
}

impl WorldFileSource for DemoWorldFileSource {
    fn load(&self, tile: TileCoord) -> Result<Option<WorldFileData>, WorldFileError> {
        let records = match tile.z.abs() {
            0 => self.line(tile),
            1 => self.countryside(tile),
            _ => return Ok(None),
        };
        Ok(Some(WorldFileData { records }))
    }
}

/// Track shapes and interlocking state for the generated route.
pub fn demo_track_database() -> MemoryTrackDatabase {
    let mut database = MemoryTrackDatabase::new();
    database.insert_track_shape(STRAIGHT_SHAPE, vec![DtrackData::straight(STRAIGHT_LENGTH)]);
    // Home signal showing the first head.
    database.insert_signal(SIGNAL_UID, Arc::new(SignalState::new(0b10)));
    database.insert_level_crossing(LEVEL_CROSSING_UID, Arc::new(ControlState::new(false)));
    database.insert_pickup(PICKUP_UID, Arc::new(ControlState::new(false)));
    database
}
