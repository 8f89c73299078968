//! Procedural track geometry: banked rails and ballast, and overhead wire.
//!
//! A track section is a chain of [`DtrackData`] subsections, each straight or
//! a circular arc. The builders sweep a cross-section [`TrackProfile`] along
//! the chain, emitting one ring of vertices per station and stitching
//! neighbouring rings into quads.

mod bank;
mod builder;
mod dtrack;
mod profile;
mod ribbon;
mod station;

pub use bank::{BankProfile, BankState, ElevationSettings, plan_banking, super_elevation_for};
pub use builder::{SuperElevationBuilder, TrackBuildSettings, WireBuilder};
pub use dtrack::{DtrackData, TrackPose};
pub use profile::{Polyline, ProfileVertex, TrackProfile};
pub use ribbon::{Ring, StationStep, TrackMesh, TrackVertex, build_ribbon};
pub use station::{PitchControl, StationSettings, station_count, wire_station_count};
