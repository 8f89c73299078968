//! Section builders: banked track and overhead wire.

use glam::Vec3;

use crate::bank::{BankProfile, ElevationSettings, plan_banking, super_elevation_for};
use crate::dtrack::{DtrackData, TrackPose};
use crate::profile::{MESSENGER_RISE, TrackProfile};
use crate::ribbon::{TrackMesh, build_ribbon};
use crate::station::{StationSettings, station_count, wire_station_count};

const DROPPER_HALF_WIDTH: f32 = 0.005;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackBuildSettings {
    pub stations: StationSettings,
    pub elevation: ElevationSettings,
    /// Speed the banking is sized for, m/s.
    pub speed_limit_mps: f32,
    /// Contact wire height above the rail head, meters.
    pub wire_height: f32,
    /// Station spacing for straight wire, meters.
    pub wire_segment_length: f32,
    /// Add a messenger wire and droppers.
    pub double_wire: bool,
}

impl Default for TrackBuildSettings {
    fn default() -> Self {
        Self {
            stations: StationSettings::default(),
            elevation: ElevationSettings::default(),
            speed_limit_mps: 44.7,
            wire_height: 6.0,
            wire_segment_length: 10.0,
            double_wire: false,
        }
    }
}

/// Builds banked track for a chain of subsections.
#[derive(Clone, Debug)]
pub struct SuperElevationBuilder {
    settings: TrackBuildSettings,
    profile: TrackProfile,
}

impl SuperElevationBuilder {
    /// Builder with the standard ballast and rail profile for the configured gauge.
    pub fn new(settings: TrackBuildSettings) -> Self {
        let profile = TrackProfile::standard(settings.elevation.gauge_m);
        Self::with_profile(settings, profile)
    }

    pub fn with_profile(settings: TrackBuildSettings, profile: TrackProfile) -> Self {
        Self { settings, profile }
    }

    pub fn settings(&self) -> &TrackBuildSettings {
        &self.settings
    }

    pub fn profile(&self) -> &TrackProfile {
        &self.profile
    }

    /// Bank profile of every subsection.
    pub fn plan(&self, sections: &[DtrackData]) -> Vec<BankProfile> {
        plan_banking(sections, |section| {
            section.radius().map_or(0.0, |radius| {
                super_elevation_for(radius, self.settings.speed_limit_mps, &self.settings.elevation)
            })
        })
    }

    /// Whether any subsection of the chain ends up banked.
    pub fn is_banked(&self, sections: &[DtrackData]) -> bool {
        self.plan(sections).iter().any(|p| *p != BankProfile::None)
    }

    /// Sweep the profile along `sections`, starting at `start`.
    pub fn build(&self, sections: &[DtrackData], start: TrackPose) -> TrackMesh {
        let mut mesh = TrackMesh::default();
        let mut pose = start;
        let mut distance = 0.0;
        for (section, bank) in sections.iter().zip(self.plan(sections)) {
            let intervals = station_count(section, &self.settings.stations);
            let rings = build_ribbon(section, &self.profile, bank, intervals);
            mesh.append_ribbon(&rings, &self.profile, &pose, distance);
            distance += section.length();
            pose = pose.advance(section);
        }
        mesh
    }
}

/// Builds overhead wire above a chain of subsections.
#[derive(Clone, Debug)]
pub struct WireBuilder {
    settings: TrackBuildSettings,
    profile: TrackProfile,
}

impl WireBuilder {
    pub fn new(settings: TrackBuildSettings) -> Self {
        let profile = if settings.double_wire {
            TrackProfile::catenary(settings.wire_height)
        } else {
            TrackProfile::contact_wire(settings.wire_height)
        };
        Self { settings, profile }
    }

    /// Sweep the wire along `sections`. Wire is never banked.
    ///
    /// With a messenger wire, a dropper joins the two at every other station.
    pub fn build(&self, sections: &[DtrackData], start: TrackPose) -> TrackMesh {
        let mut mesh = TrackMesh::default();
        let mut pose = start;
        let mut distance = 0.0;
        for section in sections {
            let intervals = wire_station_count(
                section,
                &self.settings.stations,
                self.settings.wire_segment_length,
            );
            let rings = build_ribbon(section, &self.profile, BankProfile::None, intervals);
            mesh.append_ribbon(&rings, &self.profile, &pose, distance);

            if self.settings.double_wire {
                let bottom = self.settings.wire_height;
                let top = bottom + MESSENGER_RISE;
                for ring in rings.iter().step_by(2) {
                    let lateral = Vec3::Y.cross(ring.tangent).normalize_or(Vec3::X) * DROPPER_HALF_WIDTH;
                    let at = |side: Vec3, height: f32| {
                        pose.transform_point(ring.origin + side + Vec3::Y * height)
                    };
                    mesh.append_quad(
                        [at(-lateral, bottom), at(lateral, bottom), at(lateral, top), at(-lateral, top)],
                        pose.transform_vector(ring.tangent),
                    );
                }
            }

            distance += section.length();
            pose = pose.advance(section);
        }
        mesh
    }
}
