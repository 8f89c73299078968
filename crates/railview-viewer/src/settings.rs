//! Mapping from the persisted config to each subsystem's settings.

use railview_config::{Config, PitchControl as ConfigPitchControl};
use railview_render::FrameSettings;
use railview_scenery::ScenerySettings;
use railview_terrain::TerrainSettings;
use railview_track::{ElevationSettings, PitchControl, StationSettings, TrackBuildSettings};

const MEBIBYTE: u64 = 1024 * 1024;

pub fn frame_settings(config: &Config) -> FrameSettings {
    FrameSettings {
        dynamic_shadows: config.render.dynamic_shadows,
        shadow_map_count: config.render.shadow_map_count,
        shadow_map_distance: config.shadow_map_distance(),
        shadow_map_resolution: config.render.shadow_map_resolution,
        shadow_map_blur: config.render.shadow_map_blur,
        distant_mountains: config.render.distant_mountains,
    }
}

pub fn terrain_settings(config: &Config) -> TerrainSettings {
    TerrainSettings {
        viewing_distance: config.render.viewing_distance_m,
        far_viewing_distance: config.render.far_viewing_distance_m,
        distant_mountains: config.render.distant_mountains,
        tile_cache_capacity: config.streaming.tile_cache_capacity,
    }
}

pub fn track_settings(config: &Config) -> TrackBuildSettings {
    let track = &config.track;
    let pitch_control = match track.pitch_control {
        ConfigPitchControl::None => PitchControl::None,
        ConfigPitchControl::ChordLength => PitchControl::ChordLength,
        ConfigPitchControl::ChordDisplacement => PitchControl::ChordDisplacement,
    };
    TrackBuildSettings {
        stations: StationSettings {
            chord_span: track.chord_span_deg.to_radians(),
            pitch_control,
            pitch_control_scalar: track.pitch_control_scalar,
            ..StationSettings::default()
        },
        elevation: ElevationSettings {
            enabled: track.super_elevation,
            scale: track.super_elevation_scale,
            max_elevation_m: track.max_super_elevation_m,
            min_radius_m: track.min_super_elevation_radius_m,
            gauge_m: track.gauge_m,
        },
        speed_limit_mps: track.route_speed_limit_mps,
        wire_height: track.wire_height_m,
        wire_segment_length: track.wire_segment_length_m,
        double_wire: track.double_wire,
    }
}

pub fn scenery_settings(config: &Config) -> ScenerySettings {
    ScenerySettings {
        viewing_distance: config.render.viewing_distance_m,
        model_instancing: config.render.model_instancing,
        wire_enabled: config.track.wire_enabled,
        track: track_settings(config),
        conditional_night_textures: config.streaming.conditional_day_night_textures,
        texture_memory_threshold: config.streaming.texture_memory_threshold_mb * MEBIBYTE,
        texture_memory_budget: config.streaming.texture_memory_budget_mb * MEBIBYTE,
        ..ScenerySettings::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_line_up() {
        let config = Config::default();
        assert_eq!(terrain_settings(&config), TerrainSettings::default());
        assert_eq!(scenery_settings(&config).texture_memory_threshold, 1536 * MEBIBYTE);
        assert_eq!(scenery_settings(&config).texture_memory_budget, 2048 * MEBIBYTE);
        assert_eq!(frame_settings(&config).shadow_map_count, 3);
    }

    #[test]
    fn test_track_settings_convert_units() {
        let mut config = Config::default();
        config.track.chord_span_deg = 2.0;
        config.track.pitch_control = ConfigPitchControl::ChordDisplacement;
        config.track.super_elevation = false;
        let track = track_settings(&config);
        assert!((track.stations.chord_span - 2f32.to_radians()).abs() < 1e-7);
        assert_eq!(track.stations.pitch_control, PitchControl::ChordDisplacement);
        assert!(!track.elevation.enabled);
    }
}
