//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level viewer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Rendering and shadow settings.
    pub render: RenderConfig,
    /// Procedural track and overhead wire settings.
    pub track: TrackConfig,
    /// Tile streaming and texture budget settings.
    pub streaming: StreamingConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Which route to open.
    pub route: RouteConfig,
}

/// Rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Scenery and terrain streaming distance in meters.
    pub viewing_distance_m: f32,
    /// Distant-mountain streaming distance in meters.
    pub far_viewing_distance_m: f32,
    /// Render low-resolution distant mountains beyond the viewing distance.
    pub distant_mountains: bool,
    /// Vertical field of view in degrees.
    pub viewing_fov_deg: f32,
    /// Render dynamic shadow cascades.
    pub dynamic_shadows: bool,
    /// Number of shadow cascades (1-4).
    pub shadow_map_count: u32,
    /// Far distance of the last cascade in meters; 0 derives it from the viewing distance.
    pub shadow_map_distance_m: f32,
    /// Shadow map resolution (width = height) per cascade.
    pub shadow_map_resolution: u32,
    /// Apply a separable blur to each cascade after drawing.
    pub shadow_map_blur: bool,
    /// Collapse repeated static shapes into instanced draws.
    pub model_instancing: bool,
}

/// How curved track stations are refined beyond the chord-span angle.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum PitchControl {
    /// Stations every `chord_span_deg` only.
    #[default]
    None,
    /// Cap the straight-line distance between stations.
    ChordLength,
    /// Cap the distance between the chord midpoint and the true arc.
    ChordDisplacement,
}

/// Procedural track configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackConfig {
    /// Build banked geometry for curves.
    pub super_elevation: bool,
    /// Multiplier applied to the computed super-elevation.
    pub super_elevation_scale: f32,
    /// Upper clamp for super-elevation in meters of rail height difference.
    pub max_super_elevation_m: f32,
    /// Curves with a larger radius than this are banked; tighter curves are yard track.
    pub min_super_elevation_radius_m: f32,
    /// Track gauge in meters.
    pub gauge_m: f32,
    /// Target arc angle between stations on curved track, in degrees.
    pub chord_span_deg: f32,
    /// Station refinement heuristic.
    pub pitch_control: PitchControl,
    /// Limit used by the pitch-control heuristic, in meters.
    pub pitch_control_scalar: f32,
    /// Generate overhead wire above electrified track.
    pub wire_enabled: bool,
    /// Add a messenger wire and droppers above the contact wire.
    pub double_wire: bool,
    /// Contact wire height above the rail head in meters.
    pub wire_height_m: f32,
    /// Distance between wire stations on straight track, in meters.
    pub wire_segment_length_m: f32,
    /// Speed used for the banking heuristic when a section has no limit, in m/s.
    pub route_speed_limit_mps: f32,
}

/// Tile streaming configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamingConfig {
    /// Terrain tile cache capacity.
    pub tile_cache_capacity: usize,
    /// Load night textures only once the sun is down.
    pub conditional_day_night_textures: bool,
    /// Stop loading night textures once texture memory use passes this mark.
    pub texture_memory_threshold_mb: u64,
    /// Total texture memory available to the viewer.
    pub texture_memory_budget_mb: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log per-frame composition statistics at debug level.
    pub frame_stats: bool,
}

/// Route selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RouteConfig {
    /// Route directory containing `world/` and `terrain/`. Empty runs a generated demo route.
    pub path: PathBuf,
}

// --- Default implementations ---

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            viewing_distance_m: 2000.0,
            far_viewing_distance_m: 40_000.0,
            distant_mountains: false,
            viewing_fov_deg: 45.0,
            dynamic_shadows: true,
            shadow_map_count: 3,
            shadow_map_distance_m: 0.0,
            shadow_map_resolution: 1024,
            shadow_map_blur: false,
            model_instancing: true,
        }
    }
}

impl Default for TrackConfig {
    fn default() -> Self {
        Self {
            super_elevation: true,
            super_elevation_scale: 1.0,
            max_super_elevation_m: 0.15,
            min_super_elevation_radius_m: 100.0,
            gauge_m: 1.435,
            chord_span_deg: 1.0,
            pitch_control: PitchControl::None,
            pitch_control_scalar: 1.0,
            wire_enabled: false,
            double_wire: false,
            wire_height_m: 6.0,
            wire_segment_length_m: 10.0,
            route_speed_limit_mps: 44.7,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            tile_cache_capacity: 64,
            conditional_day_night_textures: true,
            texture_memory_threshold_mb: 1536,
            texture_memory_budget_mb: 2048,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            frame_stats: false,
        }
    }
}

/// Platform config directory for the viewer, if the OS exposes one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("railview"))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            config.validate()?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        new_config.validate()?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Reject values the renderer cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4).contains(&self.render.shadow_map_count) {
            return Err(ConfigError::InvalidValue {
                field: "render.shadow_map_count",
                reason: format!("{} is not in 1..=4", self.render.shadow_map_count),
            });
        }
        if self.render.viewing_distance_m <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "render.viewing_distance_m",
                reason: "must be positive".to_string(),
            });
        }
        if self.track.chord_span_deg <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "track.chord_span_deg",
                reason: "must be positive".to_string(),
            });
        }
        if self.streaming.tile_cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "streaming.tile_cache_capacity",
                reason: "must hold at least one tile".to_string(),
            });
        }
        if self.streaming.texture_memory_threshold_mb > self.streaming.texture_memory_budget_mb {
            return Err(ConfigError::InvalidValue {
                field: "streaming.texture_memory_threshold_mb",
                reason: format!(
                    "{} MiB exceeds the {} MiB budget",
                    self.streaming.texture_memory_threshold_mb, self.streaming.texture_memory_budget_mb
                ),
            });
        }
        Ok(())
    }

    /// Distance covered by the last shadow cascade.
    ///
    /// Falls back to half the viewing distance, capped at 1 km, when unset.
    pub fn shadow_map_distance(&self) -> f32 {
        if self.render.shadow_map_distance_m > 0.0 {
            self.render.shadow_map_distance_m
        } else {
            (self.render.viewing_distance_m * 0.5).min(1000.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("viewing_distance_m: 2000.0"));
        assert!(ron_str.contains("tile_cache_capacity: 64"));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.track.pitch_control = PitchControl::ChordDisplacement;
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(render: (viewing_distance_m: 3000.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.render.viewing_distance_m, 3000.0);
        assert_eq!(config.render.shadow_map_count, 3);
        assert_eq!(config.track, TrackConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.render.distant_mountains = true;
        config.track.wire_enabled = true;
        config.route.path = PathBuf::from("routes/example");

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.render.viewing_distance_m = 4000.0;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().render.viewing_distance_m, 4000.0);
        assert!(modified.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_cascade_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.ron"),
            "(render: (shadow_map_count: 6))",
        )
        .unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "render.shadow_map_count",
                ..
            }
        ));
    }

    #[test]
    fn test_texture_threshold_within_budget() {
        let mut config = Config::default();
        config.streaming.texture_memory_budget_mb = 1024;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "streaming.texture_memory_threshold_mb",
                ..
            })
        ));
        config.streaming.texture_memory_threshold_mb = 1024;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shadow_distance_fallback() {
        let mut config = Config::default();
        assert_eq!(config.shadow_map_distance(), 1000.0);
        config.render.viewing_distance_m = 800.0;
        assert_eq!(config.shadow_map_distance(), 400.0);
        config.render.shadow_map_distance_m = 250.0;
        assert_eq!(config.shadow_map_distance(), 250.0);
    }
}
