//! Command-line argument parsing for the Railview viewer.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Railview command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "railview", about = "Railview route viewer")]
pub struct CliArgs {
    /// Route directory (contains `world/` and `terrain/`).
    #[arg(long)]
    pub route: Option<PathBuf>,

    /// Viewing distance in meters.
    #[arg(long)]
    pub viewing_distance: Option<f32>,

    /// Render distant mountains.
    #[arg(long)]
    pub distant_mountains: Option<bool>,

    /// Render dynamic shadows.
    #[arg(long)]
    pub shadows: Option<bool>,

    /// Generate overhead wire.
    #[arg(long)]
    pub wire: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of frames to render before exiting.
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Starting tile x.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub tile_x: i32,

    /// Starting tile z.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub tile_z: i32,

    /// Upload meshes to a GPU device instead of keeping them in host memory.
    #[arg(long)]
    pub gpu: bool,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref route) = args.route {
            self.route.path = route.clone();
        }
        if let Some(distance) = args.viewing_distance {
            self.render.viewing_distance_m = distance;
        }
        if let Some(enabled) = args.distant_mountains {
            self.render.distant_mountains = enabled;
        }
        if let Some(enabled) = args.shadows {
            self.render.dynamic_shadows = enabled;
        }
        if let Some(enabled) = args.wire {
            self.track.wire_enabled = enabled;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            viewing_distance: Some(6000.0),
            shadows: Some(false),
            route: Some(PathBuf::from("/routes/demo")),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.render.viewing_distance_m, 6000.0);
        assert!(!config.render.dynamic_shadows);
        assert_eq!(config.route.path, PathBuf::from("/routes/demo"));
        // Non-overridden fields retain defaults
        assert_eq!(config.render.shadow_map_count, 3);
        assert!(!config.track.wire_enabled);
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_cli_parses_negative_tiles() {
        let args = CliArgs::try_parse_from([
            "railview",
            "--tile-x",
            "-5012",
            "--tile-z",
            "14987",
            "--distant-mountains",
            "true",
        ])
        .unwrap();
        assert_eq!(args.tile_x, -5012);
        assert_eq!(args.tile_z, 14987);
        assert_eq!(args.distant_mountains, Some(true));
        assert_eq!(args.frames, 600);
    }
}
