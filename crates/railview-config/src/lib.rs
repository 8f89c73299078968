//! Configuration system for Railview.
//!
//! Settings persist to disk as `config.ron`. Every section uses
//! `#[serde(default)]`, so older or partial files keep loading as fields are
//! added. CLI flags override whatever was loaded.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, PitchControl, RenderConfig, RouteConfig, StreamingConfig, TrackConfig,
    default_config_dir,
};
pub use error::ConfigError;
