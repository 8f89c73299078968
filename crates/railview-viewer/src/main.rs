//! Headless route viewer.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI
//! flags. Without a route directory the viewer runs a generated demo route.
//! Run with `cargo run -p railview-viewer -- --frames 1200 --wire true` to
//! drive the camera for twenty simulated seconds with overhead wire.

mod demo;
mod error;
mod loader;
mod route;
mod settings;
mod viewer;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use railview_config::{CliArgs, Config, ConfigError, default_config_dir};
use railview_coords::TileCoord;
use railview_render::{BufferAllocator, HostBufferAllocator, WgpuBufferAllocator, init_headless_device};
use tracing::{error, info, warn};

use crate::error::ViewerError;
use crate::route::RouteSources;
use crate::viewer::Viewer;

/// Simulated time per frame, seconds.
const FRAME_SECONDS: f64 = 1.0 / 60.0;
/// Frames between config hot-reload checks.
const RELOAD_INTERVAL_FRAMES: u32 = 120;
const INITIAL_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), ViewerError> {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".railview"));

    // Load or create config, then apply CLI overrides
    let (mut file_config, load_error) = load_file_config(&config_dir);
    let mut config = file_config.clone();
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    railview_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    if let Some(e) = load_error {
        warn!("Failed to load config: {e}, using defaults");
    }
    config.validate()?;

    let allocator = buffer_allocator(args.gpu);
    let sources = if config.route.path.as_os_str().is_empty() {
        info!("No route given, running the generated demo route");
        RouteSources::generated()
    } else {
        info!("Opening route {}", config.route.path.display());
        RouteSources::open(&config.route.path)?
    };

    let start = TileCoord::new(args.tile_x, args.tile_z);
    let mut viewer = Viewer::new(&config, sources, allocator, start)?;
    if viewer.load_initial(INITIAL_LOAD_TIMEOUT).is_none() {
        warn!("Initial load around {start:?} did not finish within {INITIAL_LOAD_TIMEOUT:?}");
    }

    let wall = Instant::now();
    let mut items = 0;
    let mut culled = 0;
    let mut render_calls = 0;
    for index in 0..args.frames {
        if index > 0 && index % RELOAD_INTERVAL_FRAMES == 0 {
            match file_config.reload(&config_dir) {
                Ok(Some(reloaded)) => {
                    file_config = reloaded.clone();
                    let mut effective = reloaded;
                    effective.apply_cli_overrides(&args);
                    viewer.apply_config(effective);
                }
                Ok(None) => {}
                Err(e) => warn!("Config reload failed: {e}"),
            }
        }

        let stats = viewer.frame(f64::from(index) * FRAME_SECONDS);
        items += stats.total_items();
        culled += stats.culled;
        render_calls += stats.render_calls;
    }

    let frames = args.frames.max(1) as usize;
    info!(
        "Rendered {} frames in {:?}, ending on {:?}: {:.1} items, {:.1} culled, {:.1} render calls per frame, {} world files loaded",
        args.frames,
        wall.elapsed(),
        viewer.camera().tile(),
        items as f64 / frames as f64,
        culled as f64 / frames as f64,
        render_calls as f64 / frames as f64,
        viewer.scenery().world_files().len()
    );
    Ok(())
}

/// The config stored in `config_dir`, or the defaults and the reason it could
/// not be loaded. The error is reported once logging is up.
fn load_file_config(config_dir: &Path) -> (Config, Option<ConfigError>) {
    match Config::load_or_create(config_dir) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    }
}

/// GPU-backed buffers when requested and available, host memory otherwise.
fn buffer_allocator(gpu: bool) -> Arc<dyn BufferAllocator> {
    if !gpu {
        return Arc::new(HostBufferAllocator);
    }
    match init_headless_device() {
        Ok(device) => {
            info!(
                "Using GPU adapter {} ({:?})",
                device.adapter_info.name, device.adapter_info.backend
            );
            Arc::new(WgpuBufferAllocator::new(device.device))
        }
        Err(e) => {
            warn!("{e}, keeping meshes in host memory");
            Arc::new(HostBufferAllocator)
        }
    }
}
