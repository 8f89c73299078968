//! Structured logging for Railview.
//!
//! Installs a `tracing` subscriber with console output and, in debug builds, a
//! JSON log file. The render and config crates log through the `log` facade;
//! those records reach the same subscriber through `tracing-log`.

use std::path::Path;

use railview_config::Config;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when neither `RUST_LOG` nor the config names a level.
pub const DEFAULT_FILTER: &str = "info,wgpu=warn,naga=warn";

/// File name of the JSON log written in debug builds.
pub const LOG_FILE_NAME: &str = "railview.log";

/// Initialize the global tracing subscriber.
///
/// * `log_dir` - directory for the JSON log file (debug builds only)
/// * `debug_build` - whether to add the JSON file layer
/// * `config` - optional configuration whose `debug.log_level` sets the filter
///
/// `RUST_LOG` always wins over the config.
///
/// ```no_run
/// use railview_log::init_logging;
///
/// init_logging(None, false, None);
/// ```
pub fn init_logging(log_dir: Option<&Path>, debug_build: bool, config: Option<&Config>) {
    let filter_str = filter_from_config(config);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    // The loader thread is named, so thread names tell streaming apart from frame work.
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(true)
        .with_level(true)
        .with_timer(fmt::time::uptime());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    if debug_build
        && let Some(log_dir) = log_dir
        && std::fs::create_dir_all(log_dir).is_ok()
        && let Ok(log_file) = std::fs::File::create(log_dir.join(LOG_FILE_NAME))
    {
        let file_layer = fmt::layer()
            .with_writer(log_file)
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::uptime())
            .json();

        subscriber.with(file_layer).init();
        return;
    }

    subscriber.init();
}

/// The filter directive string derived from the config's log level.
///
/// A bare level such as `debug` keeps the GPU crates at `warn`.
pub fn filter_from_config(config: Option<&Config>) -> String {
    match config.map(|c| c.debug.log_level.trim()) {
        Some(level) if !level.is_empty() && level.contains('=') => level.to_string(),
        Some(level) if !level.is_empty() => format!("{level},wgpu=warn,naga=warn"),
        _ => DEFAULT_FILTER.to_string(),
    }
}

/// Create an `EnvFilter` with the default filter string.
pub fn default_env_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}
