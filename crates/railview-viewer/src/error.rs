//! Viewer startup errors.

use railview_config::ConfigError;

use crate::route::RouteError;

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),

    /// The loader thread could not be started.
    #[error("failed to spawn loader thread: {0}")]
    LoaderSpawn(#[source] std::io::Error),
}
