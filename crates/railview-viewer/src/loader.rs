//! The loader thread.
//!
//! Streaming passes run here so the render loop never waits on tile or
//! world file I/O. Requests carry the camera tile; when the camera moves to a
//! new tile the running pass is cancelled and the newest request wins.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use railview_coords::{CancelFlag, TileCoord};
use railview_scenery::{SceneryLoadReport, SceneryStreamer};
use railview_terrain::{TerrainLoadReport, TerrainStreamer};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LoaderCommand {
    Load { camera: TileCoord, sun_elevation: f32 },
    Shutdown,
}

/// One finished streaming pass.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadCompleted {
    pub camera: TileCoord,
    pub terrain: TerrainLoadReport,
    pub scenery: SceneryLoadReport,
    pub duration: Duration,
}

impl LoadCompleted {
    pub fn cancelled(&self) -> bool {
        self.terrain.cancelled || self.scenery.cancelled
    }
}

/// Handle to the loader thread. Dropping it stops and joins the thread.
pub struct LoaderProcess {
    commands: Sender<LoaderCommand>,
    completed: Receiver<LoadCompleted>,
    cancel: CancelFlag,
    last_requested: Option<TileCoord>,
    handle: Option<JoinHandle<()>>,
}

impl LoaderProcess {
    pub fn spawn(terrain: Arc<TerrainStreamer>, scenery: Arc<SceneryStreamer>) -> std::io::Result<Self> {
        let (commands, command_receiver) = unbounded::<LoaderCommand>();
        let (completed_sender, completed) = unbounded::<LoadCompleted>();
        let cancel = CancelFlag::new();
        let thread_cancel = cancel.clone();

        let handle = std::thread::Builder::new()
            .name("loader".into())
            .spawn(move || {
                while let Some((camera, sun_elevation)) = next_load(&command_receiver) {
                    thread_cancel.reset();
                    let start = Instant::now();
                    let terrain = terrain.load(camera, &thread_cancel);
                    let scenery = scenery.load(camera, sun_elevation, &thread_cancel);
                    let done = LoadCompleted {
                        camera,
                        terrain,
                        scenery,
                        duration: start.elapsed(),
                    };
                    debug!("Load pass for {camera:?} took {:?}", done.duration);
                    if completed_sender.send(done).is_err() {
                        break;
                    }
                }
                debug!("Loader thread stopped");
            })?;

        info!("Loader thread started");
        Ok(Self {
            commands,
            completed,
            cancel,
            last_requested: None,
            handle: Some(handle),
        })
    }

    /// Queues a streaming pass for a camera on `camera`.
    ///
    /// A pass still running for another tile is cancelled first. Returns
    /// `false` if the loader thread has stopped.
    pub fn request(&mut self, camera: TileCoord, sun_elevation: f32) -> bool {
        if self.last_requested.is_some_and(|last| last != camera) {
            self.cancel.cancel();
        }
        if self.commands.send(LoaderCommand::Load { camera, sun_elevation }).is_err() {
            warn!("Loader thread has stopped, dropping load request for {camera:?}");
            return false;
        }
        self.last_requested = Some(camera);
        true
    }

    pub fn last_requested(&self) -> Option<TileCoord> {
        self.last_requested
    }

    /// Passes finished since the last call, oldest first.
    pub fn completed(&self) -> Vec<LoadCompleted> {
        self.completed.try_iter().collect()
    }

    /// Blocks until a pass finishes or `timeout` runs out.
    pub fn wait(&self, timeout: Duration) -> Option<LoadCompleted> {
        self.completed.recv_timeout(timeout).ok()
    }
}

impl Drop for LoaderProcess {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.commands.send(LoaderCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Blocks for the next command and skips to the newest queued one.
///
/// `None` once the thread should stop.
fn next_load(receiver: &Receiver<LoaderCommand>) -> Option<(TileCoord, f32)> {
    let mut command = receiver.recv().ok()?;
    for newer in receiver.try_iter() {
        if command == LoaderCommand::Shutdown {
            break;
        }
        command = newer;
    }
    match command {
        LoaderCommand::Load { camera, sun_elevation } => Some((camera, sun_elevation)),
        LoaderCommand::Shutdown => None,
    }
}
