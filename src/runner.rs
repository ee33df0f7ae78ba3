//! Container lifecycle management.
//!
//! Creates a detached container from an image, waits for it to reach a
//! terminal state, supports responsive cancellation, optionally extracts the
//! result archive, and applies the cleanup policy.
//!
//! # Cancellation
//!
//! The wait loop polls container status on a fixed interval and is
//! interruptible at every tick through a [`CancellationToken`]. The
//! interrupt listener only cancels the token; the runner itself issues the
//! stop request from inside the loop and keeps polling until the resulting
//! terminal status is observed. Repeated interrupts are not distinguished.
//! Cancellation is a normal stopped outcome, not an error.
//!
//! There is no timeout on the wait loop: the container's own workload
//! defines when it finishes.

use crate::chunks::{extract_archive, ChunkReader};
use crate::constants::{CONTAINER_OUTPUT_PATH, ENTRY_POINT_FILE, POLL_INTERVAL, SERVER_PORT};
use crate::engine::{short, ChunkStream, ContainerEngine, ContainerSpec, ContainerStatus, Image, ImageRef};
use crate::error::{Error, Result};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// Run Modes
// =============================================================================

/// How the container's entry point is invoked.
#[derive(Debug, Clone, Default)]
pub struct RunMode {
    /// Run the computation and save its datasets.
    pub batch: bool,
    /// Serve the datasets after the computation.
    pub server: bool,
    /// In combined batch/server runs, serve from the saved datasets.
    pub from_saved: bool,
    /// Extra arguments passed through to the entry point.
    pub extra_args: Vec<String>,
    /// Explicit host port; implies a port mapping even outside server mode.
    pub port: Option<u16>,
}

impl RunMode {
    /// Assembles the in-container command line.
    pub fn command(&self) -> Vec<String> {
        let mut command = vec![format!("./{ENTRY_POINT_FILE}")];
        if self.batch {
            command.push("--batch".to_string());
        }
        if self.server {
            command.push("--server".to_string());
        }
        if self.from_saved {
            command.push("--from-saved".to_string());
        }
        command.extend(self.extra_args.iter().cloned());
        command
    }

    /// Host→container port mapping, only when server mode (or an explicitly
    /// requested port) is active.
    pub fn port_mapping(&self) -> Option<(u16, u16)> {
        match (self.port, self.server) {
            (Some(host), _) => Some((host, SERVER_PORT)),
            (None, true) => Some((SERVER_PORT, SERVER_PORT)),
            (None, false) => None,
        }
    }
}

/// Final report of one managed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Engine-side container id.
    pub container_id: String,
    /// Terminal status the wait observed.
    pub status: ContainerStatus,
    /// Whether an interrupt triggered the stop.
    pub cancelled: bool,
    /// Whether the cleanup policy removed the container.
    pub removed: bool,
}

// =============================================================================
// Container Runner
// =============================================================================

/// Runs containers from a resolved image and recovers their output.
pub struct ContainerRunner {
    engine: Arc<dyn ContainerEngine>,
    image: Image,
    output_dir: Option<PathBuf>,
}

impl ContainerRunner {
    /// Creates a runner, resolving the image reference through the engine.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImageReference`] when a by-name reference cannot be
    /// resolved.
    pub async fn new(
        engine: Arc<dyn ContainerEngine>,
        image: ImageRef,
        output_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let image = match image {
            ImageRef::ByHandle(image) => image,
            ImageRef::ByName(name) => engine.resolve_image(&name).await?,
        };
        Ok(Self {
            engine,
            image,
            output_dir,
        })
    }

    /// The resolved image the runner starts containers from.
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Runs one container to a terminal state.
    ///
    /// Blocks (from the caller's perspective) until the container exits or
    /// is stopped via `cancel`, then extracts the result archive when an
    /// output directory is set, then applies the cleanup policy: non-server
    /// runs without `keep` are force-removed; server-mode containers and
    /// `keep` runs are left in place.
    pub async fn run(&self, mode: &RunMode, keep: bool, cancel: CancellationToken) -> Result<RunOutcome> {
        info!("running container from image {}", self.image.short_id());
        info!("image tags: {}", self.image.tags.join(" "));

        let spec = ContainerSpec {
            image: self.image.tags[0].clone(),
            name: format!("cuberun-{}", Uuid::new_v4()),
            command: mode.command(),
            port_mapping: mode.port_mapping(),
        };
        let id = self.engine.create_container(&spec).await?;
        self.engine.start_container(&id).await?;

        info!("waiting for container {} to complete", short(&id));
        let (status, cancelled) = self.wait(&id, cancel).await?;
        info!("container {} is {}", short(&id), status);

        if let Some(output_dir) = &self.output_dir {
            info!("copying results from container to {}...", output_dir.display());
            self.extract_output(&id, output_dir).await?;
            info!("results copied");
        }

        let mut removed = false;
        if !mode.server && !keep {
            info!("removing container {}...", short(&id));
            self.engine.remove_container(&id, true).await?;
            info!("container {} removed", short(&id));
            removed = true;
        }

        Ok(RunOutcome {
            container_id: id,
            status,
            cancelled,
            removed,
        })
    }

    /// Polls until a terminal status, issuing one stop request when the
    /// cancellation token fires.
    ///
    /// The observed terminal status is always returned; the loop never exits
    /// on the interrupt alone.
    async fn wait(&self, id: &str, cancel: CancellationToken) -> Result<(ContainerStatus, bool)> {
        let mut stop_requested = false;
        let mut status = self.engine.container_status(id).await?;
        while !status.is_terminal() {
            debug!("waiting for {} (status: {})", short(id), status);
            tokio::select! {
                _ = cancel.cancelled(), if !stop_requested => {
                    info!("interrupt received, stopping container {}", short(id));
                    self.engine.stop_container(id).await?;
                    stop_requested = true;
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
            status = self.engine.container_status(id).await?;
        }
        Ok((status, stop_requested))
    }

    /// Streams the result archive out of the container and unpacks it.
    ///
    /// The engine's chunk stream is forwarded into a bounded channel whose
    /// receiving end feeds a blocking tar reader, so the archive is never
    /// materialized whole.
    async fn extract_output(&self, id: &str, output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let stream = self.engine.export_path(id, CONTAINER_OUTPUT_PATH).await?;
        unpack_chunk_stream(stream, output_dir.to_path_buf()).await
    }
}

/// Bridges an async chunk stream into the blocking [`ChunkReader`] +
/// [`extract_archive`] pair.
async fn unpack_chunk_stream(mut stream: ChunkStream, dest: PathBuf) -> Result<()> {
    // Capacity 1: at most one chunk in flight beyond the reader's remainder.
    let (tx, rx) = mpsc::sync_channel(1);
    let unpack = tokio::task::spawn_blocking(move || {
        let reader = ChunkReader::new(rx.into_iter());
        extract_archive(reader, &dest)
    });
    while let Some(chunk) = stream.next().await {
        if tx.send(chunk).is_err() {
            // Reader side ended early; its own error is the interesting one.
            break;
        }
    }
    drop(tx);
    unpack
        .await
        .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")))?
}
