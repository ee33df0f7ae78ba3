//! Container engine interface and its Docker implementation.
//!
//! The pipeline drives an external container runtime through the
//! [`ContainerEngine`] trait: image resolution and building, the container
//! lifecycle (`create → start → poll → stop/remove`), and streamed archive
//! export. The production implementation talks to a local Docker daemon via
//! bollard; tests substitute scripted implementations.
//!
//! # Container Lifecycle
//!
//! ```text
//! created ──► running ──► exited        (natural completion)
//!                   └───► stopped       (externally requested stop)
//! ```
//!
//! `removed` is a terminal post-state reached through [`ContainerEngine::remove_container`]
//! when the cleanup policy applies.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::image::BuildImageOptions;
use bollard::models::{ContainerStateStatusEnum, HostConfig, PortBinding};
use bollard::Docker;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::io;
use tracing::{debug, info};

// =============================================================================
// Container State
// =============================================================================

/// Lifecycle status of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not started.
    Created,
    /// Running.
    Running,
    /// Completed naturally.
    Exited,
    /// Stopped on external request.
    Stopped,
    /// Unusable (engine-side failure).
    Dead,
}

impl ContainerStatus {
    /// True when no further lifecycle transition occurs without explicit
    /// removal. Terminal states end polling.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Created | Self::Running)
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Exited => write!(f, "exited"),
            Self::Stopped => write!(f, "stopped"),
            Self::Dead => write!(f, "dead"),
        }
    }
}

// =============================================================================
// Images
// =============================================================================

/// Opaque handle to a built or resolved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Engine-side image identifier.
    pub id: String,
    /// Tags naming the image; never empty.
    pub tags: Vec<String>,
}

impl Image {
    /// Abbreviated identifier for log lines.
    pub fn short_id(&self) -> &str {
        let id = self.id.strip_prefix("sha256:").unwrap_or(&self.id);
        &id[..id.len().min(12)]
    }
}

/// An image argument: a reference name still to be resolved, or an already
/// resolved handle.
///
/// Resolving a name to a handle is an explicit engine call, not a runtime
/// type switch.
#[derive(Debug, Clone)]
pub enum ImageRef {
    ByName(String),
    ByHandle(Image),
}

impl From<&str> for ImageRef {
    fn from(name: &str) -> Self {
        Self::ByName(name.to_string())
    }
}

impl From<Image> for ImageRef {
    fn from(image: Image) -> Self {
        Self::ByHandle(image)
    }
}

// =============================================================================
// Engine Trait
// =============================================================================

/// Creation request for one container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    /// Image reference (tag or id) to instantiate.
    pub image: String,
    /// Container name.
    pub name: String,
    /// Full command line for the container process.
    pub command: Vec<String>,
    /// Host→container port mapping, when one applies.
    pub port_mapping: Option<(u16, u16)>,
}

/// A lazy sequence of binary chunks, as produced by the engine's archive
/// export API.
pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

/// Container engine operations the pipeline depends on.
///
/// One production implementation ([`DockerEngine`]); tests script their own.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Resolves an image reference name to a handle.
    async fn resolve_image(&self, name: &str) -> Result<Image>;

    /// Builds an image from a gzipped tar build context, returning the
    /// handle under `tag`.
    ///
    /// # Errors
    ///
    /// [`Error::BuildFailed`] carrying the engine's build log.
    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<Image>;

    /// Creates a container; returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<()>;

    /// Reports the container's current lifecycle status.
    async fn container_status(&self, id: &str) -> Result<ContainerStatus>;

    /// Requests an immediate stop of a running container.
    async fn stop_container(&self, id: &str) -> Result<()>;

    /// Removes a container.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    /// Exports an in-container path as a streamed tar archive.
    async fn export_path(&self, id: &str, path: &str) -> Result<ChunkStream>;
}

// =============================================================================
// Docker Implementation
// =============================================================================

/// [`ContainerEngine`] backed by a local Docker daemon.
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects with the environment's default daemon settings.
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn resolve_image(&self, name: &str) -> Result<Image> {
        if name.is_empty() {
            return Err(Error::InvalidImageReference {
                reference: name.to_string(),
                reason: "empty image reference".to_string(),
            });
        }
        let inspect = self.docker.inspect_image(name).await.map_err(|e| {
            Error::InvalidImageReference {
                reference: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        let id = inspect.id.unwrap_or_else(|| name.to_string());
        let tags = match inspect.repo_tags {
            Some(tags) if !tags.is_empty() => tags,
            _ => vec![name.to_string()],
        };
        Ok(Image { id, tags })
    }

    async fn build_image(&self, context: Vec<u8>, tag: &str) -> Result<Image> {
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };
        let mut stream = self
            .docker
            .build_image(options, None, Some(context.into()));
        let mut log = Vec::new();
        while let Some(update) = stream.next().await {
            let info = match update {
                Ok(info) => info,
                Err(e) => {
                    return Err(Error::BuildFailed {
                        message: e.to_string(),
                        log,
                    })
                }
            };
            if let Some(line) = info.stream {
                let line = line.trim_end().to_string();
                if !line.is_empty() {
                    debug!("build: {line}");
                    log.push(line);
                }
            }
            if let Some(message) = info.error {
                return Err(Error::BuildFailed { message, log });
            }
        }
        self.resolve_image(tag).await
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let (exposed_ports, port_bindings) = match spec.port_mapping {
            Some((host, container)) => {
                let key = format!("{container}/tcp");
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(host.to_string()),
                };
                (
                    Some(HashMap::from([(key.clone(), HashMap::new())])),
                    Some(HashMap::from([(key, Some(vec![binding]))])),
                )
            }
            None => (None, None),
        };
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            exposed_ports,
            host_config: Some(HostConfig {
                port_bindings,
                ..Default::default()
            }),
            ..Default::default()
        };
        let response = self.docker.create_container(Some(options), config).await?;
        info!("created container {}", short(&response.id));
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn container_status(&self, id: &str) -> Result<ContainerStatus> {
        let inspect = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        let status = inspect.state.and_then(|s| s.status);
        Ok(match status {
            Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
            Some(ContainerStateStatusEnum::RUNNING)
            | Some(ContainerStateStatusEnum::PAUSED)
            | Some(ContainerStateStatusEnum::RESTARTING) => ContainerStatus::Running,
            Some(ContainerStateStatusEnum::EXITED) => ContainerStatus::Exited,
            Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Stopped,
            _ => ContainerStatus::Dead,
        })
    }

    async fn stop_container(&self, id: &str) -> Result<()> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: 10 }))
            .await?;
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<()> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await?;
        Ok(())
    }

    async fn export_path(&self, id: &str, path: &str) -> Result<ChunkStream> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let stream = self
            .docker
            .download_from_container(id, Some(options))
            .map(|chunk| chunk.map_err(io::Error::other));
        Ok(stream.boxed())
    }
}

/// Abbreviates a container id for log lines.
pub fn short(id: &str) -> &str {
    &id[..id.len().min(12)]
}
