//! # cuberun
//!
//! **Package parameterized datacube computations as container images and run
//! them as managed containers.**
//!
//! cuberun takes an already-parameterized source unit (the executable body
//! produced by an external notebook converter plus its declarative
//! parameters region), builds a reproducible Docker image around it, runs
//! that image as a managed container, and recovers result datasets and
//! catalog metadata afterward.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            cuberun                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  params ──► script ──► builder ──► runner ──► chunks ──► output/    │
//! │    │                      │           │                             │
//! │    │   environment ───────┘           │                             │
//! │    │   (manifest sanitization)        │                             │
//! │    │                                  │                             │
//! │    └── resolve ◄── stage          ContainerEngine trait             │
//! │        (runs inside the image,        │                             │
//! │         at container start)       DockerEngine (bollard)            │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Container Lifecycle
//!
//! ```text
//!   ┌─────────┐   start   ┌─────────┐  completes  ┌─────────┐
//!   │ created │ ────────► │ running │ ──────────► │ exited  │
//!   └─────────┘           └────┬────┘             └─────────┘
//!                              │ stop (cancellation)
//!                              ▼
//!                         ┌─────────┐
//!                         │ stopped │
//!                         └─────────┘
//! ```
//!
//! The runner polls while the status is `created`/`running` and treats both
//! terminal states the same way; cancellation is a normal outcome. `removed`
//! follows as a post-state when the cleanup policy applies.
//!
//! # Binaries
//!
//! - `cuberun` — the orchestrating CLI (assemble, build, run).
//! - `cuberun-exec` — the fixed runtime entry point copied into every image;
//!   it resolves parameter values and drives the embedded computation.
//!
//! # Example
//!
//! ```rust,ignore
//! use cuberun::{
//!     BuildContext, ContainerRunner, DockerEngine, ImageBuilder, ParamSpec,
//!     RunMode, ScriptBundle,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> cuberun::Result<()> {
//!     let engine = Arc::new(DockerEngine::connect()?);
//!     let spec = ParamSpec::from_code("depth = 12\nregion = \"baltic\"\n");
//!     let bundle = ScriptBundle::new(body, spec);
//!     let ctx = BuildContext::with_ephemeral_dir(bundle, None, None)?;
//!
//!     let Some(image) = ImageBuilder::new(engine.clone()).build(&ctx, false).await? else {
//!         return Ok(());
//!     };
//!
//!     let runner = ContainerRunner::new(engine, image.into(), Some("out".into())).await?;
//!     runner
//!         .run(&RunMode { batch: true, ..Default::default() }, false, CancellationToken::new())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod chunks;
pub mod compute;
pub mod constants;
pub mod cwl;
pub mod engine;
pub mod environment;
pub mod error;
pub mod params;
pub mod resolve;
pub mod runner;
pub mod script;
pub mod stac;
pub mod stage;

// Re-exports
pub use builder::{BuildContext, ImageBuilder};
pub use chunks::{extract_archive, ChunkReader};
pub use compute::{ComputeRuntime, ProcessRuntime};
pub use constants::*;
pub use cwl::write_workflow;
pub use engine::{
    ChunkStream, ContainerEngine, ContainerSpec, ContainerStatus, DockerEngine, Image, ImageRef,
};
pub use environment::{sanitize, Dependency, EnvManifest, PackageIndex, PackageRecord};
pub use error::{Error, Result};
pub use params::{flag_name, ParamDecl, ParamSpec, ParamType, ParamValue};
pub use resolve::{resolve, RunContext};
pub use runner::{ContainerRunner, RunMode, RunOutcome};
pub use script::{clear_directory, ScriptBundle};
pub use stac::{scan_output_dir, write_stac, DatasetFormat};
pub use stage::{stage_in, StagedDataset};
