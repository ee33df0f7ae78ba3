//! # Pipeline Constants
//!
//! Defines the file names, paths, and timings that form the contract between
//! the build-and-run pipeline stages. These constants are the **single source
//! of truth** for the built artifact layout.
//!
//! ## Artifact Layout Contract
//!
//! The bundle assembler, the Dockerfile writer, and the in-container entry
//! point all reference files by these names. Renaming one constant without
//! the others breaks the built image, so every stage imports from here.
//!
//! ## Cross-References
//!
//! - [`crate::script`]: writes the bundle files
//! - [`crate::builder`]: references bundle files from the Dockerfile
//! - [`crate::runner`]: polls on [`POLL_INTERVAL`], extracts [`CONTAINER_OUTPUT_PATH`]
//! - [`crate::resolve`]: reads [`ENV_VAR_PREFIX`]-prefixed variables

use std::time::Duration;

// =============================================================================
// Bundle File Names
// =============================================================================
//
// Every file the image build step consumes lives directly in the build
// directory under these names. The Dockerfile COPY lines depend on them.
// =============================================================================

/// Generated executable body of the user computation.
pub const USER_CODE_FILE: &str = "user_code.py";

/// Fixed-name runtime entry point inside the image.
///
/// This is the `cuberun-exec` binary, renamed on copy. The Dockerfile's CMD
/// invokes it directly.
pub const ENTRY_POINT_FILE: &str = "execute";

/// Name of the entry-point binary next to the orchestrator executable.
pub const EXEC_BINARY_NAME: &str = "cuberun-exec";

/// Persisted parameter spec, one entry per parameter.
pub const PARAMS_FILE: &str = "parameters.yaml";

/// Dependency manifest consumed by the image build step.
pub const ENVIRONMENT_FILE: &str = "environment.yml";

/// Build-description file written into the build directory.
pub const DOCKERFILE: &str = "Dockerfile";

// =============================================================================
// Parameter Resolution
// =============================================================================

/// Prefix for per-parameter environment variable overrides.
///
/// A scalar parameter `some_int` is overridden by `cuberun_some_int`.
pub const ENV_VAR_PREFIX: &str = "cuberun_";

/// CLI flag announcing a staged-data directory for dataset parameters.
pub const PRODUCT_FLAG: &str = "--product";

// =============================================================================
// Stage-In / Stage-Out Catalogs
// =============================================================================

/// Catalog description file expected directly under a staged-data directory,
/// and written at the root of a result catalog.
pub const CATALOG_FILE: &str = "catalog.json";

/// Asset role marking the asset that carries the dataset itself.
pub const DATA_ROLE: &str = "data";

/// STAC version stamped on emitted catalogs and items.
pub const STAC_VERSION: &str = "1.0.0";

/// Directory name for saved result datasets, relative to the container home.
pub const OUTPUT_DIR_NAME: &str = "output";

/// Marker file touched once a batch run has saved all its datasets.
pub const FINISHED_MARKER: &str = "finished";

// =============================================================================
// Image Build
// =============================================================================

/// Base image for built compute images.
pub const BASE_IMAGE: &str = "mambaorg/micromamba:1.5.10-noble-cuda-12.6.0";

/// Repository part of the default timestamp-derived image tag.
pub const DEFAULT_TAG_PREFIX: &str = "cuberun";

/// Timestamp format for default image tags (`cuberun:2025.01.31.12.00.00`).
pub const TAG_TIMESTAMP_FORMAT: &str = "%Y.%m.%d.%H.%M.%S";

/// Infrastructure dependencies guaranteed present in every sanitized
/// manifest: the in-image compute/server runtime and the catalog IO library.
///
/// Appended only when no existing entry matches by exact name-prefix.
pub const INFRA_DEPENDENCIES: [&str; 2] = ["xcube", "pystac"];

/// Installer provenance string marking the secondary package mechanism.
pub const PIP_INSTALLER: &str = "pip";

/// URL scheme marking a local-filesystem package install.
pub const LOCAL_URL_SCHEME: &str = "file://";

// =============================================================================
// Container Run
// =============================================================================

/// Fixed in-container path of the result archive. The sole extraction source.
pub const CONTAINER_OUTPUT_PATH: &str = "/home/mambauser/output";

/// Port the in-image server runtime listens on, and the host port it maps to.
pub const SERVER_PORT: u16 = 8080;

/// Interval between container status polls while waiting for a terminal
/// state. The wait loop is interruptible at every tick.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

// =============================================================================
// Workflow Description Output
// =============================================================================

/// CWL version stamped on emitted workflow descriptions.
pub const CWL_VERSION: &str = "v1.0";

/// Identifier of the command-line-tool node in the emitted `$graph`.
pub const CWL_TOOL_ID: &str = "cuberun_script";
