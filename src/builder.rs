//! Image construction from a script bundle and environment manifest.
//!
//! Turns an assembled bundle plus a sanitized dependency manifest into a
//! tagged container image: the build-description file is written into the
//! build directory, the directory is packed into a gzipped tar context, and
//! the engine's build operation is invoked with the context's tag.
//!
//! A build failure is fatal: every line of the engine's build log is logged
//! and the process terminates with a non-zero status. Build failures are
//! almost always deterministic given the same manifest, so nothing is
//! retried.

use crate::constants::{
    BASE_IMAGE, DEFAULT_TAG_PREFIX, DOCKERFILE, ENTRY_POINT_FILE, ENVIRONMENT_FILE, PARAMS_FILE,
    TAG_TIMESTAMP_FORMAT, USER_CODE_FILE,
};
use crate::engine::{ContainerEngine, Image};
use crate::environment::sanitize;
use crate::error::{Error, Result};
use crate::script::ScriptBundle;
use chrono::Local;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{error, info};

// =============================================================================
// Build Context
// =============================================================================

/// Everything one image build needs: the source bundle, an optional
/// user-supplied environment manifest, a build directory, and the image tag.
///
/// The tag is assigned at construction (timestamp-derived when not supplied)
/// and immutable for the build's lifetime. The build directory is a
/// disposable scratch area: caller-owned when supplied explicitly, otherwise
/// ephemeral and owned by the context.
pub struct BuildContext {
    pub bundle: ScriptBundle,
    pub environment: Option<PathBuf>,
    tag: String,
    build_dir: PathBuf,
    // Keeps an ephemeral scratch directory alive for the build's lifetime.
    _scratch: Option<TempDir>,
}

impl BuildContext {
    /// Creates a context with a caller-owned build directory.
    pub fn new(
        bundle: ScriptBundle,
        environment: Option<PathBuf>,
        build_dir: PathBuf,
        tag: Option<String>,
    ) -> Self {
        Self {
            bundle,
            environment,
            tag: tag.unwrap_or_else(default_tag),
            build_dir,
            _scratch: None,
        }
    }

    /// Creates a context with an ephemeral build directory, created now and
    /// destroyed with the context.
    pub fn with_ephemeral_dir(
        bundle: ScriptBundle,
        environment: Option<PathBuf>,
        tag: Option<String>,
    ) -> Result<Self> {
        let scratch = TempDir::new()?;
        Ok(Self {
            bundle,
            environment,
            tag: tag.unwrap_or_else(default_tag),
            build_dir: scratch.path().to_path_buf(),
            _scratch: Some(scratch),
        })
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    /// The image tag, immutable for the build's lifetime.
    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Default timestamp-derived image tag.
fn default_tag() -> String {
    format!(
        "{}:{}",
        DEFAULT_TAG_PREFIX,
        Local::now().format(TAG_TIMESTAMP_FORMAT)
    )
}

// =============================================================================
// Image Builder
// =============================================================================

/// Builds tagged container images from build contexts.
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// Runs the full build: bundle assembly, environment sanitization,
    /// build-description writing, engine build.
    ///
    /// With `skip_build`, everything up to and including the
    /// build-description file is written but the engine is never invoked;
    /// sanitization still runs so the directory stays buildable by hand.
    ///
    /// A failed engine build logs the build log line by line and terminates
    /// the process with a non-zero status.
    pub async fn build(&self, ctx: &BuildContext, skip_build: bool) -> Result<Option<Image>> {
        ctx.bundle.assemble(ctx.build_dir(), false)?;

        let manifest = sanitize(ctx.environment.as_deref()).await?;
        fs::write(
            ctx.build_dir().join(ENVIRONMENT_FILE),
            manifest.to_yaml()?,
        )?;

        fs::write(ctx.build_dir().join(DOCKERFILE), dockerfile())?;

        if skip_build {
            info!(
                "skipping engine build; build files written to {}",
                ctx.build_dir().display()
            );
            return Ok(None);
        }

        info!("building image with tag {}...", ctx.tag());
        let context = pack_build_context(ctx.build_dir())?;
        match self.engine.build_image(context, ctx.tag()).await {
            Ok(image) => {
                info!("image built: {}", image.short_id());
                Ok(Some(image))
            }
            Err(Error::BuildFailed { message, log }) => {
                error!("{message}");
                for line in &log {
                    error!("{line}");
                }
                std::process::exit(1);
            }
            Err(other) => Err(other),
        }
    }
}

/// The build-description file. COPY lines reference the bundle files by
/// their fixed names.
fn dockerfile() -> String {
    format!(
        "FROM {BASE_IMAGE}\n\
         COPY {ENVIRONMENT_FILE} {ENVIRONMENT_FILE}\n\
         RUN micromamba install -y -n base -f {ENVIRONMENT_FILE} && \\\n\
         micromamba clean --all --yes\n\
         COPY {USER_CODE_FILE} {USER_CODE_FILE}\n\
         COPY {PARAMS_FILE} {PARAMS_FILE}\n\
         COPY {ENTRY_POINT_FILE} {ENTRY_POINT_FILE}\n\
         CMD [\"./{ENTRY_POINT_FILE}\"]\n"
    )
}

/// Packs the build directory into a gzipped tar context.
fn pack_build_context(build_dir: &Path) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut archive = tar::Builder::new(encoder);
    archive.append_dir_all(".", build_dir)?;
    let encoder = archive.into_inner()?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tag_carries_repository_prefix() {
        let tag = default_tag();
        assert!(tag.starts_with("cuberun:"));
    }

    #[test]
    fn dockerfile_references_bundle_files() {
        let text = dockerfile();
        for name in [USER_CODE_FILE, PARAMS_FILE, ENTRY_POINT_FILE, ENVIRONMENT_FILE] {
            assert!(text.contains(name), "Dockerfile must reference {name}");
        }
        assert!(text.starts_with(&format!("FROM {BASE_IMAGE}")));
    }
}
