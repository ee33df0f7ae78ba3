//! Tests for image construction.
//!
//! Validates the build-directory contract in skip-build mode, where the
//! engine is never invoked: bundle files, sanitized manifest, and the
//! build-description file must all land on disk.

use async_trait::async_trait;
use cuberun::{
    BuildContext, ChunkStream, ContainerEngine, ContainerSpec, ContainerStatus, Image,
    ImageBuilder, ParamSpec, Result, ScriptBundle,
};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// Engine that fails the test if any operation is ever invoked.
struct UnreachableEngine;

#[async_trait]
impl ContainerEngine for UnreachableEngine {
    async fn resolve_image(&self, _name: &str) -> Result<Image> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn build_image(&self, _context: Vec<u8>, _tag: &str) -> Result<Image> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn create_container(&self, _spec: &ContainerSpec) -> Result<String> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn start_container(&self, _id: &str) -> Result<()> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn container_status(&self, _id: &str) -> Result<ContainerStatus> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn stop_container(&self, _id: &str) -> Result<()> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn remove_container(&self, _id: &str, _force: bool) -> Result<()> {
        panic!("engine must not be touched in skip-build mode")
    }
    async fn export_path(&self, _id: &str, _path: &str) -> Result<ChunkStream> {
        panic!("engine must not be touched in skip-build mode")
    }
}

fn fixture_bundle(scratch: &TempDir) -> ScriptBundle {
    let entry = scratch.path().join("exec-fixture");
    fs::write(&entry, b"#!/bin/sh\n").unwrap();
    ScriptBundle::new(
        "print('compute')\n".to_string(),
        ParamSpec::from_code("depth = 12\n"),
    )
    .with_entry_point(entry)
}

fn fixture_environment(scratch: &TempDir) -> std::path::PathBuf {
    let path = scratch.path().join("environment.yml");
    fs::write(
        &path,
        "name: compute\nchannels:\n  - conda-forge\ndependencies:\n  - python=3.12\n",
    )
    .unwrap();
    path
}

// =============================================================================
// Skip-Build Tests
// =============================================================================

#[tokio::test]
async fn test_skip_build_writes_complete_build_directory() {
    let scratch = TempDir::new().unwrap();
    let build_dir = scratch.path().join("build");
    fs::create_dir_all(&build_dir).unwrap();
    let ctx = BuildContext::new(
        fixture_bundle(&scratch),
        Some(fixture_environment(&scratch)),
        build_dir.clone(),
        Some("cuberun:test".to_string()),
    );

    let builder = ImageBuilder::new(Arc::new(UnreachableEngine));
    let image = builder.build(&ctx, true).await.unwrap();

    assert!(image.is_none(), "skip-build returns no image");
    for name in [
        "user_code.py",
        "parameters.yaml",
        "execute",
        "environment.yml",
        "Dockerfile",
    ] {
        assert!(build_dir.join(name).is_file(), "{name} must be written");
    }
}

#[tokio::test]
async fn test_skip_build_still_sanitizes_manifest() {
    let scratch = TempDir::new().unwrap();
    let build_dir = scratch.path().join("build");
    fs::create_dir_all(&build_dir).unwrap();
    let ctx = BuildContext::new(
        fixture_bundle(&scratch),
        Some(fixture_environment(&scratch)),
        build_dir.clone(),
        None,
    );

    ImageBuilder::new(Arc::new(UnreachableEngine))
        .build(&ctx, true)
        .await
        .unwrap();

    let manifest = fs::read_to_string(build_dir.join("environment.yml")).unwrap();
    assert!(manifest.contains("xcube"), "infra dependency appended");
    assert!(manifest.contains("pystac"), "infra dependency appended");
}

#[tokio::test]
async fn test_dockerfile_installs_manifest_and_runs_entry_point() {
    let scratch = TempDir::new().unwrap();
    let build_dir = scratch.path().join("build");
    fs::create_dir_all(&build_dir).unwrap();
    let ctx = BuildContext::new(
        fixture_bundle(&scratch),
        Some(fixture_environment(&scratch)),
        build_dir.clone(),
        None,
    );

    ImageBuilder::new(Arc::new(UnreachableEngine))
        .build(&ctx, true)
        .await
        .unwrap();

    let dockerfile = fs::read_to_string(build_dir.join("Dockerfile")).unwrap();
    assert!(dockerfile.starts_with("FROM mambaorg/micromamba"));
    assert!(dockerfile.contains("micromamba install -y -n base -f environment.yml"));
    assert!(dockerfile.contains("CMD [\"./execute\"]"));
}

// =============================================================================
// Build Context Tests
// =============================================================================

#[test]
fn test_explicit_tag_is_kept() {
    let scratch = TempDir::new().unwrap();
    let ctx = BuildContext::new(
        fixture_bundle(&scratch),
        None,
        scratch.path().to_path_buf(),
        Some("custom:tag".to_string()),
    );
    assert_eq!(ctx.tag(), "custom:tag");
}

#[test]
fn test_default_tag_is_timestamp_derived() {
    let scratch = TempDir::new().unwrap();
    let ctx = BuildContext::new(
        fixture_bundle(&scratch),
        None,
        scratch.path().to_path_buf(),
        None,
    );
    assert!(ctx.tag().starts_with("cuberun:"));
    let stamp = ctx.tag().strip_prefix("cuberun:").unwrap();
    assert_eq!(
        stamp.split('.').count(),
        6,
        "timestamp has six dotted fields: {stamp}"
    );
}

#[test]
fn test_ephemeral_build_dir_exists_while_context_lives() {
    let scratch = TempDir::new().unwrap();
    let ctx =
        BuildContext::with_ephemeral_dir(fixture_bundle(&scratch), None, None).unwrap();
    assert!(ctx.build_dir().is_dir());
}
