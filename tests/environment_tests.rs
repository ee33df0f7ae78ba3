//! Tests for environment-definition sanitization.
//!
//! Validates the local-package heuristic over a mixed-provenance index,
//! manifest pruning, infrastructure-dependency appending, and lossless
//! re-emission.

use cuberun::{Dependency, EnvManifest, PackageIndex};
use serde_json::json;

fn inspect_fixture() -> PackageIndex {
    let report = json!({
        "version": "1",
        "pip_version": "24.3.1",
        "installed": [
            { "metadata": { "name": "pyfiglet" }, "installer": "pip" },
            {
                "metadata": { "name": "xrlint" },
                "direct_url": { "url": "file:///home/pont/loc/repos/xrlint" },
                "installer": "pip",
            },
            { "metadata": { "name": "setuptools" } },
            {
                "metadata": { "name": "pip" },
                "direct_url": {
                    "url": "file:///home/conda/feedstock_root/build_artifacts/pip_1734466185654/work"
                },
                "installer": "conda",
            },
            { "metadata": { "name": "textdistance" }, "installer": "pip" },
            {
                "metadata": { "name": "my-local-pkg" },
                "direct_url": { "url": "file:///home/pont/loc/repos/my-local-pkg" },
                "installer": "pip",
            },
            {
                "metadata": { "name": "requests" },
                "direct_url": { "url": "https://pypi.org/simple/requests" },
                "installer": "pip",
            },
        ],
    });
    PackageIndex::from_inspect_json(&report.to_string()).unwrap()
}

// =============================================================================
// Local-Package Heuristic Tests
// =============================================================================

#[test]
fn test_pip_install_with_file_url_is_local() {
    let index = inspect_fixture();
    assert!(index.is_local("xrlint"));
}

#[test]
fn test_registry_url_or_other_installer_is_not_local() {
    let index = inspect_fixture();
    assert!(!index.is_local("pyfiglet"), "no direct url");
    assert!(!index.is_local("textdistance"), "no direct url");
    assert!(!index.is_local("pip"), "conda installer");
    assert!(!index.is_local("setuptools"), "no installer");
    assert!(!index.is_local("requests"), "registry url");
    assert!(!index.is_local("unknown-package"));
}

#[test]
fn test_underscore_hyphen_normalization() {
    let index = inspect_fixture();
    assert!(index.is_local("my_local_pkg"), "conda-style name matches pip record");
    assert!(index.is_local("my-local-pkg"));
}

#[test]
fn test_version_suffix_stripped() {
    let index = inspect_fixture();
    assert!(index.is_local("xrlint=0.4.2"));
    assert!(!index.is_local("requests=2.32"));
}

// =============================================================================
// Manifest Pruning Tests
// =============================================================================

const MANIFEST_YAML: &str = "
name: compute
channels:
  - conda-forge
dependencies:
  - python=3.12
  - xarray=2024.10.0
  - pip:
      - xrlint
      - requests
";

#[test]
fn test_prune_drops_local_packages_only() {
    let mut manifest = EnvManifest::from_yaml(MANIFEST_YAML).unwrap();
    manifest.prune_local_packages(&inspect_fixture());

    let pip = manifest
        .dependencies
        .iter()
        .find_map(|d| match d {
            Dependency::Pip { pip } => Some(pip.clone()),
            _ => None,
        })
        .expect("pip block survives");
    assert_eq!(pip, vec!["requests".to_string()]);
}

#[test]
fn test_prune_removes_emptied_pip_block() {
    let mut manifest = EnvManifest::from_yaml(
        "name: compute\ndependencies:\n  - python=3.12\n  - pip:\n      - xrlint\n",
    )
    .unwrap();
    manifest.prune_local_packages(&inspect_fixture());

    assert!(
        !manifest
            .dependencies
            .iter()
            .any(|d| matches!(d, Dependency::Pip { .. })),
        "emptied pip block is removed entirely"
    );
    assert_eq!(manifest.dependencies.len(), 1);
}

#[test]
fn test_prune_without_pip_block_is_noop() {
    let mut manifest =
        EnvManifest::from_yaml("name: compute\ndependencies:\n  - python=3.12\n").unwrap();
    manifest.prune_local_packages(&inspect_fixture());
    assert_eq!(manifest.dependencies.len(), 1);
}

// =============================================================================
// Manifest Re-Emission Tests
// =============================================================================

#[test]
fn test_manifest_round_trip_preserves_unknown_keys() {
    let text = "name: compute\nchannels:\n  - conda-forge\ndependencies:\n  - python=3.12\nprefix: /opt/conda/envs/compute\n";
    let manifest = EnvManifest::from_yaml(text).unwrap();
    let re_emitted = EnvManifest::from_yaml(&manifest.to_yaml().unwrap()).unwrap();
    assert_eq!(re_emitted, manifest);
    assert!(manifest.extra.contains_key("prefix"));
}

#[test]
fn test_infra_dependencies_guaranteed() {
    let mut manifest =
        EnvManifest::from_yaml("name: compute\ndependencies:\n  - python=3.12\n").unwrap();
    manifest.ensure_infra_dependencies();

    for name in ["xcube", "pystac"] {
        assert!(
            manifest
                .dependencies
                .contains(&Dependency::Spec(name.to_string())),
            "{name} must be appended"
        );
    }
}

#[test]
fn test_infra_dependency_prefix_match() {
    let mut manifest = EnvManifest::from_yaml(
        "name: compute\ndependencies:\n  - xcube=1.9.0\n  - pystac\n",
    )
    .unwrap();
    manifest.ensure_infra_dependencies();
    assert_eq!(manifest.dependencies.len(), 2, "nothing appended twice");
}
