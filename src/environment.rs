//! Environment-definition sanitization.
//!
//! Produces the dependency manifest an image build consumes: either a
//! user-supplied manifest copied as-is, or a best-effort reconstruction of
//! the current process environment with heuristically-detected
//! locally-installed packages stripped out. Either way the two fixed
//! infrastructure dependencies are guaranteed present.
//!
//! The local-package heuristic is explicitly approximate: a package is
//! classified local when it was installed by the secondary (pip) mechanism
//! AND its direct-URL source starts with a local-filesystem scheme, checked
//! under the literal name and its underscore/hyphen-swapped variant (the
//! two package ecosystems name packages inconsistently). Misclassification
//! degrades to a warning, never an error.

use crate::constants::{INFRA_DEPENDENCIES, LOCAL_URL_SCHEME, PIP_INSTALLER};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, warn};

// =============================================================================
// Manifest Model
// =============================================================================

/// One entry of the manifest's dependency sequence: either a plain spec
/// string or the secondary-mechanism sub-list keyed `pip`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dependency {
    Spec(String),
    Pip { pip: Vec<String> },
}

/// A dependency manifest, re-emitted losslessly except for pruning.
///
/// Unknown top-level keys (e.g. the exporter's `prefix`) are preserved
/// through the flattened extras map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<String>,
    pub dependencies: Vec<Dependency>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl EnvManifest {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Appends the fixed infrastructure dependencies when absent.
    ///
    /// Presence is judged by exact name-prefix match against plain spec
    /// entries: `xcube` and `xcube=1.9` both count, `xcube-cci` does not.
    pub fn ensure_infra_dependencies(&mut self) {
        for name in INFRA_DEPENDENCIES {
            let present = self.dependencies.iter().any(|d| match d {
                Dependency::Spec(spec) => {
                    spec == name || spec.starts_with(&format!("{name}="))
                }
                Dependency::Pip { .. } => false,
            });
            if !present {
                debug!("appending infrastructure dependency '{name}'");
                self.dependencies.push(Dependency::Spec(name.to_string()));
            }
        }
    }

    /// Drops pip-block entries classified as locally installed.
    ///
    /// Removes the whole pip block when it becomes empty. Each dropped
    /// package is warned about; this trims the manifest and never rejects
    /// a build.
    pub fn prune_local_packages(&mut self, index: &PackageIndex) {
        let Some(pos) = self
            .dependencies
            .iter()
            .position(|d| matches!(d, Dependency::Pip { .. }))
        else {
            return;
        };
        let Dependency::Pip { pip } = &mut self.dependencies[pos] else {
            return;
        };
        pip.retain(|pkg| {
            if index.is_local(pkg) {
                warn!("omitting locally installed package \"{pkg}\" from environment");
                false
            } else {
                true
            }
        });
        if pip.is_empty() {
            self.dependencies.remove(pos);
        }
    }
}

// =============================================================================
// Installed Package Index
// =============================================================================

/// One installed dependency, with installer provenance and source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    pub name: String,
    pub installer: Option<String>,
    pub direct_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InspectReport {
    #[serde(default)]
    installed: Vec<InspectEntry>,
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    metadata: InspectMetadata,
    #[serde(default)]
    installer: Option<String>,
    #[serde(default)]
    direct_url: Option<InspectDirectUrl>,
}

#[derive(Debug, Deserialize)]
struct InspectMetadata {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InspectDirectUrl {
    #[serde(default)]
    url: Option<String>,
}

/// Index of installed packages, keyed by package name.
///
/// Backs the local-package classification heuristic.
#[derive(Debug, Default)]
pub struct PackageIndex {
    records: BTreeMap<String, PackageRecord>,
}

impl PackageIndex {
    pub fn new(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Parses the JSON report of `pip inspect`.
    pub fn from_inspect_json(json: &str) -> Result<Self> {
        let report: InspectReport = serde_json::from_str(json)?;
        Ok(Self::new(report.installed.into_iter().map(|e| PackageRecord {
            name: e.metadata.name,
            installer: e.installer,
            direct_url: e.direct_url.and_then(|d| d.url),
        })))
    }

    /// Captures the current process environment's installed packages.
    pub async fn capture() -> Result<Self> {
        let output = Command::new("pip")
            .args(["--no-color", "inspect"])
            .output()
            .await
            .map_err(|e| Error::EnvironmentCapture(format!("pip inspect: {e}")))?;
        if !output.status.success() {
            return Err(Error::EnvironmentCapture(format!(
                "pip inspect exited with {}",
                output.status
            )));
        }
        Self::from_inspect_json(&String::from_utf8_lossy(&output.stdout))
    }

    /// Classifies a package spec (name plus optional `=version` suffix) as
    /// locally installed.
    ///
    /// Checked under the literal name and its underscore/hyphen-swapped
    /// variant. Not guaranteed accurate; a reproducibility aid only.
    pub fn is_local(&self, package_spec: &str) -> bool {
        let name = package_spec.split('=').next().unwrap_or(package_spec);
        self.record_is_local(name) || self.record_is_local(&name.replace('_', "-"))
    }

    fn record_is_local(&self, name: &str) -> bool {
        let Some(record) = self.records.get(name) else {
            return false;
        };
        record.installer.as_deref() == Some(PIP_INSTALLER)
            && record
                .direct_url
                .as_deref()
                .is_some_and(|url| url.starts_with(LOCAL_URL_SCHEME))
    }
}

// =============================================================================
// Sanitization
// =============================================================================

/// Produces the manifest an image build consumes.
///
/// With `existing` given, the manifest is read as-is; otherwise the current
/// process environment is captured via `conda env export` and pruned of
/// locally-installed pip packages. Both paths guarantee the infrastructure
/// dependencies.
pub async fn sanitize(existing: Option<&Path>) -> Result<EnvManifest> {
    let mut manifest = match existing {
        Some(path) => EnvManifest::from_yaml_file(path)?,
        None => {
            warn!("no environment file given; trying to reproduce current environment in image");
            let mut captured = capture_environment().await?;
            let index = PackageIndex::capture().await?;
            captured.prune_local_packages(&index);
            captured
        }
    };
    manifest.ensure_infra_dependencies();
    Ok(manifest)
}

/// Exports the current environment definition via `conda env export`.
async fn capture_environment() -> Result<EnvManifest> {
    let output = Command::new("conda")
        .args(["env", "export"])
        .output()
        .await
        .map_err(|e| Error::EnvironmentCapture(format!("conda env export: {e}")))?;
    if !output.status.success() {
        return Err(Error::EnvironmentCapture(format!(
            "conda env export exited with {}",
            output.status
        )));
    }
    EnvManifest::from_yaml(&String::from_utf8_lossy(&output.stdout))
}
