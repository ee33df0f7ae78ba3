//! Script bundle assembly.
//!
//! Materializes the set of files an image needs into a build directory: the
//! generated user code body, the fixed runtime entry point, the persisted
//! parameter spec, and any shared support files. File names are a contract
//! with the Dockerfile (see [`crate::constants`]).
//!
//! Writes are independent and not rolled back on partial failure; the build
//! directory is disposable.

use crate::constants::{ENTRY_POINT_FILE, EXEC_BINARY_NAME, PARAMS_FILE, USER_CODE_FILE};
use crate::error::{Error, Result};
use crate::params::ParamSpec;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// An already-parameterized source unit, ready to be materialized.
///
/// The executable body comes from an external notebook-to-script converter;
/// the parameter spec from [`ParamSpec::from_code`] over the source's
/// parameters region.
#[derive(Debug, Clone)]
pub struct ScriptBundle {
    body: String,
    spec: ParamSpec,
    support_files: Vec<PathBuf>,
    entry_point: Option<PathBuf>,
}

impl ScriptBundle {
    pub fn new(body: String, spec: ParamSpec) -> Self {
        Self {
            body,
            spec,
            support_files: Vec::new(),
            entry_point: None,
        }
    }

    /// Adds a support file to copy verbatim into the bundle.
    pub fn with_support_file(mut self, path: PathBuf) -> Self {
        self.support_files.push(path);
        self
    }

    /// Overrides the entry-point binary to copy into the bundle.
    ///
    /// By default the `cuberun-exec` binary next to the current executable
    /// is used; an override supports cross-built entry points.
    pub fn with_entry_point(mut self, path: PathBuf) -> Self {
        self.entry_point = Some(path);
        self
    }

    /// The bundle's parameter spec.
    pub fn spec(&self) -> &ParamSpec {
        &self.spec
    }

    /// Writes all bundle files into `build_dir`, creating it if needed.
    ///
    /// With `clear` set, every existing entry of the directory (files and
    /// subtrees alike) is removed first.
    pub fn assemble(&self, build_dir: &Path, clear: bool) -> Result<()> {
        fs::create_dir_all(build_dir)?;
        if clear {
            clear_directory(build_dir)?;
        }

        fs::write(build_dir.join(USER_CODE_FILE), &self.body)?;
        fs::write(build_dir.join(PARAMS_FILE), self.spec.to_yaml()?)?;
        copy_entry_point(build_dir, self.entry_point.as_deref())?;
        for path in &self.support_files {
            let name = path.file_name().ok_or_else(|| {
                Error::Io(std::io::Error::other(format!(
                    "support file has no name: {}",
                    path.display()
                )))
            })?;
            fs::copy(path, build_dir.join(name))?;
        }

        info!("assembled script bundle in {}", build_dir.display());
        Ok(())
    }
}

/// Copies the fixed runtime entry point into the bundle.
///
/// Without an override, the `cuberun-exec` binary is looked up next to the
/// current executable; it lands in the bundle under its fixed in-image name.
fn copy_entry_point(build_dir: &Path, entry_point: Option<&Path>) -> Result<()> {
    let source = match entry_point {
        Some(path) => path.to_path_buf(),
        None => entry_point_source()?,
    };
    let target = build_dir.join(ENTRY_POINT_FILE);
    debug!("copying entry point {} -> {}", source.display(), target.display());
    fs::copy(&source, &target)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn entry_point_source() -> Result<PathBuf> {
    let exe = env::current_exe()?;
    let dir = exe.parent().ok_or_else(|| {
        Error::Io(std::io::Error::other("current executable has no parent directory"))
    })?;
    // Test executables live one level below the built binaries.
    let candidates = [
        dir.join(EXEC_BINARY_NAME),
        dir.join("..").join(EXEC_BINARY_NAME),
    ];
    for candidate in candidates {
        if candidate.is_file() {
            return Ok(candidate);
        }
    }
    Err(Error::Io(std::io::Error::other(format!(
        "runtime entry point {} not found next to {}",
        EXEC_BINARY_NAME,
        exe.display()
    ))))
}

/// Removes every entry of `directory`, files and subtrees alike.
pub fn clear_directory(directory: &Path) -> Result<()> {
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn clear_directory_removes_files_and_subtrees() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("foo").join("bar");
        fs::create_dir_all(&sub).unwrap();
        for name in ["a", "b", "c"] {
            fs::write(dir.path().join(name), "test").unwrap();
            fs::write(sub.join(name), "test").unwrap();
        }

        clear_directory(dir.path()).unwrap();

        assert!(dir.path().is_dir(), "directory itself survives");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
