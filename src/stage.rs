//! Structured-dataset stage-in from a catalog-described directory.
//!
//! Dataset parameters are not resolved from scalar overrides. At container
//! start, a `--product <dir>` flag points at a directory carrying a STAC
//! catalog; each catalog item whose id matches a declared dataset parameter
//! contributes one staged dataset, located through the item's single
//! data-role asset.
//!
//! Missing catalogs and missing declared names are fatal and reported in one
//! pass; surplus catalog items are tolerated with a warning.

use crate::constants::{CATALOG_FILE, DATA_ROLE};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

// =============================================================================
// Catalog Documents
// =============================================================================

#[derive(Debug, Deserialize)]
struct Catalog {
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    rel: String,
    href: String,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: String,
    #[serde(default)]
    assets: BTreeMap<String, Asset>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    href: String,
    #[serde(default)]
    roles: Vec<String>,
}

// =============================================================================
// Staged Datasets
// =============================================================================

/// One staged dataset input, located on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedDataset {
    /// Declared parameter name the dataset satisfies.
    pub name: String,
    /// Resolved location of the data-role asset.
    pub path: PathBuf,
}

/// Loads all declared dataset parameters from a staged-data directory.
///
/// # Errors
///
/// [`Error::StageIn`] when the catalog file is absent, when any declared
/// name has no matching catalog item (every missing name is listed), or
/// when a matched item does not expose exactly one data-role asset.
pub fn stage_in(dir: &Path, declared: &[String]) -> Result<BTreeMap<String, StagedDataset>> {
    let catalog_path = dir.join(CATALOG_FILE);
    if !catalog_path.is_file() {
        return Err(Error::StageIn(format!(
            "missing catalog file {} in {}",
            CATALOG_FILE,
            dir.display()
        )));
    }
    let catalog: Catalog = serde_json::from_str(&fs::read_to_string(&catalog_path)?)?;

    let mut staged = BTreeMap::new();
    for link in catalog.links.iter().filter(|l| l.rel == "item") {
        let item_path = dir.join(&link.href);
        let item: Item = serde_json::from_str(&fs::read_to_string(&item_path)?)?;
        if !declared.contains(&item.id) {
            warn!("ignoring catalog item '{}': no matching dataset parameter", item.id);
            continue;
        }
        let item_dir = item_path.parent().unwrap_or(dir);
        let dataset = open_data_asset(&item, item_dir)?;
        staged.insert(item.id.clone(), dataset);
    }

    let missing: Vec<&String> = declared.iter().filter(|n| !staged.contains_key(*n)).collect();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|n| n.as_str()).collect();
        return Err(Error::StageIn(format!(
            "missing dataset entries in catalog: {}",
            names.join(", ")
        )));
    }
    Ok(staged)
}

/// Resolves an item's single data-role asset against the item's directory.
fn open_data_asset(item: &Item, item_dir: &Path) -> Result<StagedDataset> {
    let data_assets: Vec<&Asset> = item
        .assets
        .values()
        .filter(|a| a.roles.iter().any(|r| r == DATA_ROLE))
        .collect();
    let asset = match data_assets.as_slice() {
        [single] => *single,
        [] => {
            return Err(Error::StageIn(format!(
                "item '{}' has no asset with a '{}' role",
                item.id, DATA_ROLE
            )))
        }
        _ => {
            return Err(Error::StageIn(format!(
                "item '{}' has more than one '{}' asset",
                item.id, DATA_ROLE
            )))
        }
    };
    let path = item_dir.join(&asset.href);
    if !path.exists() {
        return Err(Error::StageIn(format!(
            "data asset for '{}' not found at {}",
            item.id,
            path.display()
        )));
    }
    Ok(StagedDataset {
        name: item.id.clone(),
        path,
    })
}
