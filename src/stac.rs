//! Result catalog (STAC) output.
//!
//! After a batch run saves its datasets, a catalog is written over them: one
//! item per produced dataset, one data-role asset per item pointing at the
//! dataset's on-disk location under the output directory, with root-relative
//! asset links. The format of each asset (zarr or netCDF) comes from a
//! per-dataset attribute.

use crate::constants::{CATALOG_FILE, DATA_ROLE, OUTPUT_DIR_NAME, STAC_VERSION};
use crate::error::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

// =============================================================================
// Dataset Formats
// =============================================================================

/// On-disk format of a saved dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Zarr,
    NetCdf,
}

impl DatasetFormat {
    /// File extension of the saved form.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zarr => "zarr",
            Self::NetCdf => "nc",
        }
    }

    /// Media type stamped on the asset.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Zarr => "application/vnd+zarr",
            Self::NetCdf => "application/netcdf",
        }
    }

    /// Infers the format from a saved dataset's file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.ends_with(".zarr") {
            Some(Self::Zarr)
        } else if name.ends_with(".nc") {
            Some(Self::NetCdf)
        } else {
            None
        }
    }
}

// =============================================================================
// Catalog Documents
// =============================================================================

#[derive(Serialize)]
struct CatalogDoc {
    #[serde(rename = "type")]
    ty: String,
    stac_version: String,
    id: String,
    description: String,
    links: Vec<LinkDoc>,
}

#[derive(Serialize)]
struct LinkDoc {
    rel: String,
    href: String,
    #[serde(rename = "type")]
    ty: String,
}

// =============================================================================
// Catalog Writing
// =============================================================================

/// Writes a result catalog for saved datasets under `dir`.
///
/// The datasets themselves are expected at `<dir>/output/<name>.<ext>`; this
/// writes `catalog.json` plus one item document per dataset next to it.
pub fn write_stac(datasets: &BTreeMap<String, DatasetFormat>, dir: &Path) -> Result<()> {
    let links = datasets
        .keys()
        .map(|name| LinkDoc {
            rel: "item".to_string(),
            href: format!("{name}.json"),
            ty: "application/geo+json".to_string(),
        })
        .collect();
    let catalog = CatalogDoc {
        ty: "Catalog".to_string(),
        stac_version: STAC_VERSION.to_string(),
        id: "catalog".to_string(),
        description: "cuberun output catalog".to_string(),
        links,
    };
    fs::write(
        dir.join(CATALOG_FILE),
        serde_json::to_string_pretty(&catalog)?,
    )?;

    let timestamp = Utc::now().to_rfc3339();
    for (name, format) in datasets {
        let item = json!({
            "type": "Feature",
            "stac_version": STAC_VERSION,
            "stac_extensions": [],
            "id": name,
            "geometry": null,
            "properties": { "datetime": timestamp },
            "assets": {
                "data": {
                    "href": format!("{OUTPUT_DIR_NAME}/{name}.{}", format.extension()),
                    "type": format.media_type(),
                    "roles": [DATA_ROLE],
                    "title": name,
                }
            },
            "links": [],
        });
        fs::write(
            dir.join(format!("{name}.json")),
            serde_json::to_string_pretty(&item)?,
        )?;
    }
    info!("wrote result catalog for {} dataset(s)", datasets.len());
    Ok(())
}

/// Scans a saved-output directory for datasets by their on-disk format.
pub fn scan_output_dir(output_dir: &Path) -> Result<BTreeMap<String, DatasetFormat>> {
    let mut datasets = BTreeMap::new();
    if !output_dir.is_dir() {
        return Ok(datasets);
    }
    for entry in fs::read_dir(output_dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if let Some(format) = DatasetFormat::from_file_name(name) {
            let stem = name.trim_end_matches(&format!(".{}", format.extension()));
            datasets.insert(stem.to_string(), format);
        }
    }
    Ok(datasets)
}
