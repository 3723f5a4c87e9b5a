//! Bundled extension archives shipped next to the browser binary.
//!
//! The packaging step writes `bundled_extensions.json` alongside the
//! archives:
//!
//! ```json
//! { "<id>": { "external_crx": "<id>.crx", "external_version": "1.4.0" } }
//! ```

use std::path::{Component, Path, PathBuf};

use {serde::Deserialize, tracing::warn};

use crate::{
    Error, Result,
    error::Context,
    types::{ExtensionPrefs, ExtensionPrefsMap},
};

pub const BUNDLED_MANIFEST_FILE: &str = "bundled_extensions.json";

#[derive(Debug, Deserialize)]
struct BundledEntry {
    external_crx: String,
    #[serde(default)]
    external_version: Option<String>,
}

/// Read the manifest on the blocking pool and build prefs for every entry
/// whose archive is present.
pub async fn load_bundled(dir: PathBuf) -> Result<ExtensionPrefsMap> {
    tokio::task::spawn_blocking(move || read_bundled_manifest(&dir))
        .await
        .context("bundled manifest reader did not complete")?
}

/// Blocking manifest read.
///
/// A missing or unparseable manifest is an error (the caller falls through
/// to the remote path). Individual entries that are malformed, point outside
/// `dir`, or whose archive is missing are skipped.
pub fn read_bundled_manifest(dir: &Path) -> Result<ExtensionPrefsMap> {
    let manifest_path = dir.join(BUNDLED_MANIFEST_FILE);
    let data = std::fs::read_to_string(&manifest_path)?;
    let root: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&data)?;

    let mut prefs = ExtensionPrefsMap::new();
    for (id, value) in root {
        if id.trim().is_empty() {
            warn!("skipping bundled entry with empty id");
            continue;
        }
        let entry: BundledEntry = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(e) => {
                warn!(%id, error = %e, "skipping malformed bundled entry");
                continue;
            },
        };

        let relative = match sanitize_archive_name(&entry.external_crx) {
            Ok(p) => p,
            Err(e) => {
                warn!(%id, error = %e, "skipping bundled entry");
                continue;
            },
        };

        let crx_path = dir.join(relative);
        if !crx_path.is_file() {
            warn!(%id, path = %crx_path.display(), "bundled archive missing");
            continue;
        }

        prefs.insert(id, ExtensionPrefs::from_crx(crx_path, entry.external_version));
    }

    Ok(prefs)
}

/// Archive names must stay inside the bundled directory.
fn sanitize_archive_name(name: &str) -> Result<PathBuf> {
    let path = Path::new(name);
    if name.is_empty() {
        return Err(Error::parse("empty archive name"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::parse(format!("unsafe archive path: {name}")));
            },
        }
    }
    Ok(path.to_path_buf())
}
