//! Data model shared by the installer, maintainer, and loader.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

/// Opaque extension identifier (the 32-char id for real extensions, but the
/// subsystem never interprets it).
pub type ExtensionId = String;

/// Prefs handed to the host's external-provider pathway, keyed by id.
pub type ExtensionPrefsMap = BTreeMap<ExtensionId, ExtensionPrefs>;

/// Per-extension install instructions in the external-provider vocabulary.
///
/// Exactly one of `update_url` (network install) or `crx_path` (local
/// archive) is set by this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionPrefs {
    #[serde(
        rename = "external_update_url",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub update_url: Option<String>,
    #[serde(
        rename = "external_crx",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub crx_path: Option<PathBuf>,
    #[serde(
        rename = "external_version",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub version: Option<String>,
    #[serde(default)]
    pub was_installed_by_default: bool,
}

impl ExtensionPrefs {
    /// Install from an update manifest URL.
    pub fn from_update_url(update_url: impl Into<String>) -> Self {
        Self {
            update_url: Some(update_url.into()),
            crx_path: None,
            version: None,
            was_installed_by_default: true,
        }
    }

    /// Install from a packaged archive shipped next to the browser.
    pub fn from_crx(crx_path: PathBuf, version: Option<String>) -> Self {
        Self {
            update_url: None,
            crx_path: Some(crx_path),
            version,
            was_installed_by_default: true,
        }
    }
}

/// Desired state for one extension, as published in the remote config.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtensionConfig {
    /// Update manifest URL, kept byte-for-byte as published.
    pub update_url: String,
    /// Fields this crate does not interpret, carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Remote configuration: which extensions should exist, and from where.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RemoteConfig {
    entries: BTreeMap<ExtensionId, ExtensionConfig>,
}

impl RemoteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<ExtensionId>, entry: ExtensionConfig) {
        self.entries.insert(id.into(), entry);
    }

    pub fn get(&self, id: &str) -> Option<&ExtensionConfig> {
        self.entries.get(id)
    }

    pub fn update_url(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|e| e.update_url.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ExtensionId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExtensionId, &ExtensionConfig)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Prefs for the network install pathway, one per entry.
    pub fn to_prefs(&self) -> ExtensionPrefsMap {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), ExtensionPrefs::from_update_url(&entry.update_url)))
            .collect()
    }
}

impl FromIterator<(ExtensionId, ExtensionConfig)> for RemoteConfig {
    fn from_iter<I: IntoIterator<Item = (ExtensionId, ExtensionConfig)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Outcome of the one-shot acquisition.
///
/// Deliberately not `Clone`: it is produced once by the installer and moved
/// into the loader.
#[derive(Debug, Default)]
pub struct InstallResult {
    pub prefs: ExtensionPrefsMap,
    /// Source config for later maintenance. Empty for bundled installs.
    pub config: RemoteConfig,
    pub extension_ids: BTreeSet<ExtensionId>,
    /// Directory the archives were found in, set only for bundled installs.
    pub bundled_path: Option<PathBuf>,
    pub from_bundled: bool,
}

impl InstallResult {
    /// Degraded result: nothing to install this attempt.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_remote(config: RemoteConfig) -> Self {
        Self {
            prefs: config.to_prefs(),
            extension_ids: config.ids().cloned().collect(),
            config,
            bundled_path: None,
            from_bundled: false,
        }
    }

    pub fn from_bundled(bundled_path: PathBuf, prefs: ExtensionPrefsMap) -> Self {
        Self {
            extension_ids: prefs.keys().cloned().collect(),
            prefs,
            config: RemoteConfig::default(),
            bundled_path: Some(bundled_path),
            from_bundled: true,
        }
    }
}
