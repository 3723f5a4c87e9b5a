//! Companion extension bootstrap and maintenance.
//! First run installs from bundled archives when present, otherwise from the
//! remote config. A recurring maintainer then reconciles the host's installed
//! extensions against the latest config for the life of the profile.

pub mod bundled;
pub mod error;
pub mod fetch;
pub mod host;
pub mod installer;
pub mod loader;
pub mod maintainer;
pub mod memory_host;
pub mod parse;
pub mod paths;
pub mod reconcile;
pub mod types;

pub use {
    error::{Error, ErrorKind, Result},
    fetch::{ConfigFetcher, HttpConfigFetcher},
    host::Host,
    installer::ExtensionInstaller,
    loader::ExtensionLoader,
    maintainer::{CycleOutcome, CycleReport, ExtensionMaintainer, MaintenanceSnapshot},
    types::{ExtensionId, ExtensionPrefs, ExtensionPrefsMap, InstallResult, RemoteConfig},
};
