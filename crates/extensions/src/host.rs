//! Interfaces to the host browser's extension machinery.
//!
//! The subsystem never installs a package itself. It reads the registry,
//! queues installs with the pending manager, pokes the updater, and hands
//! prefs to the external-provider pathway. Everything here is injected so
//! reconciliation can run against [`crate::memory_host::InMemoryHost`].

use std::{path::PathBuf, sync::Arc};

use url::Url;

use crate::{
    Result,
    types::{ExtensionId, ExtensionPrefsMap},
};

/// Where an installed extension came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLocation {
    /// Installed from the web store by the user.
    Internal,
    /// Installed from an external prefs file with a local archive.
    ExternalPref,
    /// Installed from an external prefs file with an update URL.
    ExternalPrefDownload,
    /// Installed by the browser itself as a default component.
    ExternalComponent,
    /// Loaded unpacked from disk (developer mode).
    Unpacked,
}

impl ManifestLocation {
    pub fn is_external(self) -> bool {
        matches!(
            self,
            Self::ExternalPref | Self::ExternalPrefDownload | Self::ExternalComponent
        )
    }
}

/// Why the host disabled an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisableReason {
    UserAction,
    /// Disabled after a crash or failed reload.
    Reload,
    Corrupted,
    PermissionsIncrease,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionState {
    Enabled,
    Disabled(DisableReason),
    /// Background process crashed and was not restarted.
    Terminated,
    Blocklisted,
}

/// Registry view of one installed extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledExtension {
    pub id: ExtensionId,
    pub version: Option<String>,
    pub location: ManifestLocation,
    pub was_installed_by_default: bool,
    pub state: ExtensionState,
}

impl InstalledExtension {
    pub fn is_enabled(&self) -> bool {
        self.state == ExtensionState::Enabled
    }

    /// Installed through this subsystem's pathway rather than by the user.
    pub fn is_managed(&self) -> bool {
        self.was_installed_by_default && self.location.is_external()
    }
}

/// Read access to installed extensions.
pub trait ExtensionRegistry: Send + Sync {
    fn installed_extension(&self, id: &str) -> Option<InstalledExtension>;
}

/// One queued install from an update URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInstall {
    pub id: ExtensionId,
    pub update_url: Url,
    pub location: ManifestLocation,
    pub was_installed_by_default: bool,
}

/// Installs queued but not yet applied.
pub trait PendingExtensionManager: Send + Sync {
    fn is_pending(&self, id: &str) -> bool;

    /// Queue an install. Returns `false` when the host declined it (for
    /// example because it raced with another enqueue).
    fn add_from_external_update_url(&self, install: PendingInstall) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPriority {
    Background,
    Foreground,
}

/// Arguments for an out-of-cadence updater run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckParams {
    pub ids: Vec<ExtensionId>,
    pub install_immediately: bool,
    pub fetch_priority: FetchPriority,
}

/// The host's extension auto-updater.
pub trait ExtensionUpdater: Send + Sync {
    fn check_now(&self, params: CheckParams);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallReason {
    /// Dropped from the remote config.
    Deprecated,
}

/// Mutating operations on installed extensions.
pub trait ExtensionService: Send + Sync {
    fn uninstall(&self, id: &str, reason: UninstallReason) -> Result<()>;
    fn enable(&self, id: &str) -> Result<()>;
    /// Management policy check; `false` means leave the extension disabled.
    fn may_enable(&self, id: &str) -> bool;
}

/// The host's external-provider install pathway.
pub trait ExternalProvider: Send + Sync {
    /// Hand over prefs for installation. `base_crx_path` resolves relative
    /// archive paths and is set only for bundled installs.
    fn load_finished(&self, prefs: ExtensionPrefsMap, base_crx_path: Option<PathBuf>);
}

/// Bundle of host collaborators, cheap to clone.
#[derive(Clone)]
pub struct Host {
    pub registry: Arc<dyn ExtensionRegistry>,
    pub pending: Arc<dyn PendingExtensionManager>,
    pub updater: Arc<dyn ExtensionUpdater>,
    pub service: Arc<dyn ExtensionService>,
    pub provider: Arc<dyn ExternalProvider>,
}

impl Host {
    /// Build a `Host` from one object implementing every interface.
    pub fn from_shared<T>(host: Arc<T>) -> Self
    where
        T: ExtensionRegistry
            + PendingExtensionManager
            + ExtensionUpdater
            + ExtensionService
            + ExternalProvider
            + 'static,
    {
        Self {
            registry: host.clone(),
            pending: host.clone(),
            updater: host.clone(),
            service: host.clone(),
            provider: host,
        }
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host").finish_non_exhaustive()
    }
}
