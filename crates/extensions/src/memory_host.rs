//! In-memory host and scripted fetcher. No browser behind them, used by
//! tests and the `simulate` developer command.

use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {async_trait::async_trait, url::Url};

use crate::{
    Error, Result,
    fetch::ConfigFetcher,
    host::{
        CheckParams, ExtensionRegistry, ExtensionService, ExtensionState, ExtensionUpdater,
        ExternalProvider, Host, InstalledExtension, ManifestLocation, PendingExtensionManager,
        PendingInstall, UninstallReason,
    },
    types::{ExtensionId, ExtensionPrefsMap},
};

#[derive(Default)]
struct HostState {
    installed: BTreeMap<ExtensionId, InstalledExtension>,
    pending: BTreeMap<ExtensionId, PendingInstall>,
    enqueued: Vec<PendingInstall>,
    uninstalled: Vec<ExtensionId>,
    enabled: Vec<ExtensionId>,
    checks: Vec<CheckParams>,
    loads: Vec<(ExtensionPrefsMap, Option<PathBuf>)>,
    enable_blocked: BTreeSet<ExtensionId>,
    failing_uninstall: BTreeSet<ExtensionId>,
    failing_enable: BTreeSet<ExtensionId>,
}

/// Host double that records every call.
#[derive(Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Wire this double into every host interface.
    pub fn host(self: &Arc<Self>) -> Host {
        Host::from_shared(Arc::clone(self))
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn install(&self, extension: InstalledExtension) {
        self.lock()
            .installed
            .insert(extension.id.clone(), extension);
    }

    /// Install as if it had come through the external-provider pathway.
    pub fn install_managed(&self, id: &str) {
        self.install(InstalledExtension {
            id: id.into(),
            version: Some("1.0.0".into()),
            location: ManifestLocation::ExternalComponent,
            was_installed_by_default: true,
            state: ExtensionState::Enabled,
        });
    }

    /// Install as if the user had added it from the store.
    pub fn install_user(&self, id: &str) {
        self.install(InstalledExtension {
            id: id.into(),
            version: Some("1.0.0".into()),
            location: ManifestLocation::Internal,
            was_installed_by_default: false,
            state: ExtensionState::Enabled,
        });
    }

    pub fn set_state(&self, id: &str, state: ExtensionState) {
        if let Some(ext) = self.lock().installed.get_mut(id) {
            ext.state = state;
        }
    }

    pub fn block_enable(&self, id: &str) {
        self.lock().enable_blocked.insert(id.into());
    }

    pub fn fail_uninstall(&self, id: &str) {
        self.lock().failing_uninstall.insert(id.into());
    }

    pub fn fail_enable(&self, id: &str) {
        self.lock().failing_enable.insert(id.into());
    }

    /// Apply every pending install, as the host's installer eventually would.
    pub fn apply_pending(&self) {
        let mut state = self.lock();
        let pending = std::mem::take(&mut state.pending);
        for (id, install) in pending {
            state.installed.insert(id.clone(), InstalledExtension {
                id,
                version: Some("1.0.0".into()),
                location: install.location,
                was_installed_by_default: install.was_installed_by_default,
                state: ExtensionState::Enabled,
            });
        }
    }

    pub fn installed_ids(&self) -> Vec<ExtensionId> {
        self.lock().installed.keys().cloned().collect()
    }

    pub fn pending_ids(&self) -> Vec<ExtensionId> {
        self.lock().pending.keys().cloned().collect()
    }

    /// Every accepted enqueue, in order.
    pub fn enqueued(&self) -> Vec<PendingInstall> {
        self.lock().enqueued.clone()
    }

    pub fn uninstalled(&self) -> Vec<ExtensionId> {
        self.lock().uninstalled.clone()
    }

    pub fn enabled(&self) -> Vec<ExtensionId> {
        self.lock().enabled.clone()
    }

    pub fn checks(&self) -> Vec<CheckParams> {
        self.lock().checks.clone()
    }

    pub fn loads(&self) -> Vec<(ExtensionPrefsMap, Option<PathBuf>)> {
        self.lock().loads.clone()
    }
}

impl ExtensionRegistry for InMemoryHost {
    fn installed_extension(&self, id: &str) -> Option<InstalledExtension> {
        self.lock().installed.get(id).cloned()
    }
}

impl PendingExtensionManager for InMemoryHost {
    fn is_pending(&self, id: &str) -> bool {
        self.lock().pending.contains_key(id)
    }

    fn add_from_external_update_url(&self, install: PendingInstall) -> bool {
        let mut state = self.lock();
        if state.pending.contains_key(&install.id) || state.installed.contains_key(&install.id) {
            return false;
        }
        state.enqueued.push(install.clone());
        state.pending.insert(install.id.clone(), install);
        true
    }
}

impl ExtensionUpdater for InMemoryHost {
    fn check_now(&self, params: CheckParams) {
        self.lock().checks.push(params);
    }
}

impl ExtensionService for InMemoryHost {
    fn uninstall(&self, id: &str, _reason: UninstallReason) -> Result<()> {
        let mut state = self.lock();
        if state.failing_uninstall.contains(id) {
            return Err(Error::host(id, "uninstall", "simulated failure"));
        }
        if state.installed.remove(id).is_none() {
            return Err(Error::host(id, "uninstall", "not installed"));
        }
        state.uninstalled.push(id.into());
        Ok(())
    }

    fn enable(&self, id: &str) -> Result<()> {
        let mut state = self.lock();
        if state.failing_enable.contains(id) {
            return Err(Error::host(id, "enable", "simulated failure"));
        }
        let Some(ext) = state.installed.get_mut(id) else {
            return Err(Error::host(id, "enable", "not installed"));
        };
        ext.state = ExtensionState::Enabled;
        state.enabled.push(id.into());
        Ok(())
    }

    fn may_enable(&self, id: &str) -> bool {
        !self.lock().enable_blocked.contains(id)
    }
}

impl ExternalProvider for InMemoryHost {
    fn load_finished(&self, prefs: ExtensionPrefsMap, base_crx_path: Option<PathBuf>) {
        self.lock().loads.push((prefs, base_crx_path));
    }
}

// ── Scripted fetcher ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Scripted {
    Body(String),
    Status(u16),
}

/// [`ConfigFetcher`] that replays queued responses.
///
/// Responses are consumed in order; the last one repeats once the queue is
/// down to a single entry. An empty script answers HTTP 404.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Scripted>>,
    urls: Mutex<Vec<Url>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every fetch sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn respond(self, body: impl Into<String>) -> Self {
        self.push(Scripted::Body(body.into()));
        self
    }

    pub fn fail(self, status: u16) -> Self {
        self.push(Scripted::Status(status));
        self
    }

    /// Answer every later fetch with `body`, dropping whatever is still
    /// queued. Works on a fetcher that is already shared.
    pub fn set_body(&self, body: impl Into<String>) {
        self.replace(Scripted::Body(body.into()));
    }

    /// Fail every later fetch with `status`, dropping whatever is still queued.
    pub fn set_failure(&self, status: u16) {
        self.replace(Scripted::Status(status));
    }

    fn replace(&self, entry: Scripted) {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        script.clear();
        script.push_back(entry);
    }

    fn push(&self, entry: Scripted) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(entry);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn next(&self) -> Option<Scripted> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }
}

#[async_trait]
impl ConfigFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.next() {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::Status(status)) => Err(Error::Http {
                url: url.to_string(),
                status,
            }),
            None => Err(Error::Http {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}
