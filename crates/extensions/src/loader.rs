//! Orchestrates first-run acquisition and hands over to maintenance.

use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use {
    browseros_config::{
        DEFAULT_ALPHA_CONFIG_URL, DEFAULT_CONFIG_URL, ExtensionsConfig, FeatureFlags,
        MaintenanceConfig,
    },
    tokio::task::{AbortHandle, JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use browseros_metrics::{counter, extensions as ext_metrics};

use crate::{
    Error, Result,
    fetch::ConfigFetcher,
    host::{CheckParams, FetchPriority, Host, ManifestLocation},
    installer::ExtensionInstaller,
    maintainer::ExtensionMaintainer,
    paths::resolve_bundled_dir,
    reconcile::{EnqueueOutcome, enqueue_from_config},
    types::{ExtensionId, InstallResult, RemoteConfig},
};

/// Parse the configured source, falling back to the built-in one for the
/// same channel when the configured value is not a valid URL.
fn select_config_url(config: &ExtensionsConfig, features: &FeatureFlags) -> Result<Url> {
    let raw_url = config.selected_config_url(features);
    match Url::parse(raw_url) {
        Ok(url) => Ok(url),
        Err(e) => {
            let fallback = if features.alpha {
                DEFAULT_ALPHA_CONFIG_URL
            } else {
                DEFAULT_CONFIG_URL
            };
            warn!(url = raw_url, error = %e, %fallback, "invalid config url, using the built-in source");
            Url::parse(fallback).map_err(|e| Error::invalid_url(fallback, e))
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Installing,
    Running,
}

struct LoaderState {
    phase: Phase,
    config_url: Url,
    tracked: BTreeSet<ExtensionId>,
    last_config: RemoteConfig,
    bundled_crx_base_path: Option<PathBuf>,
    maintainer: Option<Arc<ExtensionMaintainer>>,
}

/// Profile-scoped owner of the installer and maintainer.
pub struct ExtensionLoader {
    host: Host,
    fetcher: Arc<dyn ConfigFetcher>,
    bundled_dir: Option<PathBuf>,
    immediate_install_delay: Duration,
    maintenance: MaintenanceConfig,
    cancel: CancellationToken,
    state: Mutex<LoaderState>,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl ExtensionLoader {
    /// Build a loader whose config source follows the alpha feature flag and
    /// whose tracked set starts with the configured seed ids.
    pub fn new(
        host: Host,
        fetcher: Arc<dyn ConfigFetcher>,
        config: &ExtensionsConfig,
        features: &FeatureFlags,
    ) -> Result<Arc<Self>> {
        let config_url = select_config_url(config, features)?;

        Ok(Arc::new(Self {
            host,
            fetcher,
            bundled_dir: resolve_bundled_dir(config.bundled_dir.as_deref()),
            immediate_install_delay: config.immediate_install_delay(),
            maintenance: config.maintenance.clone(),
            cancel: CancellationToken::new(),
            state: Mutex::new(LoaderState {
                phase: Phase::Idle,
                config_url,
                tracked: config.seed_ids.iter().cloned().collect(),
                last_config: RemoteConfig::default(),
                bundled_crx_base_path: None,
                maintainer: None,
            }),
            tasks: Mutex::new(Vec::new()),
        }))
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remember_task(&self, handle: &JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle.abort_handle());
    }

    /// Point the loader at another config source. Ignored once loading has
    /// started.
    pub fn set_config_url(&self, url: Url) {
        let mut state = self.lock();
        if state.phase != Phase::Idle {
            warn!(%url, "config url change after start ignored");
            return;
        }
        state.config_url = url;
    }

    /// Begin the single acquisition attempt. Returns `None` if loading was
    /// already started or the loader has been shut down.
    pub fn start_loading(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.cancel.is_cancelled() {
            return None;
        }

        let config_url = {
            let mut state = self.lock();
            if state.phase != Phase::Idle {
                warn!("extension loading already started");
                return None;
            }
            state.phase = Phase::Installing;
            state.maintainer = Some(ExtensionMaintainer::new(
                self.host.clone(),
                Arc::clone(&self.fetcher),
                self.maintenance.clone(),
                self.cancel.child_token(),
            ));
            state.config_url.clone()
        };
        info!(url = %config_url, "extension loader starting");

        let installer =
            ExtensionInstaller::new(Arc::clone(&self.fetcher), self.bundled_dir.clone());
        let weak = Arc::downgrade(self);
        let handle = installer.start_installation(config_url, move |result| {
            if let Some(loader) = weak.upgrade() {
                loader.on_install_complete(result);
            }
        });
        self.remember_task(&handle);
        Some(handle)
    }

    /// Continuation for the installer's result. Accepts exactly one result
    /// per loader; anything after the first is logged and dropped.
    pub fn on_install_complete(self: &Arc<Self>, result: InstallResult) {
        if self.cancel.is_cancelled() {
            debug!("install result arrived after shutdown, dropping");
            return;
        }

        let InstallResult {
            prefs,
            config,
            extension_ids,
            bundled_path,
            from_bundled,
        } = result;

        let base_crx_path = {
            let mut state = self.lock();
            if state.phase != Phase::Installing {
                warn!(phase = ?state.phase, "unexpected install result, dropping");
                return;
            }
            state.phase = Phase::Running;
            if from_bundled {
                state.bundled_crx_base_path = bundled_path;
            }
            state.tracked.extend(extension_ids);
            state.last_config = config;
            state.bundled_crx_base_path.clone()
        };

        info!(count = prefs.len(), from_bundled, "extension install complete");
        self.host.provider.load_finished(prefs, base_crx_path);
        self.on_startup_complete(from_bundled);
    }

    /// Arm the delayed install trigger when the network path was used, then
    /// start maintenance either way.
    fn on_startup_complete(self: &Arc<Self>, from_bundled: bool) {
        if !from_bundled {
            let weak = Arc::downgrade(self);
            let cancel = self.cancel.clone();
            let delay = self.immediate_install_delay;
            let handle = tokio::spawn(async move {
                tokio::select! {
                    () = cancel.cancelled() => {},
                    () = tokio::time::sleep(delay) => {
                        if let Some(loader) = weak.upgrade() {
                            loader.trigger_immediate_installation();
                        }
                    },
                }
            });
            self.remember_task(&handle);
            debug!(delay_ms = delay.as_millis() as u64, "scheduled immediate installation");
        }

        let (maintainer, config_url, tracked, config) = {
            let state = self.lock();
            (
                state.maintainer.clone(),
                state.config_url.clone(),
                state.tracked.clone(),
                state.last_config.clone(),
            )
        };
        if let Some(maintainer) = maintainer {
            maintainer.start(config_url, tracked, config);
        }
    }

    /// Enqueue every tracked extension that is neither installed nor pending,
    /// then ask the updater for an immediate foreground check.
    ///
    /// Returns how many extensions were newly enqueued. Repeating the call
    /// against unchanged host state enqueues nothing.
    pub fn trigger_immediate_installation(&self) -> usize {
        if self.cancel.is_cancelled() {
            return 0;
        }
        let state = self.lock();
        if state.tracked.is_empty() || state.last_config.is_empty() {
            debug!("nothing to install immediately");
            return 0;
        }

        info!(tracked = state.tracked.len(), "triggering immediate installation");
        let mut enqueued = 0;
        for id in &state.tracked {
            match enqueue_from_config(
                &self.host,
                id,
                &state.last_config,
                ManifestLocation::ExternalComponent,
            ) {
                EnqueueOutcome::Enqueued => {
                    info!(%id, "added extension to pending installs");
                    enqueued += 1;
                },
                EnqueueOutcome::Declined => warn!(%id, "pending manager declined install"),
                EnqueueOutcome::AlreadyInstalled
                | EnqueueOutcome::AlreadyPending
                | EnqueueOutcome::NotInConfig
                | EnqueueOutcome::InvalidUrl => {},
            }
        }

        self.host.updater.check_now(CheckParams {
            ids: state.tracked.iter().cloned().collect(),
            install_immediately: true,
            fetch_priority: FetchPriority::Foreground,
        });

        #[cfg(feature = "metrics")]
        counter!(ext_metrics::IMMEDIATE_ENQUEUES_TOTAL).increment(enqueued as u64);

        enqueued
    }

    /// Track more ids, forwarding them to the maintainer once it exists.
    pub fn track_extensions(&self, ids: impl IntoIterator<Item = ExtensionId>) {
        let ids: Vec<ExtensionId> = ids.into_iter().collect();
        let maintainer = {
            let mut state = self.lock();
            state.tracked.extend(ids.iter().cloned());
            state.maintainer.clone()
        };
        if let Some(maintainer) = maintainer {
            maintainer.update_extension_ids(ids);
        }
    }

    /// Directory relative archive paths resolve against. Set only after a
    /// bundled install.
    pub fn bundled_crx_base_path(&self) -> Option<PathBuf> {
        self.lock().bundled_crx_base_path.clone()
    }

    pub fn config_url(&self) -> Url {
        self.lock().config_url.clone()
    }

    pub fn tracked_ids(&self) -> Vec<ExtensionId> {
        self.lock().tracked.iter().cloned().collect()
    }

    pub fn maintainer(&self) -> Option<Arc<ExtensionMaintainer>> {
        self.lock().maintainer.clone()
    }

    /// Profile teardown. Pending continuations become no-ops.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for task in tasks {
            task.abort();
        }
        if let Some(maintainer) = self.lock().maintainer.clone() {
            maintainer.stop();
        }
        info!("extension loader shut down");
    }
}

impl Drop for ExtensionLoader {
    fn drop(&mut self) {
        self.cancel.cancel();
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}
