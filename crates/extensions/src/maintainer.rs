//! Recurring reconciliation of installed extensions against the remote config.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    browseros_config::MaintenanceConfig,
    serde::Serialize,
    tokio::{task::JoinHandle, time::MissedTickBehavior},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use browseros_metrics::{counter, extensions as ext_metrics, gauge};

use crate::{
    fetch::{ConfigFetcher, fetch_remote_config},
    host::Host,
    reconcile::{self, ExtensionHealth},
    types::{ExtensionId, RemoteConfig},
};

/// Outcome of the most recent config fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    Succeeded { entries: usize },
    Failed { error: String },
}

/// What one maintenance cycle did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// A fresh config replaced the cache this cycle.
    pub fetched: bool,
    pub uninstalled: Vec<ExtensionId>,
    pub reinstalled: Vec<ExtensionId>,
    pub reenabled: Vec<ExtensionId>,
    pub update_check_requested: bool,
    pub health: Vec<ExtensionHealth>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle still had its fetch in flight.
    Skipped,
    Cancelled,
}

/// Point-in-time view of the maintainer for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceSnapshot {
    pub config_url: Option<String>,
    pub tracked: Vec<ExtensionId>,
    pub cached_entries: usize,
    pub cycles: u64,
    pub last_fetch: Option<FetchStatus>,
    pub running: bool,
}

#[derive(Default)]
struct MaintenanceState {
    config_url: Option<Url>,
    /// Last authoritative config; `None` until one has been received.
    cached: Option<RemoteConfig>,
    tracked: BTreeSet<ExtensionId>,
    reenable_attempts: HashMap<ExtensionId, u32>,
    cycles: u64,
    last_fetch: Option<FetchStatus>,
}

/// Clears the in-flight flag when the fetching cycle ends, however it ends.
struct FetchGuard<'a>(&'a AtomicBool);

impl<'a> FetchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Background janitor that keeps the tracked extensions installed, enabled,
/// and in line with the latest config.
pub struct ExtensionMaintainer {
    host: Host,
    fetcher: Arc<dyn ConfigFetcher>,
    settings: MaintenanceConfig,
    cancel: CancellationToken,
    state: Mutex<MaintenanceState>,
    fetch_in_flight: AtomicBool,
    timer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ExtensionMaintainer {
    pub fn new(
        host: Host,
        fetcher: Arc<dyn ConfigFetcher>,
        settings: MaintenanceConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            host,
            fetcher,
            settings,
            cancel,
            state: Mutex::new(MaintenanceState::default()),
            fetch_in_flight: AtomicBool::new(false),
            timer_handle: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, MaintenanceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed the state and arm the repeating cycle. The first cycle runs after
    /// the configured initial delay. Calling this twice re-seeds the state but
    /// keeps the existing timer.
    pub fn start(
        self: &Arc<Self>,
        config_url: Url,
        initial_ids: impl IntoIterator<Item = ExtensionId>,
        initial_config: RemoteConfig,
    ) {
        if self.cancel.is_cancelled() {
            return;
        }

        {
            let mut state = self.lock();
            state.config_url = Some(config_url);
            state.tracked.extend(initial_ids);
            state.tracked.extend(initial_config.ids().cloned());
            if !initial_config.is_empty() {
                state.cached = Some(initial_config);
            }
            info!(
                tracked = state.tracked.len(),
                cached = state.cached.as_ref().map_or(0, RemoteConfig::len),
                "extension maintainer started"
            );
        }

        let mut handle = self.timer_handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            debug!("maintenance timer already armed");
            return;
        }
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let initial_delay = self.settings.initial_delay();
        let interval = self.settings.interval();
        if interval.as_secs() != self.settings.interval_secs {
            warn!(
                configured_secs = self.settings.interval_secs,
                using_secs = interval.as_secs(),
                "maintenance interval too short, clamping"
            );
        }
        *handle = Some(tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(initial_delay) => {},
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {},
                }
                let Some(maintainer) = weak.upgrade() else {
                    break;
                };
                maintainer.run_maintenance_cycle().await;
            }
            debug!("maintenance timer exited");
        }));
    }

    /// Widen the tracked set. Never restarts the cycle.
    pub fn update_extension_ids(&self, ids: impl IntoIterator<Item = ExtensionId>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let mut state = self.lock();
        let before = state.tracked.len();
        state.tracked.extend(ids);
        let added = state.tracked.len() - before;
        if added > 0 {
            debug!(added, total = state.tracked.len(), "tracking more extensions");
        }
    }

    /// Run one fetch-and-reconcile cycle now.
    ///
    /// Returns [`CycleOutcome::Skipped`] without fetching when another cycle
    /// is mid-fetch, and [`CycleOutcome::Cancelled`] once the maintainer is
    /// stopped, including when the stop lands while the fetch is in flight.
    pub async fn run_maintenance_cycle(&self) -> CycleOutcome {
        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }
        let Some(_guard) = FetchGuard::acquire(&self.fetch_in_flight) else {
            debug!("maintenance fetch still in flight, skipping tick");
            #[cfg(feature = "metrics")]
            counter!(ext_metrics::MAINTENANCE_TICKS_SKIPPED_TOTAL).increment(1);
            return CycleOutcome::Skipped;
        };

        let config_url = self.lock().config_url.clone();
        let fetched = match config_url {
            Some(url) => tokio::select! {
                biased;
                () = self.cancel.cancelled() => return CycleOutcome::Cancelled,
                result = fetch_remote_config(self.fetcher.as_ref(), &url) => Some(result),
            },
            None => None,
        };

        if self.cancel.is_cancelled() {
            return CycleOutcome::Cancelled;
        }

        let mut report = CycleReport::default();
        let mut state = self.lock();
        let MaintenanceState {
            cached,
            tracked,
            reenable_attempts,
            cycles,
            last_fetch,
            ..
        } = &mut *state;

        match fetched {
            Some(Ok(parsed)) => {
                *last_fetch = Some(FetchStatus::Succeeded {
                    entries: parsed.config.len(),
                });
                tracked.extend(parsed.config.ids().cloned());
                *cached = Some(parsed.config);
                report.fetched = true;
            },
            Some(Err(e)) => {
                let cached = cached.as_ref().map_or(0, RemoteConfig::len);
                warn!(error = %e, kind = %e.kind(), cached, "maintenance fetch failed, using cached config");
                *last_fetch = Some(FetchStatus::Failed {
                    error: e.to_string(),
                });
            },
            None => debug!("no config url, reconciling against cached config"),
        }

        report.uninstalled = reconcile::uninstall_deprecated(&self.host, cached.as_ref(), tracked);
        let empty = RemoteConfig::default();
        let cached = cached.as_ref().unwrap_or(&empty);
        report.reinstalled = reconcile::reinstall_missing(&self.host, cached);
        report.reenabled = reconcile::reenable_disabled(
            &self.host,
            tracked,
            reenable_attempts,
            self.settings.max_reenable_attempts,
        );
        report.update_check_requested = reconcile::force_update_check(&self.host, tracked);
        report.health = reconcile::log_extension_health(&self.host, cached, tracked, "maintenance");
        *cycles += 1;

        #[cfg(feature = "metrics")]
        {
            counter!(ext_metrics::MAINTENANCE_CYCLES_TOTAL).increment(1);
            counter!(ext_metrics::UNINSTALLS_TOTAL).increment(report.uninstalled.len() as u64);
            counter!(ext_metrics::REINSTALLS_TOTAL).increment(report.reinstalled.len() as u64);
            counter!(ext_metrics::REENABLES_TOTAL).increment(report.reenabled.len() as u64);
            gauge!(ext_metrics::TRACKED).set(tracked.len() as f64);
            gauge!(ext_metrics::HEALTHY)
                .set(report.health.iter().filter(|h| h.is_healthy()).count() as f64);
        }

        info!(
            cycle = *cycles,
            fetched = report.fetched,
            uninstalled = report.uninstalled.len(),
            reinstalled = report.reinstalled.len(),
            reenabled = report.reenabled.len(),
            "maintenance cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    pub fn snapshot(&self) -> MaintenanceSnapshot {
        let running = self
            .timer_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        let state = self.lock();
        MaintenanceSnapshot {
            config_url: state.config_url.as_ref().map(Url::to_string),
            tracked: state.tracked.iter().cloned().collect(),
            cached_entries: state.cached.as_ref().map_or(0, RemoteConfig::len),
            cycles: state.cycles,
            last_fetch: state.last_fetch.clone(),
            running,
        }
    }

    /// Cancel any in-flight cycle and stop the timer. Later calls into the
    /// maintainer are no-ops.
    pub fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .timer_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(h) = handle {
            h.abort();
            info!("extension maintainer stopped");
        }
    }
}

impl Drop for ExtensionMaintainer {
    fn drop(&mut self) {
        let handle = self
            .timer_handle
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(h) = handle {
            h.abort();
        }
    }
}
