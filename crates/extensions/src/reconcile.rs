//! The individual reconciliation tasks run by each maintenance cycle.
//!
//! Every task is idempotent, a no-op on an empty tracked set, and isolates
//! per-extension host failures: one bad id is logged and the loop moves on.

use std::collections::{BTreeSet, HashMap};

use {
    serde::Serialize,
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    host::{
        CheckParams, DisableReason, ExtensionState, FetchPriority, Host, ManifestLocation,
        PendingInstall, UninstallReason,
    },
    types::{ExtensionId, RemoteConfig},
};

/// Log target for per-extension health records.
pub const HEALTH_TARGET: &str = "browseros_extensions::health";

/// Result of trying to queue one extension for installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    AlreadyInstalled,
    AlreadyPending,
    NotInConfig,
    InvalidUrl,
    /// The pending manager declined the request.
    Declined,
}

/// Queue `id` for installation from its update URL in `config`.
///
/// Membership in the registry and the pending set is checked immediately
/// before the enqueue, so calling this repeatedly against unchanged host
/// state queues nothing new.
pub fn enqueue_from_config(
    host: &Host,
    id: &str,
    config: &RemoteConfig,
    location: ManifestLocation,
) -> EnqueueOutcome {
    if host.registry.installed_extension(id).is_some() {
        return EnqueueOutcome::AlreadyInstalled;
    }
    if host.pending.is_pending(id) {
        return EnqueueOutcome::AlreadyPending;
    }
    let Some(update_url) = config.update_url(id) else {
        return EnqueueOutcome::NotInConfig;
    };
    let update_url = match Url::parse(update_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(%id, error = %e, "skipping extension with invalid update url");
            return EnqueueOutcome::InvalidUrl;
        },
    };

    let accepted = host.pending.add_from_external_update_url(PendingInstall {
        id: id.to_string(),
        update_url,
        location,
        was_installed_by_default: true,
    });
    if accepted {
        EnqueueOutcome::Enqueued
    } else {
        EnqueueOutcome::Declined
    }
}

/// Uninstall tracked extensions the config no longer lists.
///
/// Only extensions this subsystem installed are touched; user-installed ones
/// with the same id are merely dropped from tracking. Ids whose uninstall
/// fails stay tracked so the next cycle retries. `config` is `None` until an
/// authoritative config has been received, and nothing is uninstalled before
/// then. A received config with no entries deprecates every tracked id.
pub fn uninstall_deprecated(
    host: &Host,
    config: Option<&RemoteConfig>,
    tracked: &mut BTreeSet<ExtensionId>,
) -> Vec<ExtensionId> {
    let Some(config) = config else {
        return Vec::new();
    };
    if tracked.is_empty() {
        return Vec::new();
    }

    let deprecated: Vec<ExtensionId> = tracked
        .iter()
        .filter(|id| !config.contains(id))
        .cloned()
        .collect();

    let mut uninstalled = Vec::new();
    for id in deprecated {
        match host.registry.installed_extension(&id) {
            Some(ext) if ext.is_managed() => {
                match host.service.uninstall(&id, UninstallReason::Deprecated) {
                    Ok(()) => {
                        info!(%id, "uninstalled deprecated extension");
                        tracked.remove(&id);
                        uninstalled.push(id);
                    },
                    Err(e) => {
                        warn!(%id, error = %e, kind = %e.kind(), "failed to uninstall deprecated extension");
                    },
                }
            },
            Some(_) => {
                debug!(%id, "deprecated id belongs to a user install, leaving it alone");
                tracked.remove(&id);
            },
            None => {
                debug!(%id, "deprecated extension not installed, untracking");
                tracked.remove(&id);
            },
        }
    }
    uninstalled
}

/// Re-queue config extensions that are missing from the registry.
pub fn reinstall_missing(host: &Host, config: &RemoteConfig) -> Vec<ExtensionId> {
    let mut enqueued = Vec::new();
    for id in config.ids() {
        match enqueue_from_config(host, id, config, ManifestLocation::ExternalComponent) {
            EnqueueOutcome::Enqueued => {
                info!(%id, "re-enqueued missing extension");
                enqueued.push(id.clone());
            },
            EnqueueOutcome::Declined => {
                warn!(%id, "pending manager declined reinstall");
            },
            EnqueueOutcome::AlreadyInstalled
            | EnqueueOutcome::AlreadyPending
            | EnqueueOutcome::NotInConfig
            | EnqueueOutcome::InvalidUrl => {},
        }
    }
    enqueued
}

/// Re-enable tracked extensions the host disabled or lost to a crash.
///
/// `attempts` counts consecutive re-enables per id and is cleared once the
/// extension is seen enabled; ids at `max_attempts` are left disabled.
/// Blocklisted extensions, user-initiated disables and disables awaiting
/// consent to new permissions are never overridden.
pub fn reenable_disabled(
    host: &Host,
    tracked: &BTreeSet<ExtensionId>,
    attempts: &mut HashMap<ExtensionId, u32>,
    max_attempts: u32,
) -> Vec<ExtensionId> {
    let mut reenabled = Vec::new();
    for id in tracked {
        let Some(ext) = host.registry.installed_extension(id) else {
            attempts.remove(id);
            continue;
        };

        match ext.state {
            ExtensionState::Enabled => {
                attempts.remove(id);
                continue;
            },
            // Both disables wait on the user.
            ExtensionState::Blocklisted
            | ExtensionState::Disabled(
                DisableReason::UserAction | DisableReason::PermissionsIncrease,
            ) => {
                continue;
            },
            ExtensionState::Disabled(_) | ExtensionState::Terminated => {},
        }

        let tried = attempts.get(id).copied().unwrap_or(0);
        if tried >= max_attempts {
            debug!(%id, tried, "re-enable attempts exhausted");
            continue;
        }
        if !host.service.may_enable(id) {
            debug!(%id, "policy forbids re-enabling");
            continue;
        }

        attempts.insert(id.clone(), tried + 1);
        match host.service.enable(id) {
            Ok(()) => {
                info!(%id, attempt = tried + 1, "re-enabled extension");
                reenabled.push(id.clone());
            },
            Err(e) => {
                warn!(%id, error = %e, "failed to re-enable extension");
            },
        }
    }
    reenabled
}

/// Ask the updater to check the tracked ids now. Returns whether a check was
/// requested.
pub fn force_update_check(host: &Host, tracked: &BTreeSet<ExtensionId>) -> bool {
    if tracked.is_empty() {
        return false;
    }
    host.updater.check_now(CheckParams {
        ids: tracked.iter().cloned().collect(),
        install_immediately: true,
        fetch_priority: FetchPriority::Background,
    });
    debug!(count = tracked.len(), "forced extension update check");
    true
}

/// Health snapshot of one tracked extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionHealth {
    pub id: ExtensionId,
    pub installed: bool,
    pub enabled: bool,
    pub pending: bool,
    pub in_config: bool,
    pub version: Option<String>,
}

impl ExtensionHealth {
    pub fn is_healthy(&self) -> bool {
        self.installed && self.enabled
    }
}

/// Emit one structured record per tracked extension. Read-only.
pub fn log_extension_health(
    host: &Host,
    config: &RemoteConfig,
    tracked: &BTreeSet<ExtensionId>,
    context: &str,
) -> Vec<ExtensionHealth> {
    let records: Vec<ExtensionHealth> = tracked
        .iter()
        .map(|id| {
            let installed = host.registry.installed_extension(id);
            ExtensionHealth {
                id: id.clone(),
                installed: installed.is_some(),
                enabled: installed.as_ref().is_some_and(|e| e.is_enabled()),
                pending: host.pending.is_pending(id),
                in_config: config.contains(id),
                version: installed.and_then(|e| e.version),
            }
        })
        .collect();

    for r in &records {
        info!(
            target: HEALTH_TARGET,
            context,
            id = %r.id,
            installed = r.installed,
            enabled = r.enabled,
            pending = r.pending,
            in_config = r.in_config,
            version = r.version.as_deref().unwrap_or("-"),
            "extension health"
        );
    }

    let healthy = records.iter().filter(|r| r.is_healthy()).count();
    info!(
        target: HEALTH_TARGET,
        context,
        tracked = records.len(),
        healthy,
        "extension health summary"
    );
    records
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{memory_host::InMemoryHost, parse::parse_remote_config},
    };

    fn config(ids: &[&str]) -> RemoteConfig {
        let json: serde_json::Map<String, serde_json::Value> = ids
            .iter()
            .map(|id| {
                (
                    (*id).to_string(),
                    serde_json::json!({"update_url": format!("https://cdn.example.com/{id}.xml")}),
                )
            })
            .collect();
        parse_remote_config(&serde_json::Value::Object(json).to_string()).config
    }

    fn tracked(ids: &[&str]) -> BTreeSet<ExtensionId> {
        ids.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn enqueue_is_idempotent() {
        let fake = InMemoryHost::new();
        let host = fake.host();
        let cfg = config(&["a"]);

        assert_eq!(
            enqueue_from_config(&host, "a", &cfg, ManifestLocation::ExternalComponent),
            EnqueueOutcome::Enqueued
        );
        assert_eq!(
            enqueue_from_config(&host, "a", &cfg, ManifestLocation::ExternalComponent),
            EnqueueOutcome::AlreadyPending
        );
        assert_eq!(
            enqueue_from_config(&host, "zzz", &cfg, ManifestLocation::ExternalComponent),
            EnqueueOutcome::NotInConfig
        );
        fake.apply_pending();
        assert_eq!(
            enqueue_from_config(&host, "a", &cfg, ManifestLocation::ExternalComponent),
            EnqueueOutcome::AlreadyInstalled
        );
        assert_eq!(fake.enqueued().len(), 1);
    }

    #[test]
    fn uninstalls_only_managed_deprecated_extensions() {
        let fake = InMemoryHost::new();
        fake.install_managed("keep");
        fake.install_managed("old");
        fake.install_user("user-old");
        let host = fake.host();

        let mut ids = tracked(&["keep", "old", "user-old", "never-installed"]);
        let removed = uninstall_deprecated(&host, Some(&config(&["keep"])), &mut ids);

        assert_eq!(removed, vec!["old"]);
        assert_eq!(fake.uninstalled(), vec!["old"]);
        assert!(fake.installed_ids().contains(&"user-old".to_string()));
        assert_eq!(ids, tracked(&["keep"]));
    }

    #[test]
    fn failed_uninstall_stays_tracked_for_retry() {
        let fake = InMemoryHost::new();
        fake.install_managed("old");
        fake.install_managed("older");
        fake.fail_uninstall("old");
        let host = fake.host();

        let mut ids = tracked(&["old", "older"]);
        let removed = uninstall_deprecated(&host, Some(&config(&["other"])), &mut ids);

        assert_eq!(removed, vec!["older"]);
        assert_eq!(ids, tracked(&["old"]));
    }

    #[test]
    fn nothing_uninstalled_before_a_config_arrives() {
        let fake = InMemoryHost::new();
        fake.install_managed("a");
        let mut ids = tracked(&["a"]);
        assert!(uninstall_deprecated(&fake.host(), None, &mut ids).is_empty());
        assert_eq!(ids.len(), 1);
        assert!(fake.uninstalled().is_empty());
    }

    #[test]
    fn received_empty_config_deprecates_everything_managed() {
        let fake = InMemoryHost::new();
        fake.install_managed("a");
        fake.install_managed("b");
        let mut ids = tracked(&["a", "b"]);

        let removed = uninstall_deprecated(&fake.host(), Some(&RemoteConfig::default()), &mut ids);
        assert_eq!(removed, vec!["a", "b"]);
        assert!(ids.is_empty());
        assert!(uninstall_deprecated(&fake.host(), Some(&RemoteConfig::default()), &mut ids).is_empty());
        assert_eq!(fake.uninstalled(), vec!["a", "b"]);
    }

    #[test]
    fn reinstall_enqueues_each_missing_extension_once() {
        let fake = InMemoryHost::new();
        fake.install_managed("present");
        let host = fake.host();
        let cfg = config(&["present", "missing-1", "missing-2"]);

        assert_eq!(reinstall_missing(&host, &cfg), vec!["missing-1", "missing-2"]);
        assert!(reinstall_missing(&host, &cfg).is_empty());
        assert_eq!(fake.enqueued().len(), 2);
    }

    #[test]
    fn reenable_respects_policy_reason_and_threshold() {
        let fake = InMemoryHost::new();
        for id in ["crashed", "blocked", "user", "perms", "listed", "flaky"] {
            fake.install_managed(id);
        }
        fake.set_state("crashed", ExtensionState::Terminated);
        fake.set_state("blocked", ExtensionState::Disabled(DisableReason::Reload));
        fake.block_enable("blocked");
        fake.set_state("user", ExtensionState::Disabled(DisableReason::UserAction));
        fake.set_state(
            "perms",
            ExtensionState::Disabled(DisableReason::PermissionsIncrease),
        );
        fake.set_state("listed", ExtensionState::Blocklisted);
        fake.set_state("flaky", ExtensionState::Disabled(DisableReason::Reload));
        fake.fail_enable("flaky");
        let host = fake.host();

        let ids = tracked(&["crashed", "blocked", "user", "perms", "listed", "flaky"]);
        let mut attempts = HashMap::new();

        assert_eq!(reenable_disabled(&host, &ids, &mut attempts, 2), vec!["crashed"]);
        assert_eq!(attempts.get("flaky"), Some(&1));
        assert!(attempts.get("crashed").is_some());

        // "crashed" is enabled now, so its counter resets; "flaky" burns its
        // second attempt and is then left alone.
        reenable_disabled(&host, &ids, &mut attempts, 2);
        assert!(!attempts.contains_key("crashed"));
        assert_eq!(attempts.get("flaky"), Some(&2));
        reenable_disabled(&host, &ids, &mut attempts, 2);
        assert_eq!(attempts.get("flaky"), Some(&2));
        assert_eq!(fake.enabled(), vec!["crashed"]);
        assert!(!attempts.contains_key("perms") && !attempts.contains_key("user"));
    }

    #[test]
    fn update_check_skips_empty_set() {
        let fake = InMemoryHost::new();
        let host = fake.host();
        assert!(!force_update_check(&host, &BTreeSet::new()));
        assert!(force_update_check(&host, &tracked(&["a", "b"])));

        let checks = fake.checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].ids, vec!["a", "b"]);
        assert_eq!(checks[0].fetch_priority, FetchPriority::Background);
    }

    #[test]
    fn health_reports_every_tracked_extension() {
        let fake = InMemoryHost::new();
        fake.install_managed("ok");
        fake.install_managed("off");
        fake.set_state("off", ExtensionState::Terminated);
        let host = fake.host();

        let records = log_extension_health(
            &host,
            &config(&["ok"]),
            &tracked(&["ok", "off", "gone"]),
            "test",
        );
        assert_eq!(records.len(), 3);
        let ok = records.iter().find(|r| r.id == "ok").unwrap();
        assert!(ok.is_healthy() && ok.in_config);
        let off = records.iter().find(|r| r.id == "off").unwrap();
        assert!(off.installed && !off.enabled);
        let gone = records.iter().find(|r| r.id == "gone").unwrap();
        assert!(!gone.installed && gone.version.is_none());
        assert!(fake.enqueued().is_empty() && fake.uninstalled().is_empty());
    }
}
