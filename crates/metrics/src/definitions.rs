//! Metric name and label definitions.

/// Extension bootstrap and maintenance metrics
pub mod extensions {
    /// Installer attempts (one per profile start)
    pub const INSTALL_ATTEMPTS_TOTAL: &str = "browseros_extensions_install_attempts_total";
    /// Installs satisfied from the bundled manifest
    pub const BUNDLED_INSTALLS_TOTAL: &str = "browseros_extensions_bundled_installs_total";
    /// Installer duration in seconds
    pub const INSTALL_DURATION_SECONDS: &str = "browseros_extensions_install_duration_seconds";
    /// Remote config fetch failures (installer and maintainer)
    pub const CONFIG_FETCH_FAILURES_TOTAL: &str =
        "browseros_extensions_config_fetch_failures_total";
    /// Config entries dropped by validation
    pub const CONFIG_ENTRIES_DROPPED_TOTAL: &str =
        "browseros_extensions_config_entries_dropped_total";
    /// Completed maintenance cycles
    pub const MAINTENANCE_CYCLES_TOTAL: &str = "browseros_extensions_maintenance_cycles_total";
    /// Maintenance ticks skipped because a fetch was still in flight
    pub const MAINTENANCE_TICKS_SKIPPED_TOTAL: &str =
        "browseros_extensions_maintenance_ticks_skipped_total";
    /// Deprecated extensions uninstalled
    pub const UNINSTALLS_TOTAL: &str = "browseros_extensions_uninstalls_total";
    /// Missing extensions re-enqueued
    pub const REINSTALLS_TOTAL: &str = "browseros_extensions_reinstalls_total";
    /// Disabled extensions re-enabled
    pub const REENABLES_TOTAL: &str = "browseros_extensions_reenables_total";
    /// Extensions enqueued by the immediate-install trigger
    pub const IMMEDIATE_ENQUEUES_TOTAL: &str = "browseros_extensions_immediate_enqueues_total";
    /// Extensions currently tracked
    pub const TRACKED: &str = "browseros_extensions_tracked";
    /// Tracked extensions that are installed and enabled
    pub const HEALTHY: &str = "browseros_extensions_healthy";
}

/// Common label keys
pub mod labels {
    pub const SOURCE: &str = "source";
}
