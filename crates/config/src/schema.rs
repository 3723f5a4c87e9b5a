//! Config schema types for the extension subsystem.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Stable extension config source.
pub const DEFAULT_CONFIG_URL: &str = "https://cdn.browseros.com/extensions/extensions.json";
/// Alpha (canary) extension config source.
pub const DEFAULT_ALPHA_CONFIG_URL: &str =
    "https://cdn.browseros.com/extensions/extensions.alpha.json";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserosConfig {
    pub extensions: ExtensionsConfig,
    pub features: FeatureFlags,
}

/// Feature switches read at profile startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Pull extensions from the alpha config source instead of stable.
    pub alpha: bool,
}

/// Bootstrap and maintenance settings for the companion extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionsConfig {
    /// Remote config used when the alpha feature is off.
    pub config_url: String,
    /// Remote config used when the alpha feature is on.
    pub alpha_config_url: String,
    /// Override for the bundled extension directory. When unset the
    /// platform location next to the browser binary is used.
    pub bundled_dir: Option<PathBuf>,
    /// Ids tracked from the first moment, before any config is known.
    pub seed_ids: Vec<String>,
    /// Delay before forcing installation after a network-path bootstrap.
    pub immediate_install_delay_secs: u64,
    /// Per-request timeout for config fetches.
    pub fetch_timeout_secs: u64,
    pub user_agent: String,
    pub maintenance: MaintenanceConfig,
}

impl Default for ExtensionsConfig {
    fn default() -> Self {
        Self {
            config_url: DEFAULT_CONFIG_URL.into(),
            alpha_config_url: DEFAULT_ALPHA_CONFIG_URL.into(),
            bundled_dir: None,
            seed_ids: Vec::new(),
            immediate_install_delay_secs: 2,
            fetch_timeout_secs: 30,
            user_agent: "browseros-extensions".into(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl ExtensionsConfig {
    /// Config URL selected by the feature flags.
    pub fn selected_config_url(&self, features: &FeatureFlags) -> &str {
        if features.alpha {
            &self.alpha_config_url
        } else {
            &self.config_url
        }
    }

    pub fn immediate_install_delay(&self) -> Duration {
        Duration::from_secs(self.immediate_install_delay_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

/// Recurring reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Delay between maintainer start and the first cycle.
    pub initial_delay_secs: u64,
    /// Fixed, un-jittered spacing between cycles.
    pub interval_secs: u64,
    /// Consecutive re-enable attempts per extension before giving up on it.
    pub max_reenable_attempts: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: 30,
            interval_secs: 15 * 60,
            max_reenable_attempts: 3,
        }
    }
}

/// Shortest spacing between maintenance cycles.
pub const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

impl MaintenanceConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    /// Cycle spacing, never shorter than [`MIN_MAINTENANCE_INTERVAL`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs).max(MIN_MAINTENANCE_INTERVAL)
    }
}
