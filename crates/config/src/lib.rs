//! Configuration loading, env substitution, and validation.
//!
//! Config files: `browseros.toml`, `browseros.yaml`, or `browseros.json`
//! Searched in `./` then `~/.config/browseros/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{
        ALPHA_FEATURES_ENV, apply_env_overrides, config_dir, discover_and_load, find_config_file,
        load_config,
    },
    schema::{
        BrowserosConfig, DEFAULT_ALPHA_CONFIG_URL, DEFAULT_CONFIG_URL, ExtensionsConfig,
        FeatureFlags, MIN_MAINTENANCE_INTERVAL, MaintenanceConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate},
};
