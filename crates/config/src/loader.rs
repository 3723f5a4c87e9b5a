use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BrowserosConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "browseros.toml",
    "browseros.yaml",
    "browseros.yml",
    "browseros.json",
];

/// Env switch that forces the alpha config source on.
pub const ALPHA_FEATURES_ENV: &str = "BROWSEROS_ALPHA_FEATURES";

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BrowserosConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./browseros.{toml,yaml,yml,json}`
/// 2. `~/.config/browseros/browseros.{toml,yaml,yml,json}`
///
/// Falls back to defaults when nothing is found or the file is broken; a bad
/// config file must never keep the browser from starting.
pub fn discover_and_load() -> BrowserosConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    let mut config = BrowserosConfig::default();
    apply_env_overrides(&mut config);
    config
}

/// Apply environment overrides on top of file values.
pub fn apply_env_overrides(config: &mut BrowserosConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(
    config: &mut BrowserosConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(value) = lookup(ALPHA_FEATURES_ENV) {
        config.features.alpha = matches!(value.trim(), "1" | "true" | "yes" | "on");
    }
}

/// Returns the user-global config directory (`~/.config/browseros/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "browseros").map(|d| d.config_dir().to_path_buf())
}

/// First existing config file in the search order, if any.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BrowserosConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
