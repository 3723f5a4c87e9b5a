//! Semantic checks on a loaded configuration.

use url::Url;

use crate::schema::BrowserosConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "extensions.config_url"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.severity, self.path, self.message)
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path: path.to_string(),
            message: message.into(),
        });
    }
}

/// Validate URLs, timings and thresholds.
pub fn validate(config: &BrowserosConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    let ext = &config.extensions;

    for (path, value) in [
        ("extensions.config_url", &ext.config_url),
        ("extensions.alpha_config_url", &ext.alpha_config_url),
    ] {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "https" | "http") => {
                if url.scheme() == "http" {
                    result.push(
                        Severity::Warning,
                        path,
                        "config is fetched over plain http",
                    );
                }
            },
            Ok(url) => result.push(
                Severity::Error,
                path,
                format!("unsupported scheme '{}'", url.scheme()),
            ),
            Err(e) => result.push(Severity::Error, path, format!("invalid url: {e}")),
        }
    }

    if ext.maintenance.interval_secs == 0 {
        result.push(
            Severity::Error,
            "extensions.maintenance.interval_secs",
            "interval must be greater than zero",
        );
    }
    if ext.maintenance.max_reenable_attempts == 0 {
        result.push(
            Severity::Warning,
            "extensions.maintenance.max_reenable_attempts",
            "disabled extensions will never be re-enabled",
        );
    }
    if ext.fetch_timeout_secs == 0 {
        result.push(
            Severity::Error,
            "extensions.fetch_timeout_secs",
            "timeout must be greater than zero",
        );
    }
    if let Some(dir) = &ext.bundled_dir
        && !dir.is_absolute()
    {
        result.push(
            Severity::Warning,
            "extensions.bundled_dir",
            format!("relative path '{}' depends on the working directory", dir.display()),
        );
    }
    for (i, id) in ext.seed_ids.iter().enumerate() {
        if id.trim().is_empty() {
            result.push(
                Severity::Error,
                &format!("extensions.seed_ids[{i}]"),
                "extension id is empty",
            );
        }
    }

    result
}
