use std::path::PathBuf;

use {anyhow::Result, clap::Subcommand};

use browseros_config::{BrowserosConfig, Severity, find_config_file, validate};

#[derive(Subcommand, Default)]
pub enum ConfigAction {
    /// Validate the configuration and report errors and warnings.
    #[default]
    Check,
    /// Print the effective configuration as JSON.
    Show,
}

pub fn handle_config(
    action: ConfigAction,
    config: &BrowserosConfig,
    explicit_path: Option<PathBuf>,
) -> Result<()> {
    match action {
        ConfigAction::Check => check(config, explicit_path.or_else(find_config_file)),
        ConfigAction::Show => {
            println!("{}", serde_json::to_string_pretty(config)?);
            eprintln!(
                "config source: {}",
                config.extensions.selected_config_url(&config.features)
            );
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: &BrowserosConfig, path: Option<PathBuf>) -> Result<()> {
    if let Some(ref path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let result = validate(config);
    for d in &result.diagnostics {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}
