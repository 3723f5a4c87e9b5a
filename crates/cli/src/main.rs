mod config_commands;
mod ext_commands;

use std::path::PathBuf;

use {
    browseros_config::BrowserosConfig,
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "browseros-ext",
    about = "Inspect the BrowserOS companion extension bootstrap"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the standard search locations.
    #[arg(long, global = true, env = "BROWSEROS_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and parse the remote extension config.
    Fetch {
        /// Config URL (defaults to the source selected by the feature flags).
        #[arg(long)]
        url: Option<String>,
    },
    /// Read a bundled extension manifest.
    Bundled {
        /// Bundled directory (defaults to the platform location).
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Show the effective configuration and report problems.
    Config {
        #[command(subcommand)]
        action: Option<config_commands::ConfigAction>,
    },
    /// Run the loader and one maintenance cycle against an in-memory host.
    Simulate {
        #[arg(long)]
        url: Option<String>,
        /// Bundled directory to try before the network.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<BrowserosConfig> {
    match path {
        Some(path) => browseros_config::load_config(path),
        None => Ok(browseros_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "browseros-ext starting");

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Fetch { url } => ext_commands::fetch(&config, url).await,
        Commands::Bundled { dir } => ext_commands::bundled(&config, dir).await,
        Commands::Config { action } => {
            config_commands::handle_config(action.unwrap_or_default(), &config, cli.config)
        },
        Commands::Simulate { url, dir } => ext_commands::simulate(config, url, dir).await,
    }
}
