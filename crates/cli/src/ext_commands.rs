use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    browseros_config::BrowserosConfig,
    browseros_extensions::{
        CycleOutcome, ExtensionLoader, HttpConfigFetcher,
        bundled::read_bundled_manifest,
        fetch::fetch_remote_config,
        memory_host::InMemoryHost,
        paths::resolve_bundled_dir,
    },
    url::Url,
};

fn config_url(config: &BrowserosConfig, url: Option<String>) -> Result<Url> {
    let raw = url.unwrap_or_else(|| {
        config
            .extensions
            .selected_config_url(&config.features)
            .to_string()
    });
    Url::parse(&raw).with_context(|| format!("invalid config url: {raw}"))
}

fn http_fetcher(config: &BrowserosConfig) -> Result<HttpConfigFetcher> {
    Ok(HttpConfigFetcher::new(
        config.extensions.fetch_timeout(),
        &config.extensions.user_agent,
    )?)
}

pub async fn fetch(config: &BrowserosConfig, url: Option<String>) -> Result<()> {
    let url = config_url(config, url)?;
    let fetcher = http_fetcher(config)?;
    let parsed = fetch_remote_config(&fetcher, &url).await?;

    for issue in &parsed.issues {
        eprintln!("skipped: {issue:?}");
    }
    if parsed.config.is_empty() {
        println!("No extensions in {url}.");
        return Ok(());
    }
    for (id, entry) in parsed.config.iter() {
        println!("  {id}  {}", entry.update_url);
    }
    eprintln!("{} extension(s), {} dropped", parsed.config.len(), parsed.dropped_entries());
    Ok(())
}

pub async fn bundled(config: &BrowserosConfig, dir: Option<PathBuf>) -> Result<()> {
    let dir = resolve_bundled_dir(dir.as_deref().or(config.extensions.bundled_dir.as_deref()))
        .context("could not locate the bundled extension directory")?;
    eprintln!("Reading {}", dir.display());

    let prefs = tokio::task::spawn_blocking(move || read_bundled_manifest(&dir)).await??;
    println!("{}", serde_json::to_string_pretty(&prefs)?);
    Ok(())
}

/// Drive the real loader against an in-memory host: acquisition, the
/// immediate-install trigger, then one maintenance cycle.
pub async fn simulate(
    mut config: BrowserosConfig,
    url: Option<String>,
    dir: Option<PathBuf>,
) -> Result<()> {
    if dir.is_some() {
        config.extensions.bundled_dir = dir;
    }
    let url = config_url(&config, url)?;

    let host = InMemoryHost::new();
    let fetcher = Arc::new(http_fetcher(&config)?);
    let loader = ExtensionLoader::new(host.host(), fetcher, &config.extensions, &config.features)?;
    loader.set_config_url(url);

    if let Some(handle) = loader.start_loading() {
        handle.await?;
    }

    let loads = host.loads();
    let bundled = loads.first().is_some_and(|(_, base)| base.is_some());
    eprintln!(
        "install: {} extension(s) handed to the host (bundled: {bundled})",
        loads.first().map_or(0, |(prefs, _)| prefs.len()),
    );

    if !bundled {
        let enqueued = loader.trigger_immediate_installation();
        eprintln!("immediate install: {enqueued} enqueued");
        host.apply_pending();
    }

    let maintainer = loader
        .maintainer()
        .context("maintainer was not started")?;
    match maintainer.run_maintenance_cycle().await {
        CycleOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
        CycleOutcome::Skipped => eprintln!("maintenance cycle skipped"),
        CycleOutcome::Cancelled => eprintln!("maintenance cycle cancelled"),
    }
    println!("{}", serde_json::to_string_pretty(&maintainer.snapshot())?);

    loader.shutdown();
    Ok(())
}
