//! One-shot acquisition of the companion extension set.

use std::{path::PathBuf, sync::Arc, time::Instant};

use {
    tokio::task::JoinHandle,
    tracing::{debug, info, warn},
    url::Url,
};

#[cfg(feature = "metrics")]
use browseros_metrics::{counter, extensions as ext_metrics, histogram, labels};

use crate::{
    bundled::load_bundled,
    fetch::{ConfigFetcher, fetch_remote_config},
    types::InstallResult,
};

/// Produces exactly one [`InstallResult`] per profile start.
///
/// Both entry points take `self` by value, so a second attempt from the same
/// installer does not type-check.
pub struct ExtensionInstaller {
    fetcher: Arc<dyn ConfigFetcher>,
    bundled_dir: Option<PathBuf>,
}

impl ExtensionInstaller {
    pub fn new(fetcher: Arc<dyn ConfigFetcher>, bundled_dir: Option<PathBuf>) -> Self {
        Self {
            fetcher,
            bundled_dir,
        }
    }

    /// Run the acquisition on a spawned task and hand the result to
    /// `on_complete`, which is never called from inside this function.
    pub fn start_installation<F>(self, config_url: Url, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(InstallResult) + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.install(&config_url).await;
            on_complete(result);
        })
    }

    /// Bundled first, then a single remote fetch. Never fails: every error
    /// degrades to fewer (possibly zero) extensions.
    pub async fn install(self, config_url: &Url) -> InstallResult {
        let started = Instant::now();

        let result = match self.try_bundled().await {
            Some(result) => result,
            None => self.install_remote(config_url).await,
        };

        #[cfg(feature = "metrics")]
        {
            let source = if result.from_bundled { "bundled" } else { "remote" };
            counter!(ext_metrics::INSTALL_ATTEMPTS_TOTAL, labels::SOURCE => source).increment(1);
            histogram!(ext_metrics::INSTALL_DURATION_SECONDS)
                .record(started.elapsed().as_secs_f64());
        }

        info!(
            count = result.extension_ids.len(),
            from_bundled = result.from_bundled,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extension acquisition finished"
        );
        result
    }

    async fn try_bundled(&self) -> Option<InstallResult> {
        let Some(dir) = self.bundled_dir.clone() else {
            debug!("no bundled extension directory");
            return None;
        };

        let prefs = match load_bundled(dir.clone()).await {
            Ok(prefs) => prefs,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, kind = %e.kind(), "bundled extensions unavailable");
                return None;
            },
        };
        if prefs.is_empty() {
            warn!(dir = %dir.display(), "bundled manifest has no usable entries, falling back to remote");
            return None;
        }

        #[cfg(feature = "metrics")]
        counter!(ext_metrics::BUNDLED_INSTALLS_TOTAL).increment(1);

        info!(count = prefs.len(), dir = %dir.display(), "using bundled extensions");
        Some(InstallResult::from_bundled(dir, prefs))
    }

    async fn install_remote(&self, config_url: &Url) -> InstallResult {
        match fetch_remote_config(self.fetcher.as_ref(), config_url).await {
            Ok(parsed) => {
                if parsed.dropped_entries() > 0 {
                    warn!(dropped = parsed.dropped_entries(), "skipped invalid config entries");
                }
                InstallResult::from_remote(parsed.config)
            },
            Err(e) => {
                warn!(url = %config_url, error = %e, kind = %e.kind(), "config fetch failed, continuing without extensions");
                InstallResult::empty()
            },
        }
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{bundled::BUNDLED_MANIFEST_FILE, memory_host::ScriptedFetcher},
        tokio::sync::oneshot,
    };

    const REMOTE: &str = r#"{"abc123": {"update_url": "https://example.com/update"}}"#;

    fn url() -> Url {
        Url::parse("https://cdn.example.com/extensions.json").unwrap()
    }

    fn bundled_dir(entries: &[(&str, bool)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let mut manifest = serde_json::Map::new();
        for (id, present) in entries {
            let file = format!("{id}.crx");
            if *present {
                std::fs::write(tmp.path().join(&file), b"crx").unwrap();
            }
            manifest.insert(
                (*id).to_string(),
                serde_json::json!({"external_crx": file, "external_version": "1.0.0"}),
            );
        }
        std::fs::write(
            tmp.path().join(BUNDLED_MANIFEST_FILE),
            serde_json::Value::Object(manifest).to_string(),
        )
        .unwrap();
        tmp
    }

    #[tokio::test]
    async fn bundled_manifest_makes_zero_fetches() {
        let tmp = bundled_dir(&[("aaa", true)]);
        let fetcher = Arc::new(ScriptedFetcher::new().respond(REMOTE));

        let result = ExtensionInstaller::new(fetcher.clone(), Some(tmp.path().to_path_buf()))
            .install(&url())
            .await;

        assert!(result.from_bundled);
        assert_eq!(result.bundled_path.as_deref(), Some(tmp.path()));
        assert!(result.config.is_empty());
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn bundled_partial_success_keeps_surviving_entry() {
        let tmp = bundled_dir(&[("aaa", true), ("bbb", false)]);
        let fetcher = Arc::new(ScriptedFetcher::new());

        let result = ExtensionInstaller::new(fetcher.clone(), Some(tmp.path().to_path_buf()))
            .install(&url())
            .await;

        assert!(result.from_bundled);
        assert_eq!(result.extension_ids.len(), 1);
        assert!(result.prefs.contains_key("aaa"));
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_remote_without_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::new().respond(REMOTE));

        let result = ExtensionInstaller::new(fetcher.clone(), Some(tmp.path().to_path_buf()))
            .install(&url())
            .await;

        assert!(!result.from_bundled);
        assert_eq!(result.extension_ids.iter().collect::<Vec<_>>(), vec!["abc123"]);
        assert_eq!(
            result.prefs["abc123"].update_url.as_deref(),
            Some("https://example.com/update")
        );
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(fetcher.requested_urls(), vec![url()]);
    }

    #[tokio::test]
    async fn falls_back_when_no_bundled_archive_survives() {
        let tmp = bundled_dir(&[("aaa", false)]);
        let fetcher = Arc::new(ScriptedFetcher::new().respond(REMOTE));

        let result = ExtensionInstaller::new(fetcher.clone(), Some(tmp.path().to_path_buf()))
            .install(&url())
            .await;

        assert!(!result.from_bundled);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn network_failure_degrades_to_empty_result() {
        let fetcher = Arc::new(ScriptedFetcher::new().fail(503));

        let (tx, rx) = oneshot::channel();
        let handle = ExtensionInstaller::new(fetcher.clone(), None).start_installation(
            url(),
            move |result| {
                let _ = tx.send(result);
            },
        );

        let result = rx.await.unwrap();
        handle.await.unwrap();

        assert!(result.prefs.is_empty());
        assert!(result.extension_ids.is_empty());
        assert!(!result.from_bundled);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_remote_document_degrades_to_empty_result() {
        let fetcher = Arc::new(ScriptedFetcher::new().respond("not json"));
        let result = ExtensionInstaller::new(fetcher, None).install(&url()).await;
        assert!(result.extension_ids.is_empty());
    }
}
