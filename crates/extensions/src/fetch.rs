//! Remote config retrieval.

use std::time::Duration;

use {async_trait::async_trait, reqwest::Client, tracing::debug, url::Url};

#[cfg(feature = "metrics")]
use browseros_metrics::{counter, extensions as ext_metrics};

use crate::{
    Error, Result,
    parse::{ParsedConfig, parse_remote_config},
};

/// Source of the remote config body. The real implementation is HTTP; tests
/// script the responses.
#[async_trait]
pub trait ConfigFetcher: Send + Sync {
    /// One GET, no retries. Non-2xx is an error.
    async fn fetch(&self, url: &Url) -> Result<String>;
}

/// [`ConfigFetcher`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
    client: Client,
}

impl HttpConfigFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|source| Error::external("failed to build http client", source))?;
        Ok(Self { client })
    }

    /// Reuse a client the host already owns.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ConfigFetcher for HttpConfigFetcher {
    async fn fetch(&self, url: &Url) -> Result<String> {
        debug!(%url, "fetching extension config");

        let resp = self
            .client
            .get(url.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| Error::Network {
                url: url.to_string(),
                source,
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|source| Error::Network {
            url: url.to_string(),
            source,
        })
    }
}

/// Fetch and parse the remote config.
///
/// Entry-level problems are tolerated; a document that is not a JSON object
/// at all is reported as [`Error::Parse`] so callers keep their last good
/// config instead of replacing it with nothing.
pub async fn fetch_remote_config(fetcher: &dyn ConfigFetcher, url: &Url) -> Result<ParsedConfig> {
    let body = match fetcher.fetch(url).await {
        Ok(body) => body,
        Err(e) => {
            #[cfg(feature = "metrics")]
            counter!(ext_metrics::CONFIG_FETCH_FAILURES_TOTAL).increment(1);
            return Err(e);
        },
    };

    let parsed = parse_remote_config(&body);
    if parsed.is_malformed() {
        return Err(Error::parse(format!("config from {url} is not a JSON object")));
    }

    #[cfg(feature = "metrics")]
    counter!(ext_metrics::CONFIG_ENTRIES_DROPPED_TOTAL).increment(parsed.dropped_entries() as u64);

    Ok(parsed)
}
