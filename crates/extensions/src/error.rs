use thiserror::Error;

/// Failure classes the subsystem distinguishes when deciding how to degrade.
///
/// None of them is fatal: network and parse failures fall back to an empty or
/// stale config, file-system failures fall through to the remote path, and
/// host failures are retried on the next maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Parse,
    FileSystem,
    Host,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Parse => "parse",
            Self::FileSystem => "filesystem",
            Self::Host => "host",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("malformed config: {reason}")]
    Parse { reason: String },

    #[error("host refused to {operation} {id}: {message}")]
    Host {
        id: String,
        operation: &'static str,
        message: String,
    },

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn host(
        id: impl Into<String>,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::Host {
            id: id.into(),
            operation,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_url(url: impl Into<String>, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            source,
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Taxonomy bucket used for log fields and fallback decisions.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::FileSystem,
            Self::Json(_) | Self::Parse { .. } | Self::InvalidUrl { .. } => ErrorKind::Parse,
            Self::Network { .. } | Self::Http { .. } => ErrorKind::Network,
            Self::Host { .. } => ErrorKind::Host,
            Self::Message { .. } | Self::External { .. } => ErrorKind::Internal,
        }
    }
}

impl browseros_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

browseros_common::impl_context!();
