use std::{fmt, io, path::PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// Which stage of the http exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// dns, tcp or tls handshake failure
    Connect,
    Timeout,
    /// the connection was up but the exchange broke (request, body, decode)
    Protocol,
    Other,
}

impl TransportErrorKind {
    pub(crate) fn classify(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_request() || err.is_body() || err.is_decode() {
            Self::Protocol
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol",
            Self::Other => "transport",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid presigned url: {0}")]
    InvalidUrl(String),

    /// The local file could not be opened, inspected or read.
    #[error("cannot read {}: {source}", path.display())]
    Resource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{kind} error: {source}")]
    Transport {
        kind: TransportErrorKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid target {0:?}, expected bucket/object")]
    InvalidTarget(String),

    #[error("unsupported method: {0} (use GET or PUT)")]
    UnsupportedMethod(String),

    #[error("invalid expiry {0:?}")]
    InvalidExpiry(String),

    #[error("presign failed: {0}")]
    Presign(String),

    #[error("parse params failed: {0}")]
    Params(#[from] serde_json::Error),

    #[error("logger init failed: {0}")]
    Logger(#[from] flexi_logger::FlexiLoggerError),

    #[error("runtime init failed: {0}")]
    Runtime(#[source] io::Error),

    #[error("runtime not initialized")]
    RuntimeNotInitialized,

    /// A thread panicked while holding one of the facade's global locks.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// The http client could not be built, no request was attempted.
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
}

impl Error {
    pub(crate) fn resource(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Resource {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(source: reqwest::Error) -> Self {
        Self::Transport {
            kind: TransportErrorKind::classify(&source),
            source,
        }
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The transport stage that failed, if this is a transport error.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Self::Transport { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_setup_error_is_not_transport() {
        let source = reqwest::Client::new()
            .get("http://127.0.0.1:0/")
            .send()
            .await
            .unwrap_err();
        let err = Error::Client(source);
        assert!(!err.is_transport());
        assert_eq!(err.transport_kind(), None);
        assert!(err.to_string().starts_with("http client setup failed"));
    }
}
