use crate::{
    error::{Error, Result},
    presigned_url::PresignedUrl,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InitParams {
    #[serde(default)]
    pub log_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferParams {
    pub url: String,
    pub file_path: String,
    #[serde(default)]
    pub allow_http: bool,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl TransferParams {
    pub(crate) fn presigned_url(&self) -> Result<PresignedUrl> {
        if self.allow_http {
            PresignedUrl::parse_insecure(&self.url)
        } else {
            PresignedUrl::parse(&self.url)
        }
    }
}

pub fn create_http_client(params: &TransferParams) -> Result<reqwest::Client> {
    let connect_timeout = params
        .connect_timeout_secs
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    let mut builder =
        reqwest::Client::builder().connect_timeout(Duration::from_secs(connect_timeout));
    // No overall timeout unless asked for, a large upload may legitimately
    // take longer than any fixed bound.
    if let Some(timeout) = params.timeout_secs {
        builder = builder.timeout(Duration::from_secs(timeout));
    }
    builder.build().map_err(Error::Client)
}

// ProgressTracker reports how much of the body has been handed to the connection.
pub(crate) struct ProgressTracker {
    bytes_written: u64,
    content_length: u64,
    progress_callback: ProgressCallback,
}

impl ProgressTracker {
    pub(crate) fn new(content_length: u64, progress_callback: ProgressCallback) -> Self {
        Self {
            bytes_written: 0,
            content_length,
            progress_callback,
        }
    }

    pub(crate) fn track(&mut self, len: u64) {
        self.bytes_written += len;
        let progress = if self.content_length == 0 {
            100.0
        } else {
            self.bytes_written as f64 / self.content_length as f64 * 100.0
        };
        (self.progress_callback)(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_transfer_params_defaults() {
        let params: TransferParams = serde_json::from_str(
            r#"{"url": "https://example.com/b/k?sig=1", "file_path": "/tmp/a"}"#,
        )
        .unwrap();
        assert!(!params.allow_http);
        assert_eq!(params.timeout_secs, None);
        assert!(params.presigned_url().is_ok());
        assert!(create_http_client(&params).is_ok());
    }

    #[test]
    fn test_transfer_params_http_needs_opt_in() {
        let mut params: TransferParams = serde_json::from_str(
            r#"{"url": "http://127.0.0.1:9000/b/k", "file_path": "/tmp/a"}"#,
        )
        .unwrap();
        assert!(matches!(params.presigned_url(), Err(Error::InvalidUrl(_))));
        params.allow_http = true;
        assert!(params.presigned_url().is_ok());
    }

    #[test]
    fn test_progress_tracker() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut tracker = ProgressTracker::new(
            4,
            Arc::new(move |progress: f64| sink.lock().unwrap().push(progress)),
        );
        tracker.track(1);
        tracker.track(3);
        assert_eq!(*seen.lock().unwrap(), vec![25.0, 100.0]);

        let mut empty =
            ProgressTracker::new(0, Arc::new(|progress: f64| assert_eq!(progress, 100.0)));
        empty.track(0);
    }
}
