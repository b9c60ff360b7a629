//! Outbound fetch of open-data feeds.
//!
//! A [`FeedSource`] is either an HTTP(S) URL or a local file (replays).
//! [`fetch_bytes`] performs exactly one GET; [`fetch_json`] adds decoding and
//! [`fetch_json_with_retry`] wraps both in a [`RetryPolicy`].

mod basic;
mod client;
mod retry;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use retry::{RetryError, RetryPolicy, Retryable, execute_with_retry};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single fetch, or of a whole retry budget.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid feed url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream answered HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("decoding payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether the failure happened while decoding the body rather than
    /// reaching the upstream.
    pub fn is_decode(&self) -> bool {
        match self {
            FetchError::Decode(_) => true,
            FetchError::Exhausted { last, .. } => last.is_decode(),
            _ => false,
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl { .. } | FetchError::Exhausted { .. })
    }
}

impl From<RetryError<FetchError>> for FetchError {
    fn from(e: RetryError<FetchError>) -> Self {
        match e {
            RetryError::Permanent(e) => e,
            // a one-shot policy surfaces the underlying error untouched
            RetryError::Exhausted { attempts: 1, last } => last,
            RetryError::Exhausted { attempts, last } => FetchError::Exhausted {
                attempts,
                last: Box::new(last),
            },
        }
    }
}

/// Where a feed is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    Http(reqwest::Url),
    File(PathBuf),
}

impl FromStr for FeedSource {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("http://") || s.starts_with("https://") {
            let url = reqwest::Url::parse(s).map_err(|e| FetchError::InvalidUrl {
                url: s.to_string(),
                reason: e.to_string(),
            })?;
            Ok(FeedSource::Http(url))
        } else {
            Ok(FeedSource::File(PathBuf::from(s)))
        }
    }
}

impl fmt::Display for FeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedSource::Http(url) => write!(f, "{url}"),
            FeedSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Performs exactly one GET against `source`, bounded by `timeout`.
#[tracing::instrument(skip(client, source), fields(source = %source))]
pub async fn fetch_bytes<C: HttpClient + ?Sized>(
    client: &C,
    source: &FeedSource,
    timeout: Duration,
) -> Result<Bytes, FetchError> {
    match source {
        FeedSource::Http(url) => {
            let mut req = reqwest::Request::new(reqwest::Method::GET, url.clone());
            *req.timeout_mut() = Some(timeout);

            let resp = client.execute(req).await?;
            if !resp.status().is_success() {
                return Err(FetchError::Status(resp.status()));
            }
            Ok(resp.bytes().await?)
        }
        FeedSource::File(path) => {
            let content = tokio::fs::read(path).await.map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            })?;
            Ok(Bytes::from(content))
        }
    }
}

/// Fetches `source` once and decodes its JSON body into `T`.
pub async fn fetch_json<T, C>(
    client: &C,
    source: &FeedSource,
    timeout: Duration,
) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    C: HttpClient + ?Sized,
{
    let bytes = fetch_bytes(client, source, timeout).await?;
    tracing::debug!(bytes = bytes.len(), "Feed bytes received, decoding");
    Ok(serde_json::from_slice(&bytes)?)
}

/// Fetches and decodes `source`, retrying transport and decode failures
/// within the budget of `policy`.
pub async fn fetch_json_with_retry<T, C>(
    client: &C,
    source: &FeedSource,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<T, FetchError>
where
    T: DeserializeOwned,
    C: HttpClient + ?Sized,
{
    execute_with_retry(policy, move |_| fetch_json::<T, C>(client, source, timeout))
        .await
        .map_err(FetchError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    const SECOND: Duration = Duration::from_secs(1);

    struct CannedClient {
        status: u16,
        body: &'static str,
        calls: AtomicU32,
    }

    impl CannedClient {
        fn new(status: u16, body: &'static str) -> Self {
            Self {
                status,
                body,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl HttpClient for CannedClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let resp = http::Response::builder()
                .status(self.status)
                .body(self.body)
                .unwrap();
            Ok(reqwest::Response::from(resp))
        }
    }

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: u32,
    }

    fn source() -> FeedSource {
        "https://example.org/feed.json".parse().unwrap()
    }

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    #[test]
    fn test_source_parsing() {
        assert!(matches!(source(), FeedSource::Http(_)));
        let file: FeedSource = "fixtures/status.json".parse().unwrap();
        assert_eq!(file, FeedSource::File(PathBuf::from("fixtures/status.json")));
        assert!("https://".parse::<FeedSource>().is_err());
    }

    #[tokio::test]
    async fn test_fetch_json_decodes_body() {
        let client = CannedClient::new(200, r#"{"value": 42}"#);
        let payload: Payload = fetch_json(&client, &source(), SECOND).await.unwrap();
        assert_eq!(payload.value, 42);
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let client = CannedClient::new(503, "");
        let err = fetch_bytes(&client, &source(), SECOND).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(s) if s.as_u16() == 503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_malformed_json_exhausts_budget() {
        let client = CannedClient::new(200, "{not json");
        let err = fetch_json_with_retry::<Payload, _>(&client, &source(), SECOND, &instant(7))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 7, .. }));
        assert!(err.is_decode());
        assert_eq!(client.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_single_attempt_surfaces_underlying_error() {
        let client = CannedClient::new(200, "[]");
        let once = RetryPolicy::once();
        let err = fetch_json_with_retry::<Payload, _>(&client, &source(), SECOND, &once)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Decode(_)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = FeedSource::File(PathBuf::from("/nonexistent/velib/feed.json"));
        let err = fetch_bytes(&BasicClient::new(), &source, SECOND).await.unwrap_err();
        assert!(matches!(err, FetchError::Io { .. }));
    }
}
