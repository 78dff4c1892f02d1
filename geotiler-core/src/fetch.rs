//! Retrieval of `GeoJSON` payloads by URL.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;
use url::Url;

/// Reasons a payload could not be retrieved.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Only `file`, `http` and `https` URLs (and bare paths) can be fetched.
    #[error("Unsupported URL scheme {0:?}, expected file, http or https")]
    UnsupportedScheme(String),

    /// The URL could not be parsed.
    #[error("Unable to parse URL {1}: {0}")]
    InvalidUrl(#[source] url::ParseError, String),

    /// Reading a local file failed.
    #[error("Unable to read {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// The HTTP request failed or returned an error status.
    #[cfg(feature = "http")]
    #[error("Unable to fetch {1}: {0}")]
    Http(#[source] reqwest::Error, Url),
}

/// Resolves a URL into raw bytes.
///
/// A single call completes exactly once, either with the payload or with the reason it failed.
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Retrieves the payload at `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// Reads local files (`file://` URLs and bare paths) and, with the `http` feature, remote
/// `http://` and `https://` resources.
#[derive(Clone, Debug, Default)]
pub struct DefaultFetcher {
    #[cfg(feature = "http")]
    client: reqwest::Client,
}

impl DefaultFetcher {
    /// Creates a fetcher with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given HTTP client for remote resources.
    #[cfg(feature = "http")]
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read_file(path: PathBuf) -> Result<Bytes, FetchError> {
        trace!("Reading {}", path.display());
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) => Err(FetchError::Io(e, path)),
        }
    }

    #[cfg(feature = "http")]
    async fn get(&self, url: Url) -> Result<Bytes, FetchError> {
        trace!("Requesting {url}");
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => return Err(FetchError::Http(e, url)),
        };
        match response.error_for_status() {
            Ok(response) => response.bytes().await.map_err(|e| FetchError::Http(e, url)),
            Err(e) => Err(FetchError::Http(e, url)),
        }
    }
}

/// A URL is treated as a local path when it has no scheme, or a single-letter one (`C:\...`).
fn is_bare_path(url: &str) -> bool {
    match url.split_once("://") {
        None => !matches!(Url::parse(url), Ok(u) if u.scheme().len() > 1),
        Some(_) => false,
    }
}

#[async_trait]
impl Fetcher for DefaultFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        if is_bare_path(url) {
            return Self::read_file(PathBuf::from(url)).await;
        }
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl(e, url.to_string()))?;
        match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| FetchError::UnsupportedScheme(url.to_string()))?;
                Self::read_file(path).await
            }
            #[cfg(feature = "http")]
            "http" | "https" => self.get(parsed).await,
            scheme => Err(FetchError::UnsupportedScheme(scheme.to_string())),
        }
    }
}
