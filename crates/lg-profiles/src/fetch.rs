//! Filter list download
//!
//! [`Fetcher`] is the seam to the HTTP client; [`HttpFetcher`] is the real
//! implementation on top of `reqwest`, which also serves `file://` sources
//! from disk so local lists share the update path.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP error with status code
    #[error("HTTP error: {0}")]
    Http(u16),

    /// Connection failure, timeout, or cancelled request
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Content too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    /// Local file could not be read
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Downloads the raw bytes of a filter list.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    max_size: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            max_size: config.max_size_bytes,
        })
    }

    fn check_size(&self, size: u64) -> Result<(), FetchError> {
        if size > self.max_size {
            return Err(FetchError::TooLarge {
                size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }

        // Check content length before downloading
        let mut data = Vec::new();
        if let Some(len) = response.content_length() {
            self.check_size(len)?;
            data.reserve(len as usize);
        }

        // The header may be missing or wrong; count what actually arrives.
        let mut body = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            self.check_size((data.len() + chunk.len()) as u64)?;
            data.extend_from_slice(&chunk);
        }
        Ok(data)
    }

    async fn fetch_file(&self, path: PathBuf) -> Result<Vec<u8>, FetchError> {
        let len = tokio::fs::metadata(&path).await?.len();
        self.check_size(len)?;
        Ok(tokio::fs::read(&path).await?)
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        log::debug!("Fetching {}", url);
        if let Some(path) = url.strip_prefix("file://") {
            return self.fetch_file(PathBuf::from(path)).await;
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return self.fetch_http(url).await;
        }
        let scheme = url.split_once(':').map_or(url, |(scheme, _)| scheme);
        Err(FetchError::UnsupportedScheme(scheme.to_string()))
    }
}
