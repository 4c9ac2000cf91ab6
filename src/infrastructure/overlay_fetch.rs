//! Overlay image loading.
//!
//! Overlays come from the archive itself, inline `data:` URLs or remote
//! URLs. Remote fetches are bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;

use crate::domain::{AppError, OverlaySource, Result};

use super::container::Container;

/// Source of remote overlay bytes.
#[async_trait]
pub trait OverlayFetcher: Send + Sync {
    /// Downloads the resource at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// HTTP fetcher with a hard per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpOverlayFetcher {
    client: Client,
}

impl HttpOverlayFetcher {
    /// Build a fetcher.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| AppError::fetch("client", e))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OverlayFetcher for HttpOverlayFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "Fetching remote overlay");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::fetch(url, e))?;

        let body = response.bytes().await.map_err(|e| AppError::fetch(url, e))?;
        Ok(body.to_vec())
    }
}

/// Fetcher used when remote overlays are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

#[async_trait]
impl OverlayFetcher for OfflineFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        Err(AppError::Fetch {
            message: format!("{url}: remote overlays disabled"),
            source: None,
        })
    }
}

/// Resolves overlay references for one run.
pub struct OverlayResolver<'a> {
    container: Option<&'a Container>,
    fetcher: &'a dyn OverlayFetcher,
}

impl<'a> OverlayResolver<'a> {
    #[must_use]
    pub fn new(container: Option<&'a Container>, fetcher: &'a dyn OverlayFetcher) -> Self {
        Self { container, fetcher }
    }

    /// Loads the raw bytes behind an overlay reference.
    ///
    /// # Errors
    /// Returns error if the entry is missing, the data URL is malformed or
    /// the fetch fails or times out.
    pub async fn load(&self, source: &OverlaySource) -> Result<Vec<u8>> {
        match source {
            OverlaySource::ArchiveEntry(name) => {
                let container = self.container.ok_or_else(|| AppError::NotFound {
                    name: name.clone(),
                })?;
                container.read(name)
            }
            OverlaySource::DataUrl(url) => decode_data_url(url),
            OverlaySource::Remote(url) => self.fetcher.fetch(url).await,
        }
    }
}

/// Decodes a base64 `data:` URL.
///
/// # Errors
/// Returns a format error for non-base64 or malformed URLs.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| AppError::format("malformed data URL"))?;

    if !header.ends_with(";base64") {
        return Err(AppError::format("only base64 data URLs are supported"));
    }

    BASE64
        .decode(payload.trim())
        .map_err(|e| AppError::format(format!("invalid base64 in data URL: {e}")))
}
