//! Fallback origin fetcher
//!
//! Requests are bounded by a connect timeout and a total timeout. Only a
//! `200 OK` with a non-empty body counts as content; every other outcome,
//! timeouts and transport errors included, is reported as absence.

use crate::error::FetchError;
use bytes::Bytes;
use mediasync_core::{FallbackOrigin, FetchConfig};
use mediasync_storage::keys::{has_variant_marker, strip_variant_marker};
use reqwest::{Client, StatusCode};

/// Which URL supplied fetched content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    /// The literal resized-variant URL. Such content must not be mirrored to
    /// the bucket, which only holds originals.
    Variant,
    /// The original asset URL.
    Original,
}

#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub url: String,
    pub bytes: Bytes,
    pub source: FetchSource,
}

#[derive(Clone)]
pub struct OriginFetcher {
    http_client: Client,
}

impl OriginFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let http_client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { http_client })
    }

    /// GET `url`, returning the body only for a non-empty `200 OK`.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str) -> Option<Bytes> {
        let start = std::time::Instant::now();

        let response = match self.http_client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "Fallback request failed");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            tracing::debug!(url = %url, status = %status, "Fallback origin has no content");
            return None;
        }

        match response.bytes().await {
            Ok(body) if !body.is_empty() => {
                tracing::info!(
                    url = %url,
                    size_bytes = body.len(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Fallback fetch successful"
                );
                Some(body)
            }
            Ok(_) => {
                tracing::debug!(url = %url, "Fallback origin returned an empty body");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "Failed to read fallback body");
                None
            }
        }
    }

    /// Fetch a media path from the origin configured for `store_code`.
    ///
    /// The literal path is tried first. If that fails and the path names a
    /// resized variant, the original asset is tried once.
    pub async fn fetch_for_path(
        &self,
        origin: &FallbackOrigin,
        store_code: &str,
        local_path: &str,
    ) -> Option<FetchedContent> {
        let url = origin.url_for_path(store_code, local_path)?;
        let is_variant = has_variant_marker(local_path);

        if let Some(bytes) = self.fetch(&url).await {
            let source = if is_variant {
                FetchSource::Variant
            } else {
                FetchSource::Original
            };
            return Some(FetchedContent { url, bytes, source });
        }

        if !is_variant {
            return None;
        }

        let original_url = origin.url_for_path(store_code, &strip_variant_marker(local_path))?;
        let bytes = self.fetch(&original_url).await?;
        Some(FetchedContent {
            url: original_url,
            bytes,
            source: FetchSource::Original,
        })
    }
}
