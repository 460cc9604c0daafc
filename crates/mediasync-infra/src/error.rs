//! Infrastructure error types

use thiserror::Error;

/// Key-value cache store errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fallback fetcher errors. A failed fetch is not an error; only a client that
/// cannot be built is.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
