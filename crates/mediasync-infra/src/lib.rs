//! Mediasync Infrastructure Library
//!
//! This crate provides shared infrastructure components used by the synchronization services:
//! - Telemetry initialization
//! - Key-value cache store and the lookup cache built on it
//! - Fallback origin HTTP fetching

pub mod cache;
pub mod error;
pub mod fetch;
pub mod telemetry;

// Re-export commonly used types
pub use cache::{CacheStore, FileCacheStore, LookupCache, MemoryCacheStore};
pub use error::{CacheError, FetchError};
pub use fetch::{FetchSource, FetchedContent, OriginFetcher};
pub use telemetry::init_telemetry;
