//! Fetch handler trait
//!
//! The synchronization service implements this trait. Queue workers and the
//! fallback upload consumer call into it for every job they receive.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use crate::consumer::FallbackUploadMessage;
use crate::queue::FetchJob;

/// Executes background work. Workers hold a weak reference and skip jobs once
/// the handler has been dropped.
#[async_trait]
pub trait FetchHandler: Send + Sync {
    /// Resolve a path that was missing locally when it was requested.
    async fn handle_fetch(self: Arc<Self>, job: &FetchJob) -> Result<()>;

    /// Download `message.url` and upload it under `message.remote_key`.
    async fn handle_fallback_upload(self: Arc<Self>, message: &FallbackUploadMessage)
        -> Result<()>;
}

/// Placeholder handler used before the real one exists. Every call errors.
struct NoopHandler;

#[async_trait]
impl FetchHandler for NoopHandler {
    async fn handle_fetch(self: Arc<Self>, _job: &FetchJob) -> Result<()> {
        Err(anyhow!("NoopHandler: no fetch handler available"))
    }

    async fn handle_fallback_upload(
        self: Arc<Self>,
        _message: &FallbackUploadMessage,
    ) -> Result<()> {
        Err(anyhow!("NoopHandler: no fetch handler available"))
    }
}

/// Weak reference to a no-op handler. It never upgrades, so jobs delivered to it
/// are dropped with a warning.
pub fn empty_handler_weak() -> Weak<dyn FetchHandler> {
    let n: Arc<dyn FetchHandler> = Arc::new(NoopHandler);
    Arc::downgrade(&n)
}
