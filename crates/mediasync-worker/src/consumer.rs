//! Fallback upload message channel
//!
//! Producers publish `(url, remote_key)` pairs onto the named queue; the
//! consumer downloads each URL and uploads the result to the bucket through
//! the [`FetchHandler`].

use serde::{Deserialize, Serialize};
use std::sync::Weak;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use mediasync_core::constants::FALLBACK_QUEUE_NAME;

use crate::context::FetchHandler;
use crate::queue::QueueError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackUploadMessage {
    pub url: String,
    pub remote_key: String,
}

#[derive(Clone)]
pub struct FallbackUploadPublisher {
    tx: mpsc::Sender<FallbackUploadMessage>,
}

pub struct FallbackUploadConsumer {
    rx: mpsc::Receiver<FallbackUploadMessage>,
}

/// Create the `mediasync.fallback.image.queue` channel.
pub fn fallback_upload_channel(
    queue_size: usize,
) -> (FallbackUploadPublisher, FallbackUploadConsumer) {
    let (tx, rx) = mpsc::channel(queue_size.max(1));
    (FallbackUploadPublisher { tx }, FallbackUploadConsumer { rx })
}

impl FallbackUploadPublisher {
    pub fn queue_name(&self) -> &'static str {
        FALLBACK_QUEUE_NAME
    }

    #[tracing::instrument(skip(self), fields(queue = FALLBACK_QUEUE_NAME))]
    pub fn publish(&self, url: &str, remote_key: &str) -> Result<(), QueueError> {
        let message = FallbackUploadMessage {
            url: url.to_string(),
            remote_key: remote_key.to_string(),
        };

        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!("Fallback upload queue is full, rejecting message");
                QueueError::Full("Fallback upload")
            }
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed("Fallback upload"),
        })
    }
}

impl FallbackUploadConsumer {
    /// Consume messages until every publisher is dropped.
    ///
    /// Messages are handled one at a time; a failure is logged and the
    /// consumer moves on.
    pub fn spawn(self, handler: Weak<dyn FetchHandler>) -> JoinHandle<()> {
        tokio::spawn(self.run(handler))
    }

    async fn run(mut self, handler: Weak<dyn FetchHandler>) {
        tracing::info!(queue = FALLBACK_QUEUE_NAME, "Fallback upload consumer started");

        while let Some(message) = self.rx.recv().await {
            let Some(handler) = handler.upgrade() else {
                tracing::warn!(
                    remote_key = %message.remote_key,
                    "Fetch handler dropped, discarding fallback upload"
                );
                continue;
            };

            if let Err(e) = handler.handle_fallback_upload(&message).await {
                tracing::error!(
                    error = %e,
                    url = %message.url,
                    remote_key = %message.remote_key,
                    "Fallback upload failed"
                );
            }
        }

        tracing::info!(queue = FALLBACK_QUEUE_NAME, "Fallback upload consumer stopped");
    }
}
