//! Mediasync worker: background fetch queue and fallback upload consumer.
//!
//! Both run in-process on tokio tasks and hand their work to a [`FetchHandler`]
//! held by weak reference, so the handler may own the queue that feeds it.

pub mod consumer;
pub mod context;
pub mod queue;

pub use consumer::{
    fallback_upload_channel, FallbackUploadConsumer, FallbackUploadMessage,
    FallbackUploadPublisher,
};
pub use context::{empty_handler_weak, FetchHandler};
pub use queue::{
    FetchDispatcher, FetchJob, FetchQueue, FetchQueueConfig, FetchQueueWorker, QueueError,
};
