//! Mediasync Core Library
//!
//! This crate provides the configuration, request context, and shared value types
//! used by every Mediasync component: the ACL policy applied to uploaded objects
//! and the fallback origin consulted when the bucket lacks an object.

pub mod acl;
pub mod config;
pub mod constants;
pub mod context;
pub mod fallback;

// Re-export commonly used types
pub use acl::AclPolicy;
pub use config::{Config, FetchConfig, GcsConfig};
pub use context::RequestContext;
pub use fallback::FallbackOrigin;
