//! Telemetry initialization
//!
//! Binaries call [`init_telemetry`] once at startup.

mod init_basic;

pub use init_basic::{init_telemetry, DEFAULT_FILTER};
