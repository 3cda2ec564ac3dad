//! Shared utilities for the attestation verification workspace.

pub mod logging;
pub mod retry;
pub mod spans;
pub mod time;

pub use logging::{init_logging, try_init_logging, LogFormat};
pub use retry::{retry, RetryPolicy};
pub use time::format_duration;
