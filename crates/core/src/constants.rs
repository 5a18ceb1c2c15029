//! Shared constants

use std::time::Duration;

/// Default interval between sampling ticks
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(DEFAULT_UPDATE_INTERVAL_MS);

/// Shortest interval accepted from configuration
pub const MIN_UPDATE_INTERVAL_MS: u64 = 10;

/// Name of the producer thread (visible in `top -H`, debuggers)
pub const SAMPLER_THREAD_NAME: &str = "hw-sens-sampler";
