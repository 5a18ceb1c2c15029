//! hw-sens: Background hardware sensor sampler with running statistics
//!
//! This library holds the application layer of hw-sens:
//! - Configuration management
//! - Console rendering of published snapshots
//!
//! The sampling engine lives in `hw-sens-core`, sensor backends in
//! `hw-sens-sources`.

pub mod config;
pub mod display;

// Re-export commonly used types
pub use config::AppConfig;
pub use display::{ConsoleRenderer, OutputFormat};
