//! Scheduler-level errors

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Errors surfaced to the owner of a [`SamplingScheduler`](crate::SamplingScheduler)
///
/// Per-channel read failures never show up here; they are absorbed as
/// skipped samples.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SamplingError {
    #[error("scheduler has already been started")]
    AlreadyStarted,
    #[error("update interval must be positive, got {0:?}")]
    InvalidInterval(Duration),
    #[error("failed to spawn sampling thread: {0}")]
    Spawn(#[source] Arc<std::io::Error>),
    #[error("sampling loop faulted: {0}")]
    Fault(String),
    #[error("every channel failed to read for {ticks} consecutive ticks")]
    SourceUnavailable { ticks: u32 },
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
