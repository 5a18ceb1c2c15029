//! hw-sens-core: Sampling engine for the hw-sens sensor monitor.
//!
//! This crate contains the statistics accumulator, the per-device
//! aggregate, the background sampling scheduler and the snapshot
//! hand-off between the sampling thread and a presentation consumer.
//! Concrete sensor sources live in `hw-sens-sources`.

pub mod constants;
mod accumulator;
mod aggregate;
mod error;
mod scheduler;
mod snapshot;
mod source;

#[cfg(test)]
mod testing;

pub use accumulator::StatisticsAccumulator;
pub use aggregate::{DeviceAggregate, TickReport};
pub use constants::{DEFAULT_UPDATE_INTERVAL, DEFAULT_UPDATE_INTERVAL_MS, MIN_UPDATE_INTERVAL_MS};
pub use error::SamplingError;
pub use scheduler::{SamplingScheduler, SchedulerConfig, SchedulerState};
pub use snapshot::{ReadyStatus, SnapshotConsumer, SnapshotReader};
pub use source::{ReadError, SensorSource, SharedSensorSource};

// Re-export types used in trait signatures for convenience
pub use hw_sens_types::{
    Attribute, ChannelStats, DeviceId, DeviceNode, DeviceSnapshot, SensorType, Snapshot, Visibility,
};
