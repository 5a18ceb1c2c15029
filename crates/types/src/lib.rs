//! hw-sens-types: Shared data types for the hw-sens sensor monitor.
//!
//! This crate contains pure data types (sensor categories, the discovered
//! device hierarchy, published snapshots) that are shared across all hw-sens
//! crates. It has no I/O and no threading, making it suitable as a
//! foundation layer for both sensor sources and presentation code.

pub mod device;
pub mod sensor;
pub mod snapshot;

// Re-export commonly used types at the crate root for convenience
pub use device::{ChannelInfo, DeviceId, DeviceNode, HardwareType};
pub use sensor::{Attribute, AttributeSet, SensorType, Visibility};
pub use snapshot::{ChannelStats, DeviceSnapshot, Snapshot};
