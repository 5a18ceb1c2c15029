//! Immutable, published view of all running statistics

use crate::device::{DeviceId, HardwareType};
use crate::sensor::SensorType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics of a single channel at the end of a tick
///
/// `current`, `min` and `max` are `None` until the first successful sample,
/// `mean` likewise, and `standard_deviation` until the second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub sample_count: u64,
    pub current: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub standard_deviation: Option<f64>,
}

impl ChannelStats {
    /// Display name: the reported label, or `<type><index>` when there is none
    pub fn display_name(&self, sensor_type: SensorType) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}{}", sensor_type.hwmon_prefix(), self.channel_index))
    }
}

/// Statistics of every eligible channel on one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub name: String,
    pub hardware_type: HardwareType,
    pub sensors: BTreeMap<SensorType, Vec<ChannelStats>>,
}

impl DeviceSnapshot {
    pub fn channel(&self, sensor_type: SensorType, channel_index: u32) -> Option<&ChannelStats> {
        self.sensors
            .get(&sensor_type)?
            .iter()
            .find(|c| c.channel_index == channel_index)
    }

    pub fn channel_count(&self) -> usize {
        self.sensors.values().map(Vec::len).sum()
    }
}

/// Everything the consumer can read after a tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Number of completed ticks; 0 before the first one
    pub tick: u64,
    pub taken_at: Option<DateTime<Utc>>,
    pub devices: Vec<DeviceSnapshot>,
}

impl Snapshot {
    pub fn device(&self, id: DeviceId) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn device_by_name(&self, name: &str) -> Option<&DeviceSnapshot> {
        self.devices.iter().find(|d| d.name == name)
    }

    pub fn channel_count(&self) -> usize {
        self.devices.iter().map(DeviceSnapshot::channel_count).sum()
    }
}
