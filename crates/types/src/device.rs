//! Device hierarchy produced by sensor discovery

use crate::sensor::{AttributeSet, SensorType};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a device within one sensor source
///
/// Assigned by the source at discovery time; it is an index into the
/// source's own device table, not a hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev{}", self.0)
    }
}

/// Hardware classification of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HardwareType {
    Cpu,
    Gpu,
    Motherboard,
    SuperIo,
    Storage,
    Memory,
    Network,
    Battery,
    PowerSupply,
    #[default]
    Other,
}

impl HardwareType {
    /// Classify a device from its driver/chip name
    pub fn from_chip_name(name: &str) -> Self {
        let name = name.to_lowercase();

        if name.contains("coretemp")
            || name.starts_with("k10temp")
            || name.starts_with("k8temp")
            || name.contains("zenpower")
            || name.contains("cpu")
        {
            return HardwareType::Cpu;
        }

        if name.contains("amdgpu")
            || name.contains("radeon")
            || name.contains("nouveau")
            || name.contains("nvidia")
            || name.contains("i915")
            || name == "xe"
        {
            return HardwareType::Gpu;
        }

        if name.starts_with("nvme") || name.contains("drivetemp") {
            return HardwareType::Storage;
        }

        if name.starts_with("nct")
            || name.starts_with("it87")
            || name.starts_with("it86")
            || name.starts_with("w83")
            || name.starts_with("f71")
        {
            return HardwareType::SuperIo;
        }

        if name.contains("acpitz") || name.contains("pch") || name.contains("asus") {
            return HardwareType::Motherboard;
        }

        if name.starts_with("jc42") || name.starts_with("spd5118") {
            return HardwareType::Memory;
        }

        if name.contains("iwlwifi") || name.contains("r8169") || name.contains("mt79") {
            return HardwareType::Network;
        }

        if name.starts_with("bat") || name.contains("battery") {
            return HardwareType::Battery;
        }

        if name.contains("psu") || name.contains("corsairpsu") {
            return HardwareType::PowerSupply;
        }

        HardwareType::Other
    }

    pub fn label(self) -> &'static str {
        match self {
            HardwareType::Cpu => "CPU",
            HardwareType::Gpu => "GPU",
            HardwareType::Motherboard => "Motherboard",
            HardwareType::SuperIo => "Super I/O",
            HardwareType::Storage => "Storage",
            HardwareType::Memory => "Memory",
            HardwareType::Network => "Network",
            HardwareType::Battery => "Battery",
            HardwareType::PowerSupply => "Power Supply",
            HardwareType::Other => "Other",
        }
    }
}

/// One numbered measurement stream exposed by a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub sensor_type: SensorType,
    /// Channel number as reported by the device; may have gaps
    pub index: u32,
    pub label: Option<String>,
    /// Attributes the device declares for this channel
    pub attributes: AttributeSet,
}

impl ChannelInfo {
    pub fn new(sensor_type: SensorType, index: u32, attributes: AttributeSet) -> Self {
        Self {
            sensor_type,
            index,
            label: None,
            attributes,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// A sensor-bearing device and its sub-devices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceNode {
    pub id: DeviceId,
    pub name: String,
    pub hardware_type: HardwareType,
    pub channels: Vec<ChannelInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DeviceNode>,
}

impl DeviceNode {
    pub fn new(id: DeviceId, name: impl Into<String>, hardware_type: HardwareType) -> Self {
        Self {
            id,
            name: name.into(),
            hardware_type,
            channels: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Visit this node and all descendants depth-first, parents before children
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a DeviceNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }

    /// Total number of channels in this subtree
    pub fn channel_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node| count += node.channels.len());
        count
    }
}
