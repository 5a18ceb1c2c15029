//! Portable temperature source backed by `sysinfo::Components`
//!
//! sysinfo only exposes a flat list of labelled temperature components.
//! Components are grouped into devices by the first word of their label
//! ("coretemp Package id 0" and "coretemp Core 0" end up on one device),
//! and every component becomes one temperature channel.

use hw_sens_core::{ReadError, SensorSource};
use hw_sens_types::{
    Attribute, AttributeSet, ChannelInfo, DeviceId, DeviceNode, HardwareType, SensorType,
    Visibility,
};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::Components;

/// Minimum interval between component refreshes
///
/// A tick reads every channel; without this each read would refresh the
/// whole component list.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(250);

struct Refreshing {
    components: Components,
    last_refresh: Instant,
}

impl Refreshing {
    fn refresh_if_needed(&mut self) {
        if self.last_refresh.elapsed() >= MIN_REFRESH_INTERVAL {
            self.components.refresh();
            self.last_refresh = Instant::now();
        }
    }
}

/// Sensor source over the sysinfo component list
pub struct SysinfoSource {
    components: Mutex<Refreshing>,
    devices: Vec<DeviceNode>,
    /// Component list index per device, in channel order
    channel_map: Vec<Vec<usize>>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let components = Components::new_with_refreshed_list();
        let labels: Vec<String> = components.iter().map(|c| c.label().to_string()).collect();
        log::info!("sysinfo components initialized: {} components", labels.len());

        let (devices, channel_map) = group_components(&labels);
        Self {
            components: Mutex::new(Refreshing {
                components,
                last_refresh: Instant::now(),
            }),
            devices,
            channel_map,
        }
    }

    fn component_index(&self, device: DeviceId, channel: u32) -> Result<usize, ReadError> {
        let channels = self
            .channel_map
            .get(device.0 as usize)
            .ok_or(ReadError::UnknownDevice(device))?;
        channel
            .checked_sub(1)
            .and_then(|i| channels.get(i as usize))
            .copied()
            .ok_or(ReadError::Unsupported {
                sensor_type: SensorType::Temperature,
                attribute: Attribute::Input,
                channel,
            })
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SysinfoSource {
    fn name(&self) -> &str {
        "sysinfo"
    }

    fn devices(&self) -> &[DeviceNode] {
        &self.devices
    }

    fn is_visible(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Visibility {
        let supported = sensor_type == SensorType::Temperature
            && matches!(attribute, Attribute::Input | Attribute::Label)
            && self.component_index(device, channel).is_ok();
        if supported {
            Visibility::READ_ONLY
        } else {
            Visibility::HIDDEN
        }
    }

    fn read(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<f64, ReadError> {
        if sensor_type != SensorType::Temperature || attribute != Attribute::Input {
            return Err(ReadError::Unsupported {
                sensor_type,
                attribute,
                channel,
            });
        }
        let index = self.component_index(device, channel)?;

        let mut components = self.components.lock().unwrap_or_else(|poisoned| {
            log::warn!("sysinfo components mutex was poisoned, recovering");
            poisoned.into_inner()
        });
        components.refresh_if_needed();
        components
            .components
            .get(index)
            .map(|c| c.temperature() as f64)
            // sysinfo can drop a component between refreshes
            .ok_or(ReadError::UnknownDevice(device))
    }
}

/// Group component labels into devices by their first word
///
/// Returns the device nodes and, per device, the component index behind
/// each channel (channel `n` maps to entry `n - 1`).
fn group_components(labels: &[String]) -> (Vec<DeviceNode>, Vec<Vec<usize>>) {
    let mut devices: Vec<DeviceNode> = Vec::new();
    let mut channel_map: Vec<Vec<usize>> = Vec::new();

    for (component, label) in labels.iter().enumerate() {
        let chip = label.split_whitespace().next().unwrap_or("unknown");
        let position = match devices.iter().position(|d| d.name == chip) {
            Some(position) => position,
            None => {
                let id = DeviceId(devices.len() as u32);
                devices.push(DeviceNode::new(id, chip, HardwareType::from_chip_name(chip)));
                channel_map.push(Vec::new());
                devices.len() - 1
            }
        };

        let index = channel_map[position].len() as u32 + 1;
        let attributes = AttributeSet::empty()
            .with(Attribute::Input)
            .with(Attribute::Label);
        devices[position]
            .channels
            .push(ChannelInfo::new(SensorType::Temperature, index, attributes).with_label(label.clone()));
        channel_map[position].push(component);
    }

    (devices, channel_map)
}
