//! Synthetic sensor source
//!
//! Channels follow deterministic waveforms with a little random jitter on
//! top. Useful for demos, for machines without sensors and for exercising
//! the skipped-sample and visibility paths end to end.

use hw_sens_core::{ReadError, SensorSource};
use hw_sens_types::{
    Attribute, AttributeSet, ChannelInfo, DeviceId, DeviceNode, HardwareType, SensorType,
    Visibility,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Shape of a simulated signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    /// Always `min`
    Constant,
    #[default]
    Sine,
    Sawtooth,
    Triangle,
    Square,
}

impl Waveform {
    /// Value at `elapsed` seconds for a signal spanning `min..=max`
    pub fn sample(self, elapsed: f64, period: f64, min: f64, max: f64) -> f64 {
        let range = max - min;

        match self {
            Waveform::Constant => min,
            Waveform::Sine => {
                let phase = (elapsed / period) * std::f64::consts::TAU;
                let normalized = (phase.sin() + 1.0) / 2.0;
                min + normalized * range
            }
            Waveform::Sawtooth => {
                let normalized = (elapsed / period).fract();
                min + normalized * range
            }
            Waveform::Triangle => {
                let phase = (elapsed / period).fract() * 2.0;
                let normalized = if phase <= 1.0 { phase } else { 2.0 - phase };
                min + normalized * range
            }
            Waveform::Square => {
                if (elapsed / period).fract() < 0.5 {
                    min
                } else {
                    max
                }
            }
        }
    }
}

/// Description of one simulated channel
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    pub sensor_type: SensorType,
    pub index: u32,
    pub label: Option<String>,
    pub waveform: Waveform,
    pub min: f64,
    pub max: f64,
    /// Waveform period in seconds
    pub period: f64,
    /// Maximum absolute noise added to every reading
    pub jitter: f64,
    /// Declared but not readable
    pub hidden: bool,
    /// Every n-th read fails; 0 disables
    pub fail_every: u64,
}

impl SimulatedChannel {
    pub fn new(sensor_type: SensorType, index: u32, waveform: Waveform, min: f64, max: f64) -> Self {
        Self {
            sensor_type,
            index,
            label: None,
            waveform,
            min,
            max,
            period: 10.0,
            jitter: 0.0,
            hidden: false,
            fail_every: 0,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn period(mut self, seconds: f64) -> Self {
        self.period = seconds;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.abs();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn fail_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }

    fn info(&self) -> ChannelInfo {
        let mut attributes = AttributeSet::empty()
            .with(Attribute::Input)
            .with(Attribute::Min)
            .with(Attribute::Max);
        if self.label.is_some() {
            attributes.insert(Attribute::Label);
        }
        ChannelInfo {
            sensor_type: self.sensor_type,
            index: self.index,
            label: self.label.clone(),
            attributes,
        }
    }
}

/// A simulated device and its children
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    pub name: String,
    pub hardware_type: HardwareType,
    pub channels: Vec<SimulatedChannel>,
    pub children: Vec<SimulatedDevice>,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<String>, hardware_type: HardwareType) -> Self {
        Self {
            name: name.into(),
            hardware_type,
            channels: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn channel(mut self, channel: SimulatedChannel) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn child(mut self, child: SimulatedDevice) -> Self {
        self.children.push(child);
        self
    }
}

struct ChannelState {
    config: SimulatedChannel,
    reads: AtomicU64,
}

/// Sensor source producing synthetic readings
pub struct SimulatedSource {
    start: Instant,
    devices: Vec<DeviceNode>,
    channels: HashMap<(DeviceId, SensorType, u32), ChannelState>,
}

impl SimulatedSource {
    /// Build a source from a device tree; ids are assigned depth-first
    pub fn new(roots: Vec<SimulatedDevice>) -> Self {
        let mut next_id = 0;
        let mut channels = HashMap::new();
        let devices = roots
            .into_iter()
            .map(|root| build_node(root, &mut next_id, &mut channels))
            .collect();

        Self {
            start: Instant::now(),
            devices,
            channels,
        }
    }

    /// A mainboard with a Super I/O child, a CPU package and an NVMe drive
    ///
    /// The Super I/O's third fan is declared but hidden, and the drive's
    /// temperature fails every fifth read.
    pub fn demo() -> Self {
        use SensorType::*;

        let superio = SimulatedDevice::new("nct6798", HardwareType::SuperIo)
            .channel(
                SimulatedChannel::new(Voltage, 0, Waveform::Triangle, 1.05, 1.25)
                    .label("Vcore")
                    .period(20.0)
                    .jitter(0.005),
            )
            .channel(
                SimulatedChannel::new(Voltage, 1, Waveform::Constant, 12.0, 12.0)
                    .label("+12V")
                    .jitter(0.02),
            )
            .channel(
                SimulatedChannel::new(Fan, 1, Waveform::Sine, 900.0, 1400.0)
                    .label("CPU Fan")
                    .period(30.0)
                    .jitter(10.0),
            )
            .channel(
                SimulatedChannel::new(Fan, 2, Waveform::Square, 600.0, 800.0)
                    .label("Chassis Fan")
                    .period(40.0),
            )
            .channel(SimulatedChannel::new(Fan, 3, Waveform::Constant, 0.0, 0.0).hidden());

        let mainboard = SimulatedDevice::new("acpitz", HardwareType::Motherboard)
            .channel(
                SimulatedChannel::new(Temperature, 1, Waveform::Sine, 30.0, 40.0)
                    .period(60.0)
                    .jitter(0.1),
            )
            .child(superio);

        let cpu = SimulatedDevice::new("k10temp", HardwareType::Cpu)
            .channel(
                SimulatedChannel::new(Temperature, 1, Waveform::Sawtooth, 40.0, 75.0)
                    .label("Tctl")
                    .period(15.0)
                    .jitter(0.5),
            )
            .channel(
                SimulatedChannel::new(Temperature, 3, Waveform::Sine, 38.0, 70.0)
                    .label("Tccd1")
                    .period(12.0)
                    .jitter(0.5),
            )
            .channel(
                SimulatedChannel::new(Power, 1, Waveform::Triangle, 15.0, 65.0)
                    .label("Package Power")
                    .period(25.0)
                    .jitter(1.0),
            );

        let drive = SimulatedDevice::new("nvme", HardwareType::Storage).channel(
            SimulatedChannel::new(Temperature, 1, Waveform::Sine, 35.0, 45.0)
                .label("Composite")
                .period(90.0)
                .jitter(0.2)
                .fail_every(5),
        );

        Self::new(vec![mainboard, cpu, drive])
    }

    fn channel(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<&ChannelState, ReadError> {
        self.channels
            .get(&(device, sensor_type, channel))
            .ok_or_else(|| {
                if device.0 as usize >= self.device_count() {
                    ReadError::UnknownDevice(device)
                } else {
                    ReadError::Unsupported {
                        sensor_type,
                        attribute,
                        channel,
                    }
                }
            })
    }

    fn device_count(&self) -> usize {
        let mut count = 0;
        for root in &self.devices {
            root.walk(&mut |_| count += 1);
        }
        count
    }
}

fn build_node(
    device: SimulatedDevice,
    next_id: &mut u32,
    channels: &mut HashMap<(DeviceId, SensorType, u32), ChannelState>,
) -> DeviceNode {
    let id = DeviceId(*next_id);
    *next_id += 1;

    let mut node = DeviceNode::new(id, device.name, device.hardware_type);
    for config in device.channels {
        node.channels.push(config.info());
        channels.insert(
            (id, config.sensor_type, config.index),
            ChannelState {
                config,
                reads: AtomicU64::new(0),
            },
        );
    }
    for child in device.children {
        node.children.push(build_node(child, next_id, channels));
    }
    node
}

impl SensorSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulated"
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
        let Ok(state) = self.channel(device, sensor_type, attribute, channel) else {
            return Visibility::HIDDEN;
        };
        if state.config.hidden || !state.config.info().attributes.contains(attribute) {
            Visibility::HIDDEN
        } else {
            Visibility::READ_ONLY
        }
    }

    fn read(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<f64, ReadError> {
        let state = self.channel(device, sensor_type, attribute, channel)?;
        let config = &state.config;
        if config.hidden {
            // EACCES
            return Err(ReadError::Status(-13));
        }

        match attribute {
            Attribute::Input => {
                let reads = state.reads.fetch_add(1, Ordering::Relaxed) + 1;
                if config.fail_every > 0 && reads % config.fail_every == 0 {
                    // EIO
                    return Err(ReadError::Status(-5));
                }
                let elapsed = self.start.elapsed().as_secs_f64();
                let mut value = config.waveform.sample(elapsed, config.period, config.min, config.max);
                if config.jitter > 0.0 {
                    value += rand::thread_rng().gen_range(-config.jitter..=config.jitter);
                }
                Ok(value)
            }
            Attribute::Min => Ok(config.min),
            Attribute::Max => Ok(config.max),
            _ => Err(ReadError::Unsupported {
                sensor_type,
                attribute,
                channel,
            }),
        }
    }
}
