//! In-memory sensor source with scripted readings, for unit tests

use crate::source::{ReadError, SensorSource};
use hw_sens_types::{
    Attribute, AttributeSet, ChannelInfo, DeviceId, DeviceNode, HardwareType, SensorType,
    Visibility,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

type Key = (DeviceId, SensorType, u32);

#[derive(Default)]
struct ChannelScript {
    queued: VecDeque<Result<f64, i32>>,
    fallback: Option<Result<f64, i32>>,
    reads: usize,
}

pub struct ScriptedSource {
    devices: Vec<DeviceNode>,
    hidden: Mutex<HashSet<Key>>,
    scripts: Mutex<HashMap<Key, ChannelScript>>,
    panicking: Mutex<HashSet<Key>>,
    unrecoverable: AtomicBool,
}

/// Panic payload that panics again when dropped, so the panic cannot be
/// contained by whoever catches the first one
struct ExplodingPayload;

impl Drop for ExplodingPayload {
    fn drop(&mut self) {
        panic!("payload dropped during recovery");
    }
}

impl ScriptedSource {
    pub const DEVICE: DeviceId = DeviceId(0);

    pub fn new(devices: Vec<DeviceNode>) -> Self {
        Self {
            devices,
            hidden: Mutex::new(HashSet::new()),
            scripts: Mutex::new(HashMap::new()),
            panicking: Mutex::new(HashSet::new()),
            unrecoverable: AtomicBool::new(false),
        }
    }

    /// One chip with `temp1`, `temp2` and `fan1`, all reading 1.0
    pub fn single_device() -> Self {
        let input = AttributeSet::empty().with(Attribute::Input);
        let mut node = DeviceNode::new(Self::DEVICE, "test-chip", HardwareType::Other);
        node.channels = vec![
            ChannelInfo::new(SensorType::Temperature, 1, input),
            ChannelInfo::new(SensorType::Temperature, 2, input),
            ChannelInfo::new(SensorType::Fan, 1, input),
        ];
        Self::new(vec![node])
    }

    pub fn script(
        &self,
        sensor_type: SensorType,
        channel: u32,
        readings: impl IntoIterator<Item = Result<f64, i32>>,
    ) {
        self.script_device(Self::DEVICE, sensor_type, channel, readings);
    }

    pub fn script_device(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        channel: u32,
        readings: impl IntoIterator<Item = Result<f64, i32>>,
    ) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry((device, sensor_type, channel))
            .or_default()
            .queued
            .extend(readings);
    }

    /// Reading returned once the scripted queue is empty
    pub fn set_fallback(&self, sensor_type: SensorType, channel: u32, reading: Result<f64, i32>) {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .entry((Self::DEVICE, sensor_type, channel))
            .or_default()
            .fallback = Some(reading);
    }

    /// Make every read of every channel fail with `status`
    pub fn fail_everything(&self, status: i32) {
        for node in &self.devices {
            node.walk(&mut |node| {
                for channel in &node.channels {
                    let mut scripts = self.scripts.lock().unwrap();
                    let script = scripts
                        .entry((node.id, channel.sensor_type, channel.index))
                        .or_default();
                    script.queued.clear();
                    script.fallback = Some(Err(status));
                }
            });
        }
    }

    pub fn hide(&self, sensor_type: SensorType, channel: u32) {
        self.hidden
            .lock()
            .unwrap()
            .insert((Self::DEVICE, sensor_type, channel));
    }

    /// Reads of this channel panic
    pub fn panic_on(&self, sensor_type: SensorType, channel: u32) {
        self.panicking
            .lock()
            .unwrap()
            .insert((Self::DEVICE, sensor_type, channel));
    }

    /// Every read panics with a payload whose drop panics too
    pub fn panic_unrecoverably(&self) {
        self.unrecoverable.store(true, Ordering::SeqCst);
    }

    pub fn reads(&self, sensor_type: SensorType, channel: u32) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .get(&(Self::DEVICE, sensor_type, channel))
            .map(|s| s.reads)
            .unwrap_or(0)
    }

    fn find(&self, id: DeviceId) -> Option<&DeviceNode> {
        let mut found = None;
        for root in &self.devices {
            root.walk(&mut |node| {
                if node.id == id {
                    found = Some(node);
                }
            });
        }
        found
    }
}

impl SensorSource for ScriptedSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn devices(&self) -> &[DeviceNode] {
        &self.devices
    }

    fn is_visible(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        _attribute: Attribute,
        channel: u32,
    ) -> Visibility {
        if self
            .hidden
            .lock()
            .unwrap()
            .contains(&(device, sensor_type, channel))
        {
            Visibility::HIDDEN
        } else {
            Visibility::READ_ONLY
        }
    }

    fn read(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        _attribute: Attribute,
        channel: u32,
    ) -> Result<f64, ReadError> {
        if self.unrecoverable.load(Ordering::SeqCst) {
            std::panic::panic_any(ExplodingPayload);
        }
        let panics = self
            .panicking
            .lock()
            .unwrap()
            .contains(&(device, sensor_type, channel));
        if panics {
            panic!("sensor bus wedged");
        }
        if self.find(device).is_none() {
            return Err(ReadError::UnknownDevice(device));
        }

        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts.entry((device, sensor_type, channel)).or_default();
        script.reads += 1;
        let reading = script
            .queued
            .pop_front()
            .or(script.fallback)
            .unwrap_or(Ok(1.0));
        reading.map_err(ReadError::Status)
    }
}
