//! Linux hwmon sensor source
//!
//! Reads `/sys/class/hwmon/hwmon*/` attribute files. Each hwmon entry
//! becomes one device; each `<type><n>_<attribute>` file group becomes one
//! channel. Values are integers in milli- or micro-units and get scaled to
//! the unit of their sensor type.

use anyhow::{Context, Result};
use hw_sens_core::{ReadError, SensorSource};
use hw_sens_types::{
    Attribute, AttributeSet, ChannelInfo, DeviceId, DeviceNode, HardwareType, SensorType,
    Visibility,
};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs location of hwmon devices
pub const DEFAULT_HWMON_ROOT: &str = "/sys/class/hwmon";

/// Attribute files of one channel
type ChannelFiles = HashMap<Attribute, PathBuf>;

/// Per-device file table, indexed by `DeviceId.0`
struct HwmonDevice {
    channels: HashMap<(SensorType, u32), ChannelFiles>,
}

/// Sensor source backed by the hwmon sysfs ABI
pub struct HwmonSource {
    devices: Vec<DeviceNode>,
    files: Vec<HwmonDevice>,
}

impl HwmonSource {
    /// Scan `root` for hwmon devices
    pub fn discover(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        log::info!("Scanning {} for hwmon devices...", root.display());

        let mut entries: Vec<PathBuf> = fs::read_dir(&root)
            .with_context(|| format!("Failed to read {}", root.display()))?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("hwmon"))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort_by_key(|path| hwmon_number(path));

        let mut devices = Vec::new();
        let mut files = Vec::new();

        for path in entries {
            let id = DeviceId(files.len() as u32);
            let name = fs::read_to_string(path.join("name"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| {
                    path.file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| format!("hwmon{}", id.0))
                });

            // Some older drivers keep their attributes under device/
            let mut channels = scan_channels(&path);
            if channels.is_empty() {
                channels = scan_channels(&path.join("device"));
            }

            let hardware_type = HardwareType::from_chip_name(&name);
            let mut node = DeviceNode::new(id, name.clone(), hardware_type);

            // BTreeMap keys order channels by (type, index)
            let ordered: BTreeMap<&(SensorType, u32), &ChannelFiles> = channels.iter().collect();
            for ((sensor_type, index), attrs) in ordered {
                let declared: AttributeSet = attrs.keys().copied().collect();
                let mut info = ChannelInfo::new(*sensor_type, *index, declared);
                if let Some(label_path) = attrs.get(&Attribute::Label) {
                    if let Ok(label) = fs::read_to_string(label_path) {
                        info.label = Some(label.trim().to_string());
                    }
                }
                log::info!(
                    "  [{}] {}: {}{} {}",
                    id,
                    name,
                    sensor_type.hwmon_prefix(),
                    index,
                    info.label.as_deref().unwrap_or("")
                );
                node.channels.push(info);
            }

            devices.push(node);
            files.push(HwmonDevice { channels });
        }

        log::info!("hwmon discovery complete: {} devices found", devices.len());

        Ok(Self { devices, files })
    }

    fn attribute_path(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<&Path, ReadError> {
        let files = self
            .files
            .get(device.0 as usize)
            .ok_or(ReadError::UnknownDevice(device))?;
        files
            .channels
            .get(&(sensor_type, channel))
            .and_then(|attrs| attrs.get(&attribute))
            .map(PathBuf::as_path)
            .ok_or(ReadError::Unsupported {
                sensor_type,
                attribute,
                channel,
            })
    }
}

impl SensorSource for HwmonSource {
    fn name(&self) -> &str {
        "hwmon"
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
        match self.attribute_path(device, sensor_type, attribute, channel) {
            Ok(path) => file_visibility(path),
            Err(_) => Visibility::HIDDEN,
        }
    }

    fn read(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<f64, ReadError> {
        let path = self.attribute_path(device, sensor_type, attribute, channel)?;
        let content = fs::read_to_string(path)?;
        let raw: i64 = content
            .trim()
            .parse()
            .map_err(|_| ReadError::Parse(content.trim().to_string()))?;
        Ok(raw as f64 * sensor_type.hwmon_scale())
    }
}

/// Group the attribute files in `dir` by channel
fn scan_channels(dir: &Path) -> HashMap<(SensorType, u32), ChannelFiles> {
    let mut channels: HashMap<(SensorType, u32), ChannelFiles> = HashMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return channels;
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some((sensor_type, index, attribute)) = parse_attribute_file(file_name) {
            channels
                .entry((sensor_type, index))
                .or_default()
                .insert(attribute, entry.path());
        }
    }
    channels
}

/// Split an hwmon file name like `temp3_input` into its parts
///
/// PWM outputs are the bare `pwm<n>` file, which is treated as their input.
pub fn parse_attribute_file(file_name: &str) -> Option<(SensorType, u32, Attribute)> {
    let (channel_part, suffix) = match file_name.split_once('_') {
        Some((channel_part, suffix)) => (channel_part, Some(suffix)),
        None => (file_name, None),
    };

    let digits_at = channel_part.find(|c: char| c.is_ascii_digit())?;
    let (prefix, number) = channel_part.split_at(digits_at);
    let sensor_type = SensorType::from_hwmon_prefix(prefix)?;
    let index: u32 = number.parse().ok()?;

    let attribute = match suffix {
        Some(suffix) => Attribute::from_hwmon_suffix(suffix)?,
        None if sensor_type == SensorType::Pwm => Attribute::Input,
        None => return None,
    };
    // A bare pwm file is the input; pwm<n>_input does not exist in the ABI
    if sensor_type == SensorType::Pwm && suffix == Some("input") {
        return None;
    }

    Some((sensor_type, index, attribute))
}

fn hwmon_number(path: &Path) -> u32 {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.trim_start_matches("hwmon").parse().ok())
        .unwrap_or(u32::MAX)
}

#[cfg(unix)]
fn file_visibility(path: &Path) -> Visibility {
    use std::os::unix::fs::PermissionsExt;

    match fs::metadata(path) {
        Ok(metadata) => Visibility((metadata.permissions().mode() & 0o777) as u16),
        Err(_) => Visibility::HIDDEN,
    }
}

#[cfg(not(unix))]
fn file_visibility(path: &Path) -> Visibility {
    match fs::metadata(path) {
        Ok(metadata) if metadata.permissions().readonly() => Visibility::READ_ONLY,
        Ok(_) => Visibility::READ_WRITE,
        Err(_) => Visibility::HIDDEN,
    }
}
