//! hw-sens-sources: Sensor source implementations for hw-sens.
//!
//! - [`HwmonSource`]: Linux hwmon sysfs tree
//! - [`SysinfoSource`]: portable temperature components via `sysinfo`
//! - [`SimulatedSource`]: synthetic waveforms

mod components;
mod hwmon;
mod simulated;

pub use components::SysinfoSource;
pub use hwmon::{parse_attribute_file, HwmonSource, DEFAULT_HWMON_ROOT};
pub use simulated::{SimulatedChannel, SimulatedDevice, SimulatedSource, Waveform};

use anyhow::Result;
use hw_sens_core::{SensorSource, SharedSensorSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Which sensor backend to sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// hwmon when it exposes any channel, sysinfo otherwise
    #[default]
    Auto,
    Hwmon,
    Sysinfo,
    Simulated,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Auto,
        SourceKind::Hwmon,
        SourceKind::Sysinfo,
        SourceKind::Simulated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Auto => "auto",
            SourceKind::Hwmon => "hwmon",
            SourceKind::Sysinfo => "sysinfo",
            SourceKind::Simulated => "simulated",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown source '{0}' (expected one of: auto, hwmon, sysinfo, simulated)")]
pub struct UnknownSourceKind(String);

impl FromStr for SourceKind {
    type Err = UnknownSourceKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSourceKind(s.to_string()))
    }
}

/// Open the sensor source selected by `kind`
///
/// `hwmon_root` is only used by the hwmon backend.
pub fn open_source(kind: SourceKind, hwmon_root: &Path) -> Result<SharedSensorSource> {
    let source: SharedSensorSource = match kind {
        SourceKind::Hwmon => Arc::new(HwmonSource::discover(hwmon_root)?),
        SourceKind::Sysinfo => Arc::new(SysinfoSource::new()),
        SourceKind::Simulated => Arc::new(SimulatedSource::demo()),
        SourceKind::Auto => match HwmonSource::discover(hwmon_root) {
            Ok(hwmon) if has_channels(&hwmon) => Arc::new(hwmon),
            Ok(_) => {
                log::info!("hwmon exposes no channels, falling back to sysinfo");
                Arc::new(SysinfoSource::new())
            }
            Err(e) => {
                log::info!("hwmon unavailable ({:#}), falling back to sysinfo", e);
                Arc::new(SysinfoSource::new())
            }
        },
    };
    log::info!("Using sensor source '{}'", source.name());
    Ok(source)
}

fn has_channels(source: &dyn SensorSource) -> bool {
    source.devices().iter().any(|device| {
        let mut found = false;
        device.walk(&mut |node| found |= !node.channels.is_empty());
        found
    })
}
