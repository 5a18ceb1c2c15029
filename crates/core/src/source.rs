//! Sensor source trait and read errors

use hw_sens_types::{Attribute, DeviceId, DeviceNode, SensorType, Visibility};
use std::sync::Arc;

/// Why a single channel read produced no sample
///
/// Every variant is treated the same by the sampling engine: the
/// sample is skipped for this tick and the next tick tries again.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("sensor reported status {0}")]
    Status(i32),
    #[error("unknown device {0}")]
    UnknownDevice(DeviceId),
    #[error("{sensor_type} channel {channel} has no readable {attribute:?} attribute")]
    Unsupported {
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unparseable reading {0:?}")]
    Parse(String),
}

impl ReadError {
    /// Non-zero status code equivalent of this error (negative errno style)
    pub fn status(&self) -> i32 {
        match self {
            ReadError::Status(code) => *code,
            ReadError::UnknownDevice(_) => -19, // ENODEV
            ReadError::Unsupported { .. } => -95, // EOPNOTSUPP
            ReadError::Io(e) => e.raw_os_error().map(|code| -code).unwrap_or(-5),
            ReadError::Parse(_) => -61, // ENODATA
        }
    }
}

/// Trait for all sensor sources
///
/// A sensor source owns the device hierarchy it discovered and answers
/// visibility and read queries for it. Sources are shared between the
/// sampling thread and whoever built the aggregates, so they must be
/// `Send + Sync` and use interior mutability where reads need state.
pub trait SensorSource: Send + Sync {
    /// Short name used in logs (e.g. "hwmon")
    fn name(&self) -> &str;

    /// Root nodes of the discovered device hierarchy
    fn devices(&self) -> &[DeviceNode];

    /// Visibility of one attribute of one channel
    fn is_visible(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Visibility;

    /// Read the latest value of one attribute, scaled to the unit of `sensor_type`
    fn read(
        &self,
        device: DeviceId,
        sensor_type: SensorType,
        attribute: Attribute,
        channel: u32,
    ) -> Result<f64, ReadError>;
}

/// Type-erased, shareable sensor source
pub type SharedSensorSource = Arc<dyn SensorSource>;
