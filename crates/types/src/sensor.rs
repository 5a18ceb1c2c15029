//! Sensor categories, read attributes and visibility flags

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of physical quantity measured by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    Temperature,
    Voltage,
    Current,
    Power,
    Energy,
    Humidity,
    Fan,
    Pwm,
}

impl SensorType {
    /// All sensor types, in display order
    pub const ALL: [SensorType; 8] = [
        SensorType::Temperature,
        SensorType::Voltage,
        SensorType::Current,
        SensorType::Power,
        SensorType::Energy,
        SensorType::Humidity,
        SensorType::Fan,
        SensorType::Pwm,
    ];

    /// File name prefix used by the Linux hwmon sysfs ABI (e.g. `temp` in `temp1_input`)
    pub fn hwmon_prefix(self) -> &'static str {
        match self {
            SensorType::Temperature => "temp",
            SensorType::Voltage => "in",
            SensorType::Current => "curr",
            SensorType::Power => "power",
            SensorType::Energy => "energy",
            SensorType::Humidity => "humidity",
            SensorType::Fan => "fan",
            SensorType::Pwm => "pwm",
        }
    }

    /// Look up a sensor type from its hwmon file prefix
    pub fn from_hwmon_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.hwmon_prefix() == prefix)
    }

    /// Unit of the scaled values reported for this sensor type
    pub fn unit(self) -> &'static str {
        match self {
            SensorType::Temperature => "°C",
            SensorType::Voltage => "V",
            SensorType::Current => "A",
            SensorType::Power => "W",
            SensorType::Energy => "J",
            SensorType::Humidity => "%RH",
            SensorType::Fan => "RPM",
            SensorType::Pwm => "",
        }
    }

    /// Human-readable name
    pub fn label(self) -> &'static str {
        match self {
            SensorType::Temperature => "Temperature",
            SensorType::Voltage => "Voltage",
            SensorType::Current => "Current",
            SensorType::Power => "Power",
            SensorType::Energy => "Energy",
            SensorType::Humidity => "Humidity",
            SensorType::Fan => "Fan",
            SensorType::Pwm => "PWM",
        }
    }

    /// Multiplier that converts a raw hwmon integer into the unit returned by [`unit`](Self::unit)
    pub fn hwmon_scale(self) -> f64 {
        match self {
            SensorType::Temperature
            | SensorType::Voltage
            | SensorType::Current
            | SensorType::Humidity => 1e-3,
            SensorType::Power | SensorType::Energy => 1e-6,
            SensorType::Fan | SensorType::Pwm => 1.0,
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-channel attribute that can be queried from a sensor source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// The live reading ("generic input"); the only attribute sampled
    Input,
    Label,
    Min,
    Max,
    Crit,
    Lowest,
    Highest,
    Average,
    Alarm,
    Enable,
}

impl Attribute {
    pub const ALL: [Attribute; 10] = [
        Attribute::Input,
        Attribute::Label,
        Attribute::Min,
        Attribute::Max,
        Attribute::Crit,
        Attribute::Lowest,
        Attribute::Highest,
        Attribute::Average,
        Attribute::Alarm,
        Attribute::Enable,
    ];

    /// Suffix used by hwmon attribute files (`temp1_input` -> `input`)
    pub fn hwmon_suffix(self) -> &'static str {
        match self {
            Attribute::Input => "input",
            Attribute::Label => "label",
            Attribute::Min => "min",
            Attribute::Max => "max",
            Attribute::Crit => "crit",
            Attribute::Lowest => "lowest",
            Attribute::Highest => "highest",
            Attribute::Average => "average",
            Attribute::Alarm => "alarm",
            Attribute::Enable => "enable",
        }
    }

    pub fn from_hwmon_suffix(suffix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.hwmon_suffix() == suffix)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Set of attributes a channel declares support for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributeSet(u16);

impl AttributeSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, attribute: Attribute) {
        self.0 |= attribute.bit();
    }

    pub fn with(mut self, attribute: Attribute) -> Self {
        self.insert(attribute);
        self
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterate over the contained attributes in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Attribute> + '_ {
        Attribute::ALL.into_iter().filter(|a| self.contains(*a))
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = Attribute>>(iter: I) -> Self {
        let mut set = Self::empty();
        for attribute in iter {
            set.insert(attribute);
        }
        set
    }
}

/// File-mode style visibility bitset reported for a channel attribute
///
/// Zero means the attribute is hidden. Any of the read bits (`0o444`)
/// makes it readable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visibility(pub u16);

impl Visibility {
    pub const HIDDEN: Visibility = Visibility(0);
    pub const READ_ONLY: Visibility = Visibility(0o444);
    pub const READ_WRITE: Visibility = Visibility(0o644);

    pub fn is_readable(self) -> bool {
        self.0 & 0o444 != 0
    }
}
