//! Console presentation of published snapshots

use anyhow::Result;
use hw_sens_core::{ChannelStats, DeviceNode, SensorType, Snapshot, SnapshotConsumer};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// How snapshots are written to the console
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// One block per device, one row per channel
    #[default]
    Table,
    /// One JSON document per line
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Table => f.write_str("table"),
            OutputFormat::Json => f.write_str("json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown format '{}' (expected table or json)", other)),
        }
    }
}

/// Writes every consumed snapshot to `out`
pub struct ConsoleRenderer<W: Write> {
    out: W,
    format: OutputFormat,
}

impl ConsoleRenderer<std::io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_table(&mut self, snapshot: &Snapshot) -> Result<()> {
        let taken_at = snapshot
            .taken_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        writeln!(self.out, "=== tick {} @ {} ===", snapshot.tick, taken_at)?;

        for device in &snapshot.devices {
            writeln!(
                self.out,
                "{} ({}) [{}]",
                device.name,
                device.hardware_type.label(),
                device.id
            )?;
            for (sensor_type, channels) in &device.sensors {
                writeln!(
                    self.out,
                    "  {:<20} {:>10} {:>10} {:>10} {:>10} {:>10} {:>6}",
                    sensor_type.label(),
                    "current",
                    "min",
                    "max",
                    "mean",
                    "stddev",
                    "n"
                )?;
                for channel in channels {
                    self.write_row(*sensor_type, channel)?;
                }
            }
        }
        writeln!(self.out)?;
        Ok(())
    }

    fn write_row(&mut self, sensor_type: SensorType, channel: &ChannelStats) -> Result<()> {
        let unit = sensor_type.unit();
        writeln!(
            self.out,
            "    {:<18} {:>10} {:>10} {:>10} {:>10} {:>10} {:>6} {}",
            channel.display_name(sensor_type),
            format_value(channel.current),
            format_value(channel.min),
            format_value(channel.max),
            format_value(channel.mean),
            format_value(channel.standard_deviation),
            channel.sample_count,
            unit
        )?;
        Ok(())
    }
}

impl<W: Write> SnapshotConsumer for ConsoleRenderer<W> {
    fn consume(&mut self, snapshot: &Snapshot) -> Result<()> {
        match self.format {
            OutputFormat::Table => self.write_table(snapshot)?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut self.out, snapshot)?;
                writeln!(self.out)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.3}", v),
        None => "-".to_string(),
    }
}

/// Print a discovered device hierarchy, one indented line per node and channel
pub fn write_device_tree(out: &mut impl Write, roots: &[DeviceNode]) -> Result<()> {
    fn write_node(out: &mut impl Write, node: &DeviceNode, depth: usize) -> Result<()> {
        let indent = "  ".repeat(depth);
        writeln!(
            out,
            "{}[{}] {} ({})",
            indent,
            node.id,
            node.name,
            node.hardware_type.label()
        )?;
        for channel in &node.channels {
            let attributes: Vec<&str> = channel.attributes.iter().map(|a| a.hwmon_suffix()).collect();
            writeln!(
                out,
                "{}  {}{} {} [{}]",
                indent,
                channel.sensor_type.hwmon_prefix(),
                channel.index,
                channel.label.as_deref().unwrap_or(""),
                attributes.join(",")
            )?;
        }
        for child in &node.children {
            write_node(out, child, depth + 1)?;
        }
        Ok(())
    }

    for root in roots {
        write_node(out, root, 0)?;
    }
    Ok(())
}
