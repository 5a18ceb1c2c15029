//! Per-device set of channel accumulators

use crate::accumulator::StatisticsAccumulator;
use crate::error::panic_message;
use crate::source::{SensorSource, SharedSensorSource};
use hw_sens_types::{
    Attribute, ChannelInfo, DeviceId, DeviceNode, DeviceSnapshot, HardwareType, SensorType,
};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Outcome of sampling a set of channels once
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub sampled: usize,
    pub skipped: usize,
}

impl TickReport {
    /// True when there was something to read and every read failed
    pub fn all_failed(&self) -> bool {
        self.sampled == 0 && self.skipped > 0
    }
}

impl Add for TickReport {
    type Output = TickReport;

    fn add(self, rhs: TickReport) -> TickReport {
        TickReport {
            sampled: self.sampled + rhs.sampled,
            skipped: self.skipped + rhs.skipped,
        }
    }
}

impl AddAssign for TickReport {
    fn add_assign(&mut self, rhs: TickReport) {
        *self = *self + rhs;
    }
}

/// Accumulators for every eligible channel of one device
///
/// The channel set is fixed at construction; only the statistics inside
/// the accumulators change afterwards.
pub struct DeviceAggregate {
    source: SharedSensorSource,
    device: DeviceId,
    name: String,
    hardware_type: HardwareType,
    sensors: BTreeMap<SensorType, Vec<StatisticsAccumulator>>,
}

impl DeviceAggregate {
    /// Build the aggregate for one device node (children are not included)
    pub fn from_device(source: SharedSensorSource, node: &DeviceNode) -> Self {
        let mut sensors: BTreeMap<SensorType, Vec<StatisticsAccumulator>> = BTreeMap::new();

        for channel in &node.channels {
            if Self::is_eligible(source.as_ref(), node.id, channel) {
                sensors
                    .entry(channel.sensor_type)
                    .or_default()
                    .push(StatisticsAccumulator::new(channel.index).with_label(channel.label.clone()));
            } else {
                debug!(
                    "{}: excluding {}{} (not a visible input)",
                    node.name,
                    channel.sensor_type.hwmon_prefix(),
                    channel.index
                );
            }
        }

        Self {
            source,
            device: node.id,
            name: node.name.clone(),
            hardware_type: node.hardware_type,
            sensors,
        }
    }

    /// Build aggregates for a whole discovered hierarchy
    ///
    /// Nodes are visited depth-first, parents first. Nodes with no eligible
    /// channel produce no aggregate.
    pub fn from_tree(source: &SharedSensorSource, roots: &[DeviceNode]) -> Vec<Self> {
        let mut aggregates = Vec::new();
        for root in roots {
            root.walk(&mut |node| {
                let aggregate = Self::from_device(Arc::clone(source), node);
                if aggregate.is_empty() {
                    debug!("{}: no eligible channels", node.name);
                } else {
                    info!(
                        "  [{}] {:?}: {} ({} channels)",
                        node.id,
                        node.hardware_type,
                        node.name,
                        aggregate.channel_count()
                    );
                    aggregates.push(aggregate);
                }
            });
        }
        aggregates
    }

    /// A channel is sampled iff its input is visible and declared
    pub fn is_eligible(source: &dyn SensorSource, device: DeviceId, channel: &ChannelInfo) -> bool {
        channel.attributes.contains(Attribute::Input)
            && source
                .is_visible(device, channel.sensor_type, Attribute::Input, channel.index)
                .is_readable()
    }

    /// Sample every channel once
    pub fn update(&mut self) -> TickReport {
        let mut report = TickReport::default();
        let source = self.source.as_ref();
        for (sensor_type, accumulators) in self.sensors.iter_mut() {
            for accumulator in accumulators.iter_mut() {
                // A panicking driver read costs this channel its sample, not the tick
                let sampled = panic::catch_unwind(AssertUnwindSafe(|| {
                    accumulator.update_from_source(source, self.device, *sensor_type)
                }))
                .unwrap_or_else(|payload| {
                    warn!(
                        "{}: read of {}{} panicked: {}",
                        self.name,
                        sensor_type.hwmon_prefix(),
                        accumulator.channel_index(),
                        panic_message(payload.as_ref())
                    );
                    false
                });
                if sampled {
                    report.sampled += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }
        report
    }

    pub fn reset(&mut self) {
        for accumulator in self.sensors.values_mut().flatten() {
            accumulator.reset();
        }
    }

    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            id: self.device,
            name: self.name.clone(),
            hardware_type: self.hardware_type,
            sensors: self
                .sensors
                .iter()
                .map(|(sensor_type, accumulators)| {
                    (
                        *sensor_type,
                        accumulators.iter().map(StatisticsAccumulator::stats).collect(),
                    )
                })
                .collect(),
        }
    }

    pub fn device_id(&self) -> DeviceId {
        self.device
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hardware_type(&self) -> HardwareType {
        self.hardware_type
    }

    pub fn sensor_types(&self) -> impl Iterator<Item = SensorType> + '_ {
        self.sensors.keys().copied()
    }

    pub fn accumulators(&self, sensor_type: SensorType) -> &[StatisticsAccumulator] {
        self.sensors
            .get(&sensor_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn accumulator(&self, sensor_type: SensorType, channel_index: u32) -> Option<&StatisticsAccumulator> {
        self.accumulators(sensor_type)
            .iter()
            .find(|a| a.channel_index() == channel_index)
    }

    pub fn channel_count(&self) -> usize {
        self.sensors.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.channel_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSource;
    use hw_sens_types::AttributeSet;

    fn input() -> AttributeSet {
        AttributeSet::empty().with(Attribute::Input)
    }

    /// A visible, B hidden, C visible but its first read fails
    fn abc_source() -> Arc<ScriptedSource> {
        let mut node = DeviceNode::new(ScriptedSource::DEVICE, "chip", HardwareType::SuperIo);
        node.channels = vec![
            ChannelInfo::new(SensorType::Temperature, 1, input()).with_label("A"),
            ChannelInfo::new(SensorType::Temperature, 2, input()).with_label("B"),
            ChannelInfo::new(SensorType::Temperature, 3, input()).with_label("C"),
        ];
        let source = ScriptedSource::new(vec![node]);
        source.hide(SensorType::Temperature, 2);
        source.script(SensorType::Temperature, 3, [Err(-5), Ok(55.0)]);
        Arc::new(source)
    }

    #[test]
    fn test_visibility_filter_and_failed_first_read() {
        let scripted = abc_source();
        let source: SharedSensorSource = scripted.clone();
        let mut aggregate = DeviceAggregate::from_device(source.clone(), &source.devices()[0]);

        let indices: Vec<u32> = aggregate
            .accumulators(SensorType::Temperature)
            .iter()
            .map(|a| a.channel_index())
            .collect();
        assert_eq!(indices, vec![1, 3]);

        let report = aggregate.update();
        assert_eq!(report, TickReport { sampled: 1, skipped: 1 });
        let snapshot = aggregate.snapshot();
        let c = snapshot.channel(SensorType::Temperature, 3).unwrap();
        assert_eq!(c.sample_count, 0);
        assert_eq!(c.label.as_deref(), Some("C"));
        assert!(snapshot.channel(SensorType::Temperature, 2).is_none());

        aggregate.update();
        let c = aggregate.accumulator(SensorType::Temperature, 3).unwrap();
        assert_eq!(c.sample_count(), 1);
        assert_eq!(c.current(), Some(55.0));

        // Hidden channel is never queried
        assert_eq!(scripted.reads(SensorType::Temperature, 2), 0);
    }

    #[test]
    fn test_undeclared_input_is_excluded() {
        let mut node = DeviceNode::new(ScriptedSource::DEVICE, "chip", HardwareType::Other);
        node.channels = vec![
            ChannelInfo::new(SensorType::Voltage, 0, input()),
            ChannelInfo::new(
                SensorType::Voltage,
                1,
                AttributeSet::empty().with(Attribute::Label).with(Attribute::Max),
            ),
        ];
        let source: SharedSensorSource = Arc::new(ScriptedSource::new(vec![node]));
        let aggregate = DeviceAggregate::from_device(source.clone(), &source.devices()[0]);

        assert_eq!(aggregate.channel_count(), 1);
        assert!(aggregate.accumulator(SensorType::Voltage, 1).is_none());
    }

    #[test]
    fn test_grouping_preserves_reported_order() {
        let mut node = DeviceNode::new(ScriptedSource::DEVICE, "chip", HardwareType::Other);
        node.channels = vec![
            ChannelInfo::new(SensorType::Fan, 3, input()),
            ChannelInfo::new(SensorType::Temperature, 2, input()),
            ChannelInfo::new(SensorType::Fan, 1, input()),
            ChannelInfo::new(SensorType::Fan, 7, input()),
        ];
        let source: SharedSensorSource = Arc::new(ScriptedSource::new(vec![node]));
        let aggregate = DeviceAggregate::from_device(source.clone(), &source.devices()[0]);

        let fans: Vec<u32> = aggregate
            .accumulators(SensorType::Fan)
            .iter()
            .map(|a| a.channel_index())
            .collect();
        assert_eq!(fans, vec![3, 1, 7]);
        let types: Vec<SensorType> = aggregate.sensor_types().collect();
        assert_eq!(types, vec![SensorType::Temperature, SensorType::Fan]);
    }

    #[test]
    fn test_from_tree_skips_empty_nodes() {
        let mut root = DeviceNode::new(DeviceId(0), "board", HardwareType::Motherboard);
        let mut superio = DeviceNode::new(DeviceId(1), "superio", HardwareType::SuperIo);
        superio.channels.push(ChannelInfo::new(SensorType::Fan, 1, input()));
        root.children.push(superio);
        let mut cpu = DeviceNode::new(DeviceId(2), "cpu", HardwareType::Cpu);
        cpu.channels.push(ChannelInfo::new(SensorType::Temperature, 1, input()));

        let source: SharedSensorSource = Arc::new(ScriptedSource::new(vec![root, cpu]));
        let aggregates = DeviceAggregate::from_tree(&source, source.devices());

        let names: Vec<&str> = aggregates.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["superio", "cpu"]);
        assert_eq!(aggregates[0].device_id(), DeviceId(1));
    }

    #[test]
    fn test_reset_clears_all_channels() {
        let source: SharedSensorSource = Arc::new(ScriptedSource::single_device());
        let mut aggregate = DeviceAggregate::from_device(source.clone(), &source.devices()[0]);
        aggregate.update();
        aggregate.update();
        assert_eq!(aggregate.accumulator(SensorType::Fan, 1).unwrap().sample_count(), 2);

        aggregate.reset();
        assert_eq!(aggregate.channel_count(), 3);
        for sensor_type in [SensorType::Temperature, SensorType::Fan] {
            for acc in aggregate.accumulators(sensor_type) {
                assert_eq!(acc.sample_count(), 0);
            }
        }
    }

    #[test]
    fn test_panicking_read_is_a_skipped_sample() {
        let scripted = Arc::new(ScriptedSource::single_device());
        scripted.panic_on(SensorType::Temperature, 1);
        scripted.set_fallback(SensorType::Temperature, 2, Ok(42.0));
        let source: SharedSensorSource = scripted.clone();
        let mut aggregate = DeviceAggregate::from_device(source.clone(), &source.devices()[0]);

        for _ in 0..3 {
            assert_eq!(aggregate.update(), TickReport { sampled: 2, skipped: 1 });
        }
        let snapshot = aggregate.snapshot();
        assert_eq!(snapshot.channel(SensorType::Temperature, 1).unwrap().sample_count, 0);
        let healthy = snapshot.channel(SensorType::Temperature, 2).unwrap();
        assert_eq!(healthy.sample_count, 3);
        assert_eq!(healthy.mean, Some(42.0));
        assert_eq!(snapshot.channel(SensorType::Fan, 1).unwrap().sample_count, 3);
    }

    #[test]
    fn test_tick_report_all_failed() {
        assert!(TickReport { sampled: 0, skipped: 2 }.all_failed());
        assert!(!TickReport { sampled: 1, skipped: 2 }.all_failed());
        assert!(!TickReport::default().all_failed());
        let total = TickReport { sampled: 1, skipped: 0 } + TickReport { sampled: 2, skipped: 3 };
        assert_eq!(total, TickReport { sampled: 3, skipped: 3 });
    }
}
