//! Running statistics for one sampled channel

use crate::source::SensorSource;
use hw_sens_types::{Attribute, ChannelStats, DeviceId, SensorType};
use log::trace;

/// Online statistics accumulator
///
/// Variance uses the shifted-data single-pass algorithm: every value is
/// offset by the first sample of the epoch (`shift`) before it is added
/// to the sums, which keeps the sums small when readings sit on a large
/// constant offset (e.g. 12 V rails, 3000 RPM fans). The mean is kept
/// exact by summing the raw values separately.
#[derive(Debug, Clone)]
pub struct StatisticsAccumulator {
    channel_index: u32,
    label: Option<String>,
    sample_count: u64,
    current: f64,
    min: f64,
    max: f64,
    shift: f64,
    shifted_sum: f64,
    shifted_sum_of_squares: f64,
    unshifted_sum: f64,
}

impl StatisticsAccumulator {
    pub fn new(channel_index: u32) -> Self {
        Self {
            channel_index,
            label: None,
            sample_count: 0,
            current: f64::NAN,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            shift: 0.0,
            shifted_sum: 0.0,
            shifted_sum_of_squares: 0.0,
            unshifted_sum: 0.0,
        }
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self
    }

    /// Add one sample
    pub fn update(&mut self, value: f64) {
        if self.sample_count == 0 {
            self.shift = value;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.current = value;
        self.sample_count += 1;

        let shifted = value - self.shift;
        self.unshifted_sum += value;
        self.shifted_sum += shifted;
        self.shifted_sum_of_squares += shifted * shifted;
    }

    /// Sample this channel's input from `source`
    ///
    /// A failed or non-finite read leaves the accumulator untouched.
    /// Returns whether a sample was taken.
    pub fn update_from_source(
        &mut self,
        source: &dyn SensorSource,
        device: DeviceId,
        sensor_type: SensorType,
    ) -> bool {
        match source.read(device, sensor_type, Attribute::Input, self.channel_index) {
            Ok(value) if value.is_finite() => {
                self.update(value);
                true
            }
            Ok(value) => {
                trace!(
                    "{} {} {}{}: discarding non-finite reading {}",
                    source.name(),
                    device,
                    sensor_type.hwmon_prefix(),
                    self.channel_index,
                    value
                );
                false
            }
            Err(e) => {
                trace!(
                    "{} {} {}{}: skipped sample (status {}): {}",
                    source.name(),
                    device,
                    sensor_type.hwmon_prefix(),
                    self.channel_index,
                    e.status(),
                    e
                );
                false
            }
        }
    }

    /// Clear all statistics, keeping the channel identity
    pub fn reset(&mut self) {
        *self = Self::new(self.channel_index).with_label(self.label.take());
    }

    pub fn channel_index(&self) -> u32 {
        self.channel_index
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn current(&self) -> Option<f64> {
        (self.sample_count > 0).then_some(self.current)
    }

    pub fn min(&self) -> Option<f64> {
        (self.sample_count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.sample_count > 0).then_some(self.max)
    }

    /// Arithmetic mean, or `None` before the first sample
    pub fn mean(&self) -> Option<f64> {
        if self.sample_count == 0 {
            return None;
        }
        Some(self.unshifted_sum / self.sample_count as f64)
    }

    /// Sample standard deviation (n - 1 denominator), or `None` with fewer than two samples
    pub fn standard_deviation(&self) -> Option<f64> {
        if self.sample_count < 2 {
            return None;
        }
        let n = self.sample_count as f64;
        let numerator =
            self.shifted_sum_of_squares - (self.shifted_sum * self.shifted_sum) / n;
        // Rounding can push a zero-variance numerator slightly negative
        Some((numerator.max(0.0) / (n - 1.0)).sqrt())
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            channel_index: self.channel_index,
            label: self.label.clone(),
            sample_count: self.sample_count,
            current: self.current(),
            min: self.min(),
            max: self.max(),
            mean: self.mean(),
            standard_deviation: self.standard_deviation(),
        }
    }
}
