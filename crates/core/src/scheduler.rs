//! Background sampling scheduler
//!
//! Runs all device aggregates on a dedicated producer thread at a fixed
//! interval. The aggregates are moved into that thread, so the producer is
//! their only writer; consumers only ever see published snapshots.

use crate::aggregate::{DeviceAggregate, TickReport};
use crate::constants::{DEFAULT_UPDATE_INTERVAL, SAMPLER_THREAD_NAME};
use crate::error::{panic_message, SamplingError};
use crate::snapshot::{ReadyNotifier, SharedState, SnapshotReader};
use crossbeam::channel::{self, Receiver};
use hw_sens_types::Snapshot;
use log::{debug, error, info, trace, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Lifecycle of a [`SamplingScheduler`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for SchedulerState {
    fn from(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Running,
            2 => SchedulerState::Stopping,
            _ => SchedulerState::Stopped,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Sleep between the end of one tick and the start of the next
    pub interval: Duration,
    /// Stop with [`SamplingError::SourceUnavailable`] after this many consecutive
    /// ticks in which every read failed. 0 disables the check.
    pub max_failed_ticks: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_UPDATE_INTERVAL,
            max_failed_ticks: 0,
        }
    }
}

impl SchedulerConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Drives periodic sampling independent of the consumer's pace
pub struct SamplingScheduler {
    shared: Arc<SharedState>,
    config: SchedulerConfig,
    aggregates: Option<Vec<DeviceAggregate>>,
    notifier: Option<ReadyNotifier>,
    ready: Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl SamplingScheduler {
    pub fn new(aggregates: Vec<DeviceAggregate>, config: SchedulerConfig) -> Result<Self, SamplingError> {
        if config.interval.is_zero() {
            return Err(SamplingError::InvalidInterval(config.interval));
        }

        let (notifier, ready) = ReadyNotifier::channel();
        Ok(Self {
            shared: Arc::new(SharedState::new()),
            config,
            aggregates: Some(aggregates),
            notifier: Some(notifier),
            ready,
            handle: None,
        })
    }

    /// Spawn the producer thread (`Idle` -> `Running`)
    ///
    /// If the thread cannot be spawned the scheduler stays `Idle` with its
    /// aggregates, so `start` can be retried.
    pub fn start(&mut self) -> Result<(), SamplingError> {
        self.start_on(thread::Builder::new().name(SAMPLER_THREAD_NAME.to_string()))
    }

    fn start_on(&mut self, builder: thread::Builder) -> Result<(), SamplingError> {
        if self.shared.state() != SchedulerState::Idle
            || self.aggregates.is_none()
            || self.notifier.is_none()
        {
            return Err(SamplingError::AlreadyStarted);
        }

        // Aggregates move to the producer only once it exists
        let (handoff_tx, handoff_rx) = channel::bounded::<(Vec<DeviceAggregate>, ReadyNotifier)>(1);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        self.shared.set_state(SchedulerState::Running);
        let handle = builder
            .spawn(move || match handoff_rx.recv() {
                Ok((aggregates, notifier)) => run_loop(aggregates, &shared, &config, notifier),
                Err(_) => shared.set_state(SchedulerState::Stopped),
            })
            .map_err(|e| {
                self.shared.set_state(SchedulerState::Idle);
                error!("Failed to spawn sampler thread: {}", e);
                SamplingError::Spawn(Arc::new(e))
            })?;
        self.handle = Some(handle);

        let (Some(aggregates), Some(notifier)) = (self.aggregates.take(), self.notifier.take()) else {
            return Err(SamplingError::AlreadyStarted);
        };
        let channels: usize = aggregates.iter().map(DeviceAggregate::channel_count).sum();
        info!(
            "Starting sampler: {} devices, {} channels, interval {:?}",
            aggregates.len(),
            channels,
            self.config.interval
        );
        if handoff_tx.send((aggregates, notifier)).is_err() {
            return Err(SamplingError::Fault("sampler thread exited before start".to_string()));
        }
        Ok(())
    }

    /// Ask the producer to exit at its next iteration boundary (non-blocking)
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        if self
            .shared
            .transition(SchedulerState::Running, SchedulerState::Stopping)
        {
            debug!("Sampler stop requested");
        }
    }

    /// Stop the producer and wait until its thread has exited
    ///
    /// Returns the fault that ended the loop, if any. Calling it again
    /// after the thread is gone is harmless and reports the same fault.
    pub fn stop(&mut self) -> Result<(), SamplingError> {
        self.request_stop();

        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                self.shared
                    .record_fault(SamplingError::Fault(panic_message(payload.as_ref())));
            }
            info!("Sampler stopped");
        }
        self.shared.set_state(SchedulerState::Stopped);

        match self.shared.fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Ask the producer to clear every accumulator before its next tick
    pub fn request_reset(&self) {
        self.shared.reset.store(true, Ordering::Release);
    }

    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader::new(Arc::clone(&self.shared), self.ready.clone())
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}

impl Drop for SamplingScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Sampler ended with error: {}", e);
        }
    }
}

fn run_loop(
    mut aggregates: Vec<DeviceAggregate>,
    shared: &SharedState,
    config: &SchedulerConfig,
    notifier: ReadyNotifier,
) {
    let mut tick: u64 = 0;
    let mut failed_ticks: u32 = 0;

    while !shared.stop.load(Ordering::Acquire) {
        if shared.reset.swap(false, Ordering::AcqRel) {
            for aggregate in aggregates.iter_mut() {
                aggregate.reset();
            }
            info!("Statistics reset");
        }

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut report = TickReport::default();
            for aggregate in aggregates.iter_mut() {
                report += aggregate.update();
            }
            report
        }));

        let report = match outcome {
            Ok(report) => report,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("Sampling tick {} faulted: {}", tick + 1, message);
                shared.record_fault(SamplingError::Fault(message));
                break;
            }
        };

        tick += 1;
        shared.publish(Snapshot {
            tick,
            taken_at: Some(chrono::Utc::now()),
            devices: aggregates.iter().map(DeviceAggregate::snapshot).collect(),
        });
        if !notifier.notify() {
            trace!("Tick {}: ready signal coalesced", tick);
        }
        trace!(
            "Tick {} took {:?} ({} sampled, {} skipped)",
            tick,
            start.elapsed(),
            report.sampled,
            report.skipped
        );

        if config.max_failed_ticks > 0 {
            if report.all_failed() {
                failed_ticks += 1;
                if failed_ticks >= config.max_failed_ticks {
                    error!("No channel could be read for {} ticks, giving up", failed_ticks);
                    shared.record_fault(SamplingError::SourceUnavailable { ticks: failed_ticks });
                    break;
                }
            } else {
                failed_ticks = 0;
            }
        }

        thread::sleep(config.interval);
    }

    shared.set_state(SchedulerState::Stopped);
    debug!("Sampler loop exited after {} ticks", tick);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ReadyStatus;
    use crate::source::SharedSensorSource;
    use crate::testing::ScriptedSource;
    use hw_sens_types::SensorType;

    const WAIT: Duration = Duration::from_secs(2);

    fn scheduler_for(source: &Arc<ScriptedSource>, config: SchedulerConfig) -> SamplingScheduler {
        let shared: SharedSensorSource = source.clone();
        let aggregates = DeviceAggregate::from_tree(&shared, shared.devices());
        SamplingScheduler::new(aggregates, config).unwrap()
    }

    fn fast() -> SchedulerConfig {
        SchedulerConfig::with_interval(Duration::from_millis(10))
    }

    #[test]
    fn test_runs_and_publishes() {
        let source = Arc::new(ScriptedSource::single_device());
        source.script(SensorType::Temperature, 1, [Ok(10.0), Ok(20.0), Ok(30.0)]);
        source.set_fallback(SensorType::Temperature, 1, Ok(30.0));

        let mut scheduler = scheduler_for(&source, fast());
        let reader = scheduler.reader();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(reader.load().tick, 0);

        scheduler.start().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Running);

        // Wait until at least three ticks are visible
        let deadline = Instant::now() + WAIT;
        while reader.load().tick < 3 && Instant::now() < deadline {
            reader.wait_ready(Duration::from_millis(50));
        }
        let snapshot = reader.load();
        assert!(snapshot.tick >= 3);
        assert!(snapshot.taken_at.is_some());

        let device = snapshot.device_by_name("test-chip").unwrap();
        let temp = device.channel(SensorType::Temperature, 1).unwrap();
        assert_eq!(temp.sample_count, snapshot.tick);
        assert_eq!(temp.min, Some(10.0));
        assert_eq!(temp.max, Some(30.0));

        scheduler.stop().unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(reader.state(), SchedulerState::Stopped);
    }

    #[test]
    fn test_start_twice_fails() {
        let source = Arc::new(ScriptedSource::single_device());
        let mut scheduler = scheduler_for(&source, fast());
        scheduler.start().unwrap();
        assert!(matches!(scheduler.start(), Err(SamplingError::AlreadyStarted)));
        scheduler.stop().unwrap();
        assert!(matches!(scheduler.start(), Err(SamplingError::AlreadyStarted)));
    }

    #[cfg(all(target_os = "linux", target_pointer_width = "64"))]
    #[test]
    fn test_failed_spawn_can_be_retried() {
        let source = Arc::new(ScriptedSource::single_device());
        let mut scheduler = scheduler_for(&source, fast());

        // No address space can hold this stack
        let oversized = thread::Builder::new().stack_size(usize::MAX / 2);
        assert!(matches!(scheduler.start_on(oversized), Err(SamplingError::Spawn(_))));
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let reader = scheduler.reader();
        scheduler.start().unwrap();
        assert_eq!(reader.wait_ready(WAIT), ReadyStatus::Ready);
        assert_eq!(reader.load().channel_count(), 3);
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = SamplingScheduler::new(Vec::new(), SchedulerConfig::with_interval(Duration::ZERO));
        assert!(matches!(result, Err(SamplingError::InvalidInterval(_))));
    }

    #[test]
    fn test_stop_latency_bounded_by_interval() {
        let interval = Duration::from_millis(100);
        let source = Arc::new(ScriptedSource::single_device());
        let mut scheduler = scheduler_for(&source, SchedulerConfig::with_interval(interval));
        let reader = scheduler.reader();
        scheduler.start().unwrap();
        assert_eq!(reader.wait_ready(WAIT), ReadyStatus::Ready);

        let requested = Instant::now();
        scheduler.request_stop();
        assert_eq!(scheduler.state(), SchedulerState::Stopping);
        scheduler.stop().unwrap();
        let elapsed = requested.elapsed();

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        // One interval plus one (tiny) update pass, with scheduling slack
        assert!(elapsed < interval + Duration::from_millis(400), "took {:?}", elapsed);

        // Producer is gone: its notifier has been dropped
        while reader.try_ready() {}
        assert_eq!(reader.wait_ready(WAIT), ReadyStatus::Closed);
    }

    #[test]
    fn test_drop_joins_producer() {
        let source = Arc::new(ScriptedSource::single_device());
        {
            let mut scheduler = scheduler_for(&source, fast());
            scheduler.start().unwrap();
            assert_eq!(scheduler.reader().wait_ready(WAIT), ReadyStatus::Ready);
            assert!(Arc::strong_count(&source) > 1);
        }
        // Aggregates lived on the producer thread; they are gone after drop
        assert_eq!(Arc::strong_count(&source), 1);
    }

    #[test]
    fn test_reset_applies_at_tick_boundary() {
        let source = Arc::new(ScriptedSource::single_device());
        let mut scheduler = scheduler_for(&source, fast());
        let reader = scheduler.reader();
        scheduler.start().unwrap();

        let count = |reader: &SnapshotReader| {
            reader
                .load()
                .device_by_name("test-chip")
                .and_then(|d| d.channel(SensorType::Fan, 1).map(|c| c.sample_count))
                .unwrap_or(0)
        };

        let deadline = Instant::now() + WAIT;
        while count(&reader) < 5 && Instant::now() < deadline {
            reader.wait_ready(Duration::from_millis(50));
        }
        let before = count(&reader);
        assert!(before >= 5);

        scheduler.request_reset();
        let deadline = Instant::now() + WAIT;
        let mut cleared = false;
        while Instant::now() < deadline {
            reader.wait_ready(Duration::from_millis(50));
            if count(&reader) < before {
                cleared = true;
                break;
            }
        }
        assert!(cleared, "statistics were not reset");
        scheduler.stop().unwrap();
    }

    #[test]
    fn test_panicking_channel_does_not_stop_sampling() {
        let source = Arc::new(ScriptedSource::single_device());
        source.panic_on(SensorType::Temperature, 1);
        source.set_fallback(SensorType::Temperature, 2, Ok(42.0));
        let mut scheduler = scheduler_for(&source, fast());
        let reader = scheduler.reader();
        scheduler.start().unwrap();

        let deadline = Instant::now() + WAIT;
        while reader.load().tick < 5 && Instant::now() < deadline {
            reader.wait_ready(Duration::from_millis(50));
        }
        let snapshot = reader.load();
        assert!(snapshot.tick >= 5);
        assert_eq!(reader.state(), SchedulerState::Running);
        assert!(reader.fault().is_none());

        let device = &snapshot.devices[0];
        let broken = device.channel(SensorType::Temperature, 1).unwrap();
        assert_eq!(broken.sample_count, 0);
        let healthy = device.channel(SensorType::Temperature, 2).unwrap();
        assert_eq!(healthy.sample_count, snapshot.tick);
        assert_eq!(healthy.current, Some(42.0));
        // Channels after the panicking one on other types are sampled too
        let fan = device.channel(SensorType::Fan, 1).unwrap();
        assert_eq!(fan.sample_count, snapshot.tick);

        scheduler.stop().unwrap();
    }

    #[test]
    fn test_fault_escaping_update_stops_sampling() {
        let source = Arc::new(ScriptedSource::single_device());
        source.panic_unrecoverably();
        let mut scheduler = scheduler_for(&source, fast());
        let reader = scheduler.reader();
        scheduler.start().unwrap();

        assert_eq!(reader.wait_ready(WAIT), ReadyStatus::Closed);
        assert_eq!(reader.state(), SchedulerState::Stopped);
        assert!(matches!(reader.fault(), Some(SamplingError::Fault(_))));

        match scheduler.stop() {
            Err(SamplingError::Fault(message)) => {
                assert!(message.contains("payload dropped during recovery"))
            }
            other => panic!("expected fault, got {:?}", other),
        }
        // Nothing was ever published
        assert_eq!(reader.load().tick, 0);
    }

    #[test]
    fn test_systemic_failure_escalates() {
        let source = Arc::new(ScriptedSource::single_device());
        source.fail_everything(-5);
        let config = SchedulerConfig {
            interval: Duration::from_millis(5),
            max_failed_ticks: 3,
        };
        let mut scheduler = scheduler_for(&source, config);
        let reader = scheduler.reader();
        scheduler.start().unwrap();

        let deadline = Instant::now() + WAIT;
        while reader.wait_ready(Duration::from_millis(50)) != ReadyStatus::Closed
            && Instant::now() < deadline
        {}

        assert_eq!(reader.load().tick, 3);
        assert!(matches!(
            scheduler.stop(),
            Err(SamplingError::SourceUnavailable { ticks: 3 })
        ));
    }

    #[test]
    fn test_failures_without_limit_keep_running() {
        let source = Arc::new(ScriptedSource::single_device());
        source.fail_everything(-5);
        let mut scheduler = scheduler_for(&source, fast());
        let reader = scheduler.reader();
        scheduler.start().unwrap();

        let deadline = Instant::now() + WAIT;
        while reader.load().tick < 5 && Instant::now() < deadline {
            reader.wait_ready(Duration::from_millis(50));
        }
        let snapshot = reader.load();
        assert!(snapshot.tick >= 5);
        // Eligible channels stay in the snapshot with no samples
        assert_eq!(snapshot.channel_count(), 3);
        let device = &snapshot.devices[0];
        assert_eq!(device.channel(SensorType::Temperature, 2).unwrap().sample_count, 0);
        assert_eq!(scheduler.state(), SchedulerState::Running);
        scheduler.stop().unwrap();
    }
}
