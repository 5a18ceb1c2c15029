//! Cross-thread snapshot publication and the consumer boundary
//!
//! The producer builds a fresh [`Snapshot`] after every tick and swaps it in
//! atomically; readers always get a complete tick. The "data ready" signal is
//! a separate, payload-free notification over a channel of capacity one, so
//! at most one notification is ever pending.

use crate::error::SamplingError;
use crate::scheduler::SchedulerState;
use arc_swap::ArcSwap;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use hw_sens_types::Snapshot;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Presentation-side consumer of published snapshots
pub trait SnapshotConsumer {
    /// Render or otherwise use one snapshot. Called on the consumer's thread.
    fn consume(&mut self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

/// State shared between the scheduler, its producer thread and readers
pub(crate) struct SharedState {
    snapshot: ArcSwap<Snapshot>,
    state: AtomicU8,
    pub(crate) stop: AtomicBool,
    pub(crate) reset: AtomicBool,
    fault: Mutex<Option<SamplingError>>,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            state: AtomicU8::new(SchedulerState::Idle as u8),
            stop: AtomicBool::new(false),
            reset: AtomicBool::new(false),
            fault: Mutex::new(None),
        }
    }

    pub(crate) fn publish(&self, snapshot: Snapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }

    pub(crate) fn load(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub(crate) fn state(&self) -> SchedulerState {
        SchedulerState::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Move `from` to `to` if the current state is `from`
    pub(crate) fn transition(&self, from: SchedulerState, to: SchedulerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Keep the first fault; later ones are consequences of it
    pub(crate) fn record_fault(&self, error: SamplingError) {
        let mut fault = self.fault.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if fault.is_none() {
            *fault = Some(error);
        }
    }

    pub(crate) fn fault(&self) -> Option<SamplingError> {
        self.fault
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

/// Producer half of the "data ready" signal
pub(crate) struct ReadyNotifier {
    tx: Sender<()>,
}

impl ReadyNotifier {
    /// Create a notifier and the receiver the consumer waits on
    pub(crate) fn channel() -> (Self, Receiver<()>) {
        let (tx, rx) = channel::bounded(1);
        (Self { tx }, rx)
    }

    /// Signal the consumer without blocking
    ///
    /// Returns false when a notification was already pending (coalesced)
    /// or nobody is listening anymore.
    pub(crate) fn notify(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }
}

/// Result of waiting for the next "data ready" signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStatus {
    /// A new snapshot was published
    Ready,
    /// Nothing was published within the timeout
    Timeout,
    /// The producer has exited; no further snapshots will arrive
    Closed,
}

/// Consumer handle: reads the latest snapshot and waits for ready signals
///
/// Clones share one notification stream, so a notification is delivered
/// to whichever clone receives it first. Use one reader per consumer.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<SharedState>,
    ready: Receiver<()>,
}

impl SnapshotReader {
    pub(crate) fn new(shared: Arc<SharedState>, ready: Receiver<()>) -> Self {
        Self { shared, ready }
    }

    /// Latest published snapshot (cheap Arc clone, never blocks the producer)
    pub fn load(&self) -> Arc<Snapshot> {
        self.shared.load()
    }

    /// Block until the next ready signal, the timeout, or producer exit
    pub fn wait_ready(&self, timeout: Duration) -> ReadyStatus {
        match self.ready.recv_timeout(timeout) {
            Ok(()) => ReadyStatus::Ready,
            Err(RecvTimeoutError::Timeout) => ReadyStatus::Timeout,
            Err(RecvTimeoutError::Disconnected) => ReadyStatus::Closed,
        }
    }

    /// Consume a pending ready signal if there is one
    pub fn try_ready(&self) -> bool {
        self.ready.try_recv().is_ok()
    }

    /// Raw receiver, for use in `crossbeam::select!` alongside other channels
    pub fn ready_receiver(&self) -> &Receiver<()> {
        &self.ready
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.state()
    }

    /// Fault that stopped the producer, if any
    pub fn fault(&self) -> Option<SamplingError> {
        self.shared.fault()
    }

    /// Load the latest snapshot and hand it to `consumer`
    pub fn deliver(&self, consumer: &mut dyn SnapshotConsumer) -> anyhow::Result<()> {
        let snapshot = self.load();
        consumer.consume(&snapshot)
    }
}
