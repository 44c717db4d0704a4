//! Decoder lifecycle contract shared by the protocol implementations.

use crate::core::device::DataDevice;
use crate::core::measurement::Measurement;
use crate::core::port::PortParameters;
use crate::core::receiver::{DataReceiver, ReceiverSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// A protocol decoder: turns the byte stream of one supported meter
/// into measurements delivered to registered receivers.
///
/// A source instance runs at most once. Create a fresh instance per
/// connection through the registry.
pub trait DataSource: Send + Sync {
    /// Device-type names this decoder handles.
    fn supported_devices(&self) -> &[&str];

    /// Serial parameters the physical link must be opened with.
    fn port_parameters(&self) -> PortParameters;

    /// Run the decode loop on the calling thread until end of stream,
    /// an I/O error or [`stop`](DataSource::stop). Idempotent: any call
    /// after the first returns immediately.
    fn start(&self, device: Arc<dyn DataDevice>);

    /// Ask the decode loop to exit. Idempotent; a no-op before `start`.
    fn stop(&self);

    /// Register a receiver for decoded measurements.
    fn add_receiver(&self, receiver: Arc<dyn DataReceiver>);

    /// Remove a previously registered receiver.
    fn remove_receiver(&self, receiver: &Arc<dyn DataReceiver>);
}

// Lifecycle states. A source moves strictly forward through them.
const NEW: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Run-once gating and receiver fan-out embedded by decoder impls.
///
/// The lifecycle is a single forward-only state machine: `begin` claims
/// the one permitted run, `request_stop` the one permitted stop, each
/// as one compare-and-swap, so a stop can never slip between claiming
/// the run and raising the running flag. A stopped source cannot be
/// restarted.
pub struct SourceState {
    lifecycle: AtomicU8,
    receivers: ReceiverSet,
}

impl SourceState {
    /// Fresh, never-started state.
    pub fn new() -> Self {
        Self {
            lifecycle: AtomicU8::new(NEW),
            receivers: ReceiverSet::new(),
        }
    }

    /// Claim the one permitted run. Returns false if already started.
    pub fn begin(&self) -> bool {
        self.lifecycle
            .compare_exchange(NEW, RUNNING, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Flag the running loops to exit. Returns true the first time the
    /// request takes effect; false before `begin` and after the run
    /// already ended.
    pub fn request_stop(&self) -> bool {
        self.lifecycle
            .compare_exchange(RUNNING, STOPPED, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Polled by decode and poll loops.
    pub fn is_running(&self) -> bool {
        self.lifecycle.load(Ordering::Relaxed) == RUNNING
    }

    /// Mark the run as finished when the decode loop exits on its own,
    /// so companion loops wind down with it.
    pub fn finish(&self) {
        self.lifecycle.store(STOPPED, Ordering::Relaxed);
    }

    /// Register a receiver.
    pub fn add_receiver(&self, receiver: Arc<dyn DataReceiver>) {
        self.receivers.add(receiver);
    }

    /// Remove a receiver.
    pub fn remove_receiver(&self, receiver: &Arc<dyn DataReceiver>) {
        self.receivers.remove(receiver);
    }

    /// Fan one measurement out to all receivers in order.
    pub fn publish(&self, measurement: &Measurement) {
        self.receivers.publish(measurement);
    }
}

impl Default for SourceState {
    fn default() -> Self {
        Self::new()
    }
}
