//! # Relay Engine
//!
//! The orchestrator on the serial tap. Each [`Relay::poll`] drains every
//! byte currently available from the source, forwards it to the sink unless
//! the lock gate is closed, and feeds it to the classifier; completed frames
//! update the statistics tracker and the state decoder and are dispatched to
//! observers in registration order, synchronously, on the polling thread.
//!
//! ## Real-Time Contract
//!
//! The upstream side of the line must never stall: bytes are always drained
//! from the source regardless of lock state, and the sink write is
//! fire-and-forget. `poll` returns as soon as the source reports no byte;
//! it never blocks or spins waiting for more.
//!
//! ## Lock Gate
//!
//! The lock is an externally-owned boolean consulted on every outgoing
//! byte. The settings layer holds the writing [`LockState`] clone; the
//! engine only reads it.

#[cfg(not(feature = "std"))]
use alloc::{boxed::Box, sync::Arc, vec::Vec};
#[cfg(feature = "std")]
use std::sync::Arc;

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Deque;

use crate::classifier::{Classified, Classifier};
use crate::decoder::{BatteryState, StateDecoder};
use crate::protocol::{FrameType, Packet};
use crate::tracker::PacketTracker;
use crate::UNKNOWN_RUN_CAP;

/// Non-blocking byte read: `None` means nothing available right now
pub type ByteSource = Box<dyn FnMut() -> Option<u8>>;

/// Fire-and-forget byte write toward the controller
pub type ByteSink = Box<dyn FnMut(u8)>;

/// Monotonic millisecond clock
pub type MillisClock = Box<dyn FnMut() -> u64>;

/// Observer for every classified packet; the view is valid only for the call
pub type PacketCallback = Box<dyn FnMut(&Packet<'_>)>;

/// Observer for bytes that resolved to no frame
pub type UnknownDataCallback = Box<dyn FnMut(u8)>;

/// Observer for the power-off announcement; must be fast and non-blocking
pub type PowerOffCallback = Box<dyn FnMut()>;

/// Shared forwarding gate.
///
/// Single writer elsewhere (the settings layer), single reader here. The
/// engine consults it synchronously on every outgoing byte.
#[derive(Debug, Clone, Default)]
pub struct LockState(Arc<AtomicBool>);

impl LockState {
    pub fn new(locked: bool) -> Self {
        Self(Arc::new(AtomicBool::new(locked)))
    }

    pub fn locked(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set_locked(&self, locked: bool) {
        self.0.store(locked, Ordering::Release)
    }
}

/// Bounded accumulation of unclassifiable bytes for observer-side use.
///
/// Saturates at [`UNKNOWN_RUN_CAP`] bytes and flags the truncation instead
/// of growing; the relay itself never owns one of these.
#[derive(Debug, Default)]
pub struct UnknownByteRun {
    bytes: heapless::Vec<u8, UNKNOWN_RUN_CAP>,
    truncated: bool,
}

impl UnknownByteRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte; returns false once the cap is reached
    pub fn push(&mut self, byte: u8) -> bool {
        if self.bytes.push(byte).is_err() {
            self.truncated = true;
            return false;
        }
        true
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.truncated = false;
    }
}

/// The relay/interception engine
pub struct Relay {
    source: ByteSource,
    sink: ByteSink,
    clock: MillisClock,
    lock: LockState,
    classifier: Classifier,
    tracker: PacketTracker,
    decoder: StateDecoder,
    packet_callbacks: Vec<PacketCallback>,
    unknown_data_callback: Option<UnknownDataCallback>,
    power_off_callback: Option<PowerOffCallback>,
    power_off_latched: bool,
    injected: Deque<u8, 4>,
}

impl Relay {
    /// Build a relay over injected capabilities.
    ///
    /// `source` must be non-blocking; `sink` is fire-and-forget; `clock`
    /// returns monotonic milliseconds. The engine keeps a read-only view of
    /// `lock`.
    pub fn new(
        source: impl FnMut() -> Option<u8> + 'static,
        sink: impl FnMut(u8) + 'static,
        clock: impl FnMut() -> u64 + 'static,
        lock: LockState,
    ) -> Self {
        Self {
            source: Box::new(source),
            sink: Box::new(sink),
            clock: Box::new(clock),
            lock,
            classifier: Classifier::new(),
            tracker: PacketTracker::new(),
            decoder: StateDecoder::new(),
            packet_callbacks: Vec::new(),
            unknown_data_callback: None,
            power_off_callback: None,
            power_off_latched: false,
            injected: Deque::new(),
        }
    }

    /// Register a packet observer; dispatch follows registration order
    pub fn add_received_packet_callback(&mut self, callback: impl FnMut(&Packet<'_>) + 'static) {
        self.packet_callbacks.push(Box::new(callback));
    }

    /// Set the single unknown-data observer, replacing any previous one
    pub fn set_unknown_data_callback(&mut self, callback: impl FnMut(u8) + 'static) {
        self.unknown_data_callback = Some(Box::new(callback));
    }

    /// Set the single power-off observer, replacing any previous one
    pub fn set_power_off_callback(&mut self, callback: impl FnMut() + 'static) {
        self.power_off_callback = Some(Box::new(callback));
    }

    /// Queue `value`'s four big-endian bytes for delivery in place of live
    /// source reads; live reads resume once drained. Bench-testing hook.
    pub fn set_serial_override(&mut self, value: u32) {
        self.injected.clear();
        for byte in value.to_be_bytes() {
            let _ = self.injected.push_back(byte);
        }
    }

    /// Run one relay iteration: drain all currently available bytes.
    pub fn poll(&mut self) {
        while let Some(byte) = self.next_byte() {
            if !self.lock.locked() {
                (self.sink)(byte);
            }

            match self.classifier.feed(byte) {
                Classified::Pending => {}
                Classified::Frame(packet) => {
                    let now = (self.clock)();
                    self.tracker.track(packet.packet_type(), now);
                    self.decoder.ingest(&packet);

                    if packet.frame_type() == Some(FrameType::PowerOff) && !self.power_off_latched
                    {
                        self.power_off_latched = true;
                        if let Some(callback) = self.power_off_callback.as_mut() {
                            callback();
                        }
                    }

                    for callback in self.packet_callbacks.iter_mut() {
                        callback(&packet);
                    }
                }
                Classified::Unknown(run) => {
                    self.tracker.unknown_bytes(run.len() as u32);
                    if let Some(callback) = self.unknown_data_callback.as_mut() {
                        for &b in &run {
                            callback(b);
                        }
                    }
                }
                Classified::ChecksumMismatch(run) => {
                    self.tracker.checksum_mismatch();
                    self.tracker.unknown_bytes(run.len() as u32);
                    if let Some(callback) = self.unknown_data_callback.as_mut() {
                        for &b in &run {
                            callback(b);
                        }
                    }
                }
            }
        }
    }

    /// Statistics over the classified stream
    pub fn packet_tracker(&self) -> &PacketTracker {
        &self.tracker
    }

    /// Latest decoded battery state
    pub fn battery_state(&self) -> &BatteryState {
        self.decoder.state()
    }

    /// Whether the power-off announcement has been seen
    pub fn power_off_detected(&self) -> bool {
        self.power_off_latched
    }

    fn next_byte(&mut self) -> Option<u8> {
        if let Some(byte) = self.injected.pop_front() {
            return Some(byte);
        }
        (self.source)()
    }
}
