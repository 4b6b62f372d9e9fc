//! # BMS Relay Core Library
//!
//! This crate provides the core of a transparent serial relay that sits
//! between a battery-management controller and its host controller:
//!
//! - **Frame Grammar**: the BMS frame layout, checksum and length tables
//! - **Classifier**: byte-at-a-time frame recognition with resynchronization
//! - **Packet Tracker**: per-frame-type inter-arrival statistics and counters
//! - **State Decoder**: battery state fields decoded from classified frames
//! - **Relay Engine**: lock-gated pass-through with observer dispatch
//!
//! ## Architecture
//!
//! ```text
//! BMS UART ──► Relay Engine ──► Controller UART
//!                   │                 ▲
//!                   │            (lock gate)
//!                   ▼
//!              Classifier ──► Packet / unknown byte
//!                   │
//!                   ├──► Packet Tracker (period stats, counters)
//!                   ├──► State Decoder  (voltages, current, SOC, ...)
//!                   └──► Observers      (telemetry stream, power-off hook)
//! ```
//!
//! ## Real-Time Strategy
//!
//! The engine runs on a single cooperative thread and must never delay a
//! byte on the wire:
//! 1. Every buffer on the relay path is bounded and heap-free (heapless)
//! 2. The byte source is drained without blocking; an empty source is a
//!    normal "nothing to do" state
//! 3. The sink write is fire-and-forget; the lock gate only suppresses it,
//!    the source is always drained so the upstream side never stalls

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod classifier;
pub mod decoder;
pub mod engine;
pub mod protocol;
pub mod tracker;

// Re-export main types for convenience
pub use classifier::{Classified, Classifier};
pub use decoder::{BatteryState, StateDecoder};
pub use engine::{LockState, Relay, UnknownByteRun};
pub use protocol::{BmsGrammar, FrameError, FrameGrammar, FrameType, Packet};
pub use tracker::{GlobalStats, IndividualPacketStat, PacketTracker};

/// Library version for diagnostics surfaces
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest frame the grammar defines (the cell voltage group)
pub const MAX_FRAME_LEN: usize = 36;

/// Cap on an observer-side accumulation of unclassifiable bytes
pub const UNKNOWN_RUN_CAP: usize = 128;

/// Per-frame-type statistics slots; must be a power of two
pub const MAX_TRACKED_FRAME_TYPES: usize = 16;
