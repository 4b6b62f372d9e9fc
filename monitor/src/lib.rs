//! # Host Monitor Library
//!
//! Host-side view over the relay's read-only query surface. The web and
//! telemetry layers are external collaborators; this crate gives them one
//! self-consistent snapshot of everything the relay exposes (decoded
//! battery state, per-frame-type timing statistics, global anomaly
//! counters), rendered as JSON.
//!
//! Collection copies every value out of the relay, so a report stays valid
//! after the relay loop continues.

use bms_relay::Relay;
use log::debug;
use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the monitor layer
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("status serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One row of the packet statistics table
#[derive(Debug, Clone, Serialize)]
pub struct PacketStatRow {
    /// Frame type byte
    pub id: u8,
    pub mean_period_millis: f32,
    pub deviation_millis: f32,
    pub total_num: u32,
}

/// Snapshot of the relay's full diagnostic surface
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub uptime: String,
    pub total_voltage: f32,
    pub current_amps: f32,
    pub bms_soc: u8,
    pub used_charge_mah: u16,
    pub regenerated_charge_mah: u16,
    pub cell_millivolts: Vec<u16>,
    pub temperatures_celsius: Vec<i8>,
    pub captured_serial: u32,
    pub packet_stats: Vec<PacketStatRow>,
    pub unknown_bytes: u32,
    pub checksum_mismatches: u32,
}

impl StatusReport {
    /// Snapshot the relay's query surface at `uptime_ms`.
    pub fn collect(relay: &Relay, uptime_ms: u64) -> Self {
        let state = relay.battery_state();
        let tracker = relay.packet_tracker();
        let global = tracker.global_stats();

        let mut packet_stats: Vec<PacketStatRow> = tracker
            .individual_packet_stats()
            .map(|stat| PacketStatRow {
                id: stat.id,
                mean_period_millis: stat.mean_period_millis(),
                deviation_millis: stat.deviation_millis(),
                total_num: stat.total_num,
            })
            .collect();
        packet_stats.sort_by_key(|row| row.id);

        debug!(
            "status snapshot: {} tracked ids, {} unknown bytes",
            packet_stats.len(),
            global.total_unknown_bytes_received
        );

        Self {
            uptime: uptime_string(uptime_ms),
            total_voltage: state.total_voltage_millivolts() as f32 / 1000.0,
            current_amps: state.current_amps(),
            bms_soc: state.bms_soc_percent,
            used_charge_mah: state.used_charge_mah,
            regenerated_charge_mah: state.regenerated_charge_mah,
            cell_millivolts: state.cell_millivolts.to_vec(),
            temperatures_celsius: state.temperatures_celsius.to_vec(),
            captured_serial: state.captured_serial,
            packet_stats,
            unknown_bytes: global.total_unknown_bytes_received,
            checksum_mismatches: global.total_packet_checksum_mismatches,
        }
    }

    /// Render the report for the web/telemetry layer
    pub fn to_json(&self) -> Result<String, MonitorError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Uptime rendered as `XhYmZs`; hours are omitted while zero
pub fn uptime_string(millis: u64) -> String {
    let total_secs = millis / 1000;
    let hrs = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hrs > 0 {
        format!("{hrs}h{mins}m{secs}s")
    } else {
        format!("{mins}m{secs}s")
    }
}
