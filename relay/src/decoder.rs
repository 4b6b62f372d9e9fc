//! # Battery State Decoder
//!
//! Layered above the classifier: consumes checksum-valid frames and keeps
//! the latest decoded battery state for the telemetry surface. The decoder
//! never touches the relay path and holds no framing logic.

use serde::Serialize;

use crate::protocol::{FrameType, Packet};

/// Cells reported in one voltage group frame
pub const CELL_COUNT: usize = 15;

/// Thermistors reported in one temperature frame
pub const THERMISTOR_COUNT: usize = 5;

/// Latest decoded BMS-reported state.
///
/// Fields hold zero until the first frame of the matching type arrives.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BatteryState {
    /// Per-cell voltages in millivolts
    pub cell_millivolts: [u16; CELL_COUNT],
    /// Thermistor readings in degrees Celsius
    pub temperatures_celsius: [i8; THERMISTOR_COUNT],
    /// Pack current in deciamps, discharge positive
    pub current_deciamps: i16,
    /// BMS-reported state of charge in percent
    pub bms_soc_percent: u8,
    /// Charge drawn from the pack since boot, mAh
    pub used_charge_mah: u16,
    /// Charge regenerated into the pack since boot, mAh
    pub regenerated_charge_mah: u16,
    /// BMS serial number captured off the line, zero until seen
    pub captured_serial: u32,
}

impl BatteryState {
    /// Pack voltage as the sum of all cell voltages
    pub fn total_voltage_millivolts(&self) -> u32 {
        self.cell_millivolts.iter().map(|&mv| u32::from(mv)).sum()
    }

    /// Pack current in amps
    pub fn current_amps(&self) -> f32 {
        f32::from(self.current_deciamps) / 10.0
    }
}

/// Accumulates [`BatteryState`] from the classified frame stream
#[derive(Debug, Default)]
pub struct StateDecoder {
    state: BatteryState,
}

impl StateDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one classified frame into the state.
    ///
    /// Frames of unknown type or unexpected payload shape are ignored.
    pub fn ingest(&mut self, packet: &Packet<'_>) {
        let Some(frame_type) = packet.frame_type() else {
            return;
        };
        let payload = packet.payload();
        if payload.len() != frame_type.payload_len() {
            return;
        }

        match frame_type {
            FrameType::CellVoltages => {
                for (i, pair) in payload.chunks_exact(2).enumerate() {
                    self.state.cell_millivolts[i] = u16::from_be_bytes([pair[0], pair[1]]);
                }
            }
            FrameType::StateOfCharge => {
                self.state.bms_soc_percent = payload[0];
            }
            FrameType::Temperatures => {
                for (i, &b) in payload.iter().enumerate() {
                    self.state.temperatures_celsius[i] = b as i8;
                }
            }
            FrameType::Current => {
                self.state.current_deciamps = i16::from_be_bytes([payload[0], payload[1]]);
            }
            FrameType::SerialNumber => {
                self.state.captured_serial =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
            }
            FrameType::ChargeCounters => {
                self.state.used_charge_mah = u16::from_be_bytes([payload[0], payload[1]]);
                self.state.regenerated_charge_mah = u16::from_be_bytes([payload[2], payload[3]]);
            }
            // Announces imminent power loss; handled by the engine, carries
            // no state fields.
            FrameType::PowerOff => {}
        }
    }

    pub fn state(&self) -> &BatteryState {
        &self.state
    }

    /// Self-consistent copy for readers outside the relay loop
    pub fn snapshot(&self) -> BatteryState {
        self.state
    }
}
