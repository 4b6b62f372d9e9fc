//! # Packet Statistics Tracker
//!
//! Per-frame-type inter-arrival timing statistics plus the global anomaly
//! counters. All updates are streaming with O(1) state per tracked id:
//! the mean period is an incremental cumulative mean and the deviation is an
//! incremental mean absolute deviation, so neither sample counts nor summed
//! deltas can overflow under long uptimes.
//!
//! The tracker is written from the relay loop only. Records are `Copy` and
//! handed out whole, so a reader interleaved between loop iterations always
//! sees a self-consistent mean/deviation pair.

use heapless::FnvIndexMap;
use serde::Serialize;

use crate::MAX_TRACKED_FRAME_TYPES;

/// Timing record for one frame type.
///
/// `mean_period_millis` and `deviation_millis` report zero until at least
/// two arrivals have been seen.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IndividualPacketStat {
    /// The frame type byte this record tracks
    pub id: u8,
    /// Total frames of this type seen since boot
    pub total_num: u32,
    last_arrival_ms: u64,
    period_count: u32,
    mean_period_ms: f32,
    deviation_ms: f32,
}

impl IndividualPacketStat {
    fn new(id: u8, now_ms: u64) -> Self {
        Self {
            id,
            total_num: 1,
            last_arrival_ms: now_ms,
            period_count: 0,
            mean_period_ms: 0.0,
            deviation_ms: 0.0,
        }
    }

    fn record_arrival(&mut self, now_ms: u64) {
        let delta = now_ms.saturating_sub(self.last_arrival_ms) as f32;
        self.last_arrival_ms = now_ms;
        self.total_num = self.total_num.saturating_add(1);
        self.period_count = self.period_count.saturating_add(1);

        let n = self.period_count as f32;
        self.mean_period_ms += (delta - self.mean_period_ms) / n;
        let spread = if delta >= self.mean_period_ms {
            delta - self.mean_period_ms
        } else {
            self.mean_period_ms - delta
        };
        self.deviation_ms += (spread - self.deviation_ms) / n;
    }

    /// Running mean of the inter-arrival period in milliseconds
    pub fn mean_period_millis(&self) -> f32 {
        if self.period_count == 0 {
            0.0
        } else {
            self.mean_period_ms
        }
    }

    /// Running mean absolute deviation of the period in milliseconds
    pub fn deviation_millis(&self) -> f32 {
        if self.period_count == 0 {
            0.0
        } else {
            self.deviation_ms
        }
    }
}

/// Process-wide anomaly counters; monotonic until restart
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GlobalStats {
    pub total_unknown_bytes_received: u32,
    pub total_packet_checksum_mismatches: u32,
}

/// Statistics over the classified packet stream
pub struct PacketTracker {
    stats: FnvIndexMap<u8, IndividualPacketStat, MAX_TRACKED_FRAME_TYPES>,
    global: GlobalStats,
}

impl PacketTracker {
    pub fn new() -> Self {
        Self {
            stats: FnvIndexMap::new(),
            global: GlobalStats::default(),
        }
    }

    /// Record one arrival of frame type `id` at `now_ms`.
    ///
    /// Once all tracking slots are taken, further new ids are relayed but
    /// not tracked.
    pub fn track(&mut self, id: u8, now_ms: u64) {
        if let Some(stat) = self.stats.get_mut(&id) {
            stat.record_arrival(now_ms);
        } else {
            let _ = self.stats.insert(id, IndividualPacketStat::new(id, now_ms));
        }
    }

    /// Count bytes that resolved to no frame
    pub fn unknown_bytes(&mut self, count: u32) {
        self.global.total_unknown_bytes_received =
            self.global.total_unknown_bytes_received.saturating_add(count);
    }

    /// Count one well-framed sequence with a failed checksum
    pub fn checksum_mismatch(&mut self) {
        self.global.total_packet_checksum_mismatches =
            self.global.total_packet_checksum_mismatches.saturating_add(1);
    }

    /// Lazy read-only view of all tracked records, order irrelevant
    pub fn individual_packet_stats(&self) -> impl Iterator<Item = &IndividualPacketStat> {
        self.stats.values()
    }

    /// Record for one frame type, if tracked
    pub fn stat_for(&self, id: u8) -> Option<&IndividualPacketStat> {
        self.stats.get(&id)
    }

    pub fn global_stats(&self) -> GlobalStats {
        self.global
    }
}

impl Default for PacketTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_arrival_reports_no_period() {
        let mut tracker = PacketTracker::new();
        tracker.track(0x03, 1_000);

        let stat = tracker.stat_for(0x03).unwrap();
        assert_eq!(stat.total_num, 1);
        assert_eq!(stat.mean_period_millis(), 0.0);
        assert_eq!(stat.deviation_millis(), 0.0);
    }

    #[test]
    fn test_second_arrival_sets_period() {
        let mut tracker = PacketTracker::new();
        tracker.track(0x03, 1_000);
        tracker.track(0x03, 1_100);

        let stat = tracker.stat_for(0x03).unwrap();
        assert_eq!(stat.total_num, 2);
        assert_eq!(stat.mean_period_millis(), 100.0);
        assert_eq!(stat.deviation_millis(), 0.0);
    }

    #[test]
    fn test_constant_interval_converges() {
        let mut tracker = PacketTracker::new();
        let mut now = 0u64;
        for _ in 0..10_000 {
            tracker.track(0x05, now);
            now += 250;
        }

        let stat = tracker.stat_for(0x05).unwrap();
        assert_eq!(stat.total_num, 10_000);
        assert!((stat.mean_period_millis() - 250.0).abs() < 0.01);
        assert!(stat.deviation_millis() < 0.01);
    }

    #[test]
    fn test_jitter_shows_up_in_deviation() {
        let mut tracker = PacketTracker::new();
        let mut now = 0u64;
        for i in 0..100 {
            tracker.track(0x02, now);
            now += if i % 2 == 0 { 80 } else { 120 };
        }

        let stat = tracker.stat_for(0x02).unwrap();
        assert!((stat.mean_period_millis() - 100.0).abs() < 2.0);
        assert!(stat.deviation_millis() > 10.0);
    }

    #[test]
    fn test_ids_tracked_independently() {
        let mut tracker = PacketTracker::new();
        tracker.track(0x03, 0);
        tracker.track(0x05, 50);
        tracker.track(0x03, 200);

        assert_eq!(tracker.stat_for(0x03).unwrap().mean_period_millis(), 200.0);
        assert_eq!(tracker.stat_for(0x05).unwrap().total_num, 1);
        assert_eq!(tracker.individual_packet_stats().count(), 2);
    }

    #[test]
    fn test_global_counters_accumulate() {
        let mut tracker = PacketTracker::new();
        tracker.unknown_bytes(3);
        tracker.unknown_bytes(4);
        tracker.checksum_mismatch();

        let global = tracker.global_stats();
        assert_eq!(global.total_unknown_bytes_received, 7);
        assert_eq!(global.total_packet_checksum_mismatches, 1);
    }

    #[test]
    fn test_slot_exhaustion_drops_new_ids_quietly() {
        let mut tracker = PacketTracker::new();
        for id in 0..=MAX_TRACKED_FRAME_TYPES as u8 {
            tracker.track(id, 0);
        }

        assert_eq!(
            tracker.individual_packet_stats().count(),
            MAX_TRACKED_FRAME_TYPES
        );
        assert!(tracker.stat_for(MAX_TRACKED_FRAME_TYPES as u8).is_none());
    }
}
