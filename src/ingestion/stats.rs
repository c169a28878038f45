//! Ingestion counters
//!
//! Lock-free counters updated by the listener on every message and read by
//! the HTTP stats endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::codec::{DecodeError, DecodeErrorKind};
use crate::republish::PublishOutcome;

/// Listener counters
#[derive(Debug)]
pub struct IngestionStats {
    // === Throughput ===
    /// Raw messages taken off the channel
    received: AtomicU64,
    /// Messages decoded and stored
    decoded: AtomicU64,

    // === Decode failures by kind ===
    field_count_mismatch: AtomicU64,
    numeric_parse_failure: AtomicU64,
    unknown_region: AtomicU64,
    malformed_record: AtomicU64,

    // === Sink outcomes ===
    direct_ok: AtomicU64,
    direct_failed: AtomicU64,
    bus_ok: AtomicU64,
    bus_failed: AtomicU64,

    start_time: Instant,
}

impl Default for IngestionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestionStats {
    /// Zeroed counters
    pub fn new() -> Self {
        Self {
            received: AtomicU64::new(0),
            decoded: AtomicU64::new(0),
            field_count_mismatch: AtomicU64::new(0),
            numeric_parse_failure: AtomicU64::new(0),
            unknown_region: AtomicU64::new(0),
            malformed_record: AtomicU64::new(0),
            direct_ok: AtomicU64::new(0),
            direct_failed: AtomicU64::new(0),
            bus_ok: AtomicU64::new(0),
            bus_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a dropped message under its error kind
    pub fn record_decode_failure(&self, err: &DecodeError) {
        let counter = match err.kind {
            DecodeErrorKind::FieldCountMismatch { .. } => &self.field_count_mismatch,
            DecodeErrorKind::NumericParseFailure { .. } => &self.numeric_parse_failure,
            DecodeErrorKind::UnknownRegion { .. } => &self.unknown_region,
            DecodeErrorKind::MalformedRecord { .. } => &self.malformed_record,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count both sink results of one publish
    pub fn record_outcome(&self, outcome: PublishOutcome) {
        let (direct, bus) = outcome.as_tuple();
        if direct {
            self.direct_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.direct_failed.fetch_add(1, Ordering::Relaxed);
        }
        if bus {
            self.bus_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bus_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total decode failures across kinds
    pub fn decode_failures(&self) -> u64 {
        self.field_count_mismatch.load(Ordering::Relaxed)
            + self.numeric_parse_failure.load(Ordering::Relaxed)
            + self.unknown_region.load(Ordering::Relaxed)
            + self.malformed_record.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> IngestionStatsSnapshot {
        IngestionStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: DecodeFailureCounts {
                total: self.decode_failures(),
                field_count_mismatch: self.field_count_mismatch.load(Ordering::Relaxed),
                numeric_parse_failure: self.numeric_parse_failure.load(Ordering::Relaxed),
                unknown_region: self.unknown_region.load(Ordering::Relaxed),
                malformed_record: self.malformed_record.load(Ordering::Relaxed),
            },
            direct: SinkCounts {
                ok: self.direct_ok.load(Ordering::Relaxed),
                failed: self.direct_failed.load(Ordering::Relaxed),
            },
            bus: SinkCounts {
                ok: self.bus_ok.load(Ordering::Relaxed),
                failed: self.bus_failed.load(Ordering::Relaxed),
            },
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Serializable copy of [`IngestionStats`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionStatsSnapshot {
    pub received: u64,
    pub decoded: u64,
    pub decode_failures: DecodeFailureCounts,
    pub direct: SinkCounts,
    pub bus: SinkCounts,
    pub uptime_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailureCounts {
    pub total: u64,
    pub field_count_mismatch: u64,
    pub numeric_parse_failure: u64,
    pub unknown_region: u64,
    pub malformed_record: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkCounts {
    pub ok: u64,
    pub failed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_counted_by_kind() {
        let stats = IngestionStats::new();
        stats.record_decode_failure(&DecodeError::field_count(4, 3));
        stats.record_decode_failure(&DecodeError::field_count(4, 5));
        stats.record_decode_failure(&DecodeError::unknown_region("x"));
        stats.record_decode_failure(&DecodeError::malformed("missing brackets"));

        let snap = stats.snapshot();
        assert_eq!(snap.decode_failures.total, 4);
        assert_eq!(snap.decode_failures.malformed_record, 1);
        assert_eq!(snap.decode_failures.field_count_mismatch, 2);
        assert_eq!(snap.decode_failures.unknown_region, 1);
        assert_eq!(snap.decode_failures.numeric_parse_failure, 0);
    }

    #[test]
    fn test_outcomes_counted_per_sink() {
        let stats = IngestionStats::new();
        stats.record_outcome(PublishOutcome {
            direct: false,
            bus: true,
        });
        stats.record_outcome(PublishOutcome {
            direct: true,
            bus: true,
        });

        let snap = stats.snapshot();
        assert_eq!(snap.direct, SinkCounts { ok: 1, failed: 1 });
        assert_eq!(snap.bus, SinkCounts { ok: 2, failed: 0 });
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = IngestionStats::new();
        stats.record_received();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["received"], 1);
        assert_eq!(json["decode_failures"]["total"], 0);
    }
}
