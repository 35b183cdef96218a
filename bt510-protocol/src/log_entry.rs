use chrono::{DateTime, TimeZone, Utc};

use consts::LOG_ENTRY_LEN;
use gateway_core::measurement::{Measurement, MeasurementSource, MeasurementType};

/// One on-device log record, 8 bytes little-endian (spec §3): `timestamp: u32`,
/// `data: u16`, `type: u8`, `salt: u8`. `salt` disambiguates entries that would
/// otherwise collide on `{timestamp, type, data}` but carries no semantic meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: u32,
    pub data: u16,
    pub entry_type: u8,
    pub salt: u8,
}

impl LogEntry {
    fn from_bytes(bytes: &[u8; LOG_ENTRY_LEN]) -> Self {
        LogEntry {
            timestamp: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data: u16::from_le_bytes([bytes[4], bytes[5]]),
            entry_type: bytes[6],
            salt: bytes[7],
        }
    }

    fn timestamp_utc(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.timestamp as i64, 0).single().unwrap_or_default()
    }
}

/// Maps a log entry's `{type, data}` pair to a [`Measurement`], per the type table in
/// spec §4.5. Types outside the table are ignored (return `None`), not an error: a
/// batch of otherwise-valid entries should not fail wholesale over one unknown type.
pub fn interpret_entry(entry: &LogEntry, source: MeasurementSource) -> Option<Measurement> {
    let (kind, value) = match entry.entry_type {
        1 | 4..=10 => (MeasurementType::Temperature, (entry.data as i16) as f64 / 100.0),
        12 | 13 | 16 => (MeasurementType::Battery, entry.data as f64 / 1000.0),
        _ => return None,
    };
    Some(Measurement::new(kind, value, entry.timestamp_utc(), source))
}

/// Parses a batch of 8-byte log records into measurements (spec §4.5, §8 invariant 4).
///
/// A trailing partial record (`len(bytes) % 8 != 0`) is dropped rather than erroring:
/// the device can hand back a truncated final batch near the end of the log, and the
/// gateway just re-reads the remainder on the next `readLog` call.
pub fn parse_log_entries(bytes: &[u8], source: MeasurementSource) -> Vec<Measurement> {
    bytes
        .chunks_exact(LOG_ENTRY_LEN)
        .filter_map(|chunk| {
            let array: [u8; LOG_ENTRY_LEN] = chunk.try_into().expect("chunks_exact guarantees this length");
            interpret_entry(&LogEntry::from_bytes(&array), source)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_temperature_log_entry() {
        let bytes = [0x01, 0x00, 0x00, 0x00, 0xdc, 0x05, 0x01, 0x2a];
        let measurements = parse_log_entries(&bytes, MeasurementSource::Log);
        assert_eq!(measurements.len(), 1);
        let m = &measurements[0];
        assert_eq!(m.kind, MeasurementType::Temperature);
        assert!((m.value - 15.00).abs() < 1e-9);
        assert_eq!(m.timestamp_utc.timestamp(), 1);
        assert_eq!(m.source, MeasurementSource::Log);
    }

    #[test]
    fn s2_battery_bad_log_entry() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0xd0, 0x07, 0x10, 0x00];
        let measurements = parse_log_entries(&bytes, MeasurementSource::Log);
        assert_eq!(measurements.len(), 1);
        let m = &measurements[0];
        assert_eq!(m.kind, MeasurementType::Battery);
        assert!((m.value - 2.000).abs() < 1e-9);
        assert_eq!(m.timestamp_utc.timestamp(), 0);
    }

    #[test]
    fn unknown_type_is_dropped_not_errored() {
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0x00];
        assert!(parse_log_entries(&bytes, MeasurementSource::Log).is_empty());
    }

    #[test]
    fn trailing_partial_record_is_dropped() {
        let mut bytes = vec![0x01, 0x00, 0x00, 0x00, 0xdc, 0x05, 0x01, 0x2a];
        bytes.extend_from_slice(&[1, 2, 3]);
        let measurements = parse_log_entries(&bytes, MeasurementSource::Log);
        assert_eq!(measurements.len(), 1);
    }

    #[test]
    fn negative_temperature_decodes_via_signed_interpretation() {
        // data = 0xFF38 as i16 == -200 -> -2.00C
        let bytes = [0x00, 0x00, 0x00, 0x00, 0x38, 0xff, 0x01, 0x00];
        let measurements = parse_log_entries(&bytes, MeasurementSource::Log);
        assert_eq!(measurements.len(), 1);
        assert!((measurements[0].value - (-2.00)).abs() < 1e-9);
    }
}
