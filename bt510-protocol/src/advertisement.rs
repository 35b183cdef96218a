use chrono::{DateTime, TimeZone, Utc};

use consts::ADVERTISEMENT_MIN_LEN;
use gateway_core::measurement::{Measurement, MeasurementSource, MeasurementType};

/// Parses a BT510 manufacturer-data advertisement payload (spec §3, §4.5): byte 19 is
/// the event type, bytes 22..26 an LE epoch, bytes 26..30 LE sensor data. Reuses the
/// same type table as log entries. Returns `None` for a too-short payload or an
/// unrecognised event type rather than erroring -- advertisements are a best-effort,
/// high-frequency source and a single malformed one must not take down the scanner.
pub fn parse_advertisement(payload: &[u8]) -> Option<Measurement> {
    if payload.len() < ADVERTISEMENT_MIN_LEN {
        return None;
    }
    let event_type = payload[19];
    let epoch = u32::from_le_bytes([payload[22], payload[23], payload[24], payload[25]]);
    let data = u32::from_le_bytes([payload[26], payload[27], payload[28], payload[29]]);

    let (kind, value) = match event_type {
        1 | 4..=10 => (MeasurementType::Temperature, ((data & 0xFFFF) as i16) as f64 / 100.0),
        12 | 13 | 16 => (MeasurementType::Battery, data as f64 / 1000.0),
        _ => return None,
    };

    let timestamp_utc: DateTime<Utc> = Utc.timestamp_opt(epoch as i64, 0).single()?;
    Some(Measurement::new(kind, value, timestamp_utc, MeasurementSource::Advertisement))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_advertisement_temperature() {
        let mut payload = vec![0u8; ADVERTISEMENT_MIN_LEN];
        payload[19] = 0x01;
        payload[22..26].copy_from_slice(&0u32.to_le_bytes());
        payload[26..30].copy_from_slice(&100u32.to_le_bytes());

        let m = parse_advertisement(&payload).unwrap();
        assert_eq!(m.kind, MeasurementType::Temperature);
        assert!((m.value - 1.00).abs() < 1e-9);
        assert_eq!(m.timestamp_utc.timestamp(), 0);
        assert_eq!(m.source, MeasurementSource::Advertisement);
    }

    #[test]
    fn too_short_payload_yields_none() {
        let payload = vec![0u8; ADVERTISEMENT_MIN_LEN - 1];
        assert!(parse_advertisement(&payload).is_none());
    }

    #[test]
    fn unrecognised_event_type_yields_none() {
        let mut payload = vec![0u8; ADVERTISEMENT_MIN_LEN];
        payload[19] = 0xFE;
        assert!(parse_advertisement(&payload).is_none());
    }
}
