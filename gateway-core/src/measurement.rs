use chrono::{DateTime, Utc};

/// The physical quantity a [`Measurement`] represents.
///
/// Non-exhaustive: the BT510 firmware defines many more log-entry types than the
/// gateway currently interprets (see `bt510-protocol`'s type table); unrecognised
/// types are dropped before a `Measurement` is ever constructed, so this enum only
/// needs to name the ones we do emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum MeasurementType {
    Temperature,
    Battery,
}

impl MeasurementType {
    /// The unit string used when serializing a measurement of this type.
    pub fn unit(&self) -> &'static str {
        match self {
            MeasurementType::Temperature => "\u{b0}C",
            MeasurementType::Battery => "V",
        }
    }
}

/// Where a measurement was obtained from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeasurementSource {
    Advertisement,
    Log,
    Both,
}

/// A single sensor reading, ready to hand to the downstream sink.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub kind: MeasurementType,
    pub value: f64,
    pub timestamp_utc: DateTime<Utc>,
    pub source: MeasurementSource,
    pub id: Option<u64>,
}

impl Measurement {
    pub fn new(kind: MeasurementType, value: f64, timestamp_utc: DateTime<Utc>, source: MeasurementSource) -> Self {
        Measurement { kind, value, timestamp_utc, source, id: None }
    }

    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }
}

/// Sorts a batch of measurements ascending by `timestamp_utc`, as required when
/// aggregating `Source::Both` sequences (spec §4.5, §8 invariant 7... see design notes).
pub fn sort_by_timestamp(measurements: &mut [Measurement]) {
    measurements.sort_by_key(|m| m.timestamp_utc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn m(secs: i64) -> Measurement {
        Measurement::new(MeasurementType::Temperature, 1.0, Utc.timestamp_opt(secs, 0).unwrap(), MeasurementSource::Log)
    }

    #[test]
    fn sorts_ascending_by_timestamp() {
        let mut batch = vec![m(30), m(10), m(20)];
        sort_by_timestamp(&mut batch);
        let secs: Vec<i64> = batch.iter().map(|m| m.timestamp_utc.timestamp()).collect();
        assert_eq!(secs, vec![10, 20, 30]);
    }
}
