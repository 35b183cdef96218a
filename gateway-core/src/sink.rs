use async_trait::async_trait;
use log::info;

use crate::error::Result;
use crate::measurement::Measurement;

/// Downstream delivery of measurements, explicitly out-of-scope for protocol logic but
/// still part of the ambient stack: the gateway binary always has *some* sink wired up.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    async fn publish(&self, measurements: &[Measurement]) -> Result<()>;
}

/// Reference sink that logs each measurement at info level. Good enough as the
/// gateway binary's default; a real deployment swaps in an MQTT/HTTP sink.
pub struct StdoutSink;

#[async_trait]
impl MeasurementSink for StdoutSink {
    async fn publish(&self, measurements: &[Measurement]) -> Result<()> {
        for m in measurements {
            info!("{:?} = {}{} (ts {})", m.kind, m.value, m.unit(), m.timestamp_utc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{MeasurementSource, MeasurementType};
    use chrono::Utc;

    #[tokio::test]
    async fn stdout_sink_publishes_without_error() {
        let sink = StdoutSink;
        let m = Measurement::new(MeasurementType::Temperature, 21.5, Utc::now(), MeasurementSource::Log);
        sink.publish(&[m]).await.unwrap();
    }
}
