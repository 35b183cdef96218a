use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::address::BluetoothAddress;
use crate::error::Result;
use crate::factory::AdvertisementRecord;
use crate::measurement::Measurement;

/// One batch-acceptance callback, shared by [`Sensor::download_log`] and
/// [`Sensor::process_log`] (spec §6.4): the caller decides, after seeing a batch,
/// whether the protocol driver may acknowledge it. Async so a real sink's I/O can run
/// to completion before the decision is made, rather than forcing a blocking call
/// inside a protocol driver's drain loop.
pub type MeasurementCallback<'a> = dyn FnMut(Vec<Measurement>) -> BoxFuture<'static, bool> + Send + 'a;

/// The per-device protocol driver contract (spec §2, §4.5, §4.8): the polymorphic
/// operations `{open, close, download_log, process_log, parse_advertisement, get_cfg,
/// set_cfg}` a [`crate::scanner::Scanner`] worker drives for one discovered peripheral,
/// regardless of which sensor family classified it.
#[async_trait]
pub trait Sensor: Send + Sync {
    fn address(&self) -> BluetoothAddress;

    /// Opens the session and performs any one-time handshake (service/characteristic
    /// discovery, authentication, notification subscription). The only path through
    /// which a connection is (re-)established; [`Self::download_log`] assumes an
    /// already-open session and never reconnects on its own.
    async fn open(&self) -> Result<()>;

    /// Disconnects and releases any held token. Safe to call even if never opened.
    async fn close(&self);

    /// Runs one read-then-ack log drain to completion against an already-open
    /// session, invoking `callback` once per batch. `callback`'s return governs
    /// whether the driver acknowledges the batch (spec §6.4); declining leaves it
    /// unacked so a future call re-reads the same window.
    async fn download_log(&self, callback: &mut MeasurementCallback<'_>) -> Result<()>;

    /// Convenience wrapper matching the spec's `process_log` pseudocode: `open()`,
    /// then [`Self::download_log`], then `close()` regardless of the drain's outcome.
    async fn process_log(&self, callback: &mut MeasurementCallback<'_>) -> Result<()> {
        self.open().await?;
        let result = self.download_log(callback).await;
        self.close().await;
        result
    }

    /// Parses whatever measurement this sensor family encodes into a raw advertising
    /// record's manufacturer data, without opening a session or consuming a token.
    fn parse_advertisement(&self, record: &AdvertisementRecord) -> Option<Measurement>;

    /// Reads named device attributes over an already-open session (BT510's `get`).
    async fn get_cfg(&self, attributes: &[&str]) -> Result<BTreeMap<String, Value>>;

    /// Writes named device attributes over an already-open session (BT510's `set`).
    async fn set_cfg(&self, attributes: &BTreeMap<String, Value>) -> Result<()>;
}

/// A no-op [`Sensor`] used in the `Dummy` classification's test-double path (spec
/// §4.8): it never connects to anything, letting the scanner's dispatch and
/// worker-lifecycle code run end to end in tests without real hardware.
pub struct DummySensor {
    address: BluetoothAddress,
}

impl DummySensor {
    pub fn new(address: BluetoothAddress) -> Self {
        DummySensor { address }
    }
}

#[async_trait]
impl Sensor for DummySensor {
    fn address(&self) -> BluetoothAddress {
        self.address
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {}

    async fn download_log(&self, _callback: &mut MeasurementCallback<'_>) -> Result<()> {
        Ok(())
    }

    fn parse_advertisement(&self, _record: &AdvertisementRecord) -> Option<Measurement> {
        None
    }

    async fn get_cfg(&self, _attributes: &[&str]) -> Result<BTreeMap<String, Value>> {
        Ok(BTreeMap::new())
    }

    async fn set_cfg(&self, _attributes: &BTreeMap<String, Value>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_sensor_process_log_completes_with_no_measurements() {
        let addr = BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]);
        let sensor = DummySensor::new(addr);
        let mut seen = Vec::new();
        sensor
            .process_log(&mut |batch: Vec<Measurement>| {
                seen.extend(batch);
                Box::pin(async { true })
            })
            .await
            .unwrap();
        assert!(seen.is_empty());
        sensor.close().await;
    }

    #[tokio::test]
    async fn dummy_sensor_never_classifies_an_advertisement() {
        let addr = BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]);
        let sensor = DummySensor::new(addr);
        let record = AdvertisementRecord::with_default_rssi("x".into(), addr, None, vec![], Default::default());
        assert!(sensor.parse_advertisement(&record).is_none());
    }
}
