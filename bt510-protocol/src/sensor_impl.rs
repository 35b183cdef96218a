use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use consts::{ADVERTISEMENT_MANUFACTURER_KEY, BT510_COMMAND_CHAR_UUID, BT510_RESPONSE_CHAR_UUID, BT510_SERVICE_UUID};
use gateway_core::address::BluetoothAddress;
use gateway_core::error::Result as CoreResult;
use gateway_core::factory::AdvertisementRecord;
use gateway_core::measurement::Measurement;
use gateway_core::sensor::{MeasurementCallback, Sensor};
use gateway_core::session::DeviceSession;

use crate::advertisement::parse_advertisement;
use crate::engine::Bt510Engine;

/// [`Sensor`] implementation for BT510 devices: owns a [`DeviceSession`] bound to the
/// BT510 GATT service/characteristics and a [`Bt510Engine`] that speaks its JSON-RPC
/// dialect over that session.
pub struct Bt510Sensor {
    session: Arc<DeviceSession>,
    engine: Bt510Engine,
    batch_size: u32,
}

impl Bt510Sensor {
    pub fn new(session: Arc<DeviceSession>, batch_size: u32) -> Self {
        let engine = Bt510Engine::new(Arc::clone(&session));
        Bt510Sensor { session, engine, batch_size }
    }

    fn service_uuid() -> Uuid {
        BT510_SERVICE_UUID.parse().expect("constant is a valid UUID")
    }

    fn response_uuid() -> Uuid {
        BT510_RESPONSE_CHAR_UUID.parse().expect("constant is a valid UUID")
    }

    fn command_uuid() -> Uuid {
        BT510_COMMAND_CHAR_UUID.parse().expect("constant is a valid UUID")
    }
}

#[async_trait]
impl Sensor for Bt510Sensor {
    fn address(&self) -> BluetoothAddress {
        self.session.address()
    }

    /// Opens the session, then locks in the BT510 GATT service/characteristics and
    /// subscribes notifications; the engine assumes all of this has already happened.
    async fn open(&self) -> CoreResult<()> {
        self.session.open().await?;
        self.session.set_service(Self::service_uuid()).await?;
        self.session.set_command_characteristic(Self::command_uuid()).await?;
        self.session.set_notifications(Self::response_uuid()).await?;
        Ok(())
    }

    async fn close(&self) {
        self.session.close().await;
    }

    /// Delegates straight to [`Bt510Engine::process_log`]; the only adaptation needed
    /// is bridging the trait's type-erased callback into the engine's generic one.
    async fn download_log(&self, callback: &mut MeasurementCallback<'_>) -> CoreResult<()> {
        self.engine.process_log(self.batch_size, move |batch: Vec<Measurement>| callback(batch)).await.map_err(Into::into)
    }

    /// Reads the `0x00FF` manufacturer-data key and applies the BT510 advertisement
    /// layout (spec §3, §4.5). Never touches the session: a still-disconnected sensor
    /// can be classified from its last seen advertisement alone.
    fn parse_advertisement(&self, record: &AdvertisementRecord) -> Option<Measurement> {
        let payload = record.manufacturer_data.get(&ADVERTISEMENT_MANUFACTURER_KEY)?;
        parse_advertisement(payload)
    }

    async fn get_cfg(&self, attributes: &[&str]) -> CoreResult<BTreeMap<String, Value>> {
        self.engine.get(attributes).await.map_err(Into::into)
    }

    async fn set_cfg(&self, attributes: &BTreeMap<String, Value>) -> CoreResult<()> {
        self.engine.set(attributes).await.map_err(Into::into)
    }
}
