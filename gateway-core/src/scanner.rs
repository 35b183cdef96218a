use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{CentralEvent, Peripheral as _, ScanFilter};
use btleplug::platform::Peripheral;
use futures::StreamExt;
use log::{error, info, warn};
use tokio::sync::Mutex;
use tokio::time::sleep;
use uuid::Uuid;

use consts::{ADAPTER_ERROR_BACKOFF_SECS, DEFAULT_MIN_RSSI_DBM, DISCOVERY_RESTART_SECS};

use crate::adapter::BleAdapter;
use crate::address::BluetoothAddress;
use crate::factory::{AdvertisementRecord, DeviceClassification, DeviceFactory};

/// One accepted discovery event, ready to hand to a worker dispatcher: the normalised
/// record, its classification (spec §4.8), and the resolved peripheral handle a worker
/// needs to build a [`crate::session::DeviceSession`] without re-resolving it.
pub type WorkerDispatch = Arc<dyn Fn(AdvertisementRecord, DeviceClassification, Peripheral) + Send + Sync>;

/// Optional acceptance filters applied before a worker is dispatched (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    pub name_prefix: Option<String>,
    pub service_uuid: Option<Uuid>,
    pub min_rssi_dbm: Option<i16>,
}

impl ScanFilters {
    fn accepts(&self, record: &AdvertisementRecord) -> bool {
        if let Some(prefix) = &self.name_prefix {
            if !record.name.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(uuid) = &self.service_uuid {
            if !record.uuids.contains(uuid) {
                return false;
            }
        }
        let floor = self.min_rssi_dbm.unwrap_or(DEFAULT_MIN_RSSI_DBM);
        record.rssi >= floor
    }
}

/// Continuous discovery loop with per-device worker dispatch and de-duplication.
///
/// Two concurrent maps back the de-dup rule (spec §4.6): `discovered` remembers every
/// address seen this discovery cycle (cleared on restart), `in_process` tracks which
/// addresses currently have a live dispatched worker. An address in `in_process` is
/// always skipped regardless of `discovered`.
pub struct Scanner {
    adapter: Arc<dyn BleAdapter>,
    filters: ScanFilters,
    restart_interval: Duration,
    discovered: Mutex<HashSet<BluetoothAddress>>,
    in_process: Mutex<HashSet<BluetoothAddress>>,
}

impl Scanner {
    pub fn new(adapter: Arc<dyn BleAdapter>, filters: ScanFilters) -> Self {
        Self::with_restart_interval(adapter, filters, Duration::from_secs(DISCOVERY_RESTART_SECS))
    }

    /// Like [`Self::new`] but overrides the default 30s discovery-restart interval
    /// (spec §10.6's `--scan-restart-secs`).
    pub fn with_restart_interval(adapter: Arc<dyn BleAdapter>, filters: ScanFilters, restart_interval: Duration) -> Self {
        Scanner {
            adapter,
            filters,
            restart_interval,
            discovered: Mutex::new(HashSet::new()),
            in_process: Mutex::new(HashSet::new()),
        }
    }

    /// Runs forever. `dispatch` is called once per accepted, not-already-in-process
    /// device; the caller is responsible for spawning the worker task and, on its
    /// completion (success or failure), calling [`Self::mark_complete`].
    pub async fn run(self: Arc<Self>, dispatch: WorkerDispatch) -> ! {
        loop {
            if let Err(err) = self.clone().run_discovery_cycle(&dispatch).await {
                error!("scanner adapter error: {err}, retrying in {ADAPTER_ERROR_BACKOFF_SECS}s");
                sleep(Duration::from_secs(ADAPTER_ERROR_BACKOFF_SECS)).await;
            }
        }
    }

    async fn run_discovery_cycle(self: Arc<Self>, dispatch: &WorkerDispatch) -> crate::error::Result<()> {
        self.discovered.lock().await.clear();
        self.adapter.start_discovery(ScanFilter::default()).await?;
        info!("discovery started");

        let mut events = self.adapter.events().await?;
        let restart_at = tokio::time::Instant::now() + self.restart_interval;

        loop {
            tokio::select! {
                event = events.next() => {
                    match event {
                        Some(event) => self.handle_event(event, dispatch).await,
                        None => return Ok(()),
                    }
                }
                _ = tokio::time::sleep_until(restart_at) => {
                    // Periodic restart defeats host-side advertisement caching; errors
                    // here are retried on the next outer loop iteration, not fatal now.
                    if let Err(err) = self.adapter.stop_discovery().await {
                        warn!("discovery restart: stop_scan failed: {err}");
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn handle_event(&self, event: CentralEvent, dispatch: &WorkerDispatch) {
        let CentralEvent::ManufacturerDataAdvertisement { id, manufacturer_data } = event else { return };

        let peripheral = match self.adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(err) => {
                warn!("could not resolve discovered peripheral: {err}");
                return;
            }
        };
        let properties = match peripheral.properties().await {
            Ok(Some(props)) => props,
            _ => return,
        };

        let address: BluetoothAddress = properties.address.into();
        {
            let mut in_process = self.in_process.lock().await;
            if in_process.contains(&address) {
                return;
            }
            let mut discovered = self.discovered.lock().await;
            if !discovered.insert(address) {
                // seen this cycle already but not in-process: harmless, fall through
                // so a worker that finished between events can be re-dispatched.
            }
            in_process.insert(address);
        }

        let record = AdvertisementRecord::with_default_rssi(
            properties.local_name.unwrap_or_default(),
            address,
            properties.rssi,
            properties.services,
            manufacturer_data_to_map(manufacturer_data),
        );

        if !self.filters.accepts(&record) {
            self.in_process.lock().await.remove(&address);
            return;
        }

        let classification = DeviceFactory::classify(&record);
        dispatch(record, classification, peripheral);
    }

    /// Must be called by the worker (or its supervisor) on every exit path once a
    /// dispatched device's work has concluded, so a future cycle can retry it.
    pub async fn mark_complete(&self, address: BluetoothAddress) {
        self.in_process.lock().await.remove(&address);
    }

    pub async fn live_worker_count(&self) -> usize {
        self.in_process.lock().await.len()
    }
}

fn manufacturer_data_to_map(data: std::collections::HashMap<u16, Vec<u8>>) -> BTreeMap<u16, Vec<u8>> {
    data.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_rejects_below_min_rssi() {
        let filters = ScanFilters { name_prefix: None, service_uuid: None, min_rssi_dbm: Some(-60) };
        let record = AdvertisementRecord::with_default_rssi(
            "sensor".into(),
            BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]),
            Some(-80),
            vec![],
            BTreeMap::new(),
        );
        assert!(!filters.accepts(&record));
    }

    #[test]
    fn filter_rejects_wrong_name_prefix() {
        let filters = ScanFilters { name_prefix: Some("BT510".into()), service_uuid: None, min_rssi_dbm: None };
        let record = AdvertisementRecord::with_default_rssi(
            "OtherSensor".into(),
            BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]),
            Some(-40),
            vec![],
            BTreeMap::new(),
        );
        assert!(!filters.accepts(&record));
    }

    #[test]
    fn filter_rejects_missing_required_service_uuid() {
        let wanted = Uuid::from_u128(0x569a1101_b87f_490c_92cb_11ba5ea5167c);
        let filters = ScanFilters { name_prefix: None, service_uuid: Some(wanted), min_rssi_dbm: None };
        let record = AdvertisementRecord::with_default_rssi(
            "sensor".into(),
            BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]),
            Some(-40),
            vec![Uuid::nil()],
            BTreeMap::new(),
        );
        assert!(!filters.accepts(&record));
    }

    #[test]
    fn default_filters_accept_everything_above_rssi_floor() {
        let filters = ScanFilters::default();
        let record = AdvertisementRecord::with_default_rssi(
            "anything".into(),
            BluetoothAddress::from_bytes([0, 0, 0, 0, 0, 1]),
            Some(-70),
            vec![],
            BTreeMap::new(),
        );
        assert!(filters.accepts(&record));
    }

    #[tokio::test]
    async fn mark_complete_allows_a_future_dispatch() {
        struct NoopAdapter;
        #[async_trait::async_trait]
        impl BleAdapter for NoopAdapter {
            async fn start_discovery(&self, _filter: ScanFilter) -> crate::error::Result<()> {
                Ok(())
            }
            async fn stop_discovery(&self) -> crate::error::Result<()> {
                Ok(())
            }
            async fn events(&self) -> crate::error::Result<futures::stream::BoxStream<'static, CentralEvent>> {
                Ok(Box::pin(futures::stream::empty()))
            }
            async fn peripheral(
                &self,
                _id: &btleplug::platform::PeripheralId,
            ) -> crate::error::Result<btleplug::platform::Peripheral> {
                unreachable!()
            }
        }

        let scanner = Scanner::new(Arc::new(NoopAdapter), ScanFilters::default());
        let address = BluetoothAddress::from_bytes([1, 1, 1, 1, 1, 1]);
        scanner.in_process.lock().await.insert(address);
        assert_eq!(scanner.live_worker_count().await, 1);
        scanner.mark_complete(address).await;
        assert_eq!(scanner.live_worker_count().await, 0);
    }
}
