use async_trait::async_trait;
use btleplug::api::{Central as _, CentralEvent, Manager as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::BoxStream;
use log::info;
use tokio::time::{sleep, Duration};

use consts::ADAPTER_POWERON_TIMEOUT_SECS;

use crate::error::{Error, Result};

/// The host BLE daemon primitives the session core depends on (spec §6.1), named so
/// nothing outside this module talks to `btleplug` concrete types directly. Backed
/// here by `btleplug::platform` (BlueZ over D-Bus on Linux); a `bluer`-based backend
/// could implement the same trait without the rest of the crate changing.
#[async_trait]
pub trait BleAdapter: Send + Sync {
    async fn start_discovery(&self, filter: ScanFilter) -> Result<()>;
    async fn stop_discovery(&self) -> Result<()>;
    async fn events(&self) -> Result<BoxStream<'static, CentralEvent>>;
    async fn peripheral(&self, id: &btleplug::platform::PeripheralId) -> Result<Peripheral>;
}

/// Lazily-initialised singleton wrapper over one `btleplug` adapter, matching the
/// spec's "adapter handle is singleton with lazy initialisation guarded by one mutex"
/// requirement (§5). Construction picks the first powered-on adapter, waiting up to
/// [`ADAPTER_POWERON_TIMEOUT_SECS`] for one to come up.
pub struct BtleplugAdapter {
    adapter: Adapter,
}

impl BtleplugAdapter {
    pub async fn first_available() -> Result<Self> {
        let manager = Manager::new().await.map_err(|_| Error::AdapterUnavailable)?;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(ADAPTER_POWERON_TIMEOUT_SECS);
        loop {
            let adapters = manager.adapters().await.map_err(|_| Error::AdapterUnavailable)?;
            if let Some(adapter) = adapters.into_iter().next() {
                info!("using Bluetooth adapter {:?}", adapter.adapter_info().await.ok());
                return Ok(BtleplugAdapter { adapter });
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::AdapterUnavailable);
            }
            sleep(Duration::from_millis(200)).await;
        }
    }

    pub async fn by_name(name: &str) -> Result<Self> {
        let manager = Manager::new().await.map_err(|_| Error::AdapterUnavailable)?;
        let adapters = manager.adapters().await.map_err(|_| Error::AdapterUnavailable)?;
        for adapter in adapters {
            if let Ok(info) = adapter.adapter_info().await {
                if info.contains(name) {
                    return Ok(BtleplugAdapter { adapter });
                }
            }
        }
        Err(Error::AdapterUnavailable)
    }
}

#[async_trait]
impl BleAdapter for BtleplugAdapter {
    async fn start_discovery(&self, filter: ScanFilter) -> Result<()> {
        self.adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_discovery(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, CentralEvent>> {
        Ok(Box::pin(self.adapter.events().await?))
    }

    async fn peripheral(&self, id: &btleplug::platform::PeripheralId) -> Result<Peripheral> {
        Ok(self.adapter.peripheral(id).await?)
    }
}
