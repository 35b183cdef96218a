mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use btleplug::api::{Central as _, Manager as _};
use btleplug::platform::{Manager, Peripheral};
use clap::Parser;
use log::{error, info, warn};

use bt510_protocol::Bt510Sensor;
use gateway_core::adapter::BtleplugAdapter;
use gateway_core::arbiter::Arbiter;
use gateway_core::factory::{AdvertisementRecord, DeviceClassification, DeviceKind};
use gateway_core::measurement::Measurement;
use gateway_core::memory_pool::MemoryPool;
use gateway_core::scanner::{ScanFilters, Scanner, WorkerDispatch};
use gateway_core::sensor::{DummySensor, MeasurementCallback, Sensor};
use gateway_core::session::DeviceSession;
use gateway_core::sink::{MeasurementSink, StdoutSink};

use crate::config::{Args, GatewayConfig, Mode};

/// Upper bound on idle rented buffers per size bucket (see `MemoryPool::new`); chosen
/// generously since BT510 traffic is low-volume per device.
const MEMORY_POOL_BUCKET_CAPACITY: usize = 16;

/// Shared, per-worker-independent wiring every dispatched device needs.
struct WorkerContext {
    arbiter: Arbiter,
    pool: MemoryPool,
    sink: Arc<dyn MeasurementSink>,
    mode: Mode,
    batch_size: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    if args.list_adapters {
        return list_adapters().await;
    }

    let config = GatewayConfig::resolve(&args)?;

    let adapter = match &config.adapter {
        Some(name) => BtleplugAdapter::by_name(name).await.with_context(|| format!("adapter matching {name:?} not found"))?,
        None => BtleplugAdapter::first_available().await.context("no Bluetooth adapter available")?,
    };

    let arbiter = Arbiter::new(config.arbiter_capacity);
    arbiter.spawn_supervisor();
    info!("arbiter capacity {}", arbiter.capacity());

    let pool = MemoryPool::new(MEMORY_POOL_BUCKET_CAPACITY);
    let sink: Arc<dyn MeasurementSink> = Arc::new(StdoutSink);

    let filters = ScanFilters {
        name_prefix: config.name_prefix.clone(),
        service_uuid: config.service_uuid,
        min_rssi_dbm: Some(config.min_rssi),
    };
    let scanner = Arc::new(Scanner::with_restart_interval(
        Arc::new(adapter),
        filters,
        std::time::Duration::from_secs(config.scan_restart_secs),
    ));

    let ctx = Arc::new(WorkerContext { arbiter, pool, sink, mode: config.mode, batch_size: config.log_batch_size });

    let dispatch_scanner = Arc::clone(&scanner);
    let dispatch: WorkerDispatch = Arc::new(move |record: AdvertisementRecord, classification: DeviceClassification, peripheral: Peripheral| {
        let ctx = Arc::clone(&ctx);
        let scanner = Arc::clone(&dispatch_scanner);
        let address = record.address;
        tokio::spawn(async move {
            if let Err(err) = run_worker(&ctx, record, classification, peripheral).await {
                error!("worker for {address} failed: {err}");
            }
            scanner.mark_complete(address).await;
        });
    });

    info!("gateway starting discovery");
    tokio::select! {
        _ = Arc::clone(&scanner).run(dispatch) => unreachable!("Scanner::run never returns"),
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }
    Ok(())
}

async fn list_adapters() -> Result<()> {
    let manager = Manager::new().await.context("failed to open Bluetooth manager")?;
    let adapters = manager.adapters().await.context("failed to list adapters")?;
    if adapters.is_empty() {
        println!("No Bluetooth adapters found");
        return Ok(());
    }
    println!("List of available Bluetooth adapters:");
    for adapter in &adapters {
        println!("- {}", adapter.adapter_info().await?);
    }
    Ok(())
}

/// Builds the right [`Sensor`] for a classified device, then runs the configured
/// harvesting mode (spec §4.6: the worker, not the scanner, owns token acquisition
/// via `process_log` -> `open` -> `DeviceSession::open`).
async fn run_worker(
    ctx: &WorkerContext,
    record: AdvertisementRecord,
    classification: DeviceClassification,
    peripheral: Peripheral,
) -> anyhow::Result<()> {
    let sensor: Box<dyn Sensor> = match classification.kind {
        DeviceKind::Dummy => Box::new(DummySensor::new(record.address)),
        DeviceKind::Bt510 | DeviceKind::Unknown => {
            let session = Arc::new(DeviceSession::new(record.address, peripheral, ctx.arbiter.clone(), ctx.pool.clone()));
            Box::new(Bt510Sensor::new(session, ctx.batch_size))
        }
    };

    match ctx.mode {
        Mode::Advertisement => {
            if let Some(measurement) = sensor.parse_advertisement(&record) {
                if let Err(err) = ctx.sink.publish(&[measurement]).await {
                    warn!("sink rejected advertisement measurement from {}: {err}", record.address);
                }
            }
        }
        Mode::Log => {
            let sink = Arc::clone(&ctx.sink);
            let mut callback: Box<MeasurementCallback<'static>> = Box::new(move |batch: Vec<Measurement>| {
                let sink = Arc::clone(&sink);
                Box::pin(async move { sink.publish(&batch).await.is_ok() })
            });
            sensor.process_log(&mut *callback).await?;
        }
    }
    Ok(())
}
