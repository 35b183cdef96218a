//! BLE session core: scanner, resource arbiter, device session, and the protocol-
//! agnostic pieces a per-sensor driver (e.g. `bt510-protocol`) is built on top of.

pub mod adapter;
pub mod address;
pub mod arbiter;
pub mod async_util;
pub mod auth;
pub mod error;
pub mod factory;
pub mod measurement;
pub mod memory_pool;
pub mod receive_buffer;
pub mod scanner;
pub mod sensor;
pub mod session;
pub mod sink;

pub use address::BluetoothAddress;
pub use arbiter::{Arbiter, Token};
pub use error::{Error, Result};
pub use factory::{AdvertisementRecord, DeviceClassification, DeviceFactory, DeviceKind};
pub use measurement::{Measurement, MeasurementSource, MeasurementType};
pub use scanner::{ScanFilters, Scanner, WorkerDispatch};
pub use sensor::{DummySensor, MeasurementCallback, Sensor};
pub use session::{ConnectionState, DeviceSession, NotificationEvent};
pub use sink::MeasurementSink;
