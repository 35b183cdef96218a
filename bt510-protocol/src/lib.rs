//! JSON-RPC-2.0 dialect, binary log/advertisement parsing, and batched log-drain
//! driver for BT510 BLE sensors, built on top of `gateway-core`'s session layer.

pub mod advertisement;
pub mod engine;
pub mod error;
pub mod jsonrpc;
pub mod log_entry;
pub mod sensor_impl;

pub use advertisement::parse_advertisement;
pub use engine::Bt510Engine;
pub use error::{ProtocolError, Result};
pub use jsonrpc::{JsonRpcRequest, JsonRpcResponse, RemoteErrorPayload};
pub use log_entry::{parse_log_entries, LogEntry};
pub use sensor_impl::Bt510Sensor;
