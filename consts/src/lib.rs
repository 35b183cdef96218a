//! Shared constants for the BT510 BLE sensor gateway.

/// GATT service UUID exposed by BT510 sensors for JSON-RPC command/response traffic.
pub const BT510_SERVICE_UUID: &str = "569a1101-b87f-490c-92cb-11ba5ea5167c";

/// Characteristic the gateway subscribes to for responses (device -> host).
pub const BT510_RESPONSE_CHAR_UUID: &str = "569a2000-b87f-490c-92cb-11ba5ea5167c";

/// Characteristic the gateway writes JSON-RPC requests to (host -> device).
pub const BT510_COMMAND_CHAR_UUID: &str = "569a2001-b87f-490c-92cb-11ba5ea5167c";

/// Manufacturer-data company identifier assigned to Laird / Ezurio, used by BT510 sensors.
pub const COMPANY_ID_LAIRD: u16 = 0x0077;

/// Manufacturer-data company identifier reserved for the `Dummy` test double.
pub const COMPANY_ID_DUMMY: u16 = 0x0000;

/// Manufacturer-data key under which BT510 advertisement payloads are carried.
pub const ADVERTISEMENT_MANUFACTURER_KEY: u16 = 0x00FF;

/// Minimum length of a BT510 advertisement payload that can be parsed (see §3 of the spec).
pub const ADVERTISEMENT_MIN_LEN: usize = 31;

/// Size in bytes of one on-device log entry.
pub const LOG_ENTRY_LEN: usize = 8;

/// Default BLE link MTU assumed before a session queries the real value.
pub const DEFAULT_MTU: usize = 244;

/// RSSI (dBm) substituted when a discovery event carries no signal strength.
pub const DEFAULT_RSSI_DBM: i16 = -50;

/// Maximum `prepareLog`/`readLog`/`ackLog` iterations per `process_log` call.
pub const MAX_LOG_DRAIN_ITERATIONS: u32 = 10;

/// Connection attempts `DeviceSession::open` makes before giving up.
pub const CONNECT_ATTEMPTS: u32 = 3;

/// Delay between connection attempts.
pub const CONNECT_RETRY_DELAY_SECS: u64 = 1;

/// Settle time given to the link after a low-level connect succeeds.
pub const CONNECT_STABILIZE_SECS: u64 = 2;

/// Timeout for token acquisition by sessions that need an active GATT link.
pub const TOKEN_ACQUIRE_ACTIVE_TIMEOUT_SECS: u64 = 120;

/// Timeout waiting for a full JSON-RPC response after a write.
pub const RESPONSE_WAIT_TIMEOUT_SECS: u64 = 30;

/// Interval at which the scanner restarts discovery to defeat advertisement caching.
pub const DISCOVERY_RESTART_SECS: u64 = 30;

/// Delay the scanner waits after an adapter-level error before retrying.
pub const ADAPTER_ERROR_BACKOFF_SECS: u64 = 5;

/// Interval at which the arbiter supervisor checks for leaked tokens.
pub const ARBITER_SUPERVISOR_INTERVAL_SECS: u64 = 60;

/// Age after which a held token is logged as a potential leak.
pub const ARBITER_LEAK_THRESHOLD_SECS: u64 = 300;

/// Payload size threshold above which the receive buffer stages through the memory pool.
pub const POOL_STAGING_THRESHOLD: usize = 100;

/// Payload size threshold above which `ReceiveBuffer::append` becomes `append_large`.
pub const LARGE_APPEND_THRESHOLD: usize = 512;

/// Byte marking the end of a JSON object, used by the notification boundary heuristic.
pub const JSON_OBJECT_END: u8 = b'}';

/// Time budget for a Bluetooth adapter to become available at startup.
pub const ADAPTER_POWERON_TIMEOUT_SECS: u64 = 5;

/// RSSI floor below which a discovered advertisement is ignored by the scanner.
pub const DEFAULT_MIN_RSSI_DBM: i16 = -90;

/// `readLog` batch size requested on each log-drain iteration absent an override.
pub const DEFAULT_LOG_BATCH_SIZE: u32 = 128;

/// Default arbiter capacity floor (`N = max(2, cores/2)`, spec §4.3) when the host
/// can't report its core count.
pub const DEFAULT_ARBITER_CORES_FALLBACK: usize = 2;
