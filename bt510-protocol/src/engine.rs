use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, warn};
use serde_json::{json, Value};

use consts::{JSON_OBJECT_END, MAX_LOG_DRAIN_ITERATIONS};
use gateway_core::measurement::{Measurement, MeasurementSource};
use gateway_core::session::DeviceSession;

use crate::error::{ProtocolError, Result};
use crate::jsonrpc::{JsonRpcRequest, JsonRpcResponse};
use crate::log_entry::parse_log_entries;

/// The notification-boundary heuristic (spec §4.5, §9): end-of-message is signalled by
/// either a short final packet or a trailing `}`. A firmware quirk, not a protocol
/// guarantee -- isolated behind this one predicate so a length-prefixed alternative
/// could replace it without touching the rest of the engine.
fn is_boundary(payload: &[u8], mtu: usize) -> bool {
    payload.len() < mtu || payload.last() == Some(&JSON_OBJECT_END)
}

/// Frames and drives the BT510's JSON-RPC-2.0 dialect over a [`DeviceSession`]'s
/// command/response characteristics: request-id correlation, notification-boundary
/// detection, and the batched read-then-ack log drain.
///
/// `factoryReset` is deliberately unimplemented (spec §4.5): there is no safe
/// downstream recovery path for a sensor that wipes itself mid-fleet-operation.
pub struct Bt510Engine {
    session: Arc<DeviceSession>,
    next_id: AtomicU32,
}

impl Bt510Engine {
    pub fn new(session: Arc<DeviceSession>) -> Self {
        Bt510Engine { session, next_id: AtomicU32::new(1) }
    }

    fn next_request_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Sends `method(params)`, waits for the boundary-delimited response, and checks
    /// its id/error before returning it.
    ///
    /// A watcher task subscribed to the session's notification stream applies the
    /// boundary heuristic to each incoming packet and calls `stop_communication()` the
    /// moment one matches; `write_without_response(.., wait = true)` is what's actually
    /// blocked on that signal (or its own 30s timeout, whichever comes first).
    async fn call(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse> {
        let id = self.next_request_id();
        let request = JsonRpcRequest::new(id, method, params);
        let bytes = request.to_bytes()?;

        let mut notifications = self.session.notifications();
        let session = Arc::clone(&self.session);
        let mtu = session.mtu();
        let watcher = tokio::spawn(async move {
            while let Ok(event) = notifications.recv().await {
                if is_boundary(&event.bytes, mtu) {
                    session.stop_communication();
                    break;
                }
            }
        });

        let write_result = self.session.write_without_response(&bytes, true).await;
        watcher.abort();
        write_result.map_err(ProtocolError::Session)?;

        let raw = self.session.receive_buffer().drain();
        let response = JsonRpcResponse::parse(&raw)?;
        response.into_checked(id)
    }

    /// `get` — returns the requested attribute/value mapping.
    pub async fn get(&self, attributes: &[&str]) -> Result<std::collections::BTreeMap<String, Value>> {
        let response = self.call("get", Some(json!(attributes))).await?;
        Ok(merge_result_shapes(&response))
    }

    /// `set` — mapping name -> value; returns `Ok(())` on the device's `"ok"`.
    pub async fn set(&self, attributes: &std::collections::BTreeMap<String, Value>) -> Result<()> {
        self.call("set", Some(json!(attributes))).await?;
        Ok(())
    }

    /// `dump` — all attributes, optionally scoped by `mode`.
    pub async fn dump(&self, mode: Option<i64>) -> Result<std::collections::BTreeMap<String, Value>> {
        let params = mode.map(|m| json!([m]));
        let response = self.call("dump", params).await?;
        Ok(merge_result_shapes(&response))
    }

    /// `reboot` — optional bootloader mode.
    pub async fn reboot(&self, bootloader_mode: Option<i64>) -> Result<()> {
        let params = bootloader_mode.map(|m| json!([m]));
        self.call("reboot", params).await?;
        Ok(())
    }

    /// `prepareLog` — `mode = 0` is FIFO; returns the remaining entry count.
    pub async fn prepare_log(&self, mode: i64) -> Result<u32> {
        let response = self.call("prepareLog", Some(json!([mode]))).await?;
        as_u32(&response.result).ok_or_else(|| ProtocolError::Malformed("prepareLog result is not a count".into()))
    }

    /// `readLog` — returns `(actual_count, raw_bytes)` after base64-decoding the
    /// two-element `[count, payload]` array the device responds with.
    pub async fn read_log(&self, count: u32) -> Result<(u32, Vec<u8>)> {
        let response = self.call("readLog", Some(json!([count]))).await?;
        let array = response
            .result
            .as_ref()
            .and_then(Value::as_array)
            .ok_or_else(|| ProtocolError::Malformed("readLog result is not an array".into()))?;
        if array.len() != 2 {
            return Err(ProtocolError::Malformed("readLog result did not have 2 elements".into()));
        }
        let actual_count = array[0].as_u64().ok_or_else(|| ProtocolError::Malformed("readLog count is not a number".into()))? as u32;
        let base64_payload = array[1].as_str().ok_or_else(|| ProtocolError::Malformed("readLog payload is not a string".into()))?;
        let bytes = BASE64.decode(base64_payload).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        Ok((actual_count, bytes))
    }

    /// `ackLog` — acknowledges `count` entries; returns the count actually acknowledged.
    pub async fn ack_log(&self, count: u32) -> Result<u32> {
        let response = self.call("ackLog", Some(json!([count]))).await?;
        as_u32(&response.result).ok_or_else(|| ProtocolError::Malformed("ackLog result is not a count".into()))
    }

    /// `setEpoch` — sets the device clock to `epoch_seconds`.
    pub async fn set_epoch(&self, epoch_seconds: i64) -> Result<()> {
        self.call("setEpoch", Some(json!([epoch_seconds]))).await?;
        Ok(())
    }

    /// `getEpoch` — reads the device clock.
    pub async fn get_epoch(&self) -> Result<i64> {
        let response = self.call("getEpoch", None).await?;
        response.result.as_ref().and_then(Value::as_i64).ok_or_else(|| ProtocolError::Malformed("getEpoch result is not a number".into()))
    }

    /// `ledTest` — flashes the device LED for `duration_ms`.
    pub async fn led_test(&self, duration_ms: i64) -> Result<()> {
        self.call("ledTest", Some(json!(duration_ms))).await?;
        Ok(())
    }

    /// Synchronises the device clock to the host's current UTC time.
    pub async fn synchronize_time(&self) -> Result<()> {
        self.set_epoch(chrono::Utc::now().timestamp()).await
    }

    /// Drives the read-then-ack log drain (spec §4.5): repeatedly `prepareLog`s the
    /// remaining count, reads a batch, hands it to `callback`, and only `ackLog`s if
    /// the callback resolves to `true`. Bounded at [`MAX_LOG_DRAIN_ITERATIONS`]
    /// iterations to keep a pathological device (or sink) from looping the worker
    /// forever.
    ///
    /// `callback` is async and the downstream decision point: returning `false` (e.g.
    /// because the sink failed to publish) leaves the batch un-acked so it is re-read
    /// next cycle, giving idempotent delivery across a crash between read and ack.
    pub async fn process_log<F, Fut>(&self, batch_size: u32, mut callback: F) -> Result<()>
    where
        F: FnMut(Vec<Measurement>) -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        self.synchronize_time().await?;

        for iteration in 0..MAX_LOG_DRAIN_ITERATIONS {
            let remaining = self.prepare_log(0).await?;
            if remaining == 0 {
                break;
            }

            let (actual_count, payload) = self.read_log(batch_size).await?;
            let measurements = parse_log_entries(&payload, MeasurementSource::Log);
            debug!("log drain iteration {iteration}: read {actual_count} ({} parsed)", measurements.len());
            let count = measurements.len();

            if !callback(measurements).await {
                // Downstream declined the batch; leave it un-acked and retry the same
                // window next iteration rather than advancing past unpublished data.
                continue;
            }

            let acked = self.ack_log(count as u32).await?;
            if (acked as usize) < count {
                warn!("ackLog acknowledged {acked} of {count} entries");
            }
        }
        Ok(())
    }
}

fn as_u32(value: &Option<Value>) -> Option<u32> {
    value.as_ref().and_then(Value::as_u64).map(|v| v as u32)
}

/// Merges a response's standard `result` object (when it is itself a mapping) with its
/// root-level extras (spec §4.5's non-standard GET/dump shape), so callers see one flat
/// attribute mapping regardless of which shape the firmware chose to answer with.
fn merge_result_shapes(response: &JsonRpcResponse) -> std::collections::BTreeMap<String, Value> {
    let mut merged = response.root_extras.clone();
    if let Some(object) = response.result.as_ref().and_then(Value::as_object) {
        for (key, value) in object {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s5_root_level_get_result_merges_to_a_flat_mapping() {
        let bytes = br#"{"jsonrpc":"2.0","id":2,"mtu":244,"sensorName":"DTT-34179","result":"ok"}"#;
        let response = JsonRpcResponse::parse(bytes).unwrap();
        let merged = merge_result_shapes(&response);
        assert_eq!(merged.get("mtu"), Some(&json!(244)));
        assert_eq!(merged.get("sensorName"), Some(&json!("DTT-34179")));
    }

    #[test]
    fn standard_mapping_result_is_merged_too() {
        let bytes = br#"{"jsonrpc":"2.0","id":2,"result":{"mtu":244}}"#;
        let response = JsonRpcResponse::parse(bytes).unwrap();
        let merged = merge_result_shapes(&response);
        assert_eq!(merged.get("mtu"), Some(&json!(244)));
    }

    #[test]
    fn boundary_on_short_packet() {
        assert!(is_boundary(b"short", 244));
        assert!(!is_boundary(&[0u8; 244], 244));
    }

    #[test]
    fn boundary_on_trailing_brace_even_at_full_mtu() {
        let mut payload = vec![b'x'; 243];
        payload.push(b'}');
        assert!(is_boundary(&payload, 244));
    }
}
