use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};

/// A JSON-RPC 2.0 request with a monotonically increasing `id`, as written to the
/// BT510 command characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u32,
}

impl JsonRpcRequest {
    pub fn new(id: u32, method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcRequest { jsonrpc: "2.0".into(), method: method.into(), params, id }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// A parsed response, covering both wire shapes the BT510 firmware emits (spec §4.5):
/// the standard `result`-keyed shape, and a "root-level" shape where extra attributes
/// ride alongside `result: "ok"` at the object root (a quirk specific to `get`/`dump`).
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcResponse {
    pub id: u32,
    pub result: Option<Value>,
    pub error: Option<RemoteErrorPayload>,
    /// Keys present at the object root outside `{jsonrpc, id, result, error}`.
    pub root_extras: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteErrorPayload {
    pub code: i64,
    pub message: String,
}

impl JsonRpcResponse {
    /// Parses a raw UTF-8 JSON object into a response, collecting any keys outside the
    /// reserved set into `root_extras` for the root-level quirk.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        let object = value.as_object().ok_or_else(|| ProtocolError::Malformed("response is not a JSON object".into()))?;

        let id = object
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::Malformed("response is missing an integer id".into()))?;
        let id = u32::try_from(id).map_err(|_| ProtocolError::Malformed("response id does not fit in u32".into()))?;

        let error = object.get("error").map(|err| {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
            RemoteErrorPayload { code, message }
        });

        let result = object.get("result").cloned();

        const RESERVED: [&str; 4] = ["jsonrpc", "id", "result", "error"];
        let root_extras = object
            .iter()
            .filter(|(key, _)| !RESERVED.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(JsonRpcResponse { id: id as u32, result, error, root_extras })
    }

    /// Checks the response id against `expected`, converting a mismatch to
    /// [`ProtocolError::IdMismatch`] and a populated `error` field to
    /// [`ProtocolError::RemoteError`].
    pub fn into_checked(self, expected: u32) -> Result<JsonRpcResponse> {
        if self.id != expected {
            return Err(ProtocolError::IdMismatch { expected, got: self.id });
        }
        if let Some(err) = &self.error {
            return Err(ProtocolError::RemoteError { code: err.code, message: err.message.clone() });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trips_through_serialize_then_parse() {
        let req = JsonRpcRequest::new(7, "get", Some(json!(["mtu", "sensorName"])));
        let bytes = req.to_bytes().unwrap();
        let parsed: JsonRpcRequest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn standard_shape_result_is_extracted() {
        let bytes = br#"{"jsonrpc":"2.0","id":2,"result":"ok"}"#;
        let resp = JsonRpcResponse::parse(bytes).unwrap();
        assert_eq!(resp.id, 2);
        assert_eq!(resp.result, Some(json!("ok")));
        assert!(resp.root_extras.is_empty());
    }

    #[test]
    fn root_level_shape_collects_extra_keys() {
        let bytes = br#"{"jsonrpc":"2.0","id":2,"mtu":244,"sensorName":"DTT-34179","result":"ok"}"#;
        let resp = JsonRpcResponse::parse(bytes).unwrap();
        assert_eq!(resp.root_extras.get("mtu"), Some(&json!(244)));
        assert_eq!(resp.root_extras.get("sensorName"), Some(&json!("DTT-34179")));
    }

    #[test]
    fn id_mismatch_is_a_protocol_error() {
        let bytes = br#"{"jsonrpc":"2.0","id":8,"result":"ok"}"#;
        let resp = JsonRpcResponse::parse(bytes).unwrap();
        let err = resp.into_checked(7).unwrap_err();
        assert!(matches!(err, ProtocolError::IdMismatch { expected: 7, got: 8 }));
    }

    #[test]
    fn error_payload_becomes_remote_error() {
        let bytes = br#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"busy"}}"#;
        let resp = JsonRpcResponse::parse(bytes).unwrap();
        let err = resp.into_checked(1).unwrap_err();
        assert!(matches!(err, ProtocolError::RemoteError { code: -32000, .. }));
    }
}
