use std::fmt;

use uuid::Uuid;

/// The crate-wide error taxonomy for the BLE session core.
///
/// Each variant corresponds to one row of the error-kind table in the spec: origin and
/// recovery policy are documented at the call sites that raise it, not here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no usable Bluetooth adapter is available")]
    AdapterUnavailable,

    #[error("device address was never set on this session")]
    AddressUnset,

    #[error("connection failed after {attempts} attempt(s)")]
    ConnectionFailed { attempts: u32 },

    #[error("session is busy with another operation")]
    Busy,

    #[error("operation timed out")]
    Timeout,

    #[error("response id {got} did not match request id {expected}")]
    ProtocolMismatch { expected: u32, got: u32 },

    #[error("remote device reported error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("failed to parse data: {0}")]
    DataParse(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("invalid argument or programmer error: {0}")]
    Invalid(String),

    #[error("GATT characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: Uuid },

    #[error("GATT service {uuid} not found")]
    ServiceNotFound { uuid: Uuid },

    #[error("underlying BLE transport error: {0}")]
    Transport(#[from] btleplug::Error),
}

impl Error {
    pub fn data_parse(msg: impl fmt::Display) -> Self {
        Error::DataParse(msg.to_string())
    }

    pub fn invalid(msg: impl fmt::Display) -> Self {
        Error::Invalid(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
