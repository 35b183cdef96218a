use gateway_core::error::Error as CoreError;

/// JSON-RPC and log/advertisement-parsing specific errors, kept separate from
/// [`gateway_core::Error`] so parse failures don't have to squeeze into the session
/// core's taxonomy; convertible into it at the boundary where a `Sensor` impl reports
/// back to a worker.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed JSON-RPC payload: {0}")]
    Malformed(String),

    #[error("response id {got} did not match request id {expected}")]
    IdMismatch { expected: u32, got: u32 },

    #[error("device reported error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("timed out waiting for a response")]
    Timeout,

    #[error("underlying session error: {0}")]
    Session(#[from] CoreError),
}

impl From<ProtocolError> for CoreError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Malformed(msg) => CoreError::DataParse(msg),
            ProtocolError::IdMismatch { expected, got } => CoreError::ProtocolMismatch { expected, got },
            ProtocolError::RemoteError { code, message } => CoreError::RemoteError { code, message },
            ProtocolError::Timeout => CoreError::Timeout,
            ProtocolError::Session(err) => err,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
