use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A typed failure with a short code, as the host expects to see it.
///
/// Node code can return one of these (wrapped in `anyhow`) to control the code
/// the host receives instead of the generic `Err.Unknown`.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RpcError {
    pub code: String,
    pub message: String,
}

impl RpcError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// `{"code":..,"message":..}`, the payload carried in the RPC error.
    pub fn serialize(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| {
                format!(r#"{{"code":"{}","message":"{}"}}"#, self.code, self.message)
            })
    }
}

/// Errors raised by the node runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// No host channel has been established yet.
    #[error("runtime not ready")]
    RuntimeNotReady,

    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),

    #[error("unknown node instance `{0}`")]
    UnknownInstance(String),

    #[error("node instance `{0}` already exists")]
    DuplicateInstance(String),

    #[error("malformed config: {0}")]
    MalformedConfig(String),

    /// A referenced spillover file is missing.
    #[error("large message object `{0}` not found")]
    LmoNotFound(String),

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("compression failure: {0}")]
    Compression(String),

    #[error("host rpc failure: {0}")]
    HostRpc(String),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    pub fn code(&self) -> &str {
        match self {
            Error::RuntimeNotReady => "Err.RuntimeNotReady",
            Error::UnknownNodeType(_) => "Err.UnknownNodeType",
            Error::UnknownInstance(_) => "Err.UnknownInstance",
            Error::DuplicateInstance(_) => "Err.DuplicateInstance",
            Error::MalformedConfig(_) => "Err.MalformedConfig",
            Error::LmoNotFound(_) => "Err.LMONotFound",
            Error::Serialization(_) => "Err.Serialization",
            Error::Compression(_) => "Err.Compression",
            Error::HostRpc(_) => "Err.HostRpc",
            Error::Rpc(err) => &err.code,
            Error::Unknown(_) => "Err.Unknown",
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            Error::Rpc(err) => err.clone(),
            other => RpcError::new(other.code(), other.to_string()),
        }
    }

    /// Converts any failure coming out of node code into a typed error.
    ///
    /// Failures that already carry a code keep it; everything else becomes
    /// `Err.Unknown` carrying the original message.
    pub fn from_anyhow(err: anyhow::Error) -> Error {
        match err.downcast::<Error>() {
            Ok(err) => err,
            Err(err) => match err.downcast::<RpcError>() {
                Ok(rpc) => Error::Rpc(rpc),
                Err(err) => Error::Unknown(format!("{err:#}")),
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Unknown(err.to_string())
    }
}
