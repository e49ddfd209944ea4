use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Codes carried by `RpcError` when `origin` is `Local`.
pub mod local_code {
    pub const TIMEOUT: i64 = 1;
    pub const ABORT: i64 = 2;
    pub const NO_DATA: i64 = 3;
    pub const REJECTED: i64 = 4;
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ErrorOrigin {
    Server,
    Application,
    Transport,
    Local,
}

impl ErrorOrigin {
    pub fn wire_code(self) -> i64 {
        match self {
            ErrorOrigin::Server => 1,
            ErrorOrigin::Application => 2,
            ErrorOrigin::Transport => 3,
            ErrorOrigin::Local => 4,
        }
    }

    pub fn from_wire_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ErrorOrigin::Server),
            2 => Some(ErrorOrigin::Application),
            3 => Some(ErrorOrigin::Transport),
            4 => Some(ErrorOrigin::Local),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorOrigin::Server => "server",
            ErrorOrigin::Application => "application",
            ErrorOrigin::Transport => "transport",
            ErrorOrigin::Local => "local",
        }
    }
}

impl std::fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call failure classified by where it arose. `request_seq` correlates the
/// error back to the originating request when known.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[error("{origin} error {code}: {message}")]
pub struct RpcError {
    pub origin: ErrorOrigin,
    pub code: i64,
    pub message: String,
    pub request_seq: Option<u64>,
}

impl RpcError {
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        Self::with_origin(ErrorOrigin::Server, code, message)
    }

    pub fn application(code: i64, message: impl Into<String>) -> Self {
        Self::with_origin(ErrorOrigin::Application, code, message)
    }

    pub fn transport(code: i64, message: impl Into<String>) -> Self {
        Self::with_origin(ErrorOrigin::Transport, code, message)
    }

    pub fn local(code: i64, message: impl Into<String>) -> Self {
        Self::with_origin(ErrorOrigin::Local, code, message)
    }

    pub fn with_origin(origin: ErrorOrigin, code: i64, message: impl Into<String>) -> Self {
        Self {
            origin,
            code,
            message: message.into(),
            request_seq: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.request_seq = Some(seq);
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.origin == ErrorOrigin::Local && self.code == local_code::TIMEOUT
    }

    pub fn is_abort(&self) -> bool {
        self.origin == ErrorOrigin::Local && self.code == local_code::ABORT
    }
}

#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RemoteError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("request queue is shut down")]
    QueueClosed,
    #[error("no transport satisfies the request: {0}")]
    NoTransport(String),
    #[error("not supported by transport: {0}")]
    Unsupported(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RemoteError> for RpcError {
    fn from(err: RemoteError) -> Self {
        RpcError::local(local_code::REJECTED, err.to_string())
    }
}
