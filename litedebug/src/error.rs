use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors returned by the node JSON-RPC client
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("Connection failed: {0}")]
    Connect(reqwest::Error),
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP error {status}: {reason}")]
    Http { status: u16, reason: String },
    // Rendered as the node's own message so callers can match on its text
    #[error("RPC error {code}: {message}")]
    Server { code: i64, message: String },
    #[error("Invalid response for {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: SerdeError,
    },
}

impl RpcError {
    /// JSON-RPC error code, if the node answered with an error object
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The server-provided message, if any
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Server { message, .. } => Some(message),
            _ => None,
        }
    }
}
