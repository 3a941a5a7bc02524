//! Client error types

use branchkv_core::rpc::ErrorBody;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Code reported for transport failures
pub const PEER_UNREACHABLE: &str = "PeerUnreachable";

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request error (connect, timeout, body)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error reported by the server
    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Build an API error from a response body
    pub fn from_body(text: &str, status: u16) -> Self {
        match serde_json::from_str::<ErrorBody>(text) {
            Ok(body) => Self::Api {
                status,
                code: body.code,
                message: body.message,
                request_id: body.request_id,
            },
            Err(_) => Self::Api {
                status,
                code: format!("HTTP{}", status),
                message: if text.is_empty() {
                    "Unknown error".to_string()
                } else {
                    text.to_string()
                },
                request_id: None,
            },
        }
    }

    /// Error code, transport failures report `PeerUnreachable`
    pub fn code(&self) -> &str {
        match self {
            Self::Http(_) => PEER_UNREACHABLE,
            Self::Api { code, .. } => code,
            Self::Config(_) => "InvalidRequest",
            Self::InvalidResponse(_) => "InternalError",
        }
    }

    /// Check if the peer could not be reached
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_decode() && !e.is_status(),
            Self::Api { code, .. } => code == PEER_UNREACHABLE,
            _ => false,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
