//! Error types and wire error codes

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use branchkv_client::ClientError;
use branchkv_core::{rpc::ErrorBody, CoreError};
use thiserror::Error;

/// Error codes reported on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    KeyNotFound,
    LocationNotFound,
    VirtualLocationNotFound,
    RangeNotFound,
    LocationCollision,
    ChainTooDeep,
    PeerUnreachable,
    SplitAborted,
    ConflictResolutionFailure,
    InvalidRequest,
    InternalError,
}

impl ErrorCode {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyNotFound => "KeyNotFound",
            Self::LocationNotFound => "LocationNotFound",
            Self::VirtualLocationNotFound => "VirtualLocationNotFound",
            Self::RangeNotFound => "RangeNotFound",
            Self::LocationCollision => "LocationCollision",
            Self::ChainTooDeep => "ChainTooDeep",
            Self::PeerUnreachable => "PeerUnreachable",
            Self::SplitAborted => "SplitAborted",
            Self::ConflictResolutionFailure => "ConflictResolutionFailure",
            Self::InvalidRequest => "InvalidRequest",
            Self::InternalError => "InternalError",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::KeyNotFound | Self::LocationNotFound | Self::VirtualLocationNotFound => {
                StatusCode::NOT_FOUND
            }
            Self::LocationCollision => StatusCode::CONFLICT,
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::PeerUnreachable => StatusCode::BAD_GATEWAY,
            Self::RangeNotFound
            | Self::ChainTooDeep
            | Self::SplitAborted
            | Self::ConflictResolutionFailure
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<&CoreError> for ErrorCode {
    fn from(e: &CoreError) -> Self {
        match e {
            CoreError::KeyNotFound(_) => Self::KeyNotFound,
            CoreError::LocationNotFound(_) => Self::LocationNotFound,
            CoreError::VirtualLocationNotFound { .. } => Self::VirtualLocationNotFound,
            CoreError::RangeNotFound(_) => Self::RangeNotFound,
            CoreError::LocationCollision(_) => Self::LocationCollision,
            CoreError::ChainTooDeep(_) => Self::ChainTooDeep,
            CoreError::RangeOverlap { .. }
            | CoreError::InvalidSplit(_)
            | CoreError::EmptyUpdate
            | CoreError::RootImmutable => Self::InvalidRequest,
        }
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Api { code: ErrorCode, message: String },

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Error reported by a peer, passed through unchanged
    #[error("{message}")]
    Forwarded {
        status: u16,
        code: String,
        message: String,
    },

    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Create an error with an explicit code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Api {
            code,
            message: message.into(),
        }
    }

    /// Create an `InvalidRequest` error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Wire code of the error
    pub fn code(&self) -> &str {
        match self {
            Self::Api { code, .. } => code.as_str(),
            Self::Core(e) => ErrorCode::from(e).as_str(),
            Self::Forwarded { code, .. } => code,
            Self::PeerUnreachable(_) => ErrorCode::PeerUnreachable.as_str(),
            Self::Internal(_) => ErrorCode::InternalError.as_str(),
        }
    }

    /// HTTP status of the error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Api { code, .. } => code.status_code(),
            Self::Core(e) => ErrorCode::from(e).status_code(),
            Self::Forwarded { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::PeerUnreachable(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error is a regular "not found" outcome
    pub fn is_not_found(&self) -> bool {
        self.status() == StatusCode::NOT_FOUND
    }

    /// Express the error the way a remote peer would have reported it
    pub fn into_client_error(self) -> ClientError {
        ClientError::Api {
            status: self.status().as_u16(),
            code: self.code().to_string(),
            message: self.to_string(),
            request_id: None,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Api {
                status,
                code,
                message,
                ..
            } => Self::Forwarded {
                status,
                code,
                message,
            },
            e if e.is_unreachable() => Self::PeerUnreachable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let request_id = uuid::Uuid::new_v4().to_string();
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            request_id: Some(request_id.clone()),
        };

        (status, [("x-request-id", request_id.as_str())], Json(body)).into_response()
    }
}
