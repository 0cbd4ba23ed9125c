//! Error types for handshake-daemon

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use handshake_types::{ErrorCode, InvalidSessionId};
use serde::Serialize;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Server startup error
    #[error("Server error: {0}")]
    Server(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend cannot be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error
    #[error("Query error: {0}")]
    Query(String),

    /// Stored value could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Query(_))
    }
}

/// Identity-wallet collaborator errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// The submitted token failed validation
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// The wallet service could not be reached
    #[error("Identity wallet unavailable: {0}")]
    Unavailable(String),

    /// The token could not be decoded at all
    #[error("Malformed token: {0}")]
    Malformed(String),
}

/// Failure taxonomy of the handshake operations
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Session store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Identity wallet unavailable: {0}")]
    AdapterUnavailable(String),

    #[error("Unknown session: {0}")]
    SessionNotFound(String),

    #[error("Session already completed: {0}")]
    AlreadyCompleted(String),

    #[error("Malformed input: {0}")]
    Malformed(String),
}

impl HandshakeError {
    /// Error code reported on a realtime channel
    pub fn channel_code(&self) -> ErrorCode {
        match self {
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
            Self::AdapterUnavailable(_) => ErrorCode::AdapterUnavailable,
            Self::InvalidCredential(_) | Self::Malformed(_) => ErrorCode::InvalidCredential,
            Self::SessionNotFound(_) | Self::AlreadyCompleted(_) => ErrorCode::Internal,
        }
    }
}

impl From<StorageError> for HandshakeError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidData(msg) => Self::Malformed(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<WalletError> for HandshakeError {
    fn from(e: WalletError) -> Self {
        match e {
            WalletError::InvalidCredential(msg) => Self::InvalidCredential(msg),
            WalletError::Malformed(msg) => Self::InvalidCredential(msg),
            WalletError::Unavailable(msg) => Self::AdapterUnavailable(msg),
        }
    }
}

/// API-specific errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Handshake failure
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
}

impl From<InvalidSessionId> for ApiError {
    fn from(e: InvalidSessionId) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<WalletError> for ApiError {
    fn from(e: WalletError) -> Self {
        ApiError::Handshake(e.into())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Handshake(e) => match e {
                HandshakeError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
                }
                HandshakeError::AdapterUnavailable(_) => {
                    (StatusCode::BAD_GATEWAY, "ADAPTER_UNAVAILABLE")
                }
                HandshakeError::InvalidCredential(_) => {
                    (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIAL")
                }
                HandshakeError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                HandshakeError::AlreadyCompleted(_) => (StatusCode::CONFLICT, "ALREADY_COMPLETED"),
                HandshakeError::Malformed(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            },
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, code, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Result type alias for handshake operations
pub type HandshakeResult<T> = Result<T, HandshakeError>;
