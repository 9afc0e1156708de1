use tablebroker_core::{CoreError, ErrorResponse};
use thiserror::Error;

/// Broker specific errors
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Instance conflict: {0}")]
    Conflict(String),
    #[error("Instance not found: {0}")]
    NotFound(String),
    #[error("Backend failure: {0}")]
    BackendFailure(String),
    #[error("Not implemented: {0}")]
    NotImplemented(String),
    #[error("Storage error: {0}")]
    StorageError(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl BrokerError {
    /// HTTP status the protocol skeleton should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            BrokerError::InvalidRequest(_) | BrokerError::InvalidParameters(_) => 400,
            BrokerError::NotFound(_) => 404,
            BrokerError::Conflict(_) => 409,
            BrokerError::NotImplemented(_) => 501,
            BrokerError::BackendFailure(_) => 502,
            BrokerError::StorageError(_) | BrokerError::Configuration(_) => 500,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BrokerError::InvalidRequest(_) => "INVALID_REQUEST",
            BrokerError::InvalidParameters(_) => "INVALID_PARAMETERS",
            BrokerError::Conflict(_) => "CONFLICT",
            BrokerError::NotFound(_) => "NOT_FOUND",
            BrokerError::BackendFailure(_) => "BACKEND_FAILURE",
            BrokerError::NotImplemented(_) => "NOT_IMPLEMENTED",
            BrokerError::StorageError(_) => "STORAGE_ERROR",
            BrokerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    fn message(&self) -> &str {
        match self {
            BrokerError::InvalidRequest(msg)
            | BrokerError::InvalidParameters(msg)
            | BrokerError::Conflict(msg)
            | BrokerError::NotFound(msg)
            | BrokerError::BackendFailure(msg)
            | BrokerError::NotImplemented(msg)
            | BrokerError::StorageError(msg)
            | BrokerError::Configuration(msg) => msg,
        }
    }
}

impl From<CoreError> for BrokerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidParameters(msg) => BrokerError::InvalidParameters(msg),
            CoreError::InvalidConnection(msg) | CoreError::SerializationError(msg) => {
                BrokerError::Configuration(msg)
            }
            CoreError::Backend(msg) => BrokerError::BackendFailure(msg),
            CoreError::Timeout(msg) => BrokerError::BackendFailure(format!("timed out: {msg}")),
        }
    }
}

impl From<BrokerError> for ErrorResponse {
    fn from(err: BrokerError) -> Self {
        ErrorResponse::new(err.status_code(), err.error_code(), err.message())
    }
}

pub type BrokerResult<T> = std::result::Result<T, BrokerError>;
