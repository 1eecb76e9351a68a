//! Result and error types for the core library

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::transfer::TransferStatus;

/// Core library error type
///
/// The first six variants are the transfer taxonomy callers are expected to
/// branch on. None of them leaves persisted state half-written.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Receiver not found: {0}")]
    ReceiverNotFound(String),

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Invalid state: transfer is {0}")]
    InvalidState(TransferStatus),

    /// Persistence failed mid-settlement and was rolled back; safe to retry.
    #[error("Settlement failed: {0}")]
    SettlementFailed(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid transfer error
    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Self::InvalidTransfer(msg.into())
    }

    /// Stable machine-readable code, used in JSON output and the event log
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidTransfer(_) => "INVALID_TRANSFER",
            Error::ReceiverNotFound(_) => "RECEIVER_NOT_FOUND",
            Error::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::InvalidState(_) => "INVALID_STATE",
            Error::SettlementFailed(_) => "SETTLEMENT_FAILED",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Validation(_) => "VALIDATION",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Json(_) => "JSON_ERROR",
            Error::Other(_) => "ERROR",
        }
    }

    /// True when the caller sent something wrong, as opposed to a system fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidTransfer(_)
                | Error::ReceiverNotFound(_)
                | Error::InsufficientFunds
                | Error::Forbidden(_)
                | Error::InvalidState(_)
                | Error::NotFound(_)
                | Error::Validation(_)
        )
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result envelope (serialized by the CLI's --json mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: None,
        }
    }

    /// Create a failed result carrying the error's code
    pub fn from_error(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            code: Some(error.code().to_string()),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::from_error(&e),
        }
    }
}
