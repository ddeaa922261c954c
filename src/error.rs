//! Error taxonomy for the fleet monitor engine.
//!
//! Network and payload errors are recovered inside the fetcher and never abort
//! a poll cycle. Registry and validation errors surface to the caller of the
//! mutating operation.

use std::path::PathBuf;
use thiserror::Error;

/// Caller supplied invalid host fields. Raised before any mutation happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field '{0}' must not be empty")]
    BlankField(&'static str),

    #[error("port must be between 1 and 65535")]
    InvalidPort,

    #[error("'{0}' is not a valid address")]
    InvalidAddress(String),

    #[error("host {0} is already registered")]
    Duplicate(String),
}

/// Errors produced by the durable host registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize roster: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single remote call.
///
/// `Fetcher::fetch` never returns these; they are folded into the snapshot
/// either as an unreachable host or as a defaulted metric family.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("host unreachable: {0}")]
    Unreachable(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    #[error("malformed {family} payload: {reason}")]
    MalformedPayload { family: &'static str, reason: String },
}

impl FetchError {
    /// Server-side errors and transient network failures are worth another
    /// attempt. Client errors and schema violations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status(code) => matches!(code, 500 | 502 | 503 | 504),
            FetchError::Timeout => true,
            FetchError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetchError::Unreachable(_) => false,
            FetchError::MalformedPayload { .. } => false,
        }
    }
}

/// Errors returned by the fleet service intent dispatcher.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("refresh interval must be at least 1 second, got {0}")]
    InvalidInterval(u64),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] FetchError),
}

impl From<ValidationError> for ServiceError {
    fn from(e: ValidationError) -> Self {
        ServiceError::Registry(RegistryError::Validation(e))
    }
}
