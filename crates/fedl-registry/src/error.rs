use fedl_ledger::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Error class surfaced at the dispatch boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

impl ErrorKind {
    /// HTTP-equivalent status code reported to the submitter
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Internal => 500,
        }
    }
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::BadRequest(_) => ErrorKind::BadRequest,
            RegistryError::NotFound(_) | RegistryError::Ledger(LedgerError::NotFound(_)) => {
                ErrorKind::NotFound
            }
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::Forbidden(_) => ErrorKind::Forbidden,
            RegistryError::Ledger(LedgerError::InvalidKey(_)) => ErrorKind::BadRequest,
            RegistryError::Internal(_)
            | RegistryError::Ledger(_)
            | RegistryError::Serialization(_) => ErrorKind::Internal,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<fedl_types::TypesError> for RegistryError {
    fn from(e: fedl_types::TypesError) -> Self {
        match e {
            fedl_types::TypesError::InvalidIdentifier(msg) => Self::BadRequest(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}
