use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Index entry missing: {0}")]
    IndexEntryMissing(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
