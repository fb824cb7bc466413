use thiserror::Error;

#[derive(Error, Debug)]
pub enum TypesError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid JSON structure: {0}")]
    InvalidStructure(String),
}

impl From<serde_json::Error> for TypesError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TypesError>;
