use crate::{TypesError, KEY_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an organization taking part in the federation.
///
/// Organizations own assets, submit tuples and execute them. The value comes
/// from the transaction credential and is compared byte for byte.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrgId(String);

impl OrgId {
    pub fn new(id: impl Into<String>) -> Result<Self, TypesError> {
        let id = id.into();
        if id.is_empty() {
            return Err(TypesError::InvalidIdentifier(
                "organization id must not be empty".to_string(),
            ));
        }
        if id.contains(KEY_SEPARATOR) {
            return Err(TypesError::InvalidIdentifier(format!(
                "organization id {:?} contains a reserved separator",
                id
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrgId({})", self.0)
    }
}

impl fmt::Display for OrgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrgId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for OrgId {
    /// Unchecked conversion for literals in tests and fixtures.
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
