pub mod canonical_json;
pub mod error;
pub mod id;

pub use canonical_json::{canonical_hash, content_key, to_canonical_json};
pub use error::{Result, TypesError};
pub use id::OrgId;

/// Length in hex characters of a content-derived key.
pub const CONTENT_KEY_LEN: usize = 64;

/// Separator reserved by composite index keys. Identifiers may never contain it.
pub const KEY_SEPARATOR: char = '\u{0}';
