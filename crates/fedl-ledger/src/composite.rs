//! Composite key encoding for secondary indices
//!
//! An index entry is a plain ledger key built from an index name and an
//! ordered attribute tuple:
//!
//! ```text
//! \0{index}\0{attr_1}\0{attr_2}\0 ... {attr_n}\0
//! ```
//!
//! The leading separator keeps index entries out of the way of asset keys,
//! and terminating every attribute makes prefix scans exact: scanning for
//! `["ab"]` never returns entries indexed under `["abc"]`. By convention the
//! last attribute is the key of the indexed entity.

use crate::error::{LedgerError, Result};
use fedl_types::KEY_SEPARATOR;

/// Build the full key of an index entry
pub fn build_composite_key(index: &str, attributes: &[&str]) -> Result<String> {
    if attributes.is_empty() {
        return Err(LedgerError::InvalidKey(format!(
            "index entry for {} needs at least one attribute",
            index
        )));
    }
    build_prefix(index, attributes)
}

/// Build the scan prefix for every entry of `index` whose leading attributes equal `attributes`
pub fn build_prefix(index: &str, attributes: &[&str]) -> Result<String> {
    validate_part(index)?;
    if index.is_empty() {
        return Err(LedgerError::InvalidKey("index name must not be empty".to_string()));
    }

    let mut key = String::with_capacity(
        2 + index.len() + attributes.iter().map(|a| a.len() + 1).sum::<usize>(),
    );
    key.push(KEY_SEPARATOR);
    key.push_str(index);
    key.push(KEY_SEPARATOR);
    for attribute in attributes {
        validate_part(attribute)?;
        key.push_str(attribute);
        key.push(KEY_SEPARATOR);
    }
    Ok(key)
}

/// Split an index entry key back into its index name and attributes
pub fn split_composite_key(key: &str) -> Option<(String, Vec<String>)> {
    let body = key.strip_prefix(KEY_SEPARATOR)?.strip_suffix(KEY_SEPARATOR)?;
    let mut parts = body.split(KEY_SEPARATOR);
    let index = parts.next()?.to_string();
    let attributes: Vec<String> = parts.map(str::to_string).collect();
    if index.is_empty() || attributes.is_empty() {
        return None;
    }
    Some((index, attributes))
}

pub(crate) fn is_composite_key(key: &str) -> bool {
    key.starts_with(KEY_SEPARATOR)
}

fn validate_part(part: &str) -> Result<()> {
    if part.contains(KEY_SEPARATOR) {
        return Err(LedgerError::InvalidKey(format!(
            "{:?} contains the reserved separator",
            part
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let key = build_composite_key("traintuple~worker~status~key", &["orgA", "todo", "k1"]).unwrap();
        let (index, attributes) = split_composite_key(&key).unwrap();
        assert_eq!(index, "traintuple~worker~status~key");
        assert_eq!(attributes, vec!["orgA", "todo", "k1"]);
    }

    #[test]
    fn test_prefix_is_exact_per_attribute() {
        let prefix = build_prefix("idx", &["ab"]).unwrap();
        let matching = build_composite_key("idx", &["ab", "k"]).unwrap();
        let other = build_composite_key("idx", &["abc", "k"]).unwrap();
        assert!(matching.starts_with(&prefix));
        assert!(!other.starts_with(&prefix));
    }

    #[test]
    fn test_rejects_separator_and_empty() {
        assert!(build_composite_key("idx", &["a\u{0}b"]).is_err());
        assert!(build_composite_key("idx", &[]).is_err());
        assert!(build_prefix("", &["a"]).is_err());
    }

    #[test]
    fn test_plain_keys_are_not_composite() {
        assert!(split_composite_key("plain-key").is_none());
        assert!(!is_composite_key("plain-key"));
    }
}
