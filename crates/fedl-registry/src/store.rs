//! Typed records on top of the raw ledger.
//!
//! Every value is wrapped in an envelope naming its asset type so that a key
//! holding an algo can never be read back as a tuple.

use crate::error::{RegistryError, Result};
use fedl_ledger::{Ledger, LedgerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    DataManager,
    DataSample,
    Objective,
    Algo,
    Traintuple,
    CompositeTraintuple,
    Aggregatetuple,
    Testtuple,
    ComputePlan,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::DataManager => "dataManager",
            AssetType::DataSample => "dataSample",
            AssetType::Objective => "objective",
            AssetType::Algo => "algo",
            AssetType::Traintuple => "traintuple",
            AssetType::CompositeTraintuple => "compositeTraintuple",
            AssetType::Aggregatetuple => "aggregatetuple",
            AssetType::Testtuple => "testtuple",
            AssetType::ComputePlan => "computePlan",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a, T> {
    asset_type: AssetType,
    body: &'a T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    asset_type: AssetType,
    body: serde_json::Value,
}

/// Write `record` under `key`, replacing any previous value
pub async fn put_record<T: Serialize + Sync>(
    ledger: &mut dyn Ledger,
    key: &str,
    asset_type: AssetType,
    record: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(&EnvelopeRef {
        asset_type,
        body: record,
    })?;
    ledger.put(key, bytes).await?;
    Ok(())
}

/// Read the record of `asset_type` stored under `key`.
///
/// Missing keys and keys holding another asset type are both `NotFound`.
pub async fn get_record<T: DeserializeOwned>(
    ledger: &dyn Ledger,
    key: &str,
    asset_type: AssetType,
) -> Result<T> {
    let envelope = match read_envelope(ledger, key).await? {
        Some(envelope) if envelope.asset_type == asset_type => envelope,
        _ => {
            return Err(RegistryError::not_found(format!(
                "{} {} not found",
                asset_type, key
            )))
        }
    };
    Ok(serde_json::from_value(envelope.body)?)
}

/// Asset type stored under `key`, if any
pub async fn asset_type_of(ledger: &dyn Ledger, key: &str) -> Result<Option<AssetType>> {
    Ok(read_envelope(ledger, key).await?.map(|e| e.asset_type))
}

/// Fail with `Conflict` when anything is already stored under `key`
pub async fn ensure_absent(ledger: &dyn Ledger, key: &str) -> Result<()> {
    if ledger.exists(key).await? {
        return Err(RegistryError::conflict(format!("key {} already exists", key)));
    }
    Ok(())
}

async fn read_envelope(ledger: &dyn Ledger, key: &str) -> Result<Option<Envelope>> {
    match ledger.get(key).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(LedgerError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Reject identifiers the ledger would refuse as plain keys
pub fn validate_key(key: &str, what: &str) -> Result<()> {
    if key.is_empty() {
        return Err(RegistryError::bad_request(format!("{} must not be empty", what)));
    }
    if key.contains(fedl_types::KEY_SEPARATOR) {
        return Err(RegistryError::bad_request(format!(
            "{} {:?} contains a reserved character",
            what, key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use fedl_ledger::{MemoryBackend, TxContext};
    use fedl_types::OrgId;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
    }

    fn ctx() -> TxContext {
        TxContext::new(Arc::new(MemoryBackend::new()), OrgId::from("orgA"), "tx-1")
    }

    #[tokio::test]
    async fn test_record_round_trip() {
        let mut ledger = ctx();
        let record = Sample { name: "a".into() };
        put_record(&mut ledger, "k1", AssetType::Algo, &record).await.unwrap();

        let loaded: Sample = get_record(&ledger, "k1", AssetType::Algo).await.unwrap();
        assert_eq!(loaded, record);
        assert_eq!(asset_type_of(&ledger, "k1").await.unwrap(), Some(AssetType::Algo));
    }

    #[tokio::test]
    async fn test_wrong_asset_type_is_not_found() {
        let mut ledger = ctx();
        put_record(&mut ledger, "k1", AssetType::Algo, &Sample { name: "a".into() })
            .await
            .unwrap();

        let err = get_record::<Sample>(&ledger, "k1", AssetType::Traintuple)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_ensure_absent() {
        let mut ledger = ctx();
        assert!(ensure_absent(&ledger, "k1").await.is_ok());
        put_record(&mut ledger, "k1", AssetType::Algo, &Sample { name: "a".into() })
            .await
            .unwrap();
        let err = ensure_absent(&ledger, "k1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc", "key").is_ok());
        assert!(validate_key("", "key").is_err());
        assert!(validate_key("a\u{0}b", "key").is_err());
    }
}
