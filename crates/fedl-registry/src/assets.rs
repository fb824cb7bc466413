//! Datasets, objectives and algorithms referenced by tuples.
//!
//! Plain registrations without a lifecycle: created once by their owner,
//! never mutated afterwards.

use crate::error::{RegistryError, Result};
use crate::index::{
    ALGO_OWNER_INDEX, DATA_MANAGER_OWNER_INDEX, DATA_SAMPLE_BY_MANAGER_INDEX,
    OBJECTIVE_OWNER_INDEX,
};
use crate::permissions::{new_permissions, Permissions, PermissionsInput};
use crate::store::{ensure_absent, get_record, put_record, validate_key, AssetType};
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataManager {
    pub key: String,
    pub owner: OrgId,
    pub name: String,
    pub objective_key: Option<String>,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSample {
    pub key: String,
    pub owner: OrgId,
    pub data_manager_keys: Vec<String>,
    pub test_only: bool,
}

/// Data manager plus an explicit list of its samples
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub data_manager_key: String,
    pub data_sample_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    pub key: String,
    pub owner: OrgId,
    pub name: String,
    pub test_dataset: Option<Dataset>,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AlgoKind {
    Algo,
    CompositeAlgo,
    AggregateAlgo,
}

impl fmt::Display for AlgoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgoKind::Algo => "algo",
            AlgoKind::CompositeAlgo => "compositeAlgo",
            AlgoKind::AggregateAlgo => "aggregateAlgo",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Algo {
    pub key: String,
    pub owner: OrgId,
    pub name: String,
    pub kind: AlgoKind,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataManagerInput {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub objective_key: Option<String>,
    #[serde(default)]
    pub permissions: PermissionsInput,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSampleInput {
    pub keys: Vec<String>,
    pub data_manager_keys: Vec<String>,
    #[serde(default)]
    pub test_only: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveInput {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub test_dataset: Option<Dataset>,
    #[serde(default)]
    pub permissions: PermissionsInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlgoInput {
    pub key: String,
    pub name: String,
    pub kind: AlgoKind,
    #[serde(default)]
    pub permissions: PermissionsInput,
}

pub async fn register_data_manager(
    ledger: &mut dyn Ledger,
    input: &DataManagerInput,
) -> Result<DataManager> {
    validate_key(&input.key, "data manager key")?;
    ensure_absent(ledger, &input.key).await?;
    if let Some(objective_key) = &input.objective_key {
        get_objective(ledger, objective_key).await?;
    }

    let owner = ledger.tx_creator().clone();
    let data_manager = DataManager {
        key: input.key.clone(),
        owner: owner.clone(),
        name: input.name.clone(),
        objective_key: input.objective_key.clone(),
        permissions: new_permissions(&input.permissions, &owner),
    };
    put_record(ledger, &data_manager.key, AssetType::DataManager, &data_manager).await?;
    ledger
        .create_index_entry(DATA_MANAGER_OWNER_INDEX, &[owner.as_str(), data_manager.key.as_str()])
        .await?;

    info!(key = %data_manager.key, owner = %owner, "🗄️ Data manager registered");
    Ok(data_manager)
}

/// Register a batch of samples shared by every listed data manager
pub async fn register_data_samples(
    ledger: &mut dyn Ledger,
    input: &DataSampleInput,
) -> Result<Vec<DataSample>> {
    if input.keys.is_empty() {
        return Err(RegistryError::bad_request("no data sample keys given"));
    }
    if input.data_manager_keys.is_empty() {
        return Err(RegistryError::bad_request("data samples need a data manager"));
    }
    let unique: BTreeSet<&String> = input.keys.iter().collect();
    if unique.len() != input.keys.len() {
        return Err(RegistryError::bad_request("duplicate data sample keys"));
    }

    let owner = ledger.tx_creator().clone();
    for data_manager_key in &input.data_manager_keys {
        let data_manager = get_data_manager(ledger, data_manager_key).await?;
        if data_manager.owner != owner {
            return Err(RegistryError::forbidden(format!(
                "{} does not own data manager {}",
                owner, data_manager_key
            )));
        }
    }
    for key in &input.keys {
        validate_key(key, "data sample key")?;
        ensure_absent(ledger, key).await?;
    }

    let mut samples = Vec::with_capacity(input.keys.len());
    for key in &input.keys {
        let sample = DataSample {
            key: key.clone(),
            owner: owner.clone(),
            data_manager_keys: input.data_manager_keys.clone(),
            test_only: input.test_only,
        };
        put_record(ledger, key, AssetType::DataSample, &sample).await?;
        for data_manager_key in &input.data_manager_keys {
            ledger
                .create_index_entry(DATA_SAMPLE_BY_MANAGER_INDEX, &[data_manager_key.as_str(), key.as_str()])
                .await?;
        }
        samples.push(sample);
    }

    info!(count = samples.len(), owner = %owner, test_only = input.test_only, "🗄️ Data samples registered");
    Ok(samples)
}

pub async fn register_objective(ledger: &mut dyn Ledger, input: &ObjectiveInput) -> Result<Objective> {
    validate_key(&input.key, "objective key")?;
    ensure_absent(ledger, &input.key).await?;
    if let Some(test_dataset) = &input.test_dataset {
        let summary = check_dataset(ledger, test_dataset).await?;
        if !summary.all_test_only {
            return Err(RegistryError::bad_request(
                "objective test dataset may only contain test-only samples",
            ));
        }
    }

    let owner = ledger.tx_creator().clone();
    let objective = Objective {
        key: input.key.clone(),
        owner: owner.clone(),
        name: input.name.clone(),
        test_dataset: input.test_dataset.clone(),
        permissions: new_permissions(&input.permissions, &owner),
    };
    put_record(ledger, &objective.key, AssetType::Objective, &objective).await?;
    ledger
        .create_index_entry(OBJECTIVE_OWNER_INDEX, &[owner.as_str(), objective.key.as_str()])
        .await?;

    info!(key = %objective.key, owner = %owner, "🎯 Objective registered");
    Ok(objective)
}

pub async fn register_algo(ledger: &mut dyn Ledger, input: &AlgoInput) -> Result<Algo> {
    validate_key(&input.key, "algo key")?;
    ensure_absent(ledger, &input.key).await?;

    let owner = ledger.tx_creator().clone();
    let algo = Algo {
        key: input.key.clone(),
        owner: owner.clone(),
        name: input.name.clone(),
        kind: input.kind,
        permissions: new_permissions(&input.permissions, &owner),
    };
    put_record(ledger, &algo.key, AssetType::Algo, &algo).await?;
    ledger
        .create_index_entry(ALGO_OWNER_INDEX, &[owner.as_str(), algo.key.as_str()])
        .await?;

    info!(key = %algo.key, owner = %owner, kind = %algo.kind, "🧮 Algo registered");
    Ok(algo)
}

pub async fn get_data_manager(ledger: &dyn Ledger, key: &str) -> Result<DataManager> {
    get_record(ledger, key, AssetType::DataManager).await
}

pub async fn get_data_sample(ledger: &dyn Ledger, key: &str) -> Result<DataSample> {
    get_record(ledger, key, AssetType::DataSample).await
}

pub async fn get_objective(ledger: &dyn Ledger, key: &str) -> Result<Objective> {
    get_record(ledger, key, AssetType::Objective).await
}

/// Algo of the expected kind. Any other kind reads as `NotFound`.
pub async fn get_algo(ledger: &dyn Ledger, key: &str, kind: AlgoKind) -> Result<Algo> {
    let algo: Algo = get_record(ledger, key, AssetType::Algo).await?;
    if algo.kind != kind {
        return Err(RegistryError::not_found(format!("{} {} not found", kind, key)));
    }
    Ok(algo)
}

/// Sample keys registered under a data manager, split into train and test
pub async fn query_dataset(ledger: &dyn Ledger, data_manager_key: &str) -> Result<DatasetView> {
    let data_manager = get_data_manager(ledger, data_manager_key).await?;
    let mut view = DatasetView {
        data_manager,
        train_data_sample_keys: Vec::new(),
        test_data_sample_keys: Vec::new(),
    };
    for key in ledger
        .scan_index(DATA_SAMPLE_BY_MANAGER_INDEX, &[data_manager_key])
        .await?
    {
        let sample = get_data_sample(ledger, &key).await?;
        if sample.test_only {
            view.test_data_sample_keys.push(key);
        } else {
            view.train_data_sample_keys.push(key);
        }
    }
    Ok(view)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetView {
    pub data_manager: DataManager,
    pub train_data_sample_keys: Vec<String>,
    pub test_data_sample_keys: Vec<String>,
}

pub async fn query_algos(ledger: &dyn Ledger) -> Result<Vec<Algo>> {
    let mut algos = Vec::new();
    for key in ledger.scan_index(ALGO_OWNER_INDEX, &[]).await? {
        algos.push(get_record(ledger, &key, AssetType::Algo).await?);
    }
    Ok(algos)
}

pub async fn query_data_managers(ledger: &dyn Ledger) -> Result<Vec<DataManager>> {
    let mut data_managers = Vec::new();
    for key in ledger.scan_index(DATA_MANAGER_OWNER_INDEX, &[]).await? {
        data_managers.push(get_data_manager(ledger, &key).await?);
    }
    Ok(data_managers)
}

pub async fn query_objectives(ledger: &dyn Ledger) -> Result<Vec<Objective>> {
    let mut objectives = Vec::new();
    for key in ledger.scan_index(OBJECTIVE_OWNER_INDEX, &[]).await? {
        objectives.push(get_objective(ledger, &key).await?);
    }
    Ok(objectives)
}

/// Result of validating a dataset reference
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    pub data_manager: DataManager,
    pub all_test_only: bool,
    pub any_test_only: bool,
}

/// Check that every sample exists, appears once and belongs to the data manager
pub async fn check_dataset(ledger: &dyn Ledger, dataset: &Dataset) -> Result<DatasetSummary> {
    let data_manager = get_data_manager(ledger, &dataset.data_manager_key).await?;
    if dataset.data_sample_keys.is_empty() {
        return Err(RegistryError::bad_request("dataset has no data samples"));
    }
    let unique: BTreeSet<&String> = dataset.data_sample_keys.iter().collect();
    if unique.len() != dataset.data_sample_keys.len() {
        return Err(RegistryError::bad_request("duplicate data samples"));
    }

    let mut all_test_only = true;
    let mut any_test_only = false;
    for key in &dataset.data_sample_keys {
        let sample = get_data_sample(ledger, key).await?;
        if !sample.data_manager_keys.contains(&dataset.data_manager_key) {
            return Err(RegistryError::bad_request(format!(
                "data sample {} does not belong to data manager {}",
                key, dataset.data_manager_key
            )));
        }
        all_test_only &= sample.test_only;
        any_test_only |= sample.test_only;
    }

    Ok(DatasetSummary {
        data_manager,
        all_test_only,
        any_test_only,
    })
}
