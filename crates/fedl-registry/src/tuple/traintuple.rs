use super::{
    authorize_algo, check_in_models, derive_key, load_parent, rank_from_parents,
    status_from_parents, OutModel, TupleCore, TupleKind, TupleVariant,
};
use crate::assets::{check_dataset, AlgoKind, Dataset};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::permissions::{merge_permissions, Permissions};
use async_trait::async_trait;
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trains an algo on one worker's data, optionally starting from parent models
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Traintuple {
    #[serde(flatten)]
    pub core: TupleCore,
    pub dataset: Dataset,
    pub in_model_keys: Vec<String>,
    /// Dataset permissions merged with algo permissions
    pub permissions: Permissions,
    #[serde(default)]
    pub out_model: Option<OutModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraintupleInput {
    #[serde(default)]
    pub key: Option<String>,
    pub algo_key: String,
    pub data_manager_key: String,
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_models: Vec<String>,
    #[serde(default)]
    pub compute_plan_key: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct KeySeed<'a> {
    kind: TupleKind,
    creator: &'a OrgId,
    algo_key: &'a str,
    data_manager_key: &'a str,
    data_sample_keys: &'a [String],
    in_models: &'a [String],
}

#[async_trait]
impl TupleVariant for Traintuple {
    const KIND: TupleKind = TupleKind::Traintuple;

    type Input = TraintupleInput;

    async fn set_from_input(
        ledger: &dyn Ledger,
        config: &RegistryConfig,
        input: &TraintupleInput,
    ) -> Result<Self> {
        let creator = ledger.tx_creator().clone();
        let algo = authorize_algo(ledger, &input.algo_key, AlgoKind::Algo, &creator).await?;

        let dataset = Dataset {
            data_manager_key: input.data_manager_key.clone(),
            data_sample_keys: input.data_sample_keys.clone(),
        };
        let summary = check_dataset(ledger, &dataset).await?;
        if summary.any_test_only {
            return Err(RegistryError::bad_request(
                "traintuple cannot train on test-only data samples",
            ));
        }
        check_in_models(config, &input.in_models)?;

        let key = derive_key(
            config,
            input.key.as_deref(),
            &KeySeed {
                kind: Self::KIND,
                creator: &creator,
                algo_key: &input.algo_key,
                data_manager_key: &input.data_manager_key,
                data_sample_keys: &input.data_sample_keys,
                in_models: &input.in_models,
            },
        )?;

        let mut core = TupleCore::new(
            key,
            creator,
            summary.data_manager.owner.clone(),
            algo.key.clone(),
        );
        core.compute_plan_key = input.compute_plan_key.clone();
        core.tag = input.tag.clone();
        core.metadata = input.metadata.clone();

        Ok(Self {
            core,
            dataset,
            in_model_keys: input.in_models.clone(),
            permissions: merge_permissions(&summary.data_manager.permissions, &algo.permissions),
            out_model: None,
        })
    }

    async fn set_from_parents(&mut self, ledger: &dyn Ledger) -> Result<()> {
        let mut parents = Vec::with_capacity(self.in_model_keys.len());
        for key in &self.in_model_keys {
            parents.push(load_parent(ledger, key).await?);
        }
        self.core.status = status_from_parents(&parents);
        self.core.rank = rank_from_parents(self.core.compute_plan_key.as_deref(), &parents);
        Ok(())
    }

    fn core(&self) -> &TupleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    fn parent_keys(&self) -> Vec<String> {
        self.in_model_keys.clone()
    }
}
