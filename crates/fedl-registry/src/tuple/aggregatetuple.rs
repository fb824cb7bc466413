use super::{
    authorize_algo, check_in_models, derive_key, load_parent, rank_from_parents,
    status_from_parents, OutModel, TupleCore, TupleKind, TupleVariant,
};
use crate::assets::AlgoKind;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::permissions::{can_process, merge_permissions, Permissions};
use async_trait::async_trait;
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Combines the output models of other tuples on a chosen worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregatetuple {
    #[serde(flatten)]
    pub core: TupleCore,
    pub in_model_keys: Vec<String>,
    /// Algo permissions merged with every parent model's permissions
    pub permissions: Permissions,
    #[serde(default)]
    pub out_model: Option<OutModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatetupleInput {
    #[serde(default)]
    pub key: Option<String>,
    pub algo_key: String,
    pub worker: OrgId,
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
    worker: &'a OrgId,
    in_models: &'a [String],
}

#[async_trait]
impl TupleVariant for Aggregatetuple {
    const KIND: TupleKind = TupleKind::Aggregatetuple;

    type Input = AggregatetupleInput;

    async fn set_from_input(
        ledger: &dyn Ledger,
        config: &RegistryConfig,
        input: &AggregatetupleInput,
    ) -> Result<Self> {
        let creator = ledger.tx_creator().clone();
        let algo =
            authorize_algo(ledger, &input.algo_key, AlgoKind::AggregateAlgo, &creator).await?;
        let worker = OrgId::new(input.worker.as_str())?;
        check_in_models(config, &input.in_models)?;

        let key = derive_key(
            config,
            input.key.as_deref(),
            &KeySeed {
                kind: Self::KIND,
                creator: &creator,
                algo_key: &input.algo_key,
                worker: &worker,
                in_models: &input.in_models,
            },
        )?;

        let mut core = TupleCore::new(key, creator, worker, algo.key.clone());
        core.compute_plan_key = input.compute_plan_key.clone();
        core.tag = input.tag.clone();
        core.metadata = input.metadata.clone();

        Ok(Self {
            core,
            in_model_keys: input.in_models.clone(),
            permissions: algo.permissions,
            out_model: None,
        })
    }

    async fn set_from_parents(&mut self, ledger: &dyn Ledger) -> Result<()> {
        let mut parents = Vec::with_capacity(self.in_model_keys.len());
        for key in &self.in_model_keys {
            let parent = load_parent(ledger, key).await?;
            let Some(model_permissions) = parent.model_permissions() else {
                return Err(RegistryError::bad_request(format!(
                    "tuple {} produces no model",
                    key
                )));
            };
            if !can_process(model_permissions, &parent.core().worker, &self.core.worker) {
                return Err(RegistryError::forbidden(format!(
                    "{} is not allowed to process the model of {}",
                    self.core.worker, key
                )));
            }
            self.permissions = merge_permissions(&self.permissions, model_permissions);
            parents.push(parent);
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
