use super::{
    authorize_algo, derive_key, load_parent, rank_from_parents, status_from_parents,
    OutModel, TupleCore, TupleKind, TupleVariant,
};
use crate::assets::{check_dataset, AlgoKind, Dataset};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::permissions::{new_permissions, Permissions, PermissionsInput};
use crate::store::validate_key;
use async_trait::async_trait;
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Trains a private head model and a shareable trunk model together.
///
/// The head model stays on the worker that produced it. The trunk model is
/// shared according to the permissions given at submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTraintuple {
    #[serde(flatten)]
    pub core: TupleCore,
    pub dataset: Dataset,
    #[serde(default)]
    pub in_head_model_key: Option<String>,
    #[serde(default)]
    pub in_trunk_model_key: Option<String>,
    pub head_permissions: Permissions,
    pub trunk_permissions: Permissions,
    #[serde(default)]
    pub out_head_model: Option<OutModel>,
    #[serde(default)]
    pub out_trunk_model: Option<OutModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeTraintupleInput {
    #[serde(default)]
    pub key: Option<String>,
    pub algo_key: String,
    pub data_manager_key: String,
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_head_model_key: Option<String>,
    #[serde(default)]
    pub in_trunk_model_key: Option<String>,
    #[serde(default)]
    pub out_trunk_model_permissions: PermissionsInput,
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
    in_head_model_key: Option<&'a str>,
    in_trunk_model_key: Option<&'a str>,
}

#[async_trait]
impl TupleVariant for CompositeTraintuple {
    const KIND: TupleKind = TupleKind::CompositeTraintuple;

    type Input = CompositeTraintupleInput;

    async fn set_from_input(
        ledger: &dyn Ledger,
        config: &RegistryConfig,
        input: &CompositeTraintupleInput,
    ) -> Result<Self> {
        let creator = ledger.tx_creator().clone();
        let algo =
            authorize_algo(ledger, &input.algo_key, AlgoKind::CompositeAlgo, &creator).await?;

        let dataset = Dataset {
            data_manager_key: input.data_manager_key.clone(),
            data_sample_keys: input.data_sample_keys.clone(),
        };
        let summary = check_dataset(ledger, &dataset).await?;
        if summary.any_test_only {
            return Err(RegistryError::bad_request(
                "composite traintuple cannot train on test-only data samples",
            ));
        }

        match (&input.in_head_model_key, &input.in_trunk_model_key) {
            (Some(head), Some(trunk)) => {
                validate_key(head, "in-head-model key")?;
                validate_key(trunk, "in-trunk-model key")?;
            }
            (None, None) => {}
            _ => {
                return Err(RegistryError::bad_request(
                    "in-head-model and in-trunk-model must be given together",
                ))
            }
        }

        let key = derive_key(
            config,
            input.key.as_deref(),
            &KeySeed {
                kind: Self::KIND,
                creator: &creator,
                algo_key: &input.algo_key,
                data_manager_key: &input.data_manager_key,
                data_sample_keys: &input.data_sample_keys,
                in_head_model_key: input.in_head_model_key.as_deref(),
                in_trunk_model_key: input.in_trunk_model_key.as_deref(),
            },
        )?;

        let worker = summary.data_manager.owner.clone();
        let head_permissions = Permissions::private_to(&worker);
        let trunk_permissions = new_permissions(&input.out_trunk_model_permissions, &worker);

        let mut core = TupleCore::new(key, creator, worker, algo.key.clone());
        core.compute_plan_key = input.compute_plan_key.clone();
        core.tag = input.tag.clone();
        core.metadata = input.metadata.clone();

        Ok(Self {
            core,
            dataset,
            in_head_model_key: input.in_head_model_key.clone(),
            in_trunk_model_key: input.in_trunk_model_key.clone(),
            head_permissions,
            trunk_permissions,
            out_head_model: None,
            out_trunk_model: None,
        })
    }

    async fn set_from_parents(&mut self, ledger: &dyn Ledger) -> Result<()> {
        let (Some(head_key), Some(trunk_key)) =
            (self.in_head_model_key.clone(), self.in_trunk_model_key.clone())
        else {
            self.core.status = status_from_parents(&[]);
            self.core.rank = 0;
            return Ok(());
        };

        let head = load_parent(ledger, &head_key).await?;
        if head.kind() != TupleKind::CompositeTraintuple {
            return Err(RegistryError::bad_request(format!(
                "in-head-model {} must be a composite traintuple, got a {}",
                head_key,
                head.kind()
            )));
        }
        if head.core().worker != self.core.worker {
            return Err(RegistryError::forbidden(format!(
                "head model {} belongs to {} and cannot be used on {}",
                head_key,
                head.core().worker,
                self.core.worker
            )));
        }
        let trunk = load_parent(ledger, &trunk_key).await?;

        let parents = [head, trunk];
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
        let mut keys: Vec<String> = Vec::with_capacity(2);
        for key in [&self.in_head_model_key, &self.in_trunk_model_key]
            .into_iter()
            .flatten()
        {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }
}
