use super::{derive_key, load_parent, AnyTuple, TupleCore, TupleKind, TupleVariant};
use crate::assets::{check_dataset, get_objective, Dataset};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::index::{TESTTUPLE_BY_OBJECTIVE_INDEX, TESTTUPLE_BY_TRAINTUPLE_INDEX};
use crate::permissions::can_process;
use crate::status::Status;
use crate::store::validate_key;
use async_trait::async_trait;
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Evaluates the model of a training tuple against an objective.
///
/// The worker is the owner of the test data. Algo, rank and compute plan
/// are inherited from the evaluated tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Testtuple {
    #[serde(flatten)]
    pub core: TupleCore,
    pub objective_key: String,
    pub traintuple_key: String,
    pub traintuple_kind: TupleKind,
    pub dataset: Dataset,
    /// Dataset is the objective's own test dataset
    pub certified: bool,
    #[serde(default)]
    pub perf: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TesttupleInput {
    #[serde(default)]
    pub key: Option<String>,
    pub traintuple_key: String,
    pub objective_key: String,
    /// Explicit dataset; the objective test dataset is used when omitted
    #[serde(default)]
    pub data_manager_key: Option<String>,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
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
    traintuple_key: &'a str,
    objective_key: &'a str,
    data_manager_key: &'a str,
    data_sample_keys: &'a [String],
}

fn same_dataset(a: &Dataset, b: &Dataset) -> bool {
    a.data_manager_key == b.data_manager_key
        && a.data_sample_keys.iter().collect::<BTreeSet<_>>()
            == b.data_sample_keys.iter().collect::<BTreeSet<_>>()
}

#[async_trait]
impl TupleVariant for Testtuple {
    const KIND: TupleKind = TupleKind::Testtuple;

    type Input = TesttupleInput;

    async fn set_from_input(
        ledger: &dyn Ledger,
        config: &RegistryConfig,
        input: &TesttupleInput,
    ) -> Result<Self> {
        let creator = ledger.tx_creator().clone();
        validate_key(&input.traintuple_key, "traintuple key")?;
        let objective = get_objective(ledger, &input.objective_key).await?;

        let (dataset, certified) = match (&input.data_manager_key, input.data_sample_keys.is_empty()) {
            (None, true) => {
                let dataset = objective.test_dataset.clone().ok_or_else(|| {
                    RegistryError::bad_request(format!(
                        "objective {} has no test dataset, an explicit one is required",
                        objective.key
                    ))
                })?;
                (dataset, true)
            }
            (Some(data_manager_key), false) => {
                let dataset = Dataset {
                    data_manager_key: data_manager_key.clone(),
                    data_sample_keys: input.data_sample_keys.clone(),
                };
                let certified = objective
                    .test_dataset
                    .as_ref()
                    .is_some_and(|canonical| same_dataset(canonical, &dataset));
                (dataset, certified)
            }
            _ => {
                return Err(RegistryError::bad_request(
                    "data manager and data samples must be given together",
                ))
            }
        };
        let summary = check_dataset(ledger, &dataset).await?;

        let key = derive_key(
            config,
            input.key.as_deref(),
            &KeySeed {
                kind: Self::KIND,
                creator: &creator,
                traintuple_key: &input.traintuple_key,
                objective_key: &input.objective_key,
                data_manager_key: &dataset.data_manager_key,
                data_sample_keys: &dataset.data_sample_keys,
            },
        )?;

        let mut core = TupleCore::new(key, creator, summary.data_manager.owner, String::new());
        core.tag = input.tag.clone();
        core.metadata = input.metadata.clone();

        Ok(Self {
            core,
            objective_key: input.objective_key.clone(),
            traintuple_key: input.traintuple_key.clone(),
            traintuple_kind: TupleKind::Traintuple,
            dataset,
            certified,
            perf: None,
        })
    }

    async fn set_from_parents(&mut self, ledger: &dyn Ledger) -> Result<()> {
        let parent = load_parent(ledger, &self.traintuple_key).await?;
        let model_permissions = match &parent {
            AnyTuple::CompositeTraintuple(composite) => Some(&composite.head_permissions),
            other => other.model_permissions(),
        };
        let Some(model_permissions) = model_permissions else {
            return Err(RegistryError::bad_request(format!(
                "tuple {} produces no model",
                self.traintuple_key
            )));
        };
        if !can_process(model_permissions, &parent.core().worker, &self.core.creator) {
            return Err(RegistryError::forbidden(format!(
                "{} is not allowed to evaluate the model of {}",
                self.core.creator, self.traintuple_key
            )));
        }

        self.core.status = match parent.status() {
            Status::Done => Status::Todo,
            Status::Failed | Status::Aborted => {
                return Err(RegistryError::bad_request(format!(
                    "cannot evaluate {} {} which is {}",
                    parent.kind(),
                    self.traintuple_key,
                    parent.status()
                )))
            }
            _ => Status::Waiting,
        };
        self.traintuple_kind = parent.kind();
        self.core.algo_key = parent.core().algo_key.clone();
        self.core.rank = parent.core().rank;
        self.core.compute_plan_key = parent.core().compute_plan_key.clone();
        Ok(())
    }

    fn core(&self) -> &TupleCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TupleCore {
        &mut self.core
    }

    /// Test tuples consume a model but feed none; they are tracked through
    /// their own indices rather than the in-model ones.
    fn parent_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn extra_index_entries(&self) -> Vec<(&'static str, Vec<String>)> {
        let certified = self.certified.to_string();
        vec![
            (
                TESTTUPLE_BY_TRAINTUPLE_INDEX,
                vec![self.traintuple_key.clone(), certified.clone(), self.core.key.clone()],
            ),
            (
                TESTTUPLE_BY_OBJECTIVE_INDEX,
                vec![self.objective_key.clone(), certified, self.core.key.clone()],
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_dataset_ignores_sample_order() {
        let a = Dataset {
            data_manager_key: "dm".into(),
            data_sample_keys: vec!["t1".into(), "t2".into()],
        };
        let b = Dataset {
            data_manager_key: "dm".into(),
            data_sample_keys: vec!["t2".into(), "t1".into()],
        };
        assert!(same_dataset(&a, &b));

        let c = Dataset {
            data_manager_key: "other".into(),
            ..b.clone()
        };
        assert!(!same_dataset(&a, &c));
    }
}
