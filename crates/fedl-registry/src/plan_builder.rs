//! Batch materialization of compute plans.
//!
//! A batch names its tuples with temporary IDs and may reference IDs that
//! have no ledger key yet. The batch is ordered topologically, then tuples
//! are created in that order while a temporary ID to key map is filled in.
//! Test tuples are created once every training tuple exists.

use crate::compute_plan::{create_plan, load_plan, plan_key_for, save_plan, ComputePlan};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::StatusChange;
use crate::permissions::PermissionsInput;
use crate::tuple::{
    create_tuple, AggregatetupleInput, CompositeTraintupleInput, PlanTarget, Testtuple,
    TesttupleInput, TraintupleInput, TupleKind, TupleVariant,
};
use crate::tuple::{Aggregatetuple, CompositeTraintuple, Traintuple};
use fedl_ledger::Ledger;
use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanTraintuple {
    pub id: String,
    pub algo_key: String,
    pub data_manager_key: String,
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_models_ids: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanCompositeTraintuple {
    pub id: String,
    pub algo_key: String,
    pub data_manager_key: String,
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub in_head_model_id: Option<String>,
    #[serde(default)]
    pub in_trunk_model_id: Option<String>,
    #[serde(default)]
    pub out_trunk_model_permissions: PermissionsInput,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanAggregatetuple {
    pub id: String,
    pub algo_key: String,
    pub worker: OrgId,
    #[serde(default)]
    pub in_models_ids: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanTesttuple {
    pub traintuple_id: String,
    pub objective_key: String,
    #[serde(default)]
    pub data_manager_key: Option<String>,
    #[serde(default)]
    pub data_sample_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlanInput {
    #[serde(default)]
    pub traintuples: Vec<ComputePlanTraintuple>,
    #[serde(default)]
    pub composite_traintuples: Vec<ComputePlanCompositeTraintuple>,
    #[serde(default)]
    pub aggregatetuples: Vec<ComputePlanAggregatetuple>,
    #[serde(default)]
    pub testtuples: Vec<ComputePlanTesttuple>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ComputePlanInput {
    pub fn tuple_count(&self) -> usize {
        self.traintuples.len()
            + self.composite_traintuples.len()
            + self.aggregatetuples.len()
            + self.testtuples.len()
    }
}

/// Training node of the batch DAG
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DagNode {
    pub id: String,
    /// Temporary IDs of the parents, in the batch or already resolved
    pub parents: Vec<String>,
}

/// Position in `nodes` and batch depth, in creation order.
///
/// Ties are broken by declaration order. Parents listed in `resolved` come
/// from earlier batches and add no edge. Unknown parents, duplicate IDs and
/// cycles are rejected.
pub fn topological_order(nodes: &[DagNode], resolved: &BTreeSet<String>) -> Result<Vec<(usize, u32)>> {
    let mut index_of: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if node.id.is_empty() {
            return Err(RegistryError::bad_request("tuple id must not be empty"));
        }
        if resolved.contains(&node.id) {
            return Err(RegistryError::bad_request(format!(
                "tuple id {} is already used in the compute plan",
                node.id
            )));
        }
        if index_of.insert(node.id.as_str(), i).is_some() {
            return Err(RegistryError::bad_request(format!("duplicate tuple id {}", node.id)));
        }
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0usize; nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for parent in &node.parents {
            match index_of.get(parent.as_str()) {
                Some(&j) => {
                    children[j].push(i);
                    indegree[i] += 1;
                }
                None if resolved.contains(parent) => {}
                None => {
                    return Err(RegistryError::bad_request(format!(
                        "tuple {} references unknown id {}",
                        node.id, parent
                    )))
                }
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut depth = vec![0u32; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(i) = ready.pop_first() {
        order.push((i, depth[i]));
        for &child in &children[i] {
            depth[child] = depth[child].max(depth[i] + 1);
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = (0..nodes.len())
            .filter(|&i| indegree[i] > 0)
            .map(|i| nodes[i].id.as_str())
            .collect();
        return Err(RegistryError::bad_request(format!(
            "compute plan contains a cycle through {:?}",
            stuck
        )));
    }
    Ok(order)
}

fn resolve(id_to_key: &BTreeMap<String, String>, id: &str) -> Result<String> {
    id_to_key
        .get(id)
        .cloned()
        .ok_or_else(|| RegistryError::internal(format!("id {} resolved out of order", id)))
}

fn resolve_all(id_to_key: &BTreeMap<String, String>, ids: &[String]) -> Result<Vec<String>> {
    ids.iter().map(|id| resolve(id_to_key, id)).collect()
}

fn resolve_opt(id_to_key: &BTreeMap<String, String>, id: &Option<String>) -> Result<Option<String>> {
    id.as_deref().map(|id| resolve(id_to_key, id)).transpose()
}

/// Create every tuple of `input`, into `existing` or into a new plan
pub(crate) async fn apply_batch(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    existing: Option<ComputePlan>,
    input: &ComputePlanInput,
    changes: &mut Vec<StatusChange>,
) -> Result<ComputePlan> {
    if input.tuple_count() > config.max_batch_tuples {
        return Err(RegistryError::bad_request(format!(
            "batch of {} tuples exceeds the limit of {}",
            input.tuple_count(),
            config.max_batch_tuples
        )));
    }

    let mut id_to_key = existing
        .as_ref()
        .map(|plan| plan.id_to_key.clone())
        .unwrap_or_default();
    let resolved: BTreeSet<String> = id_to_key.keys().cloned().collect();

    let mut nodes = Vec::new();
    let mut slots = Vec::new();
    for (position, entry) in input.traintuples.iter().enumerate() {
        nodes.push(DagNode {
            id: entry.id.clone(),
            parents: entry.in_models_ids.clone(),
        });
        slots.push((TupleKind::Traintuple, position));
    }
    for (position, entry) in input.composite_traintuples.iter().enumerate() {
        nodes.push(DagNode {
            id: entry.id.clone(),
            parents: [&entry.in_head_model_id, &entry.in_trunk_model_id]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
        });
        slots.push((TupleKind::CompositeTraintuple, position));
    }
    for (position, entry) in input.aggregatetuples.iter().enumerate() {
        nodes.push(DagNode {
            id: entry.id.clone(),
            parents: entry.in_models_ids.clone(),
        });
        slots.push((TupleKind::Aggregatetuple, position));
    }

    let order = topological_order(&nodes, &resolved)?;
    for entry in &input.testtuples {
        let known = resolved.contains(&entry.traintuple_id)
            || nodes.iter().any(|node| node.id == entry.traintuple_id);
        if !known {
            return Err(RegistryError::bad_request(format!(
                "testtuple references unknown id {}",
                entry.traintuple_id
            )));
        }
    }

    let mut plan_key = existing.as_ref().map(|plan| plan.key.clone());
    for (i, depth) in order {
        let target = match &plan_key {
            Some(key) => PlanTarget::Batch(key.clone()),
            None => PlanTarget::NewBatch,
        };
        let (kind, position) = slots[i];
        let (key, compute_plan_key) = match kind {
            TupleKind::Traintuple => {
                let entry = &input.traintuples[position];
                let tuple_input = TraintupleInput {
                    key: None,
                    algo_key: entry.algo_key.clone(),
                    data_manager_key: entry.data_manager_key.clone(),
                    data_sample_keys: entry.data_sample_keys.clone(),
                    in_models: resolve_all(&id_to_key, &entry.in_models_ids)?,
                    compute_plan_key: None,
                    tag: entry.tag.clone(),
                    metadata: entry.metadata.clone(),
                };
                let tuple: Traintuple =
                    create_tuple(ledger, config, &tuple_input, target, changes).await?;
                (tuple.core.key, tuple.core.compute_plan_key)
            }
            TupleKind::CompositeTraintuple => {
                let entry = &input.composite_traintuples[position];
                let tuple_input = CompositeTraintupleInput {
                    key: None,
                    algo_key: entry.algo_key.clone(),
                    data_manager_key: entry.data_manager_key.clone(),
                    data_sample_keys: entry.data_sample_keys.clone(),
                    in_head_model_key: resolve_opt(&id_to_key, &entry.in_head_model_id)?,
                    in_trunk_model_key: resolve_opt(&id_to_key, &entry.in_trunk_model_id)?,
                    out_trunk_model_permissions: entry.out_trunk_model_permissions.clone(),
                    compute_plan_key: None,
                    tag: entry.tag.clone(),
                    metadata: entry.metadata.clone(),
                };
                let tuple: CompositeTraintuple =
                    create_tuple(ledger, config, &tuple_input, target, changes).await?;
                (tuple.core.key, tuple.core.compute_plan_key)
            }
            TupleKind::Aggregatetuple => {
                let entry = &input.aggregatetuples[position];
                let tuple_input = AggregatetupleInput {
                    key: None,
                    algo_key: entry.algo_key.clone(),
                    worker: entry.worker.clone(),
                    in_models: resolve_all(&id_to_key, &entry.in_models_ids)?,
                    compute_plan_key: None,
                    tag: entry.tag.clone(),
                    metadata: entry.metadata.clone(),
                };
                let tuple: Aggregatetuple =
                    create_tuple(ledger, config, &tuple_input, target, changes).await?;
                (tuple.core.key, tuple.core.compute_plan_key)
            }
            TupleKind::Testtuple => {
                return Err(RegistryError::internal("testtuple in the training DAG"));
            }
        };
        tracing::debug!(id = %nodes[i].id, key = %key, depth, "Batch tuple materialized");
        id_to_key.insert(nodes[i].id.clone(), key);
        if plan_key.is_none() {
            plan_key = compute_plan_key;
        }
    }

    for entry in &input.testtuples {
        let Some(key) = plan_key.clone() else {
            return Err(RegistryError::bad_request("testtuples need a training tuple to evaluate"));
        };
        let tuple_input = TesttupleInput {
            key: None,
            traintuple_key: resolve(&id_to_key, &entry.traintuple_id)?,
            objective_key: entry.objective_key.clone(),
            data_manager_key: entry.data_manager_key.clone(),
            data_sample_keys: entry.data_sample_keys.clone(),
            tag: entry.tag.clone(),
            metadata: entry.metadata.clone(),
        };
        let tuple: Testtuple =
            create_tuple(ledger, config, &tuple_input, PlanTarget::Batch(key), changes).await?;
        if tuple.core().compute_plan_key != plan_key {
            return Err(RegistryError::bad_request(format!(
                "testtuple {} evaluates a tuple outside the compute plan",
                tuple.core().key
            )));
        }
    }

    let mut plan = match plan_key {
        Some(key) => load_plan(&*ledger, &key).await?,
        None => {
            let key = plan_key_for(ledger.tx_id())?;
            let owner = ledger.tx_creator().clone();
            create_plan(ledger, &key, owner).await?
        }
    };
    plan.id_to_key = id_to_key;
    if !input.tag.is_empty() {
        plan.tag = input.tag.clone();
    }
    plan.metadata
        .extend(input.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    save_plan(ledger, &plan).await?;

    info!(
        key = %plan.key,
        added = input.tuple_count(),
        tuples = plan.tuple_count,
        status = %plan.status,
        "🗺️ Compute plan batch applied"
    );
    Ok(plan)
}
