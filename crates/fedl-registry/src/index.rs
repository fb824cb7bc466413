//! Names of the composite indices maintained by the registry.
//!
//! These strings are part of the on-ledger format and must not change.

use crate::error::{RegistryError, Result};
use crate::tuple::TupleKind;

/// Members of a compute plan: plan key, worker, rank, tuple key
pub const COMPUTE_PLAN_INDEX: &str = "computePlan~computeplankey~worker~rank~key";
/// Test tuples by the training tuple they evaluate
pub const TESTTUPLE_BY_TRAINTUPLE_INDEX: &str = "testtuple~traintuple~certified~key";
/// Test tuples by objective
pub const TESTTUPLE_BY_OBJECTIVE_INDEX: &str = "testtuple~objective~certified~key";
/// Compute plans by owner
pub const COMPUTE_PLAN_OWNER_INDEX: &str = "computePlan~owner~key";

pub const ALGO_OWNER_INDEX: &str = "algo~owner~key";
pub const DATA_MANAGER_OWNER_INDEX: &str = "dataManager~owner~key";
pub const OBJECTIVE_OWNER_INDEX: &str = "objective~owner~key";
pub const DATA_SAMPLE_BY_MANAGER_INDEX: &str = "dataSample~dataManager~key";

pub fn worker_status_index(kind: TupleKind) -> String {
    format!("{}~worker~status~key", kind.as_str())
}

pub fn in_model_index(kind: TupleKind) -> String {
    format!("{}~inModel~key", kind.as_str())
}

pub fn algo_index(kind: TupleKind) -> String {
    format!("{}~algo~key", kind.as_str())
}

pub fn tag_index(kind: TupleKind) -> String {
    format!("{}~tag~key", kind.as_str())
}

/// Number of attributes preceding the entity key in `index`
fn filter_arity(index: &str) -> usize {
    index.split('~').count().saturating_sub(2)
}

/// Every index that resolves to tuple keys
pub fn tuple_indices() -> Vec<String> {
    let mut indices = Vec::new();
    for kind in TupleKind::ALL {
        indices.push(worker_status_index(kind));
        indices.push(algo_index(kind));
        indices.push(tag_index(kind));
        if kind.is_training() {
            indices.push(in_model_index(kind));
        }
    }
    indices.push(COMPUTE_PLAN_INDEX.to_string());
    indices.push(TESTTUPLE_BY_TRAINTUPLE_INDEX.to_string());
    indices.push(TESTTUPLE_BY_OBJECTIVE_INDEX.to_string());
    indices
}

/// Check that `attributes` is a usable filter over the tuple index `index`
pub fn validate_tuple_filter(index: &str, attributes: &[String]) -> Result<()> {
    if !tuple_indices().iter().any(|known| known == index) {
        return Err(RegistryError::bad_request(format!("unknown index {}", index)));
    }
    let arity = filter_arity(index);
    if attributes.len() > arity {
        return Err(RegistryError::bad_request(format!(
            "index {} accepts at most {} attributes, got {}",
            index,
            arity,
            attributes.len()
        )));
    }
    Ok(())
}
