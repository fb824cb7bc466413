use crate::error::{RegistryError, Result};
use crate::index::{validate_tuple_filter, TESTTUPLE_BY_TRAINTUPLE_INDEX};
use crate::tuple::{load_tuple, AnyTuple, GenericTuple};
use fedl_ledger::Ledger;
use std::collections::BTreeSet;

/// Tuples whose entries in `index` start with `attributes`
pub async fn query_tuples_by_filter(
    ledger: &dyn Ledger,
    index: &str,
    attributes: &[String],
) -> Result<Vec<AnyTuple>> {
    validate_tuple_filter(index, attributes)?;
    let prefix: Vec<&str> = attributes.iter().map(String::as_str).collect();
    let mut tuples = Vec::new();
    for key in ledger.scan_index(index, &prefix).await? {
        tuples.push(load_tuple(ledger, &key).await?);
    }
    Ok(tuples)
}

/// Test tuples evaluating `traintuple_key`
pub async fn query_testtuples_for(ledger: &dyn Ledger, traintuple_key: &str) -> Result<Vec<AnyTuple>> {
    let mut tuples = Vec::new();
    for key in ledger
        .scan_index(TESTTUPLE_BY_TRAINTUPLE_INDEX, &[traintuple_key])
        .await?
    {
        tuples.push(load_tuple(ledger, &key).await?);
    }
    Ok(tuples)
}

/// Every training ancestor of `key`, parents before children, ending with `key`.
///
/// `max_visits` bounds the number of tuples loaded.
pub async fn query_model_lineage(
    ledger: &dyn Ledger,
    key: &str,
    max_visits: usize,
) -> Result<Vec<GenericTuple>> {
    let root = load_tuple(ledger, key).await?;
    if !root.kind().is_training() {
        return Err(RegistryError::bad_request(format!(
            "{} {} has no model lineage",
            root.kind(),
            key
        )));
    }

    // Iterative post-order walk: a tuple is emitted once all its parents are
    let mut emitted: BTreeSet<String> = BTreeSet::new();
    let mut expanded: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<AnyTuple> = vec![root];
    let mut lineage = Vec::new();

    while let Some(top) = stack.last() {
        let top_key = top.key().to_string();
        if emitted.contains(&top_key) {
            stack.pop();
            continue;
        }
        if expanded.insert(top_key.clone()) {
            let parents = top.parent_keys();
            for parent_key in parents.into_iter().rev() {
                if emitted.contains(&parent_key) || expanded.contains(&parent_key) {
                    continue;
                }
                if expanded.len() + stack.len() > max_visits {
                    return Err(RegistryError::internal(format!(
                        "lineage of {} exceeded {} tuples",
                        key, max_visits
                    )));
                }
                stack.push(load_tuple(ledger, &parent_key).await?);
            }
        } else if let Some(done) = stack.pop() {
            emitted.insert(top_key);
            lineage.push(done.as_generic());
        }
    }
    Ok(lineage)
}
