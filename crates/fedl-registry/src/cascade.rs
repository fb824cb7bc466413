//! Dependency cascade.
//!
//! When a training tuple completes or fails, dependents waiting on it are
//! resolved with an explicit worklist. Each tuple is visited at most once per
//! cascade, so the walk terminates even on a corrupted graph.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::StatusChange;
use crate::index::{in_model_index, TESTTUPLE_BY_TRAINTUPLE_INDEX};
use crate::status::{Actor, Status};
use crate::tuple::{commit_status_update, load_tuple, AnyTuple, TupleKind};
use fedl_ledger::Ledger;
use std::collections::{BTreeSet, VecDeque};
use tracing::{debug, info};

/// Resolve every tuple that depends on `root`, using its current status.
///
/// Running it again on the resulting state changes nothing.
pub async fn resolve_dependents(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    root: &AnyTuple,
    changes: &mut Vec<StatusChange>,
) -> Result<()> {
    let before = changes.len();
    let mut visited: BTreeSet<String> = BTreeSet::from([root.key().to_string()]);
    let mut queue: VecDeque<AnyTuple> = VecDeque::from([root.clone()]);
    let mut visits = 0usize;

    while let Some(current) = queue.pop_front() {
        let status = current.status();
        if !matches!(status, Status::Done | Status::Failed) {
            continue;
        }

        update_anchored_testtuples(ledger, current.key(), status, changes).await?;

        // A failed plan member surfaces at the plan level; its dependents stay put
        if status == Status::Failed && current.core().compute_plan_key.is_some() {
            debug!(key = current.key(), "Failure kept within compute plan");
            continue;
        }

        for kind in TupleKind::TRAINING {
            let dependents = ledger
                .scan_index(&in_model_index(kind), &[current.key()])
                .await?;
            for dependent_key in dependents {
                if !visited.insert(dependent_key.clone()) {
                    continue;
                }
                visits += 1;
                if visits > config.max_cascade_visits {
                    return Err(RegistryError::internal(format!(
                        "cascade from {} exceeded {} visits",
                        root.key(),
                        config.max_cascade_visits
                    )));
                }

                let mut dependent = load_tuple(&*ledger, &dependent_key).await?;
                if dependent.status() != Status::Waiting {
                    continue;
                }

                match status {
                    Status::Failed => {
                        commit_status_update(
                            ledger,
                            &mut dependent,
                            Status::Failed,
                            &Actor::System,
                            changes,
                        )
                        .await?;
                        queue.push_back(dependent);
                    }
                    _ => {
                        if is_ready(&*ledger, &dependent, current.key()).await? {
                            commit_status_update(
                                ledger,
                                &mut dependent,
                                Status::Todo,
                                &Actor::System,
                                changes,
                            )
                            .await?;
                        }
                    }
                }
            }
        }
    }

    let updated = changes.len() - before;
    if updated > 0 {
        info!(
            root = root.key(),
            status = %root.status(),
            updated,
            "🌊 Dependency cascade applied"
        );
    }
    Ok(())
}

/// True when every parent other than `completed` is done
async fn is_ready(ledger: &dyn Ledger, dependent: &AnyTuple, completed: &str) -> Result<bool> {
    for parent_key in dependent.parent_keys() {
        if parent_key == completed {
            continue;
        }
        if load_tuple(ledger, &parent_key).await?.status() != Status::Done {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Unblock or fail the test tuples evaluating `traintuple_key`
async fn update_anchored_testtuples(
    ledger: &mut dyn Ledger,
    traintuple_key: &str,
    status: Status,
    changes: &mut Vec<StatusChange>,
) -> Result<()> {
    let target = match status {
        Status::Done => Status::Todo,
        Status::Failed => Status::Failed,
        _ => return Ok(()),
    };
    let testtuple_keys = ledger
        .scan_index(TESTTUPLE_BY_TRAINTUPLE_INDEX, &[traintuple_key])
        .await?;
    for key in testtuple_keys {
        let mut testtuple = load_tuple(&*ledger, &key).await?;
        if testtuple.status() != Status::Waiting {
            continue;
        }
        commit_status_update(ledger, &mut testtuple, target, &Actor::System, changes).await?;
    }
    Ok(())
}
