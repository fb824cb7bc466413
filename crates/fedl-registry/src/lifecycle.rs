//! Worker-reported progress: start, success and failure of tuples.

use crate::cascade::resolve_dependents;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::StatusChange;
use crate::status::{Actor, Status};
use crate::tuple::{commit_status_update, load_tuple, AnyTuple, OutModel, TupleKind};
use fedl_ledger::Ledger;
use tracing::info;

fn worker_actor(ledger: &dyn Ledger) -> Actor {
    Actor::Worker(ledger.tx_creator().clone())
}

async fn load_kind(ledger: &dyn Ledger, key: &str, kind: TupleKind) -> Result<AnyTuple> {
    let tuple = load_tuple(ledger, key).await?;
    if tuple.kind() != kind {
        return Err(RegistryError::not_found(format!("{} {} not found", kind, key)));
    }
    Ok(tuple)
}

/// Todo -> Doing, reported by the worker
pub async fn log_start(
    ledger: &mut dyn Ledger,
    key: &str,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let mut tuple = load_tuple(&*ledger, key).await?;
    let actor = worker_actor(&*ledger);
    commit_status_update(ledger, &mut tuple, Status::Doing, &actor, changes).await?;
    info!(key, kind = %tuple.kind(), worker = %tuple.core().worker, "▶️ Tuple started");
    Ok(tuple)
}

/// Mark `tuple` done and resolve what depended on it
async fn complete(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    mut tuple: AnyTuple,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let actor = worker_actor(&*ledger);
    commit_status_update(ledger, &mut tuple, Status::Done, &actor, changes).await?;
    if tuple.kind().is_training() {
        resolve_dependents(ledger, config, &tuple, changes).await?;
    }
    info!(key = tuple.key(), kind = %tuple.kind(), "✅ Tuple done");
    Ok(tuple)
}

pub async fn log_success_train(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    key: &str,
    out_model: OutModel,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let mut tuple = load_kind(&*ledger, key, TupleKind::Traintuple).await?;
    if let AnyTuple::Traintuple(train) = &mut tuple {
        train.out_model = Some(out_model);
    }
    complete(ledger, config, tuple, changes).await
}

pub async fn log_success_composite(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    key: &str,
    out_head_model: OutModel,
    out_trunk_model: OutModel,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let mut tuple = load_kind(&*ledger, key, TupleKind::CompositeTraintuple).await?;
    if let AnyTuple::CompositeTraintuple(composite) = &mut tuple {
        composite.out_head_model = Some(out_head_model);
        composite.out_trunk_model = Some(out_trunk_model);
    }
    complete(ledger, config, tuple, changes).await
}

pub async fn log_success_aggregate(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    key: &str,
    out_model: OutModel,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let mut tuple = load_kind(&*ledger, key, TupleKind::Aggregatetuple).await?;
    if let AnyTuple::Aggregatetuple(aggregate) = &mut tuple {
        aggregate.out_model = Some(out_model);
    }
    complete(ledger, config, tuple, changes).await
}

pub async fn log_success_test(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    key: &str,
    perf: f64,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    if !perf.is_finite() {
        return Err(RegistryError::bad_request(format!("perf {} is not a finite number", perf)));
    }
    let mut tuple = load_kind(&*ledger, key, TupleKind::Testtuple).await?;
    if let AnyTuple::Testtuple(test) = &mut tuple {
        test.perf = Some(perf);
    }
    complete(ledger, config, tuple, changes).await
}

/// Fail a tuple of any kind and propagate the failure
pub async fn log_fail(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    key: &str,
    log: &str,
    changes: &mut Vec<StatusChange>,
) -> Result<AnyTuple> {
    let mut tuple = load_tuple(&*ledger, key).await?;
    tuple.core_mut().log = log.to_string();
    let actor = worker_actor(&*ledger);
    commit_status_update(ledger, &mut tuple, Status::Failed, &actor, changes).await?;
    if tuple.kind().is_training() {
        resolve_dependents(ledger, config, &tuple, changes).await?;
    }
    info!(key, kind = %tuple.kind(), worker = %tuple.core().worker, "❌ Tuple failed");
    Ok(tuple)
}
