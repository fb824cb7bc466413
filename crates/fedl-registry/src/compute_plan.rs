//! Compute plans: groups of tuples tracked as one unit of progress.

use crate::error::{RegistryError, Result};
use crate::events::StatusChange;
use crate::index::{COMPUTE_PLAN_INDEX, COMPUTE_PLAN_OWNER_INDEX};
use crate::status::{check_new_tuple_status, Actor, PlanStatus, Status};
use crate::store::{ensure_absent, get_record, put_record, AssetType};
use crate::tuple::{commit_status_update, load_tuple, TupleCore, TupleKind};
use fedl_ledger::Ledger;
use fedl_types::{content_key, OrgId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputePlan {
    pub key: String,
    pub owner: OrgId,
    pub status: PlanStatus,
    pub tuple_count: u32,
    pub done_count: u32,
    pub traintuple_keys: Vec<String>,
    pub composite_traintuple_keys: Vec<String>,
    pub aggregatetuple_keys: Vec<String>,
    pub testtuple_keys: Vec<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Batch temporary IDs resolved to tuple keys
    #[serde(default)]
    pub id_to_key: BTreeMap<String, String>,
}

impl ComputePlan {
    pub fn new(key: String, owner: OrgId) -> Self {
        Self {
            key,
            owner,
            status: PlanStatus::Empty,
            tuple_count: 0,
            done_count: 0,
            traintuple_keys: Vec::new(),
            composite_traintuple_keys: Vec::new(),
            aggregatetuple_keys: Vec::new(),
            testtuple_keys: Vec::new(),
            tag: String::new(),
            metadata: BTreeMap::new(),
            id_to_key: BTreeMap::new(),
        }
    }

    pub fn member_keys(&self, kind: TupleKind) -> &[String] {
        match kind {
            TupleKind::Traintuple => &self.traintuple_keys,
            TupleKind::CompositeTraintuple => &self.composite_traintuple_keys,
            TupleKind::Aggregatetuple => &self.aggregatetuple_keys,
            TupleKind::Testtuple => &self.testtuple_keys,
        }
    }

    fn member_keys_mut(&mut self, kind: TupleKind) -> &mut Vec<String> {
        match kind {
            TupleKind::Traintuple => &mut self.traintuple_keys,
            TupleKind::CompositeTraintuple => &mut self.composite_traintuple_keys,
            TupleKind::Aggregatetuple => &mut self.aggregatetuple_keys,
            TupleKind::Testtuple => &mut self.testtuple_keys,
        }
    }

    /// Every member key, training kinds first
    pub fn all_member_keys(&self) -> Vec<String> {
        TupleKind::ALL
            .iter()
            .flat_map(|kind| self.member_keys(*kind).iter().cloned())
            .collect()
    }

    /// Count a new member with its initial status
    pub fn register_member(&mut self, kind: TupleKind, key: &str, status: Status) -> Result<()> {
        if self.status.is_absorbing() {
            return Err(RegistryError::bad_request(format!(
                "compute plan {} is {} and accepts no new tuples",
                self.key, self.status
            )));
        }
        self.member_keys_mut(kind).push(key.to_string());
        self.tuple_count += 1;
        if status == Status::Done {
            self.done_count += 1;
        }
        self.status = check_new_tuple_status(self.status, status, self.done_count, self.tuple_count);
        Ok(())
    }

    /// Account for a member reaching `status`. Returns whether the plan status changed.
    pub fn apply_member_status(&mut self, status: Status) -> bool {
        if status == Status::Done && self.done_count < self.tuple_count {
            self.done_count += 1;
        }
        let next = check_new_tuple_status(self.status, status, self.done_count, self.tuple_count);
        let changed = next != self.status;
        self.status = next;
        changed
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanKeySeed<'a> {
    compute_plan: &'a str,
}

/// Plan key derived from its first tuple key, or from the transaction id for
/// an empty plan
pub fn plan_key_for(seed: &str) -> Result<String> {
    Ok(content_key(&PlanKeySeed { compute_plan: seed })?)
}

pub async fn load_plan(ledger: &dyn Ledger, key: &str) -> Result<ComputePlan> {
    get_record(ledger, key, AssetType::ComputePlan).await
}

pub(crate) async fn save_plan(ledger: &mut dyn Ledger, plan: &ComputePlan) -> Result<()> {
    put_record(ledger, &plan.key, AssetType::ComputePlan, plan).await
}

/// Write a new empty plan
pub(crate) async fn create_plan(
    ledger: &mut dyn Ledger,
    key: &str,
    owner: OrgId,
) -> Result<ComputePlan> {
    ensure_absent(&*ledger, key).await?;
    let plan = ComputePlan::new(key.to_string(), owner);
    save_plan(ledger, &plan).await?;
    ledger
        .create_index_entry(COMPUTE_PLAN_OWNER_INDEX, &[plan.owner.as_str(), key])
        .await?;
    debug!(key, owner = %plan.owner, "Compute plan record created");
    Ok(plan)
}

/// Record a freshly created tuple as a member of `plan`
pub(crate) async fn add_member(
    ledger: &mut dyn Ledger,
    mut plan: ComputePlan,
    kind: TupleKind,
    core: &TupleCore,
) -> Result<()> {
    plan.register_member(kind, &core.key, core.status)?;
    save_plan(ledger, &plan).await?;
    if kind.is_training() {
        let rank = core.rank.to_string();
        ledger
            .create_index_entry(
                COMPUTE_PLAN_INDEX,
                &[plan.key.as_str(), core.worker.as_str(), rank.as_str(), core.key.as_str()],
            )
            .await?;
    }
    Ok(())
}

/// Checks applied when a single training tuple joins an existing plan:
/// one tuple per worker and rank, and one algo per tuple kind.
pub(crate) async fn check_standalone_slot(
    ledger: &dyn Ledger,
    plan: &ComputePlan,
    kind: TupleKind,
    core: &TupleCore,
) -> Result<()> {
    let rank = core.rank.to_string();
    let taken = ledger
        .scan_index(
            COMPUTE_PLAN_INDEX,
            &[plan.key.as_str(), core.worker.as_str(), rank.as_str()],
        )
        .await?;
    if let Some(existing) = taken.first() {
        return Err(RegistryError::conflict(format!(
            "compute plan {} already has tuple {} for worker {} at rank {}",
            plan.key, existing, core.worker, core.rank
        )));
    }

    if let Some(first) = plan.member_keys(kind).first() {
        let member = load_tuple(ledger, first).await?;
        if member.core().algo_key != core.algo_key {
            return Err(RegistryError::bad_request(format!(
                "{} members of compute plan {} use algo {}, got {}",
                kind,
                plan.key,
                member.core().algo_key,
                core.algo_key
            )));
        }
    }
    Ok(())
}

/// Fold a member status change into the plan
pub(crate) async fn on_member_status(
    ledger: &mut dyn Ledger,
    plan_key: &str,
    status: Status,
) -> Result<()> {
    let mut plan = load_plan(&*ledger, plan_key).await?;
    let previous = plan.status;
    let changed = plan.apply_member_status(status);
    if changed || status == Status::Done {
        save_plan(ledger, &plan).await?;
    }
    if changed {
        info!(
            key = %plan.key,
            from = %previous,
            to = %plan.status,
            done = plan.done_count,
            total = plan.tuple_count,
            "📊 Compute plan status changed"
        );
    }
    Ok(())
}

/// Cancel a plan and abort its waiting members. Only the owner may cancel.
pub(crate) async fn cancel_compute_plan(
    ledger: &mut dyn Ledger,
    key: &str,
    changes: &mut Vec<StatusChange>,
) -> Result<ComputePlan> {
    let mut plan = load_plan(&*ledger, key).await?;
    let requester = ledger.tx_creator().clone();
    if requester != plan.owner {
        return Err(RegistryError::forbidden(format!(
            "{} is not the owner of compute plan {}",
            requester, key
        )));
    }
    if matches!(
        plan.status,
        PlanStatus::Done | PlanStatus::Failed | PlanStatus::Canceled | PlanStatus::Aborted
    ) {
        return Err(RegistryError::bad_request(format!(
            "compute plan {} is {} and cannot be canceled",
            key, plan.status
        )));
    }

    plan.status = PlanStatus::Canceled;
    save_plan(ledger, &plan).await?;

    let before = changes.len();
    for member_key in plan.all_member_keys() {
        let mut member = load_tuple(&*ledger, &member_key).await?;
        commit_status_update(ledger, &mut member, Status::Aborted, &Actor::System, changes)
            .await?;
    }

    info!(
        key,
        aborted = changes.len() - before,
        "🛑 Compute plan canceled"
    );
    Ok(plan)
}

pub async fn query_compute_plans(ledger: &dyn Ledger) -> Result<Vec<ComputePlan>> {
    let mut plans = Vec::new();
    for key in ledger.scan_index(COMPUTE_PLAN_OWNER_INDEX, &[]).await? {
        plans.push(load_plan(ledger, &key).await?);
    }
    Ok(plans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> ComputePlan {
        ComputePlan::new("cp".into(), OrgId::from("orgA"))
    }

    #[test]
    fn test_first_member_sets_status() {
        let mut plan = plan();
        plan.register_member(TupleKind::Traintuple, "t1", Status::Todo).unwrap();
        assert_eq!(plan.status, PlanStatus::Todo);
        assert_eq!(plan.tuple_count, 1);
        assert_eq!(plan.traintuple_keys, vec!["t1".to_string()]);
    }

    #[test]
    fn test_plan_completes_when_every_member_is_done() {
        let mut plan = plan();
        plan.register_member(TupleKind::Traintuple, "t1", Status::Todo).unwrap();
        plan.register_member(TupleKind::Traintuple, "t2", Status::Waiting).unwrap();

        assert!(plan.apply_member_status(Status::Doing));
        assert!(!plan.apply_member_status(Status::Done));
        assert_eq!(plan.status, PlanStatus::Doing);
        assert!(!plan.apply_member_status(Status::Todo));
        plan.apply_member_status(Status::Doing);
        assert!(plan.apply_member_status(Status::Done));
        assert_eq!(plan.status, PlanStatus::Done);
        assert_eq!(plan.done_count, 2);
    }

    #[test]
    fn test_done_plan_reopens_for_new_member() {
        let mut plan = plan();
        plan.register_member(TupleKind::Traintuple, "t1", Status::Todo).unwrap();
        plan.apply_member_status(Status::Doing);
        plan.apply_member_status(Status::Done);
        assert_eq!(plan.status, PlanStatus::Done);

        plan.register_member(TupleKind::Traintuple, "t2", Status::Todo).unwrap();
        assert_eq!(plan.status, PlanStatus::Todo);
    }

    #[test]
    fn test_canceled_plan_rejects_members() {
        let mut plan = plan();
        plan.status = PlanStatus::Canceled;
        assert!(plan
            .register_member(TupleKind::Traintuple, "t1", Status::Todo)
            .is_err());
    }

    #[test]
    fn test_all_member_keys_order() {
        let mut plan = plan();
        plan.register_member(TupleKind::Testtuple, "e1", Status::Waiting).unwrap();
        plan.register_member(TupleKind::Aggregatetuple, "a1", Status::Waiting).unwrap();
        plan.register_member(TupleKind::Traintuple, "t1", Status::Todo).unwrap();
        assert_eq!(plan.all_member_keys(), vec!["t1", "a1", "e1"]);
    }

    #[test]
    fn test_plan_key_is_deterministic() {
        assert_eq!(plan_key_for("t1").unwrap(), plan_key_for("t1").unwrap());
        assert_ne!(plan_key_for("t1").unwrap(), plan_key_for("t2").unwrap());
        assert_ne!(plan_key_for("t1").unwrap(), "t1");
    }
}
