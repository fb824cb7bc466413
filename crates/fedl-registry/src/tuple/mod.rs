//! Tuples: units of training or evaluation work tracked by the registry.
//!
//! Four kinds share one lifecycle. Each kind implements [`TupleVariant`],
//! which covers input shaping and parent wiring. Everything downstream of
//! creation (status commits, cascade, plan tracking) works on [`AnyTuple`]
//! without knowing the concrete kind.

mod aggregatetuple;
mod composite_traintuple;
mod testtuple;
mod traintuple;

pub use aggregatetuple::{Aggregatetuple, AggregatetupleInput};
pub use composite_traintuple::{CompositeTraintuple, CompositeTraintupleInput};
pub use testtuple::{Testtuple, TesttupleInput};
pub use traintuple::{Traintuple, TraintupleInput};

use crate::assets::{get_algo, Algo, AlgoKind};
use crate::compute_plan;
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::StatusChange;
use crate::index::{algo_index, in_model_index, tag_index, worker_status_index};
use crate::permissions::{can_process, Permissions};
use crate::status::{can_transition, Actor, Status};
use crate::store::{asset_type_of, ensure_absent, get_record, put_record, validate_key, AssetType};
use async_trait::async_trait;
use fedl_ledger::Ledger;
use fedl_types::{content_key, OrgId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TupleKind {
    Traintuple,
    CompositeTraintuple,
    Aggregatetuple,
    Testtuple,
}

impl TupleKind {
    pub const ALL: [TupleKind; 4] = [
        TupleKind::Traintuple,
        TupleKind::CompositeTraintuple,
        TupleKind::Aggregatetuple,
        TupleKind::Testtuple,
    ];

    /// Kinds that produce a model other tuples can consume
    pub const TRAINING: [TupleKind; 3] = [
        TupleKind::Traintuple,
        TupleKind::CompositeTraintuple,
        TupleKind::Aggregatetuple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TupleKind::Traintuple => "traintuple",
            TupleKind::CompositeTraintuple => "compositeTraintuple",
            TupleKind::Aggregatetuple => "aggregatetuple",
            TupleKind::Testtuple => "testtuple",
        }
    }

    pub fn asset_type(&self) -> AssetType {
        match self {
            TupleKind::Traintuple => AssetType::Traintuple,
            TupleKind::CompositeTraintuple => AssetType::CompositeTraintuple,
            TupleKind::Aggregatetuple => AssetType::Aggregatetuple,
            TupleKind::Testtuple => AssetType::Testtuple,
        }
    }

    pub fn from_asset_type(asset_type: AssetType) -> Option<Self> {
        match asset_type {
            AssetType::Traintuple => Some(TupleKind::Traintuple),
            AssetType::CompositeTraintuple => Some(TupleKind::CompositeTraintuple),
            AssetType::Aggregatetuple => Some(TupleKind::Aggregatetuple),
            AssetType::Testtuple => Some(TupleKind::Testtuple),
            _ => None,
        }
    }

    pub fn is_training(&self) -> bool {
        !matches!(self, TupleKind::Testtuple)
    }
}

impl fmt::Display for TupleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every tuple kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TupleCore {
    pub key: String,
    pub creator: OrgId,
    /// Organization executing the tuple
    pub worker: OrgId,
    pub algo_key: String,
    pub status: Status,
    /// Depth within the compute plan, 0 outside of any plan
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_plan_key: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl TupleCore {
    pub(crate) fn new(key: String, creator: OrgId, worker: OrgId, algo_key: String) -> Self {
        Self {
            key,
            creator,
            worker,
            algo_key,
            status: Status::Waiting,
            rank: 0,
            compute_plan_key: None,
            tag: String::new(),
            log: String::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// Model produced by a successful training tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutModel {
    pub checksum: String,
    pub storage_address: String,
}

/// Kind-independent view of a tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericTuple {
    pub key: String,
    pub kind: TupleKind,
    pub creator: OrgId,
    pub worker: OrgId,
    pub algo_key: String,
    pub status: Status,
    pub rank: u32,
    pub compute_plan_key: Option<String>,
    pub tag: String,
    pub parent_keys: Vec<String>,
}

/// Capabilities every tuple kind provides
#[async_trait]
pub trait TupleVariant: Serialize + DeserializeOwned + Clone + Send + Sync + Sized {
    const KIND: TupleKind;

    type Input: Send + Sync;

    /// Resolve and authorize references, compute permissions and derive the key
    async fn set_from_input(
        ledger: &dyn Ledger,
        config: &RegistryConfig,
        input: &Self::Input,
    ) -> Result<Self>;

    /// Load parents, then set the initial status and rank
    async fn set_from_parents(&mut self, ledger: &dyn Ledger) -> Result<()>;

    fn core(&self) -> &TupleCore;

    fn core_mut(&mut self) -> &mut TupleCore;

    /// Distinct keys of the tuples whose output model this tuple consumes
    fn parent_keys(&self) -> Vec<String>;

    /// Kind-specific index entries written once at creation
    fn extra_index_entries(&self) -> Vec<(&'static str, Vec<String>)> {
        Vec::new()
    }

    fn as_generic(&self) -> GenericTuple {
        let core = self.core();
        GenericTuple {
            key: core.key.clone(),
            kind: Self::KIND,
            creator: core.creator.clone(),
            worker: core.worker.clone(),
            algo_key: core.algo_key.clone(),
            status: core.status,
            rank: core.rank,
            compute_plan_key: core.compute_plan_key.clone(),
            tag: core.tag.clone(),
            parent_keys: self.parent_keys(),
        }
    }
}

/// A tuple of any kind, as stored on the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "tuple", rename_all = "camelCase")]
pub enum AnyTuple {
    Traintuple(Traintuple),
    CompositeTraintuple(CompositeTraintuple),
    Aggregatetuple(Aggregatetuple),
    Testtuple(Testtuple),
}

impl AnyTuple {
    pub fn kind(&self) -> TupleKind {
        match self {
            AnyTuple::Traintuple(_) => TupleKind::Traintuple,
            AnyTuple::CompositeTraintuple(_) => TupleKind::CompositeTraintuple,
            AnyTuple::Aggregatetuple(_) => TupleKind::Aggregatetuple,
            AnyTuple::Testtuple(_) => TupleKind::Testtuple,
        }
    }

    pub fn core(&self) -> &TupleCore {
        match self {
            AnyTuple::Traintuple(t) => t.core(),
            AnyTuple::CompositeTraintuple(t) => t.core(),
            AnyTuple::Aggregatetuple(t) => t.core(),
            AnyTuple::Testtuple(t) => t.core(),
        }
    }

    pub fn core_mut(&mut self) -> &mut TupleCore {
        match self {
            AnyTuple::Traintuple(t) => t.core_mut(),
            AnyTuple::CompositeTraintuple(t) => t.core_mut(),
            AnyTuple::Aggregatetuple(t) => t.core_mut(),
            AnyTuple::Testtuple(t) => t.core_mut(),
        }
    }

    pub fn key(&self) -> &str {
        &self.core().key
    }

    pub fn status(&self) -> Status {
        self.core().status
    }

    pub fn parent_keys(&self) -> Vec<String> {
        match self {
            AnyTuple::Traintuple(t) => t.parent_keys(),
            AnyTuple::CompositeTraintuple(t) => t.parent_keys(),
            AnyTuple::Aggregatetuple(t) => t.parent_keys(),
            AnyTuple::Testtuple(t) => t.parent_keys(),
        }
    }

    pub fn as_generic(&self) -> GenericTuple {
        match self {
            AnyTuple::Traintuple(t) => t.as_generic(),
            AnyTuple::CompositeTraintuple(t) => t.as_generic(),
            AnyTuple::Aggregatetuple(t) => t.as_generic(),
            AnyTuple::Testtuple(t) => t.as_generic(),
        }
    }

    /// Permissions of the model handed to consuming tuples.
    ///
    /// For a composite tuple this is the trunk model; the head model never
    /// leaves its worker. Test tuples produce no model.
    pub fn model_permissions(&self) -> Option<&Permissions> {
        match self {
            AnyTuple::Traintuple(t) => Some(&t.permissions),
            AnyTuple::CompositeTraintuple(t) => Some(&t.trunk_permissions),
            AnyTuple::Aggregatetuple(t) => Some(&t.permissions),
            AnyTuple::Testtuple(_) => None,
        }
    }

    /// Overwrite the stored record with this value
    pub(crate) async fn persist(&self, ledger: &mut dyn Ledger) -> Result<()> {
        let key = self.key().to_string();
        let asset_type = self.kind().asset_type();
        match self {
            AnyTuple::Traintuple(t) => put_record(ledger, &key, asset_type, t).await,
            AnyTuple::CompositeTraintuple(t) => put_record(ledger, &key, asset_type, t).await,
            AnyTuple::Aggregatetuple(t) => put_record(ledger, &key, asset_type, t).await,
            AnyTuple::Testtuple(t) => put_record(ledger, &key, asset_type, t).await,
        }
    }
}

/// Load a tuple of any kind
pub async fn load_tuple(ledger: &dyn Ledger, key: &str) -> Result<AnyTuple> {
    let kind = asset_type_of(ledger, key)
        .await?
        .and_then(TupleKind::from_asset_type)
        .ok_or_else(|| RegistryError::not_found(format!("tuple {} not found", key)))?;
    let asset_type = kind.asset_type();
    Ok(match kind {
        TupleKind::Traintuple => AnyTuple::Traintuple(get_record(ledger, key, asset_type).await?),
        TupleKind::CompositeTraintuple => {
            AnyTuple::CompositeTraintuple(get_record(ledger, key, asset_type).await?)
        }
        TupleKind::Aggregatetuple => {
            AnyTuple::Aggregatetuple(get_record(ledger, key, asset_type).await?)
        }
        TupleKind::Testtuple => AnyTuple::Testtuple(get_record(ledger, key, asset_type).await?),
    })
}

/// Load a tuple of a known kind. Other kinds read as `NotFound`.
pub async fn load<T: TupleVariant>(ledger: &dyn Ledger, key: &str) -> Result<T> {
    get_record(ledger, key, T::KIND.asset_type()).await
}

/// Load a tuple referenced as an in-model. Test tuples produce no model.
pub(crate) async fn load_parent(ledger: &dyn Ledger, key: &str) -> Result<AnyTuple> {
    let parent = load_tuple(ledger, key).await?;
    if !parent.kind().is_training() {
        return Err(RegistryError::bad_request(format!(
            "tuple {} is a {} and produces no model",
            key,
            parent.kind()
        )));
    }
    Ok(parent)
}

/// Fetch an algo and check that `requester` may process it
pub(crate) async fn authorize_algo(
    ledger: &dyn Ledger,
    key: &str,
    kind: AlgoKind,
    requester: &OrgId,
) -> Result<Algo> {
    let algo = get_algo(ledger, key, kind).await?;
    if !can_process(&algo.permissions, &algo.owner, requester) {
        return Err(RegistryError::forbidden(format!(
            "{} is not allowed to process {} {}",
            requester, kind, key
        )));
    }
    Ok(algo)
}

/// Validate the in-model list of a training tuple
pub(crate) fn check_in_models(config: &RegistryConfig, keys: &[String]) -> Result<()> {
    if keys.len() > config.max_in_models {
        return Err(RegistryError::bad_request(format!(
            "{} in-models exceed the limit of {}",
            keys.len(),
            config.max_in_models
        )));
    }
    let mut seen = BTreeSet::new();
    for key in keys {
        validate_key(key, "in-model key")?;
        if !seen.insert(key) {
            return Err(RegistryError::bad_request(format!("duplicate in-model {}", key)));
        }
    }
    Ok(())
}

/// Caller key when allowed, otherwise the content key of `seed`
pub(crate) fn derive_key<S: Serialize>(
    config: &RegistryConfig,
    caller_key: Option<&str>,
    seed: &S,
) -> Result<String> {
    match caller_key {
        Some(key) if config.allow_caller_keys => {
            validate_key(key, "tuple key")?;
            Ok(key.to_string())
        }
        _ => Ok(content_key(seed)?),
    }
}

/// Initial status given the parents: `Todo` once every parent is done
pub(crate) fn status_from_parents(parents: &[AnyTuple]) -> Status {
    if parents.iter().all(|p| p.status() == Status::Done) {
        Status::Todo
    } else {
        Status::Waiting
    }
}

/// One more than the deepest parent of the same plan, 0 when there is none
pub(crate) fn rank_from_parents(compute_plan_key: Option<&str>, parents: &[AnyTuple]) -> u32 {
    let Some(plan_key) = compute_plan_key else {
        return 0;
    };
    parents
        .iter()
        .filter(|p| p.core().compute_plan_key.as_deref() == Some(plan_key))
        .map(|p| p.core().rank + 1)
        .max()
        .unwrap_or(0)
}

/// Where a new tuple lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlanTarget {
    /// Standalone submission: plan taken from the input, slot checks enforced
    FromInput,
    /// Batch member of an existing plan
    Batch(String),
    /// First member of a new batch plan, keyed after this tuple
    NewBatch,
}

/// Validate, wire and persist a new tuple along with its index entries.
///
/// Nothing is written unless every check passes.
pub(crate) async fn create_tuple<T: TupleVariant>(
    ledger: &mut dyn Ledger,
    config: &RegistryConfig,
    input: &T::Input,
    target: PlanTarget,
    changes: &mut Vec<StatusChange>,
) -> Result<T> {
    let mut tuple = T::set_from_input(&*ledger, config, input).await?;
    let key = tuple.core().key.clone();
    ensure_absent(&*ledger, &key).await?;

    let standalone = target == PlanTarget::FromInput;
    match target {
        PlanTarget::FromInput => {}
        PlanTarget::Batch(plan_key) => tuple.core_mut().compute_plan_key = Some(plan_key),
        PlanTarget::NewBatch => {
            let plan_key = compute_plan::plan_key_for(&key)?;
            let owner = ledger.tx_creator().clone();
            compute_plan::create_plan(ledger, &plan_key, owner).await?;
            tuple.core_mut().compute_plan_key = Some(plan_key);
        }
    }

    tuple.set_from_parents(&*ledger).await?;

    if let Some(plan_key) = tuple.core().compute_plan_key.clone() {
        let plan = compute_plan::load_plan(&*ledger, &plan_key).await?;
        if standalone && T::KIND.is_training() {
            compute_plan::check_standalone_slot(&*ledger, &plan, T::KIND, tuple.core()).await?;
        }
        save_new(ledger, &tuple).await?;
        compute_plan::add_member(ledger, plan, T::KIND, tuple.core()).await?;
    } else {
        save_new(ledger, &tuple).await?;
    }

    let core = tuple.core();
    changes.push(StatusChange {
        key: core.key.clone(),
        kind: T::KIND,
        from: None,
        to: core.status,
    });

    info!(
        key = %core.key,
        kind = %T::KIND,
        worker = %core.worker,
        status = %core.status,
        rank = core.rank,
        compute_plan = core.compute_plan_key.as_deref().unwrap_or(""),
        "🧩 Tuple created"
    );

    Ok(tuple)
}

async fn save_new<T: TupleVariant>(ledger: &mut dyn Ledger, tuple: &T) -> Result<()> {
    let core = tuple.core();
    let key = core.key.as_str();
    put_record(ledger, key, T::KIND.asset_type(), tuple).await?;

    ledger
        .create_index_entry(
            &worker_status_index(T::KIND),
            &[core.worker.as_str(), core.status.as_str(), key],
        )
        .await?;
    ledger
        .create_index_entry(&algo_index(T::KIND), &[core.algo_key.as_str(), key])
        .await?;
    if !core.tag.is_empty() {
        ledger
            .create_index_entry(&tag_index(T::KIND), &[core.tag.as_str(), key])
            .await?;
    }
    for parent in tuple.parent_keys() {
        ledger
            .create_index_entry(&in_model_index(T::KIND), &[parent.as_str(), key])
            .await?;
    }
    for (index, attributes) in tuple.extra_index_entries() {
        let attributes: Vec<&str> = attributes.iter().map(String::as_str).collect();
        ledger.create_index_entry(index, &attributes).await?;
    }
    Ok(())
}

/// Move `tuple` to `new_status` on behalf of `actor`.
///
/// Persists the record, swaps its worker/status index entry and propagates
/// the change to the owning compute plan. Returns whether anything changed.
pub(crate) async fn commit_status_update(
    ledger: &mut dyn Ledger,
    tuple: &mut AnyTuple,
    new_status: Status,
    actor: &Actor,
    changes: &mut Vec<StatusChange>,
) -> Result<bool> {
    let kind = tuple.kind();
    let old_status = tuple.status();
    if old_status == new_status {
        return Ok(false);
    }
    // Only waiting tuples get aborted; anything further along keeps running
    if new_status == Status::Aborted && old_status != Status::Waiting {
        return Ok(false);
    }
    if let Actor::Worker(requester) = actor {
        if requester != &tuple.core().worker {
            return Err(RegistryError::forbidden(format!(
                "{} is not the worker of {} {}",
                requester,
                kind,
                tuple.key()
            )));
        }
    }

    match actor {
        Actor::Worker(_) => {
            if !can_transition(old_status, new_status, actor) {
                return Err(RegistryError::bad_request(format!(
                    "cannot change status of {} {} from {} to {}",
                    kind,
                    tuple.key(),
                    old_status,
                    new_status
                )));
            }
        }
        Actor::System => {
            if !can_transition(old_status, new_status, actor) {
                return Err(RegistryError::internal(format!(
                    "unexpected transition of {} {} from {} to {}",
                    kind,
                    tuple.key(),
                    old_status,
                    new_status
                )));
            }
        }
    }

    tuple.core_mut().status = new_status;
    tuple.persist(ledger).await?;

    let core = tuple.core();
    ledger
        .update_index_entry(
            &worker_status_index(kind),
            &[core.worker.as_str(), old_status.as_str(), core.key.as_str()],
            &[core.worker.as_str(), new_status.as_str(), core.key.as_str()],
        )
        .await?;

    changes.push(StatusChange {
        key: core.key.clone(),
        kind,
        from: Some(old_status),
        to: new_status,
    });
    debug!(
        key = %core.key,
        kind = %kind,
        from = %old_status,
        to = %new_status,
        "Tuple status committed"
    );

    if let Some(plan_key) = core.compute_plan_key.clone() {
        compute_plan::on_member_status(ledger, &plan_key, new_status).await?;
    }
    Ok(true)
}
