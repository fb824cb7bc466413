//! Federated-learning task registry.
//!
//! Organizations register datasets, objectives and algorithms, then submit
//! tuples: training or evaluation work that consumes the models of other
//! tuples. Within one deterministic ledger transaction the registry validates
//! a submission, derives its initial status from its parents, keeps the
//! secondary indices consistent and, when a tuple completes or fails,
//! cascades the change to dependents and to the owning compute plan.
//!
//! All state lives on the [`fedl_ledger::Ledger`] passed to each call.

pub mod assets;
pub mod cascade;
pub mod compute_plan;
pub mod config;
pub mod error;
pub mod events;
pub mod index;
pub mod lifecycle;
pub mod permissions;
pub mod plan_builder;
pub mod query;
pub mod registry;
pub mod status;
pub mod store;
pub mod tuple;

pub use assets::{
    Algo, AlgoInput, AlgoKind, DataManager, DataManagerInput, DataSample, DataSampleInput,
    Dataset, DatasetView, Objective, ObjectiveInput,
};
pub use compute_plan::ComputePlan;
pub use config::RegistryConfig;
pub use error::{ErrorKind, RegistryError, Result};
pub use events::{StatusChange, TupleEvent, TUPLES_UPDATED_EVENT, TUPLE_CREATED_EVENT};
pub use permissions::{
    can_process, merge_permissions, new_permissions, new_privilege, Permissions,
    PermissionsInput, Privilege, PrivilegeInput,
};
pub use plan_builder::{
    ComputePlanAggregatetuple, ComputePlanCompositeTraintuple, ComputePlanInput,
    ComputePlanTesttuple, ComputePlanTraintuple,
};
pub use registry::Registry;
pub use status::{check_new_tuple_status, Actor, PlanStatus, Status};
pub use tuple::{
    Aggregatetuple, AggregatetupleInput, AnyTuple, CompositeTraintuple,
    CompositeTraintupleInput, GenericTuple, OutModel, Testtuple, TesttupleInput, Traintuple,
    TraintupleInput, TupleKind,
};
