use crate::assets::{
    self, Algo, AlgoInput, DataManager, DataManagerInput, DataSample, DataSampleInput,
    DatasetView, Objective, ObjectiveInput,
};
use crate::compute_plan::{self, ComputePlan};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::events::{emit, StatusChange, TUPLES_UPDATED_EVENT, TUPLE_CREATED_EVENT};
use crate::lifecycle;
use crate::plan_builder::{apply_batch, ComputePlanInput};
use crate::query;
use crate::tuple::{
    self, create_tuple, Aggregatetuple, AggregatetupleInput, AnyTuple, CompositeTraintuple,
    CompositeTraintupleInput, GenericTuple, OutModel, PlanTarget, Testtuple, TesttupleInput,
    Traintuple, TraintupleInput, TupleVariant,
};
use fedl_ledger::Ledger;

/// Entry points of the registry.
///
/// Holds no state besides its config: every call works against the
/// [`Ledger`] of the transaction being executed. On error the caller must
/// abandon the transaction.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    config: RegistryConfig,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // Assets

    pub async fn register_data_manager(
        &self,
        ledger: &mut dyn Ledger,
        input: &DataManagerInput,
    ) -> Result<DataManager> {
        assets::register_data_manager(ledger, input).await
    }

    pub async fn register_data_samples(
        &self,
        ledger: &mut dyn Ledger,
        input: &DataSampleInput,
    ) -> Result<Vec<DataSample>> {
        assets::register_data_samples(ledger, input).await
    }

    pub async fn register_objective(
        &self,
        ledger: &mut dyn Ledger,
        input: &ObjectiveInput,
    ) -> Result<Objective> {
        assets::register_objective(ledger, input).await
    }

    pub async fn register_algo(&self, ledger: &mut dyn Ledger, input: &AlgoInput) -> Result<Algo> {
        assets::register_algo(ledger, input).await
    }

    pub async fn query_dataset(&self, ledger: &dyn Ledger, key: &str) -> Result<DatasetView> {
        assets::query_dataset(ledger, key).await
    }

    pub async fn query_objective(&self, ledger: &dyn Ledger, key: &str) -> Result<Objective> {
        assets::get_objective(ledger, key).await
    }

    pub async fn query_data_sample(&self, ledger: &dyn Ledger, key: &str) -> Result<DataSample> {
        assets::get_data_sample(ledger, key).await
    }

    pub async fn query_algos(&self, ledger: &dyn Ledger) -> Result<Vec<Algo>> {
        assets::query_algos(ledger).await
    }

    pub async fn query_data_managers(&self, ledger: &dyn Ledger) -> Result<Vec<DataManager>> {
        assets::query_data_managers(ledger).await
    }

    pub async fn query_objectives(&self, ledger: &dyn Ledger) -> Result<Vec<Objective>> {
        assets::query_objectives(ledger).await
    }

    // Tuple creation

    async fn create<T: TupleVariant>(&self, ledger: &mut dyn Ledger, input: &T::Input) -> Result<T> {
        let mut changes = Vec::new();
        let tuple =
            create_tuple::<T>(ledger, &self.config, input, PlanTarget::FromInput, &mut changes)
                .await?;
        emit(ledger, TUPLE_CREATED_EVENT, &changes)?;
        Ok(tuple)
    }

    pub async fn create_traintuple(
        &self,
        ledger: &mut dyn Ledger,
        input: &TraintupleInput,
    ) -> Result<Traintuple> {
        self.create(ledger, input).await
    }

    pub async fn create_composite_traintuple(
        &self,
        ledger: &mut dyn Ledger,
        input: &CompositeTraintupleInput,
    ) -> Result<CompositeTraintuple> {
        self.create(ledger, input).await
    }

    pub async fn create_aggregatetuple(
        &self,
        ledger: &mut dyn Ledger,
        input: &AggregatetupleInput,
    ) -> Result<Aggregatetuple> {
        self.create(ledger, input).await
    }

    pub async fn create_testtuple(
        &self,
        ledger: &mut dyn Ledger,
        input: &TesttupleInput,
    ) -> Result<Testtuple> {
        self.create(ledger, input).await
    }

    // Lifecycle

    fn updated(ledger: &mut dyn Ledger, changes: &[StatusChange]) -> Result<()> {
        emit(ledger, TUPLES_UPDATED_EVENT, changes)
    }

    pub async fn log_start(&self, ledger: &mut dyn Ledger, key: &str) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple = lifecycle::log_start(ledger, key, &mut changes).await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    pub async fn log_success_train(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
        out_model: OutModel,
    ) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple =
            lifecycle::log_success_train(ledger, &self.config, key, out_model, &mut changes)
                .await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    pub async fn log_success_composite(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
        out_head_model: OutModel,
        out_trunk_model: OutModel,
    ) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple = lifecycle::log_success_composite(
            ledger,
            &self.config,
            key,
            out_head_model,
            out_trunk_model,
            &mut changes,
        )
        .await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    pub async fn log_success_aggregate(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
        out_model: OutModel,
    ) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple =
            lifecycle::log_success_aggregate(ledger, &self.config, key, out_model, &mut changes)
                .await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    pub async fn log_success_test(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
        perf: f64,
    ) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple =
            lifecycle::log_success_test(ledger, &self.config, key, perf, &mut changes).await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    pub async fn log_fail(&self, ledger: &mut dyn Ledger, key: &str, log: &str) -> Result<AnyTuple> {
        let mut changes = Vec::new();
        let tuple = lifecycle::log_fail(ledger, &self.config, key, log, &mut changes).await?;
        Self::updated(ledger, &changes)?;
        Ok(tuple)
    }

    // Tuple queries

    pub async fn query_tuple(&self, ledger: &dyn Ledger, key: &str) -> Result<AnyTuple> {
        tuple::load_tuple(ledger, key).await
    }

    pub async fn query_traintuple(&self, ledger: &dyn Ledger, key: &str) -> Result<Traintuple> {
        tuple::load(ledger, key).await
    }

    pub async fn query_composite_traintuple(
        &self,
        ledger: &dyn Ledger,
        key: &str,
    ) -> Result<CompositeTraintuple> {
        tuple::load(ledger, key).await
    }

    pub async fn query_aggregatetuple(
        &self,
        ledger: &dyn Ledger,
        key: &str,
    ) -> Result<Aggregatetuple> {
        tuple::load(ledger, key).await
    }

    pub async fn query_testtuple(&self, ledger: &dyn Ledger, key: &str) -> Result<Testtuple> {
        tuple::load(ledger, key).await
    }

    pub async fn query_tuples_by_filter(
        &self,
        ledger: &dyn Ledger,
        index: &str,
        attributes: &[String],
    ) -> Result<Vec<AnyTuple>> {
        query::query_tuples_by_filter(ledger, index, attributes).await
    }

    pub async fn query_testtuples_for(
        &self,
        ledger: &dyn Ledger,
        traintuple_key: &str,
    ) -> Result<Vec<AnyTuple>> {
        query::query_testtuples_for(ledger, traintuple_key).await
    }

    pub async fn query_model_lineage(
        &self,
        ledger: &dyn Ledger,
        key: &str,
    ) -> Result<Vec<GenericTuple>> {
        query::query_model_lineage(ledger, key, self.config.max_cascade_visits).await
    }

    // Compute plans

    pub async fn create_compute_plan(
        &self,
        ledger: &mut dyn Ledger,
        input: &ComputePlanInput,
    ) -> Result<ComputePlan> {
        let mut changes = Vec::new();
        let plan = apply_batch(ledger, &self.config, None, input, &mut changes).await?;
        emit(ledger, TUPLE_CREATED_EVENT, &changes)?;
        Ok(plan)
    }

    /// Add a batch to an existing plan. Temporary IDs of earlier batches
    /// stay resolvable.
    pub async fn update_compute_plan(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
        input: &ComputePlanInput,
    ) -> Result<ComputePlan> {
        let plan = compute_plan::load_plan(&*ledger, key).await?;
        let requester = ledger.tx_creator().clone();
        if requester != plan.owner {
            return Err(RegistryError::forbidden(format!(
                "{} is not the owner of compute plan {}",
                requester, key
            )));
        }
        if plan.status.is_absorbing() {
            return Err(RegistryError::bad_request(format!(
                "compute plan {} is {} and accepts no new tuples",
                key, plan.status
            )));
        }

        let mut changes = Vec::new();
        let plan = apply_batch(ledger, &self.config, Some(plan), input, &mut changes).await?;
        emit(ledger, TUPLE_CREATED_EVENT, &changes)?;
        Ok(plan)
    }

    pub async fn cancel_compute_plan(&self, ledger: &mut dyn Ledger, key: &str) -> Result<ComputePlan> {
        let mut changes = Vec::new();
        let plan = compute_plan::cancel_compute_plan(ledger, key, &mut changes).await?;
        Self::updated(ledger, &changes)?;
        Ok(plan)
    }

    pub async fn query_compute_plan(&self, ledger: &dyn Ledger, key: &str) -> Result<ComputePlan> {
        compute_plan::load_plan(ledger, key).await
    }

    pub async fn query_compute_plans(&self, ledger: &dyn Ledger) -> Result<Vec<ComputePlan>> {
        compute_plan::query_compute_plans(ledger).await
    }

    /// Re-run the dependency cascade from `key` on the current state.
    ///
    /// A committed state is a fixed point, so this reports no change unless
    /// the state was written outside the registry.
    pub async fn resolve_dependents(
        &self,
        ledger: &mut dyn Ledger,
        key: &str,
    ) -> Result<Vec<StatusChange>> {
        let root = tuple::load_tuple(&*ledger, key).await?;
        let mut changes = Vec::new();
        crate::cascade::resolve_dependents(ledger, &self.config, &root, &mut changes).await?;
        Self::updated(ledger, &changes)?;
        Ok(changes)
    }
}
