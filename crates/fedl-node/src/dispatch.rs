//! Routing of a named ledger function and its JSON arguments to the registry.
//!
//! Function names follow the chaincode convention (`createTraintuple`,
//! `logSuccessTrain`, ...). Arguments are the camelCase JSON of the matching
//! registry input. Every error carries the HTTP-style status of its kind.

use fedl_ledger::{Ledger, LedgerEvent};
use fedl_registry::{
    AggregatetupleInput, AlgoInput, CompositeTraintupleInput, ComputePlanInput, DataManagerInput,
    DataSampleInput, ObjectiveInput, OutModel, Registry, RegistryError, TesttupleInput,
    TraintupleInput,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One transaction of a replay file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxRequest {
    /// Derived from the request and the ledger state when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_id: Option<String>,
    pub creator: String,
    pub function: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub name: String,
    pub payload: Value,
}

impl From<LedgerEvent> for EventRecord {
    fn from(event: LedgerEvent) -> Self {
        let payload = serde_json::from_slice(&event.payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&event.payload).into_owned()));
        Self {
            name: event.name,
            payload,
        }
    }
}

/// Outcome of one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub tx_id: String,
    pub function: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventRecord>,
}

impl TxResponse {
    pub fn committed(tx_id: String, function: &str, payload: Value, events: Vec<LedgerEvent>) -> Self {
        Self {
            tx_id,
            function: function.to_string(),
            status: 200,
            payload: Some(payload),
            error: None,
            events: events.into_iter().map(EventRecord::from).collect(),
        }
    }

    pub fn rejected(tx_id: String, function: &str, error: &RegistryError) -> Self {
        Self {
            tx_id,
            function: function.to_string(),
            status: error.kind().status_code(),
            payload: None,
            error: Some(error.to_string()),
            events: Vec::new(),
        }
    }

    pub fn is_committed(&self) -> bool {
        self.status == 200
    }
}

#[derive(Deserialize)]
struct KeyArgs {
    key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuccessTrainArgs {
    key: String,
    out_model: OutModel,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuccessCompositeArgs {
    key: String,
    out_head_model: OutModel,
    out_trunk_model: OutModel,
}

#[derive(Deserialize)]
struct SuccessTestArgs {
    key: String,
    perf: f64,
}

#[derive(Deserialize)]
struct FailArgs {
    key: String,
    #[serde(default)]
    log: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilterArgs {
    index_name: String,
    #[serde(default)]
    attributes: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePlanArgs {
    compute_plan_key: String,
    #[serde(flatten)]
    batch: ComputePlanInput,
}

fn parse<T: DeserializeOwned>(function: &str, args: Value) -> Result<T, RegistryError> {
    // Functions without arguments accept an absent `args`
    let args = if args.is_null() { Value::Object(Default::default()) } else { args };
    serde_json::from_value(args)
        .map_err(|e| RegistryError::bad_request(format!("invalid arguments for {}: {}", function, e)))
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, RegistryError> {
    Ok(serde_json::to_value(value)?)
}

/// Execute `function` against `ledger`. The caller commits on success and
/// drops the transaction otherwise.
pub async fn dispatch(
    registry: &Registry,
    ledger: &mut dyn Ledger,
    function: &str,
    args: Value,
) -> Result<Value, RegistryError> {
    debug!(function, tx_id = %ledger.tx_id(), "Dispatching");

    match function {
        // Assets
        "registerDataManager" => {
            let input: DataManagerInput = parse(function, args)?;
            to_value(&registry.register_data_manager(ledger, &input).await?)
        }
        "registerDataSample" => {
            let input: DataSampleInput = parse(function, args)?;
            to_value(&registry.register_data_samples(ledger, &input).await?)
        }
        "registerObjective" => {
            let input: ObjectiveInput = parse(function, args)?;
            to_value(&registry.register_objective(ledger, &input).await?)
        }
        "registerAlgo" => {
            let input: AlgoInput = parse(function, args)?;
            to_value(&registry.register_algo(ledger, &input).await?)
        }
        "queryDataset" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_dataset(ledger, &key).await?)
        }
        "queryDataSample" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_data_sample(ledger, &key).await?)
        }
        "queryObjective" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_objective(ledger, &key).await?)
        }
        "queryDataManagers" => to_value(&registry.query_data_managers(ledger).await?),
        "queryObjectives" => to_value(&registry.query_objectives(ledger).await?),
        "queryAlgos" => to_value(&registry.query_algos(ledger).await?),

        // Tuple creation
        "createTraintuple" => {
            let input: TraintupleInput = parse(function, args)?;
            to_value(&registry.create_traintuple(ledger, &input).await?)
        }
        "createCompositeTraintuple" => {
            let input: CompositeTraintupleInput = parse(function, args)?;
            to_value(&registry.create_composite_traintuple(ledger, &input).await?)
        }
        "createAggregatetuple" => {
            let input: AggregatetupleInput = parse(function, args)?;
            to_value(&registry.create_aggregatetuple(ledger, &input).await?)
        }
        "createTesttuple" => {
            let input: TesttupleInput = parse(function, args)?;
            to_value(&registry.create_testtuple(ledger, &input).await?)
        }

        // Lifecycle
        "logStart" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.log_start(ledger, &key).await?)
        }
        "logSuccessTrain" => {
            let SuccessTrainArgs { key, out_model } = parse(function, args)?;
            to_value(&registry.log_success_train(ledger, &key, out_model).await?)
        }
        "logSuccessCompositeTrain" => {
            let SuccessCompositeArgs {
                key,
                out_head_model,
                out_trunk_model,
            } = parse(function, args)?;
            to_value(
                &registry
                    .log_success_composite(ledger, &key, out_head_model, out_trunk_model)
                    .await?,
            )
        }
        "logSuccessAggregate" => {
            let SuccessTrainArgs { key, out_model } = parse(function, args)?;
            to_value(&registry.log_success_aggregate(ledger, &key, out_model).await?)
        }
        "logSuccessTest" => {
            let SuccessTestArgs { key, perf } = parse(function, args)?;
            to_value(&registry.log_success_test(ledger, &key, perf).await?)
        }
        "logFail" => {
            let FailArgs { key, log } = parse(function, args)?;
            to_value(&registry.log_fail(ledger, &key, &log).await?)
        }

        // Tuple queries
        "queryTuple" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_tuple(ledger, &key).await?)
        }
        "queryTraintuple" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_traintuple(ledger, &key).await?)
        }
        "queryCompositeTraintuple" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_composite_traintuple(ledger, &key).await?)
        }
        "queryAggregatetuple" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_aggregatetuple(ledger, &key).await?)
        }
        "queryTesttuple" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_testtuple(ledger, &key).await?)
        }
        "queryFilter" => {
            let FilterArgs {
                index_name,
                attributes,
            } = parse(function, args)?;
            to_value(
                &registry
                    .query_tuples_by_filter(ledger, &index_name, &attributes)
                    .await?,
            )
        }
        "queryTesttuplesFor" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_testtuples_for(ledger, &key).await?)
        }
        "queryModelLineage" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_model_lineage(ledger, &key).await?)
        }

        // Compute plans
        "createComputePlan" => {
            let input: ComputePlanInput = parse(function, args)?;
            to_value(&registry.create_compute_plan(ledger, &input).await?)
        }
        "updateComputePlan" => {
            let UpdatePlanArgs {
                compute_plan_key,
                batch,
            } = parse(function, args)?;
            to_value(
                &registry
                    .update_compute_plan(ledger, &compute_plan_key, &batch)
                    .await?,
            )
        }
        "cancelComputePlan" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.cancel_compute_plan(ledger, &key).await?)
        }
        "queryComputePlan" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.query_compute_plan(ledger, &key).await?)
        }
        "queryComputePlans" => to_value(&registry.query_compute_plans(ledger).await?),
        "resolveDependents" => {
            let KeyArgs { key } = parse(function, args)?;
            to_value(&registry.resolve_dependents(ledger, &key).await?)
        }

        other => Err(RegistryError::bad_request(format!("unknown function {}", other))),
    }
}
