#![allow(dead_code)]

use fedl_ledger::{MemoryBackend, Snapshot, TxContext};
use fedl_registry::{
    AlgoInput, AlgoKind, AnyTuple, ComputePlan, DataManagerInput, DataSampleInput, Dataset,
    ObjectiveInput, OutModel, PermissionsInput, Registry, RegistryConfig, Traintuple,
    TraintupleInput,
};
use fedl_types::OrgId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const ORG_A: &str = "orgA";
pub const ORG_B: &str = "orgB";

/// Registry over an in-memory ledger, seeded with:
/// - orgA: data manager `dmA` (private) with train samples `a1..a4` and test sample `ta1`
/// - orgB: data manager `dmB` (public) with train samples `b1..b2`
/// - public algos `algo`, `calgo` (composite) and `aalgo` (aggregate) owned by orgA
/// - objective `obj` whose test dataset is `dmA` / `ta1`
pub struct Harness {
    pub backend: Arc<MemoryBackend>,
    pub registry: Registry,
    next_tx: AtomicU64,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(RegistryConfig::default()).await
    }

    pub async fn with_config(config: RegistryConfig) -> Self {
        let harness = Self {
            backend: Arc::new(MemoryBackend::new()),
            registry: Registry::new(config).unwrap(),
            next_tx: AtomicU64::new(1),
        };
        harness.seed().await;
        harness
    }

    pub fn tx(&self, org: &str) -> TxContext {
        let id = self.next_tx.fetch_add(1, Ordering::SeqCst);
        TxContext::new(self.backend.clone(), OrgId::from(org), format!("tx-{}", id))
    }

    pub async fn state_hash(&self) -> String {
        Snapshot::state_hash(self.backend.as_ref()).await.unwrap()
    }

    async fn seed(&self) {
        let registry = &self.registry;

        let mut tx = self.tx(ORG_A);
        registry
            .register_data_manager(
                &mut tx,
                &DataManagerInput {
                    key: "dmA".into(),
                    name: "hospital A".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        registry
            .register_data_samples(
                &mut tx,
                &DataSampleInput {
                    keys: vec!["a1".into(), "a2".into(), "a3".into(), "a4".into()],
                    data_manager_keys: vec!["dmA".into()],
                    test_only: false,
                },
            )
            .await
            .unwrap();
        registry
            .register_data_samples(
                &mut tx,
                &DataSampleInput {
                    keys: vec!["ta1".into()],
                    data_manager_keys: vec!["dmA".into()],
                    test_only: true,
                },
            )
            .await
            .unwrap();
        for (key, kind) in [
            ("algo", AlgoKind::Algo),
            ("calgo", AlgoKind::CompositeAlgo),
            ("aalgo", AlgoKind::AggregateAlgo),
        ] {
            registry
                .register_algo(
                    &mut tx,
                    &AlgoInput {
                        key: key.into(),
                        name: key.into(),
                        kind,
                        permissions: PermissionsInput::public(),
                    },
                )
                .await
                .unwrap();
        }
        registry
            .register_objective(
                &mut tx,
                &ObjectiveInput {
                    key: "obj".into(),
                    name: "accuracy".into(),
                    test_dataset: Some(Dataset {
                        data_manager_key: "dmA".into(),
                        data_sample_keys: vec!["ta1".into()],
                    }),
                    permissions: PermissionsInput::public(),
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = self.tx(ORG_B);
        registry
            .register_data_manager(
                &mut tx,
                &DataManagerInput {
                    key: "dmB".into(),
                    name: "hospital B".into(),
                    objective_key: Some("obj".into()),
                    permissions: PermissionsInput::public(),
                },
            )
            .await
            .unwrap();
        registry
            .register_data_samples(
                &mut tx,
                &DataSampleInput {
                    keys: vec!["b1".into(), "b2".into()],
                    data_manager_keys: vec!["dmB".into()],
                    test_only: false,
                },
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn create_train(&self, data_manager: &str, samples: &[&str], in_models: &[&str]) -> Traintuple {
        let mut tx = self.tx(ORG_A);
        let tuple = self
            .registry
            .create_traintuple(&mut tx, &train_input(data_manager, samples, in_models))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        tuple
    }

    pub async fn start(&self, worker: &str, key: &str) {
        let mut tx = self.tx(worker);
        self.registry.log_start(&mut tx, key).await.unwrap();
        tx.commit().await.unwrap();
    }

    /// Start then complete a traintuple
    pub async fn train(&self, worker: &str, key: &str) {
        self.start(worker, key).await;
        let mut tx = self.tx(worker);
        self.registry
            .log_success_train(&mut tx, key, out_model(key))
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn fail(&self, worker: &str, key: &str) {
        let mut tx = self.tx(worker);
        self.registry.log_fail(&mut tx, key, "out of memory").await.unwrap();
        tx.commit().await.unwrap();
    }

    pub async fn tuple(&self, key: &str) -> AnyTuple {
        let tx = self.tx(ORG_A);
        self.registry.query_tuple(&tx, key).await.unwrap()
    }

    pub async fn plan(&self, key: &str) -> ComputePlan {
        let tx = self.tx(ORG_A);
        self.registry.query_compute_plan(&tx, key).await.unwrap()
    }
}

pub fn train_input(data_manager: &str, samples: &[&str], in_models: &[&str]) -> TraintupleInput {
    TraintupleInput {
        algo_key: "algo".into(),
        data_manager_key: data_manager.into(),
        data_sample_keys: samples.iter().map(|s| s.to_string()).collect(),
        in_models: in_models.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn out_model(key: &str) -> OutModel {
    OutModel {
        checksum: format!("checksum-{}", key),
        storage_address: format!("https://storage.local/{}", key),
    }
}
