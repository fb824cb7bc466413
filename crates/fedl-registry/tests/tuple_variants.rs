mod common;

use common::{out_model, Harness, ORG_A, ORG_B};
use fedl_registry::{
    AggregatetupleInput, AnyTuple, CompositeTraintupleInput, ErrorKind, Permissions,
    PermissionsInput, Privilege, RegistryConfig, Status, TesttupleInput, TraintupleInput,
};
use fedl_types::OrgId;

fn composite_input(
    data_manager: &str,
    sample: &str,
    head: Option<&str>,
    trunk: Option<&str>,
) -> CompositeTraintupleInput {
    CompositeTraintupleInput {
        algo_key: "calgo".into(),
        data_manager_key: data_manager.into(),
        data_sample_keys: vec![sample.into()],
        in_head_model_key: head.map(str::to_string),
        in_trunk_model_key: trunk.map(str::to_string),
        out_trunk_model_permissions: PermissionsInput::public(),
        ..Default::default()
    }
}

fn aggregate_input(worker: &str, in_models: &[&str]) -> AggregatetupleInput {
    AggregatetupleInput {
        key: None,
        algo_key: "aalgo".into(),
        worker: OrgId::from(worker),
        in_models: in_models.iter().map(|s| s.to_string()).collect(),
        compute_plan_key: None,
        tag: String::new(),
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn test_composite_head_model_stays_on_worker() {
    let h = Harness::new().await;

    let mut tx = h.tx(ORG_A);
    let root = h
        .registry
        .create_composite_traintuple(&mut tx, &composite_input("dmA", "a1", None, None))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(root.core.status, Status::Todo);
    assert_eq!(root.head_permissions, Permissions::private_to(&OrgId::from(ORG_A)));
    assert_eq!(root.trunk_permissions.process, Privilege::public());

    // Head and trunk come together
    let mut tx = h.tx(ORG_A);
    let err = h
        .registry
        .create_composite_traintuple(
            &mut tx,
            &composite_input("dmA", "a2", Some(&root.core.key), None),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    drop(tx);

    // A head model cannot move to another worker
    let mut tx = h.tx(ORG_B);
    let err = h
        .registry
        .create_composite_traintuple(
            &mut tx,
            &composite_input("dmB", "b1", Some(&root.core.key), Some(&root.core.key)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    drop(tx);

    let mut tx = h.tx(ORG_A);
    let next = h
        .registry
        .create_composite_traintuple(
            &mut tx,
            &composite_input("dmA", "a2", Some(&root.core.key), Some(&root.core.key)),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(next.core.status, Status::Waiting);

    h.start(ORG_A, &root.core.key).await;
    let mut tx = h.tx(ORG_A);
    h.registry
        .log_success_composite(&mut tx, &root.core.key, out_model("head"), out_model("trunk"))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let AnyTuple::CompositeTraintuple(done) = h.tuple(&root.core.key).await else {
        panic!("expected a composite traintuple");
    };
    assert_eq!(done.out_head_model, Some(out_model("head")));
    assert_eq!(done.out_trunk_model, Some(out_model("trunk")));
    assert_eq!(h.tuple(&next.core.key).await.status(), Status::Todo);
}

#[tokio::test]
async fn test_composite_head_parent_must_be_composite() {
    let h = Harness::new().await;
    let train = h.create_train("dmA", &["a1"], &[]).await;

    let mut tx = h.tx(ORG_A);
    let err = h
        .registry
        .create_composite_traintuple(
            &mut tx,
            &composite_input("dmA", "a2", Some(&train.core.key), Some(&train.core.key)),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_aggregate_merges_parent_permissions() {
    let h = Harness::new().await;
    // Private to orgA
    let private = h.create_train("dmA", &["a1"], &[]).await;
    // Public
    let public = h.create_train("dmB", &["b1"], &[]).await;
    assert_eq!(public.core.worker, OrgId::from(ORG_B));
    assert!(public.permissions.process.public);

    let mut tx = h.tx(ORG_A);
    let err = h
        .registry
        .create_aggregatetuple(&mut tx, &aggregate_input(ORG_B, &[&private.core.key]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    drop(tx);

    let mut tx = h.tx(ORG_A);
    let aggregate = h
        .registry
        .create_aggregatetuple(
            &mut tx,
            &aggregate_input(ORG_A, &[&private.core.key, &public.core.key]),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(aggregate.core.status, Status::Waiting);
    assert!(!aggregate.permissions.process.public);
    assert!(aggregate
        .permissions
        .process
        .authorized_ids
        .contains(&OrgId::from(ORG_A)));
    assert!(!aggregate
        .permissions
        .process
        .authorized_ids
        .contains(&OrgId::from(ORG_B)));

    h.train(ORG_A, &private.core.key).await;
    assert_eq!(h.tuple(&aggregate.core.key).await.status(), Status::Waiting);
    h.train(ORG_B, &public.core.key).await;
    assert_eq!(h.tuple(&aggregate.core.key).await.status(), Status::Todo);

    h.start(ORG_A, &aggregate.core.key).await;
    let mut tx = h.tx(ORG_A);
    h.registry
        .log_success_aggregate(&mut tx, &aggregate.core.key, out_model("agg"))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(h.tuple(&aggregate.core.key).await.status(), Status::Done);
}

#[tokio::test]
async fn test_testtuple_on_failed_parent_rejected() {
    let h = Harness::new().await;
    let train = h.create_train("dmA", &["a1"], &[]).await;
    h.fail(ORG_A, &train.core.key).await;

    let mut tx = h.tx(ORG_A);
    let err = h
        .registry
        .create_testtuple(
            &mut tx,
            &TesttupleInput {
                traintuple_key: train.core.key.clone(),
                objective_key: "obj".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn test_testtuple_dataset_certification() {
    let h = Harness::new().await;
    let train = h.create_train("dmB", &["b1"], &[]).await;
    h.train(ORG_B, &train.core.key).await;

    let mut tx = h.tx(ORG_A);
    let explicit_canonical = h
        .registry
        .create_testtuple(
            &mut tx,
            &TesttupleInput {
                traintuple_key: train.core.key.clone(),
                objective_key: "obj".into(),
                data_manager_key: Some("dmA".into()),
                data_sample_keys: vec!["ta1".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(explicit_canonical.certified);
    assert_eq!(explicit_canonical.core.status, Status::Todo);
    assert_eq!(explicit_canonical.core.worker, OrgId::from(ORG_A));
    assert_eq!(explicit_canonical.core.algo_key, "algo");

    let custom = h
        .registry
        .create_testtuple(
            &mut tx,
            &TesttupleInput {
                traintuple_key: train.core.key.clone(),
                objective_key: "obj".into(),
                data_manager_key: Some("dmB".into()),
                data_sample_keys: vec!["b2".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!custom.certified);
    assert_eq!(custom.core.worker, OrgId::from(ORG_B));

    let err = h
        .registry
        .create_testtuple(
            &mut tx,
            &TesttupleInput {
                traintuple_key: train.core.key.clone(),
                objective_key: "obj".into(),
                data_manager_key: Some("dmB".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    tx.commit().await.unwrap();

    let tx = h.tx(ORG_A);
    let anchored = h
        .registry
        .query_testtuples_for(&tx, &train.core.key)
        .await
        .unwrap();
    assert_eq!(anchored.len(), 2);
    let certified = h
        .registry
        .query_tuples_by_filter(
            &tx,
            "testtuple~objective~certified~key",
            &["obj".to_string(), "true".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(certified.len(), 1);
    assert_eq!(certified[0].key(), explicit_canonical.core.key);
}

#[tokio::test]
async fn test_testtuple_requires_model_access() {
    let h = Harness::new().await;
    // Private to orgA
    let train = h.create_train("dmA", &["a1"], &[]).await;

    let mut tx = h.tx(ORG_B);
    let err = h
        .registry
        .create_testtuple(
            &mut tx,
            &TesttupleInput {
                traintuple_key: train.core.key.clone(),
                objective_key: "obj".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn test_caller_keys_follow_config() {
    let open = Harness::new().await;
    let mut tx = open.tx(ORG_A);
    let named = open
        .registry
        .create_traintuple(
            &mut tx,
            &TraintupleInput {
                key: Some("my-train".into()),
                ..common::train_input("dmA", &["a1"], &[])
            },
        )
        .await
        .unwrap();
    assert_eq!(named.core.key, "my-train");

    let closed = Harness::with_config(RegistryConfig {
        allow_caller_keys: false,
        ..Default::default()
    })
    .await;
    let mut tx = closed.tx(ORG_A);
    let derived = closed
        .registry
        .create_traintuple(
            &mut tx,
            &TraintupleInput {
                key: Some("my-train".into()),
                ..common::train_input("dmA", &["a1"], &[])
            },
        )
        .await
        .unwrap();
    assert_ne!(derived.core.key, "my-train");
    assert_eq!(derived.core.key.len(), fedl_types::CONTENT_KEY_LEN);
}

#[tokio::test]
async fn test_in_model_limit() {
    let h = Harness::with_config(RegistryConfig {
        max_in_models: 1,
        ..Default::default()
    })
    .await;
    let t1 = h.create_train("dmA", &["a1"], &[]).await;
    let t2 = h.create_train("dmA", &["a2"], &[]).await;

    let mut tx = h.tx(ORG_A);
    let err = h
        .registry
        .create_traintuple(
            &mut tx,
            &common::train_input("dmA", &["a3"], &[&t1.core.key, &t2.core.key]),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

/// Composite H (head source), traintuple T1, then composite C on (H, T1) and
/// aggregate A on [T1]
async fn mixed_children(h: &Harness) -> (String, String, String, String) {
    let mut tx = h.tx(ORG_A);
    let head = h
        .registry
        .create_composite_traintuple(&mut tx, &composite_input("dmA", "a1", None, None))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    let trunk = h.create_train("dmA", &["a2"], &[]).await;

    let mut tx = h.tx(ORG_A);
    let composite = h
        .registry
        .create_composite_traintuple(
            &mut tx,
            &composite_input("dmA", "a3", Some(&head.core.key), Some(&trunk.core.key)),
        )
        .await
        .unwrap();
    let aggregate = h
        .registry
        .create_aggregatetuple(&mut tx, &aggregate_input(ORG_A, &[&trunk.core.key]))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(composite.core.status, Status::Waiting);
    assert_eq!(aggregate.core.status, Status::Waiting);

    (head.core.key, trunk.core.key, composite.core.key, aggregate.core.key)
}

#[tokio::test]
async fn test_trunk_failure_reaches_composite_and_aggregate_children() {
    let h = Harness::new().await;
    let (head, trunk, composite, aggregate) = mixed_children(&h).await;

    h.fail(ORG_A, &trunk).await;

    assert_eq!(h.tuple(&composite).await.status(), Status::Failed);
    assert_eq!(h.tuple(&aggregate).await.status(), Status::Failed);
    assert_eq!(h.tuple(&head).await.status(), Status::Todo);
}

#[tokio::test]
async fn test_composite_waits_for_head_and_trunk() {
    let h = Harness::new().await;
    let (head, trunk, composite, aggregate) = mixed_children(&h).await;

    h.train(ORG_A, &trunk).await;
    assert_eq!(h.tuple(&aggregate).await.status(), Status::Todo);
    assert_eq!(h.tuple(&composite).await.status(), Status::Waiting);

    h.start(ORG_A, &head).await;
    let mut tx = h.tx(ORG_A);
    h.registry
        .log_success_composite(&mut tx, &head, out_model("head"), out_model("trunk"))
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(h.tuple(&composite).await.status(), Status::Todo);
}
