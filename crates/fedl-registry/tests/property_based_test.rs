use fedl_registry::plan_builder::{topological_order, DagNode};
use fedl_registry::{merge_permissions, ComputePlan, Permissions, PlanStatus, Privilege, Status, TupleKind};
use fedl_types::OrgId;
use proptest::prelude::*;
use std::collections::BTreeSet;

const ORGS: [&str; 4] = ["orgA", "orgB", "orgC", "orgD"];

fn arbitrary_privilege() -> impl Strategy<Value = Privilege> {
    (any::<bool>(), 0u8..16).prop_map(|(public, mask)| Privilege {
        public,
        authorized_ids: ORGS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, org)| OrgId::from(*org))
            .collect(),
    })
}

fn arbitrary_permissions() -> impl Strategy<Value = Permissions> {
    (arbitrary_privilege(), arbitrary_privilege())
        .prop_map(|(process, download)| Permissions { process, download })
}

#[derive(Debug, Clone)]
enum PlanOp {
    Register(Status),
    Update(Status),
}

fn plan_op() -> impl Strategy<Value = PlanOp> {
    prop_oneof![
        prop_oneof![Just(Status::Waiting), Just(Status::Todo), Just(Status::Done)]
            .prop_map(PlanOp::Register),
        prop_oneof![
            Just(Status::Todo),
            Just(Status::Doing),
            Just(Status::Done),
            Just(Status::Failed),
            Just(Status::Aborted),
        ]
        .prop_map(PlanOp::Update),
    ]
}

/// Random DAG where node `i` may only depend on nodes `j < i`, declared in a
/// shuffled order
fn arbitrary_dag() -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1usize..12).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<u16>(), n),
            Just((0..n).collect::<Vec<usize>>()).prop_shuffle(),
        )
            .prop_map(move |(masks, declared)| {
                let parents = masks
                    .iter()
                    .enumerate()
                    .map(|(i, mask)| (0..i).filter(|j| mask & (1 << j) != 0).collect())
                    .collect();
                (parents, declared)
            })
    })
}

fn longest_path_depths(parents: &[Vec<usize>]) -> Vec<u32> {
    let mut depth = vec![0u32; parents.len()];
    for i in 0..parents.len() {
        depth[i] = parents[i].iter().map(|&j| depth[j] + 1).max().unwrap_or(0);
    }
    depth
}

proptest! {
    /// Property: merging permissions does not depend on operand order
    #[test]
    fn prop_merge_commutative(a in arbitrary_permissions(), b in arbitrary_permissions()) {
        prop_assert_eq!(merge_permissions(&a, &b), merge_permissions(&b, &a));
    }

    /// Property: merging permissions is associative
    #[test]
    fn prop_merge_associative(
        a in arbitrary_permissions(),
        b in arbitrary_permissions(),
        c in arbitrary_permissions(),
    ) {
        let left = merge_permissions(&merge_permissions(&a, &b), &c);
        let right = merge_permissions(&a, &merge_permissions(&b, &c));
        prop_assert_eq!(left, right);
    }

    /// Property: the merge grants exactly what both sides grant
    #[test]
    fn prop_merge_is_intersection(a in arbitrary_privilege(), b in arbitrary_privilege()) {
        let merged = a.merge(&b);
        for org in ORGS {
            let org = OrgId::from(org);
            prop_assert_eq!(merged.allows(&org), a.allows(&org) && b.allows(&org));
        }
    }

    /// Property: plan counters stay consistent under any member history
    #[test]
    fn prop_plan_counters_consistent(ops in prop::collection::vec(plan_op(), 1..40)) {
        let mut plan = ComputePlan::new("plan".into(), OrgId::from("orgA"));
        let mut absorbed: Option<PlanStatus> = None;

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                PlanOp::Register(status) => {
                    let registered = plan.register_member(TupleKind::Traintuple, &format!("t{}", i), status);
                    prop_assert_eq!(registered.is_err(), plan.status.is_absorbing());
                }
                PlanOp::Update(status) => {
                    if plan.tuple_count == 0 {
                        continue;
                    }
                    plan.apply_member_status(status);
                }
            }

            prop_assert!(plan.done_count <= plan.tuple_count);
            if plan.status == PlanStatus::Done {
                prop_assert_eq!(plan.done_count, plan.tuple_count);
            }
            if let Some(status) = absorbed {
                prop_assert_eq!(plan.status, status);
            } else if plan.status.is_absorbing() {
                absorbed = Some(plan.status);
            }
        }
    }

    /// Property: creation order respects every edge and depth is the longest path
    #[test]
    fn prop_topological_order_depths((parents, declared) in arbitrary_dag()) {
        // Node `i` is declared under the id `n{i}`
        let nodes: Vec<DagNode> = declared
            .iter()
            .map(|&node| DagNode {
                id: format!("n{}", node),
                parents: parents[node].iter().map(|j| format!("n{}", j)).collect(),
            })
            .collect();

        let order = topological_order(&nodes, &BTreeSet::new()).unwrap();
        prop_assert_eq!(order.len(), nodes.len());

        let expected = longest_path_depths(&parents);
        let mut created_at = vec![0usize; parents.len()];
        for (step, &(slot, depth)) in order.iter().enumerate() {
            let node = declared[slot];
            prop_assert_eq!(depth, expected[node]);
            created_at[node] = step;
        }
        for (node, node_parents) in parents.iter().enumerate() {
            for &parent in node_parents {
                prop_assert!(created_at[parent] < created_at[node]);
            }
        }
    }

    /// Property: closing a chain into a loop is always rejected
    #[test]
    fn prop_cycles_rejected(len in 1usize..10, offset in 0usize..10) {
        let nodes: Vec<DagNode> = (0..len)
            .map(|i| DagNode {
                id: format!("n{}", i),
                parents: vec![format!("n{}", (i + len - 1) % len)],
            })
            .collect();
        let resolved = BTreeSet::from([format!("earlier-{}", offset)]);
        prop_assert!(topological_order(&nodes, &resolved).is_err());
    }
}
