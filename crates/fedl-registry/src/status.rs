//! Tuple and compute plan status lattices.

use fedl_types::OrgId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Waiting,
    Todo,
    Doing,
    Done,
    Failed,
    Aborted,
}

impl Status {
    pub const ALL: [Status; 6] = [
        Status::Waiting,
        Status::Todo,
        Status::Doing,
        Status::Done,
        Status::Failed,
        Status::Aborted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Waiting => "waiting",
            Status::Todo => "todo",
            Status::Doing => "doing",
            Status::Done => "done",
            Status::Failed => "failed",
            Status::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Done | Status::Failed | Status::Aborted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status {:?}", s))
    }
}

/// Originator of a status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Organization reporting on work it executes
    Worker(OrgId),
    /// Registry-driven update (dependency cascade, plan cancellation)
    System,
}

/// Allowed transitions for `actor`.
///
/// Workers move a tuple through `Todo -> Doing -> Done` and may fail it at any
/// non-terminal point. The registry itself unblocks waiting tuples, fails
/// dependents and aborts waiting members of a cancelled plan.
pub fn can_transition(from: Status, to: Status, actor: &Actor) -> bool {
    if from.is_terminal() {
        return false;
    }
    match actor {
        Actor::Worker(_) => matches!(
            (from, to),
            (Status::Todo, Status::Doing) | (Status::Doing, Status::Done) | (_, Status::Failed)
        ),
        Actor::System => matches!(
            (from, to),
            (Status::Waiting, Status::Todo) | (_, Status::Failed) | (Status::Waiting, Status::Aborted)
        ),
    }
}

/// Aggregated status of a compute plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    /// No member yet
    #[default]
    #[serde(rename = "")]
    Empty,
    Waiting,
    Todo,
    Doing,
    Done,
    Failed,
    Canceled,
    Aborted,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Empty => "",
            PlanStatus::Waiting => "waiting",
            PlanStatus::Todo => "todo",
            PlanStatus::Doing => "doing",
            PlanStatus::Done => "done",
            PlanStatus::Failed => "failed",
            PlanStatus::Canceled => "canceled",
            PlanStatus::Aborted => "aborted",
        }
    }

    /// Statuses no member event can leave
    pub fn is_absorbing(&self) -> bool {
        matches!(self, PlanStatus::Failed | PlanStatus::Canceled | PlanStatus::Aborted)
    }
}

impl From<Status> for PlanStatus {
    fn from(status: Status) -> Self {
        match status {
            Status::Waiting => PlanStatus::Waiting,
            Status::Todo => PlanStatus::Todo,
            Status::Doing => PlanStatus::Doing,
            Status::Done => PlanStatus::Done,
            Status::Failed => PlanStatus::Failed,
            Status::Aborted => PlanStatus::Aborted,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New plan status after a member reports `member`.
///
/// `done_count` must already include the incoming member when it is `Done`.
pub fn check_new_tuple_status(
    plan: PlanStatus,
    member: Status,
    done_count: u32,
    tuple_count: u32,
) -> PlanStatus {
    let complete = tuple_count > 0 && done_count == tuple_count;
    match (plan, member) {
        (plan, _) if plan.is_absorbing() => plan,
        (PlanStatus::Empty, member) => member.into(),
        (_, Status::Failed) => PlanStatus::Failed,
        (_, Status::Done) if complete => PlanStatus::Done,
        (PlanStatus::Waiting, Status::Todo) => PlanStatus::Todo,
        (PlanStatus::Waiting | PlanStatus::Todo, Status::Doing) => PlanStatus::Doing,
        (PlanStatus::Done, Status::Waiting) => PlanStatus::Waiting,
        (PlanStatus::Done, Status::Todo) => PlanStatus::Todo,
        (plan, _) => plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn worker() -> Actor {
        Actor::Worker(OrgId::from("orgA"))
    }

    #[test]
    fn test_worker_transitions() {
        assert!(can_transition(Status::Todo, Status::Doing, &worker()));
        assert!(can_transition(Status::Doing, Status::Done, &worker()));
        assert!(can_transition(Status::Waiting, Status::Failed, &worker()));
        assert!(!can_transition(Status::Waiting, Status::Todo, &worker()));
        assert!(!can_transition(Status::Todo, Status::Done, &worker()));
        assert!(!can_transition(Status::Waiting, Status::Aborted, &worker()));
    }

    #[test]
    fn test_system_transitions() {
        assert!(can_transition(Status::Waiting, Status::Todo, &Actor::System));
        assert!(can_transition(Status::Doing, Status::Failed, &Actor::System));
        assert!(can_transition(Status::Waiting, Status::Aborted, &Actor::System));
        assert!(!can_transition(Status::Todo, Status::Doing, &Actor::System));
        assert!(!can_transition(Status::Todo, Status::Aborted, &Actor::System));
    }

    #[test]
    fn test_terminal_statuses_never_leave() {
        for from in [Status::Done, Status::Failed, Status::Aborted] {
            for to in Status::ALL {
                assert!(!can_transition(from, to, &worker()));
                assert!(!can_transition(from, to, &Actor::System));
            }
        }
    }

    #[test]
    fn test_status_parse_round_trip() {
        for status in Status::ALL {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("running".parse::<Status>().is_err());
    }

    #[test]
    fn test_empty_plan_status_serializes_as_empty_string() {
        assert_eq!(serde_json::to_string(&PlanStatus::Empty).unwrap(), r#""""#);
        let parsed: PlanStatus = serde_json::from_str(r#""canceled""#).unwrap();
        assert_eq!(parsed, PlanStatus::Canceled);
    }

    #[test]
    fn test_plan_status_table() {
        use PlanStatus as P;
        use Status as S;

        assert_eq!(check_new_tuple_status(P::Empty, S::Waiting, 0, 1), P::Waiting);
        // An empty plan takes the status of whatever joins it
        for member in Status::ALL {
            assert_eq!(check_new_tuple_status(P::Empty, member, 0, 2), P::from(member));
        }
        assert_eq!(check_new_tuple_status(P::Waiting, S::Todo, 0, 2), P::Todo);
        assert_eq!(check_new_tuple_status(P::Todo, S::Doing, 0, 2), P::Doing);
        assert_eq!(check_new_tuple_status(P::Doing, S::Failed, 0, 2), P::Failed);
        assert_eq!(check_new_tuple_status(P::Doing, S::Done, 1, 2), P::Doing);
        assert_eq!(check_new_tuple_status(P::Doing, S::Done, 2, 2), P::Done);
        assert_eq!(check_new_tuple_status(P::Done, S::Todo, 2, 3), P::Todo);
        assert_eq!(check_new_tuple_status(P::Done, S::Waiting, 2, 3), P::Waiting);
        for member in Status::ALL {
            assert_eq!(check_new_tuple_status(P::Canceled, member, 1, 1), P::Canceled);
            assert_eq!(check_new_tuple_status(P::Failed, member, 1, 1), P::Failed);
        }
    }

    #[test]
    fn test_plan_status_extended_rows() {
        use PlanStatus as P;
        use Status as S;

        assert_eq!(check_new_tuple_status(P::Todo, S::Failed, 0, 2), P::Failed);
        assert_eq!(check_new_tuple_status(P::Waiting, S::Doing, 0, 2), P::Doing);
        assert_eq!(check_new_tuple_status(P::Todo, S::Done, 2, 2), P::Done);
        assert_eq!(check_new_tuple_status(P::Doing, S::Todo, 0, 2), P::Doing);
        assert_eq!(check_new_tuple_status(P::Todo, S::Waiting, 0, 2), P::Todo);
    }
}
