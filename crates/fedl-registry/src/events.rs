use crate::error::Result;
use crate::status::Status;
use crate::tuple::TupleKind;
use fedl_ledger::Ledger;
use serde::{Deserialize, Serialize};

pub const TUPLE_CREATED_EVENT: &str = "tuple-created";
pub const TUPLES_UPDATED_EVENT: &str = "tuples-updated";

/// One tuple status write. `from` is `None` for a creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub key: String,
    pub kind: TupleKind,
    pub from: Option<Status>,
    pub to: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleEvent {
    pub changes: Vec<StatusChange>,
}

/// Attach the changes of the current transaction as a ledger event
pub fn emit(ledger: &mut dyn Ledger, name: &str, changes: &[StatusChange]) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let payload = serde_json::to_vec(&TupleEvent {
        changes: changes.to_vec(),
    })?;
    ledger.set_event(name, payload);
    Ok(())
}
