use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};

/// Limits and policy applied by every registry operation.
///
/// Replicas executing the same transaction must share the same config,
/// otherwise they can disagree on the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of tuples accepted in one compute plan batch
    pub max_batch_tuples: usize,
    /// Maximum number of in-models referenced by a single tuple
    pub max_in_models: usize,
    /// Upper bound on dependents visited by one cascade
    pub max_cascade_visits: usize,
    /// Use caller-supplied tuple keys instead of deriving them from content
    pub allow_caller_keys: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_batch_tuples: 1000,
            max_in_models: 100,
            max_cascade_visits: 100_000,
            allow_caller_keys: true,
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_tuples == 0 {
            return Err(RegistryError::bad_request("max_batch_tuples must be positive"));
        }
        if self.max_in_models == 0 {
            return Err(RegistryError::bad_request("max_in_models must be positive"));
        }
        if self.max_cascade_visits == 0 {
            return Err(RegistryError::bad_request("max_cascade_visits must be positive"));
        }
        Ok(())
    }
}
