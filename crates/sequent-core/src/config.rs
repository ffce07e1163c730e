//! Service configuration.

use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Settings for the worker thread.
///
/// Every field has a default, so `{}` is a valid config. Unknown keys are
/// rejected to catch typos early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Name given to the worker thread.
    pub worker_name: String,

    /// Worker thread stack size in bytes (platform default when unset).
    pub stack_size: Option<usize>,
}

impl ServiceConfig {
    pub const DEFAULT_WORKER_NAME: &'static str = "sequent-worker";

    pub fn from_json_str(json: &str) -> Result<Self, ExecError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_name: Self::DEFAULT_WORKER_NAME.to_string(),
            stack_size: None,
        }
    }
}
