//! Transfer mode and options
//!
//! A transfer moves an in-progress Task's reservation to another worker or
//! queue. The option struct enumerates every recognized option; anything
//! else a caller might want to send simply has no field, so unrecognized
//! keys are dropped deterministically rather than forwarded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the task is handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Immediate handoff; the transferring worker drops out.
    #[default]
    Cold,
    /// Live handoff; both workers stay on until completion.
    Warm,
}

impl TransferMode {
    /// Wire representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Warm => "warm",
        }
    }
}

/// Recognized options for [`crate::task::Task::transfer`].
#[derive(Debug, Clone, Default)]
pub struct TransferOptions {
    /// Attributes forwarded with the transfer request.
    pub attributes: Option<Value>,
    /// Handoff mode; cold when unspecified.
    pub mode: Option<TransferMode>,
    /// Priority override for the transferred task.
    pub priority: Option<i64>,
}

impl TransferOptions {
    /// Options with the given mode set.
    pub fn with_mode(mode: TransferMode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }
}
