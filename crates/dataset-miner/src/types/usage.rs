//! Per-call token usage records

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pipeline stage made a model call
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Generate,
    Verify,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => f.write_str("generate"),
            Self::Verify => f.write_str("verify"),
        }
    }
}

/// Token counts for one completed model call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub operation: OperationKind,
    pub model: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl UsageRecord {
    pub fn new(
        operation: OperationKind,
        model: impl Into<String>,
        input_tokens: usize,
        output_tokens: usize,
    ) -> Self {
        Self {
            operation,
            model: model.into(),
            input_tokens,
            output_tokens,
        }
    }
}
