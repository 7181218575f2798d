//! Observability module for correlation and tracing

use crate::tx_builder::instructions::OperationKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation ID tying together every log line of one user operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First eight hex digits, for terminal output
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CorrelationId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Root span for one operation; stage events logged inside it inherit the
/// correlation id and operation name.
pub fn operation_span(kind: OperationKind, correlation_id: &CorrelationId) -> tracing::Span {
    tracing::info_span!(
        "operation",
        operation = kind.as_str(),
        correlation_id = %correlation_id
    )
}
