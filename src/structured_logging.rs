//! Structured logging of pipeline stages

use crate::observability::CorrelationId;
use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::instructions::OperationKind;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature};

/// Emits one event per pipeline stage, all tagged with the operation's
/// correlation id
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    correlation_id: CorrelationId,
    operation: OperationKind,
}

impl StructuredLogger {
    pub fn new(correlation_id: CorrelationId, operation: OperationKind) -> Self {
        Self {
            correlation_id,
            operation,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn log_anchor_fetched(&self, blockhash: &Hash, attempt: u32) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            blockhash = %blockhash,
            attempt,
            "Freshness anchor fetched"
        );
    }

    pub fn log_signing_requested(&self, user: &Pubkey, instructions: usize) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            user = %user,
            instructions,
            "Requesting user signature"
        );
    }

    pub fn log_user_rejected(&self, user: &Pubkey) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            user = %user,
            "User declined to sign"
        );
    }

    pub fn log_co_signed(&self, service: &Pubkey) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            service = %service,
            "Service co-signed"
        );
    }

    pub fn log_simulated(&self, units_consumed: Option<u64>) {
        tracing::debug!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            units_consumed = ?units_consumed,
            "Simulation passed"
        );
    }

    pub fn log_submitted(&self, signature: &Signature, attempts: u32, latency_ms: u64) {
        tracing::info!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            signature = %signature,
            attempts,
            latency_ms,
            "Transaction submitted"
        );
    }

    pub fn log_rebuild(&self, reason: &PipelineError, rebuild: u32) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            error = %reason,
            rebuild,
            "Anchor went stale, rebuilding"
        );
    }

    pub fn log_failure(&self, error: &PipelineError, latency_ms: u64) {
        tracing::warn!(
            correlation_id = %self.correlation_id,
            operation = self.operation.as_str(),
            category = error.category(),
            class = ?error.class(),
            error = %error,
            latency_ms,
            "Operation failed"
        );
    }
}
