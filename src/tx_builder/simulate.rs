//! Pre-submission simulation gate
//!
//! Every fully signed transaction is dry-run before it reaches the network.
//! The dry run skips signature verification on the node, so the gate first
//! re-checks the signatures locally: a body changed after signing must never
//! pass through silently.

use crate::rpc::{LedgerRpc, SimulationResult};
use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::signing::{verify_signatures, SignedTransaction};
use std::sync::Arc;
use tracing::{debug, warn};

/// Origin label attached to gate log events
///
/// Both variants block submission on a failed simulation; the label only
/// tells vendor-built and locally built transactions apart in the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Vendor-built transactions
    Mandatory,
    /// Locally built transactions
    Advisory,
}

/// Dry-runs signed transactions and decides go/no-go
#[derive(Clone)]
pub struct SimulationGate {
    rpc: Arc<dyn LedgerRpc>,
}

impl SimulationGate {
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self { rpc }
    }

    /// Simulate `tx`; a reported failure becomes `SimulationFailed` with the
    /// runtime's reason and logs.
    pub async fn simulate(
        &self,
        tx: &SignedTransaction,
        policy: GatePolicy,
    ) -> Result<SimulationResult, PipelineError> {
        verify_signatures(tx.transaction())?;

        let result = self.rpc.simulate(tx.transaction()).await?;

        match &result.err {
            None => {
                debug!(
                    units_consumed = ?result.units_consumed,
                    policy = ?policy,
                    "Simulation passed"
                );
                Ok(result)
            }
            Some(reason) => {
                warn!(
                    error = %reason,
                    policy = ?policy,
                    logs = result.logs.len(),
                    "Simulation failed, blocking submission"
                );
                Err(PipelineError::SimulationFailed {
                    reason: reason.clone(),
                    logs: result.logs.clone(),
                    units_consumed: result.units_consumed,
                })
            }
        }
    }
}
