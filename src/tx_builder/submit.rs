//! Network submission
//!
//! Send-and-forget: returns the transaction id as soon as the node accepts
//! it, without waiting for confirmation. Transport failures resend the same
//! bytes a bounded number of times; rejections are surfaced unchanged so the
//! caller can decide whether to rebuild. A duplicate answer to a resend means
//! the earlier attempt was accepted and counts as success.

use crate::rpc::LedgerRpc;
use crate::tx_builder::errors::{PipelineError, RejectionCause};
use crate::tx_builder::signing::{verify_signatures, SignedTransaction};
use solana_sdk::signature::Signature;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::{strategy::FixedInterval, RetryIf};
use tracing::{info, warn};

/// Submits fully signed transactions
#[derive(Clone)]
pub struct SubmissionPipeline {
    rpc: Arc<dyn LedgerRpc>,
    transport_retries: usize,
    retry_delay: Duration,
}

impl SubmissionPipeline {
    pub fn new(rpc: Arc<dyn LedgerRpc>, transport_retries: usize, retry_delay: Duration) -> Self {
        Self {
            rpc,
            transport_retries,
            retry_delay,
        }
    }

    /// Submit `tx`, returning the network-assigned id and the number of
    /// send attempts it took
    pub async fn submit(&self, tx: &SignedTransaction) -> Result<(Signature, u32), PipelineError> {
        verify_signatures(tx.transaction())?;

        let attempts = AtomicU32::new(0);
        let strategy = FixedInterval::new(self.retry_delay).take(self.transport_retries);

        let result = RetryIf::spawn(
            strategy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt > 1 {
                    warn!(attempt, signature = %tx.signature(), "Resending after transport failure");
                }
                self.rpc.send(tx.transaction())
            },
            |err: &PipelineError| err.is_retryable(),
        )
        .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match result {
            Ok(signature) => {
                info!(signature = %signature, attempts, "Transaction accepted by network");
                Ok((signature, attempts))
            }
            // the earlier attempt landed and only its reply was lost
            Err(PipelineError::SubmissionRejected {
                cause: RejectionCause::Duplicate,
                ..
            }) if attempts > 1 => {
                let signature = tx.signature();
                info!(signature = %signature, attempts, "Resend reported as duplicate, earlier attempt was accepted");
                Ok((signature, attempts))
            }
            Err(err) => {
                warn!(error = %err, attempts, "Submission failed");
                Err(err)
            }
        }
    }
}
