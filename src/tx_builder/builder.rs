//! Transaction composition
//!
//! Turns an ordered instruction list, a fee payer and a recent blockhash into
//! an unsigned `VersionedTransaction` carrying a legacy message. Instruction
//! order is kept exactly as given; the network executes them in sequence and
//! aborts the whole transaction if any one fails.

use crate::compat;
use crate::tx_builder::errors::PipelineError;
use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use tracing::debug;

/// Stateless builder for locally composed transactions
#[derive(Debug, Default, Clone, Copy)]
pub struct TransactionBuilder;

impl TransactionBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build an unsigned transaction.
    ///
    /// The blockhash should be fetched immediately before this call; it is
    /// bound into the message and every later signature covers it.
    pub fn build(
        &self,
        instructions: &[Instruction],
        fee_payer: &Pubkey,
        anchor: Hash,
    ) -> Result<VersionedTransaction, PipelineError> {
        if instructions.is_empty() {
            return Err(PipelineError::EmptyTransaction);
        }

        let message = Message::new_with_blockhash(instructions, Some(fee_payer), &anchor);
        let num_signers = message.header.num_required_signatures as usize;

        debug!(
            fee_payer = %fee_payer,
            blockhash = %anchor,
            instructions = instructions.len(),
            signers = num_signers,
            "Built unsigned transaction"
        );

        Ok(VersionedTransaction {
            signatures: vec![Signature::default(); num_signers],
            message: VersionedMessage::Legacy(message),
        })
    }
}

/// Check the structural invariants a freshly built transaction must hold
///
/// - the fee payer occupies signer slot 0
/// - one signature slot exists per required signer
pub fn sanity_check_transaction(
    tx: &VersionedTransaction,
    fee_payer: &Pubkey,
) -> Result<(), PipelineError> {
    let signers = compat::get_required_signers(&tx.message);
    match signers.first() {
        Some(first) if first == fee_payer => {}
        _ => {
            return Err(PipelineError::MissingSignature { signer: *fee_payer });
        }
    }
    if tx.signatures.len() != signers.len() {
        return Err(PipelineError::InvalidSigningState {
            state: "malformed",
            action: "validate signature slots",
        });
    }
    Ok(())
}
