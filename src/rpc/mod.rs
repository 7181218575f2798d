//! Ledger RPC seam
//!
//! Every network read and the single write (submission) go through
//! [`LedgerRpc`], so the pipeline can run against the real cluster or a
//! scripted test double.

use crate::tx_builder::errors::PipelineError;
use async_trait::async_trait;
use serde::Serialize;
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};

pub mod rpc_client;
pub mod rpc_errors;

pub use rpc_client::SolanaRpc;
pub use rpc_errors::{classify_client_error, classify_failure, classify_read_error};

/// One owner's balance of one mint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldingAccount {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub owner: Pubkey,
    /// Balance in raw units
    pub amount: u64,
    pub decimals: u8,
}

/// Mint metadata needed to build instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MintInfo {
    pub decimals: u8,
    pub supply: u64,
}

/// Outcome of a dry run against current network state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    /// Failure reported by the runtime, if any
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationResult {
    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }
}

/// Network operations used by the pipeline
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Fetch a recent blockhash to bind into a new transaction
    async fn latest_blockhash(&self) -> Result<Hash, PipelineError>;

    /// Lamport balance of `address`
    async fn balance(&self, address: &Pubkey) -> Result<u64, PipelineError>;

    /// Holding accounts of `owner` under `token_program`
    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<HoldingAccount>, PipelineError>;

    /// Decimals and supply of `mint`
    async fn mint_info(&self, mint: &Pubkey) -> Result<MintInfo, PipelineError>;

    /// Whether an account exists at `address`
    async fn account_exists(&self, address: &Pubkey) -> Result<bool, PipelineError>;

    /// Dry-run without committing state and without signature verification
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult, PipelineError>;

    /// Hand a signed transaction to the network, returning its id on acceptance
    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, PipelineError>;
}
