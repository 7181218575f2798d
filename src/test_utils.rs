//! Test Utilities Module
//!
//! Deterministic stand-ins for the ledger and the external wallet. Only
//! compiled for tests or with the `test_utils` feature.

#![cfg(any(test, feature = "test_utils"))]

use crate::aggregator::{parse_quote, Quote, QuoteRequest, QuoteSource};
use crate::rpc::{HoldingAccount, LedgerRpc, MintInfo, SimulationResult};
use crate::tx_builder::builder::TransactionBuilder;
use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::signing::{SignedTransaction, WalletDecision, WalletSigner};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction::{self, SystemInstruction},
    system_program,
    transaction::VersionedTransaction,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct LedgerState {
    balances: HashMap<Pubkey, u64>,
    holdings: Vec<HoldingAccount>,
    mints: HashMap<Pubkey, MintInfo>,
    anchors: Vec<Hash>,
    simulation_failure: Option<(String, Vec<String>)>,
    send_errors: VecDeque<PipelineError>,
    sent: Vec<VersionedTransaction>,
    simulate_calls: usize,
}

impl LedgerState {
    /// Move lamports for every system transfer in an accepted transaction
    fn apply_system_transfers(&mut self, tx: &VersionedTransaction) {
        let keys = tx.message.static_account_keys();
        for ix in tx.message.instructions() {
            if keys.get(ix.program_id_index as usize) != Some(&system_program::id()) {
                continue;
            }
            let Ok(SystemInstruction::Transfer { lamports }) = bincode::deserialize(&ix.data) else {
                continue;
            };
            let (Some(from), Some(to)) = (
                ix.accounts.first().and_then(|i| keys.get(*i as usize)),
                ix.accounts.get(1).and_then(|i| keys.get(*i as usize)),
            ) else {
                continue;
            };
            let source = self.balances.entry(*from).or_default();
            *source = source.saturating_sub(lamports);
            let destination = self.balances.entry(*to).or_default();
            *destination = destination.saturating_add(lamports);
        }
    }
}

/// Scripted in-memory ledger
///
/// Clones share state, so a test can keep one handle for assertions while
/// the pipeline owns another.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, address: Pubkey, lamports: u64) {
        self.state.lock().balances.insert(address, lamports);
    }

    pub fn add_holding(&self, account: HoldingAccount) {
        self.state.lock().holdings.push(account);
    }

    pub fn add_mint(&self, mint: Pubkey, info: MintInfo) {
        self.state.lock().mints.insert(mint, info);
    }

    /// Make every following simulation report `reason`
    pub fn fail_simulation(&self, reason: impl Into<String>, logs: Vec<String>) {
        self.state.lock().simulation_failure = Some((reason.into(), logs));
    }

    /// Queue an error for the next `send` call
    pub fn push_send_error(&self, err: PipelineError) {
        self.state.lock().send_errors.push_back(err);
    }

    pub fn balances_snapshot(&self) -> HashMap<Pubkey, u64> {
        self.state.lock().balances.clone()
    }

    /// Blockhashes handed out so far, in order
    pub fn anchors(&self) -> Vec<Hash> {
        self.state.lock().anchors.clone()
    }

    pub fn simulate_calls(&self) -> usize {
        self.state.lock().simulate_calls
    }

    pub fn send_calls(&self) -> usize {
        self.state.lock().sent.len()
    }

    /// Transactions passed to `send`, including failed attempts
    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.state.lock().sent.clone()
    }
}

#[async_trait]
impl LedgerRpc for MockLedger {
    async fn latest_blockhash(&self) -> Result<Hash, PipelineError> {
        let hash = Hash::new_unique();
        self.state.lock().anchors.push(hash);
        Ok(hash)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, PipelineError> {
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        _token_program: &Pubkey,
    ) -> Result<Vec<HoldingAccount>, PipelineError> {
        Ok(self
            .state
            .lock()
            .holdings
            .iter()
            .filter(|h| h.owner == *owner)
            .cloned()
            .collect())
    }

    async fn mint_info(&self, mint: &Pubkey) -> Result<MintInfo, PipelineError> {
        self.state
            .lock()
            .mints
            .get(mint)
            .copied()
            .ok_or_else(|| PipelineError::Rpc(format!("AccountNotFound: pubkey={}", mint)))
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, PipelineError> {
        let state = self.state.lock();
        Ok(state.balances.contains_key(address)
            || state.mints.contains_key(address)
            || state.holdings.iter().any(|h| h.address == *address))
    }

    async fn simulate(&self, _tx: &VersionedTransaction) -> Result<SimulationResult, PipelineError> {
        let mut state = self.state.lock();
        state.simulate_calls += 1;
        Ok(match &state.simulation_failure {
            Some((reason, logs)) => SimulationResult {
                err: Some(reason.clone()),
                logs: logs.clone(),
                units_consumed: Some(0),
            },
            None => SimulationResult {
                err: None,
                logs: vec!["Program log: ok".to_string()],
                units_consumed: Some(4_500),
            },
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, PipelineError> {
        let mut state = self.state.lock();
        state.sent.push(tx.clone());
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }
        state.apply_system_transfers(tx);
        Ok(tx.signatures.first().copied().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletMode {
    Approve,
    Reject,
    Forge,
}

/// Wallet double with a fixed answer and a prompt counter
pub struct ScriptedWallet {
    keypair: Keypair,
    mode: WalletMode,
    prompts: AtomicUsize,
}

impl ScriptedWallet {
    pub fn approving(keypair: Keypair) -> Self {
        Self::with_mode(keypair, WalletMode::Approve)
    }

    pub fn rejecting(keypair: Keypair) -> Self {
        Self::with_mode(keypair, WalletMode::Reject)
    }

    /// Approves, but with a signature from an unrelated key
    pub fn forging(keypair: Keypair) -> Self {
        Self::with_mode(keypair, WalletMode::Forge)
    }

    fn with_mode(keypair: Keypair, mode: WalletMode) -> Self {
        Self {
            keypair,
            mode,
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for ScriptedWallet {
    fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign(&self, message: &[u8]) -> Result<WalletDecision, PipelineError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Ok(match self.mode {
            WalletMode::Approve => WalletDecision::Approved(self.keypair.sign_message(message)),
            WalletMode::Reject => WalletDecision::Rejected,
            WalletMode::Forge => WalletDecision::Approved(Keypair::new().sign_message(message)),
        })
    }
}

/// A fee transfer from `user` to `service`, paid by `service`, signed by both
pub fn signed_fee_transfer(
    user: &Keypair,
    service: &Keypair,
    anchor: Hash,
) -> (SignedTransaction, Pubkey, Pubkey) {
    let ix = system_instruction::transfer(&user.pubkey(), &service.pubkey(), 1_000);
    let mut tx = TransactionBuilder::new()
        .build(&[ix], &service.pubkey(), anchor)
        .expect("non-empty instruction list");
    let message = tx.message.serialize();
    tx.signatures[0] = service.sign_message(&message);
    tx.signatures[1] = user.sign_message(&message);
    (SignedTransaction { tx }, user.pubkey(), service.pubkey())
}

/// Aggregator double: quotes 2x the input amount and returns a transfer
/// transaction paid by the requesting user with a fresh blockhash per call
#[derive(Clone, Default)]
pub struct MockQuoteSource {
    failure: Arc<Mutex<Option<String>>>,
    quote_calls: Arc<AtomicUsize>,
    swap_calls: Arc<AtomicUsize>,
}

impl MockQuoteSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following quote request fail with `reason`
    pub fn fail_quotes(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> usize {
        self.swap_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for MockQuoteSource {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, PipelineError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.failure.lock().clone() {
            return Err(PipelineError::quote_unavailable(reason));
        }
        let out = request.amount.saturating_mul(2);
        parse_quote(json!({
            "inputMint": request.input_mint.to_string(),
            "inAmount": request.amount.to_string(),
            "outputMint": request.output_mint.to_string(),
            "outAmount": out.to_string(),
            "otherAmountThreshold": (out - out / 200).to_string(),
            "swapMode": request.mode.as_str(),
            "slippageBps": 50,
            "priceImpactPct": "0",
            "routePlan": [{ "swapInfo": { "label": "Mock" }, "percent": 100 }]
        }))
    }

    async fn get_swap_transaction(
        &self,
        _quote: &Quote,
        user: &Pubkey,
    ) -> Result<VersionedTransaction, PipelineError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        let ix = system_instruction::transfer(user, &Pubkey::new_unique(), 1);
        TransactionBuilder::new().build(&[ix], user, Hash::new_unique())
    }
}
