//! User operations: burn, transfer and swap
//!
//! Each operation runs `resolve -> instructions -> anchor -> build -> user
//! sign -> service co-sign -> simulate -> submit`. The anchor is fetched
//! last so the interactive signing step eats as little of its validity
//! window as possible. An expired anchor at submission triggers a bounded
//! rebuild; every other failure is surfaced as-is.

use crate::accounts::AccountResolver;
use crate::aggregator::{Quote, QuoteRequest, QuoteSource};
use crate::compat;
use crate::config::Config;
use crate::metrics::{Metrics, Timer};
use crate::observability::{operation_span, CorrelationId};
use crate::rpc::{HoldingAccount, LedgerRpc, SimulationResult};
use crate::structured_logging::StructuredLogger;
use crate::tx_builder::{
    plan_burn_instructions, plan_transfer_instructions, sanity_check_ix_order,
    sanity_check_transaction, sol_to_lamports, to_raw_units, BurnRequest, DualSignatureCoordinator,
    GatePolicy, InstructionPlan, OperationKind, PipelineError, SimulationGate, SubmissionPipeline,
    TransactionBuilder, WalletSigner,
};
use crate::wallet::ServiceKey;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Fee and retry rules applied to every operation
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub service_fee_lamports: u64,
    pub stale_rebuilds: u32,
    pub rebuild_swaps_on_expiry: bool,
    pub transport_retries: usize,
    pub retry_delay: Duration,
}

impl PipelinePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            service_fee_lamports: config.fees.service_fee_lamports,
            stale_rebuilds: config.retry.stale_rebuilds,
            rebuild_swaps_on_expiry: config.retry.rebuild_swaps_on_expiry,
            transport_retries: config.retry.transport_retries,
            retry_delay: config.retry.retry_delay(),
        }
    }
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Burn parameters as entered by the user
#[derive(Debug, Clone)]
pub struct BurnParams {
    /// Mint to burn; `None` burns from the first holding account found
    pub mint: Option<Pubkey>,
    /// Decimal token amount, e.g. "1.5"
    pub amount: String,
}

/// Transfer parameters as entered by the user
#[derive(Debug, Clone)]
pub struct TransferParams {
    pub destination: Pubkey,
    /// Decimal SOL amount
    pub sol: String,
}

/// Result of an operation accepted by the network
#[derive(Debug, Clone)]
pub struct OperationReceipt {
    pub signature: Signature,
    pub correlation_id: CorrelationId,
    pub simulation: SimulationResult,
    /// Send attempts across every build cycle
    pub attempts: u32,
    /// Rebuild-and-resign cycles after an expired anchor
    pub rebuilds: u32,
    /// The quote the final transaction was built from (swaps only)
    pub quote: Option<Quote>,
}

struct Outcome {
    signature: Signature,
    simulation: SimulationResult,
    attempts: u32,
    rebuilds: u32,
    quote: Option<Quote>,
}

/// Entry point for user operations
pub struct Operations {
    rpc: Arc<dyn LedgerRpc>,
    quotes: Arc<dyn QuoteSource>,
    resolver: AccountResolver,
    builder: TransactionBuilder,
    coordinator: DualSignatureCoordinator,
    gate: SimulationGate,
    submitter: SubmissionPipeline,
    metrics: Arc<Metrics>,
    policy: PipelinePolicy,
}

impl Operations {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        quotes: Arc<dyn QuoteSource>,
        service: ServiceKey,
        metrics: Arc<Metrics>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            resolver: AccountResolver::new(rpc.clone()),
            builder: TransactionBuilder::new(),
            coordinator: DualSignatureCoordinator::new(service),
            gate: SimulationGate::new(rpc.clone()),
            submitter: SubmissionPipeline::new(rpc.clone(), policy.transport_retries, policy.retry_delay),
            rpc,
            quotes,
            metrics,
            policy,
        }
    }

    pub fn service_pubkey(&self) -> Pubkey {
        self.coordinator.service_pubkey()
    }

    pub fn resolver(&self) -> &AccountResolver {
        &self.resolver
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Holding accounts of `owner`, for display
    pub async fn holding_accounts(&self, owner: &Pubkey) -> Result<Vec<HoldingAccount>, PipelineError> {
        self.resolver.holding_accounts(owner).await
    }

    /// Fetch a quote without building or signing anything
    pub async fn quote(&self, request: &QuoteRequest) -> Result<Quote, PipelineError> {
        self.quotes.get_quote(request).await
    }

    /// Burn tokens from the wallet owner's holding account and pay the
    /// service fee, with the service as fee payer
    pub async fn burn(
        &self,
        wallet: &dyn WalletSigner,
        params: &BurnParams,
    ) -> Result<OperationReceipt, PipelineError> {
        self.observe(OperationKind::Burn, |logger| async move {
            let owner = wallet.address();
            let account = match params.mint {
                Some(mint) => self.resolver.require_holding_account(&owner, &mint).await?,
                None => self.resolver.first_holding_account(&owner).await?,
            };
            let decimals = self.resolver.mint_info(&account.mint).await?.decimals;
            let amount = to_raw_units(&params.amount, decimals)?;

            let request = BurnRequest {
                holding_account: account.address,
                mint: account.mint,
                authority: owner,
                amount,
                decimals,
            };
            let plan = plan_burn_instructions(
                &request,
                account.amount,
                &self.service_pubkey(),
                self.policy.service_fee_lamports,
            )?;
            self.execute_local(&plan, wallet, &logger).await
        })
        .await
    }

    /// Send SOL from the wallet owner to `destination` and pay the service
    /// fee, with the service as fee payer
    pub async fn transfer(
        &self,
        wallet: &dyn WalletSigner,
        params: &TransferParams,
    ) -> Result<OperationReceipt, PipelineError> {
        self.observe(OperationKind::Transfer, |logger| async move {
            let source = wallet.address();
            let lamports = sol_to_lamports(&params.sol)?;
            let available = self.rpc.balance(&source).await?;

            let plan = plan_transfer_instructions(
                &source,
                &params.destination,
                lamports,
                available,
                &self.service_pubkey(),
                self.policy.service_fee_lamports,
            )?;
            self.execute_local(&plan, wallet, &logger).await
        })
        .await
    }

    /// Quote, fetch the vendor-built transaction, sign and submit it
    ///
    /// An expired anchor fetches a fresh quote and vendor transaction and asks
    /// the user again, up to the stale rebuild budget. Clearing
    /// `rebuild_swaps_on_expiry` surfaces the first expiry instead.
    pub async fn swap(
        &self,
        wallet: &dyn WalletSigner,
        request: &QuoteRequest,
    ) -> Result<OperationReceipt, PipelineError> {
        self.observe(OperationKind::Swap, |logger| async move {
            let user = wallet.address();
            let rebuild_budget = if self.policy.rebuild_swaps_on_expiry {
                self.policy.stale_rebuilds
            } else {
                0
            };

            let mut rebuilds = 0;
            let mut attempts = 0;
            loop {
                let quote = self.quotes.get_quote(request).await?;
                let tx = self.quotes.get_swap_transaction(&quote, &user).await?;
                logger.log_anchor_fetched(compat::get_recent_blockhash(&tx.message), rebuilds + 1);

                match self
                    .authorize_and_submit(tx, wallet, GatePolicy::Mandatory, &logger)
                    .await
                {
                    Ok(mut outcome) => {
                        outcome.attempts += attempts;
                        outcome.rebuilds = rebuilds;
                        outcome.quote = Some(quote);
                        return Ok(outcome);
                    }
                    Err(err) if err.is_stale() && rebuilds < rebuild_budget => {
                        attempts += 1;
                        rebuilds += 1;
                        self.metrics.rebuilds.inc();
                        logger.log_rebuild(&err, rebuilds);
                    }
                    Err(err) => return Err(err),
                }
            }
        })
        .await
    }

    /// Build, sign and submit a locally planned transaction, rebuilding with
    /// a fresh anchor after expiry up to the configured budget
    async fn execute_local(
        &self,
        plan: &InstructionPlan,
        wallet: &dyn WalletSigner,
        logger: &StructuredLogger,
    ) -> Result<Outcome, PipelineError> {
        sanity_check_ix_order(plan)?;
        let fee_payer = self.service_pubkey();

        let mut rebuilds = 0;
        let mut attempts = 0;
        loop {
            let anchor = self.rpc.latest_blockhash().await?;
            logger.log_anchor_fetched(&anchor, rebuilds + 1);

            let tx = self.builder.build(&plan.instructions, &fee_payer, anchor)?;
            sanity_check_transaction(&tx, &fee_payer)?;

            match self
                .authorize_and_submit(tx, wallet, GatePolicy::Advisory, logger)
                .await
            {
                Ok(mut outcome) => {
                    outcome.attempts += attempts;
                    outcome.rebuilds = rebuilds;
                    return Ok(outcome);
                }
                Err(err) if err.is_stale() && rebuilds < self.policy.stale_rebuilds => {
                    attempts += 1;
                    rebuilds += 1;
                    self.metrics.rebuilds.inc();
                    logger.log_rebuild(&err, rebuilds);
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn authorize_and_submit(
        &self,
        tx: VersionedTransaction,
        wallet: &dyn WalletSigner,
        policy: GatePolicy,
        logger: &StructuredLogger,
    ) -> Result<Outcome, PipelineError> {
        let user = wallet.address();
        logger.log_signing_requested(&user, compat::get_instructions(&tx.message).len());

        let signed = match self.coordinator.authorize(tx, wallet).await {
            Ok(signed) => signed,
            Err(PipelineError::UserRejected) => {
                logger.log_user_rejected(&user);
                return Err(PipelineError::UserRejected);
            }
            Err(err) => return Err(err),
        };
        logger.log_co_signed(&self.service_pubkey());

        let simulation = self.gate.simulate(&signed, policy).await?;
        logger.log_simulated(simulation.units_consumed);

        let (signature, attempts) = self.submitter.submit(&signed).await?;
        if attempts > 1 {
            self.metrics.transport_retries.inc_by(u64::from(attempts - 1));
        }

        Ok(Outcome {
            signature,
            simulation,
            attempts,
            rebuilds: 0,
            quote: None,
        })
    }

    /// Run one operation under its own correlation id, span and metrics
    async fn observe<F, Fut>(
        &self,
        kind: OperationKind,
        run: F,
    ) -> Result<OperationReceipt, PipelineError>
    where
        F: FnOnce(StructuredLogger) -> Fut,
        Fut: Future<Output = Result<Outcome, PipelineError>>,
    {
        let correlation_id = CorrelationId::new();
        let logger = StructuredLogger::new(correlation_id.clone(), kind);
        let span = operation_span(kind, &correlation_id);
        let timer = Timer::new();
        self.metrics.record_started(kind);

        let result = run(logger.clone()).instrument(span).await;
        timer.observe_duration(&self.metrics.pipeline_latency);
        let latency_ms = (timer.elapsed_secs() * 1000.0) as u64;

        match result {
            Ok(outcome) => {
                self.metrics.record_success(kind);
                logger.log_submitted(&outcome.signature, outcome.attempts, latency_ms);
                Ok(OperationReceipt {
                    signature: outcome.signature,
                    correlation_id,
                    simulation: outcome.simulation,
                    attempts: outcome.attempts,
                    rebuilds: outcome.rebuilds,
                    quote: outcome.quote,
                })
            }
            Err(err) => {
                self.metrics.record_failure(kind, &err);
                logger.log_failure(&err, latency_ms);
                Err(err)
            }
        }
    }
}
