//! End-to-end pipeline scenarios
//!
//! Each test runs a full operation through [`Operations`] with a scripted
//! ledger and wallet, then inspects what reached the network.

use crate::accounts::derive_holding_account;
use crate::aggregator::{QuoteRequest, SwapMode};
use crate::compat;
use crate::metrics::Metrics;
use crate::pipeline::{BurnParams, Operations, PipelinePolicy, TransferParams};
use crate::rpc::{classify_failure, HoldingAccount, MintInfo};
use crate::test_utils::{MockLedger, MockQuoteSource, ScriptedWallet};
use crate::tx_builder::{verify_signatures, ErrorClass, PipelineError};
use crate::wallet::ServiceKey;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction::SystemInstruction,
    system_program,
    transaction::VersionedTransaction,
};
use spl_token::instruction::TokenInstruction;
use std::sync::Arc;
use std::time::Duration;

const FEE: u64 = 50_000_000;

struct Harness {
    ledger: MockLedger,
    quotes: MockQuoteSource,
    metrics: Arc<Metrics>,
    service: Pubkey,
    ops: Operations,
}

fn harness(policy: PipelinePolicy) -> Harness {
    let ledger = MockLedger::new();
    let quotes = MockQuoteSource::new();
    let metrics = Arc::new(Metrics::new().unwrap());
    let service_key = ServiceKey::from_keypair(Keypair::new());
    let service = service_key.pubkey();
    let ops = Operations::new(
        Arc::new(ledger.clone()),
        Arc::new(quotes.clone()),
        service_key,
        metrics.clone(),
        policy,
    );
    Harness {
        ledger,
        quotes,
        metrics,
        service,
        ops,
    }
}

fn default_policy() -> PipelinePolicy {
    PipelinePolicy {
        service_fee_lamports: FEE,
        stale_rebuilds: 1,
        rebuild_swaps_on_expiry: true,
        transport_retries: 1,
        retry_delay: Duration::from_millis(1),
    }
}

/// Register a 6-decimal mint and a holding of `amount` at the owner's
/// associated account
fn fund_tokens(ledger: &MockLedger, owner: &Pubkey, amount: u64) -> Pubkey {
    let mint = Pubkey::new_unique();
    ledger.add_mint(
        mint,
        MintInfo {
            decimals: 6,
            supply: 1_000_000_000,
        },
    );
    ledger.add_holding(HoldingAccount {
        address: derive_holding_account(owner, &mint, &spl_token::id()),
        mint,
        owner: *owner,
        amount,
        decimals: 6,
    });
    mint
}

fn program_ids(tx: &VersionedTransaction) -> Vec<Pubkey> {
    let keys = compat::get_static_account_keys(&tx.message);
    compat::get_instructions(&tx.message)
        .iter()
        .map(|ix| keys[ix.program_id_index as usize])
        .collect()
}

#[tokio::test]
async fn scenario_a_burn_scales_amount_and_appends_fee() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let user_pubkey = user.pubkey();
    let mint = fund_tokens(&h.ledger, &user_pubkey, 2_000_000);
    let wallet = ScriptedWallet::approving(user);

    let params = BurnParams {
        mint: Some(mint),
        amount: "1.5".to_string(),
    };
    let receipt = h.ops.burn(&wallet, &params).await.unwrap();

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 1);
    let tx = &sent[0];
    assert_eq!(receipt.signature, tx.signatures[0]);
    verify_signatures(tx).unwrap();

    // exactly [burn, fee transfer], service pays the network fee
    assert_eq!(program_ids(tx), vec![spl_token::id(), system_program::id()]);
    assert_eq!(compat::get_fee_payer(&tx.message), Some(&h.service));

    let ixs = compat::get_instructions(&tx.message);
    match TokenInstruction::unpack(&ixs[0].data).unwrap() {
        TokenInstruction::BurnChecked { amount, decimals } => {
            assert_eq!(amount, 1_500_000);
            assert_eq!(decimals, 6);
        }
        other => panic!("expected BurnChecked, got {:?}", other),
    }
    let fee: SystemInstruction = bincode::deserialize(&ixs[1].data).unwrap();
    assert_eq!(fee, SystemInstruction::Transfer { lamports: FEE });

    assert_eq!(wallet.prompts(), 1);
    assert_eq!(receipt.attempts, 1);
    assert_eq!(receipt.rebuilds, 0);
}

#[tokio::test]
async fn scenario_b_user_rejection_submits_nothing() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 2_000_000);
    let wallet = ScriptedWallet::rejecting(user);

    let params = BurnParams {
        mint: Some(mint),
        amount: "1".to_string(),
    };
    let err = h.ops.burn(&wallet, &params).await.unwrap_err();

    assert_eq!(err, PipelineError::UserRejected);
    assert_eq!(err.class(), ErrorClass::UserRejected);
    assert_eq!(wallet.prompts(), 1);
    assert_eq!(h.ledger.simulate_calls(), 0);
    assert_eq!(h.ledger.send_calls(), 0);
    assert_eq!(h.metrics.user_rejections.get(), 1);
}

#[tokio::test]
async fn scenario_c_simulation_failure_blocks_submission() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 2_000_000);
    h.ledger.fail_simulation(
        "InstructionError(1, Custom(1))",
        vec!["Program log: Error: insufficient lamports".to_string()],
    );
    let wallet = ScriptedWallet::approving(user);

    let params = BurnParams {
        mint: Some(mint),
        amount: "0.25".to_string(),
    };
    let err = h.ops.burn(&wallet, &params).await.unwrap_err();

    match &err {
        PipelineError::SimulationFailed { reason, logs, .. } => {
            assert_eq!(reason, "InstructionError(1, Custom(1))");
            assert_eq!(logs.len(), 1);
        }
        other => panic!("expected SimulationFailed, got {:?}", other),
    }
    assert_eq!(err.class(), ErrorClass::Vendor);
    assert_eq!(h.ledger.simulate_calls(), 1);
    assert_eq!(h.ledger.send_calls(), 0);
    assert_eq!(h.metrics.simulation_failures.get(), 1);
}

#[tokio::test]
async fn scenario_d_expired_anchor_rebuilds_once() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 2_000_000);
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    let wallet = ScriptedWallet::approving(user);

    let params = BurnParams {
        mint: Some(mint),
        amount: "1".to_string(),
    };
    let receipt = h.ops.burn(&wallet, &params).await.unwrap();

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 2);
    let anchors = h.ledger.anchors();
    assert_eq!(anchors.len(), 2);
    assert_eq!(compat::get_recent_blockhash(&sent[0].message), &anchors[0]);
    assert_eq!(compat::get_recent_blockhash(&sent[1].message), &anchors[1]);

    // the rebuilt body needs a fresh user signature
    assert_eq!(wallet.prompts(), 2);
    assert_eq!(receipt.rebuilds, 1);
    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.signature, sent[1].signatures[0]);
    assert_eq!(h.metrics.rebuilds.get(), 1);
}

#[tokio::test]
async fn scenario_d_second_expiry_is_surfaced() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 2_000_000);
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("block height exceeded"));
    let wallet = ScriptedWallet::approving(user);

    let params = BurnParams {
        mint: Some(mint),
        amount: "1".to_string(),
    };
    let err = h.ops.burn(&wallet, &params).await.unwrap_err();

    assert!(err.is_stale());
    assert_eq!(h.ledger.send_calls(), 2);
    assert_eq!(wallet.prompts(), 2);
    assert_eq!(h.metrics.submission_rejections.get(), 1);
}

#[tokio::test]
async fn burn_without_mint_uses_first_holding() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 5_000_000);
    let wallet = ScriptedWallet::approving(user);

    let params = BurnParams {
        mint: None,
        amount: "5".to_string(),
    };
    h.ops.burn(&wallet, &params).await.unwrap();

    let tx = &h.ledger.sent()[0];
    let keys = compat::get_static_account_keys(&tx.message);
    assert!(keys.contains(&mint));
}

#[tokio::test]
async fn burn_rejects_excess_precision_and_overdraw_before_prompting() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let mint = fund_tokens(&h.ledger, &user.pubkey(), 1_000_000);
    let wallet = ScriptedWallet::approving(user);

    let precise = BurnParams {
        mint: Some(mint),
        amount: "0.0000001".to_string(),
    };
    let err = h.ops.burn(&wallet, &precise).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidAmount(_)));

    let overdraw = BurnParams {
        mint: Some(mint),
        amount: "2".to_string(),
    };
    let err = h.ops.burn(&wallet, &overdraw).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Validation);

    let missing = BurnParams {
        mint: Some(Pubkey::new_unique()),
        amount: "1".to_string(),
    };
    let err = h.ops.burn(&wallet, &missing).await.unwrap_err();
    assert!(matches!(err, PipelineError::AccountNotFound { .. }));

    assert_eq!(wallet.prompts(), 0);
    assert_eq!(h.ledger.anchors().len(), 0);
}

#[tokio::test]
async fn transfer_reserves_fee_from_balance() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let source = user.pubkey();
    let destination = Pubkey::new_unique();
    h.ledger.set_balance(source, 1_100_000_000);
    let wallet = ScriptedWallet::approving(user);

    let ok = TransferParams {
        destination,
        sol: "1".to_string(),
    };
    h.ops.transfer(&wallet, &ok).await.unwrap();

    let tx = &h.ledger.sent()[0];
    assert_eq!(program_ids(tx), vec![system_program::id(), system_program::id()]);
    let first: SystemInstruction =
        bincode::deserialize(&compat::get_instructions(&tx.message)[0].data).unwrap();
    assert_eq!(
        first,
        SystemInstruction::Transfer {
            lamports: 1_000_000_000
        }
    );

    let balances = h.ledger.balances_snapshot();
    assert_eq!(balances[&source], 50_000_000);
    assert_eq!(balances[&destination], 1_000_000_000);
    assert_eq!(balances[&h.service], FEE);

    // 1.06 SOL + 0.05 SOL fee exceeds 1.1 SOL
    h.ledger.set_balance(source, 1_100_000_000);
    let too_much = TransferParams {
        destination,
        sol: "1.06".to_string(),
    };
    let err = h.ops.transfer(&wallet, &too_much).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidAmount(_)));
    assert_eq!(h.ledger.send_calls(), 1);
}

#[tokio::test]
async fn transport_failure_resends_same_bytes() {
    let h = harness(default_policy());
    let user = Keypair::new();
    h.ledger.set_balance(user.pubkey(), 2_000_000_000);
    h.ledger
        .push_send_error(PipelineError::NetworkUnreachable("connection reset".into()));
    let wallet = ScriptedWallet::approving(user);

    let params = TransferParams {
        destination: Pubkey::new_unique(),
        sol: "0.5".to_string(),
    };
    let receipt = h.ops.transfer(&wallet, &params).await.unwrap();

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
    assert_eq!(receipt.attempts, 2);
    assert_eq!(receipt.rebuilds, 0);
    assert_eq!(wallet.prompts(), 1);
    assert_eq!(h.metrics.transport_retries.get(), 1);
}

#[tokio::test]
async fn lost_reply_then_duplicate_reports_success() {
    let h = harness(default_policy());
    let user = Keypair::new();
    h.ledger.set_balance(user.pubkey(), 2_000_000_000);
    h.ledger
        .push_send_error(PipelineError::NetworkUnreachable("connection reset".into()));
    h.ledger.push_send_error(classify_failure(
        "Transaction simulation failed: This transaction has already been processed",
        false,
    ));
    let wallet = ScriptedWallet::approving(user);

    let params = TransferParams {
        destination: Pubkey::new_unique(),
        sol: "0.5".to_string(),
    };
    let receipt = h.ops.transfer(&wallet, &params).await.unwrap();

    let sent = h.ledger.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(receipt.signature, sent[0].signatures[0]);
    assert_eq!(receipt.rebuilds, 0);
    // no rebuild, so the user is never asked to pay twice
    assert_eq!(wallet.prompts(), 1);
    assert_eq!(h.metrics.rebuilds.get(), 0);
}

fn swap_request() -> QuoteRequest {
    QuoteRequest {
        input_mint: Pubkey::new_unique(),
        output_mint: Pubkey::new_unique(),
        amount: 1_000,
        mode: SwapMode::ExactIn,
    }
}

#[tokio::test]
async fn swap_is_paid_by_user_and_gated() {
    let h = harness(default_policy());
    let user = Keypair::new();
    let user_pubkey = user.pubkey();
    let wallet = ScriptedWallet::approving(user);

    let receipt = h.ops.swap(&wallet, &swap_request()).await.unwrap();

    let tx = &h.ledger.sent()[0];
    // service is not a signer of vendor transactions paid by the user
    assert_eq!(tx.signatures.len(), 1);
    assert_eq!(compat::get_fee_payer(&tx.message), Some(&user_pubkey));
    assert_eq!(h.ledger.simulate_calls(), 1);
    assert_eq!(receipt.quote.map(|q| q.out_amount), Some(2_000));
}

#[tokio::test]
async fn swap_expiry_requotes_and_rebuilds_once() {
    let h = harness(PipelinePolicy::default());
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    let wallet = ScriptedWallet::approving(Keypair::new());

    let receipt = h.ops.swap(&wallet, &swap_request()).await.unwrap();

    assert_eq!(receipt.rebuilds, 1);
    assert_eq!(h.quotes.quote_calls(), 2);
    assert_eq!(h.quotes.swap_calls(), 2);
    assert_eq!(wallet.prompts(), 2);
    let sent = h.ledger.sent();
    assert_ne!(
        compat::get_recent_blockhash(&sent[0].message),
        compat::get_recent_blockhash(&sent[1].message)
    );
}

#[tokio::test]
async fn swap_second_expiry_is_surfaced() {
    let h = harness(default_policy());
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    let wallet = ScriptedWallet::approving(Keypair::new());

    let err = h.ops.swap(&wallet, &swap_request()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::StaleState);
    assert_eq!(h.quotes.quote_calls(), 2);
    assert_eq!(h.ledger.send_calls(), 2);
}

#[tokio::test]
async fn swap_rebuild_can_be_disabled() {
    let h = harness(PipelinePolicy {
        rebuild_swaps_on_expiry: false,
        ..default_policy()
    });
    h.ledger
        .push_send_error(PipelineError::blockhash_expired("Blockhash not found"));
    let wallet = ScriptedWallet::approving(Keypair::new());

    let err = h.ops.swap(&wallet, &swap_request()).await.unwrap_err();

    assert_eq!(err.class(), ErrorClass::StaleState);
    assert_eq!(h.quotes.quote_calls(), 1);
    assert_eq!(h.ledger.send_calls(), 1);
}

#[tokio::test]
async fn quote_failure_is_not_retried() {
    let h = harness(default_policy());
    h.quotes.fail_quotes("no route found");
    let wallet = ScriptedWallet::approving(Keypair::new());

    let err = h.ops.swap(&wallet, &swap_request()).await.unwrap_err();

    assert_eq!(err, PipelineError::quote_unavailable("no route found"));
    assert_eq!(h.quotes.quote_calls(), 1);
    assert_eq!(wallet.prompts(), 0);
    assert_eq!(h.ledger.send_calls(), 0);
}
