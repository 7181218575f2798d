//! Cosigner CLI
//!
//! Burns, transfers and swaps authorized jointly by a user wallet and the
//! service key. The user wallet is a local keypair file: `--yes` signs
//! without asking, otherwise every signature is confirmed on the terminal.

// Compiler warning configuration
#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cosigner::aggregator::{JupiterClient, QuoteRequest, QuoteSource, SwapMode};
use cosigner::config::{Config, DEFAULT_CONFIG_PATH};
use cosigner::metrics::Metrics;
use cosigner::rpc::{LedgerRpc, SolanaRpc};
use cosigner::tx_builder::{from_raw_units, instructions::SOL_DECIMALS, WalletSigner};
use cosigner::wallet::{keypair_from_file, ConsoleWallet, KeypairWallet, ServiceKey};
use cosigner::{
    BurnParams, OperationReceipt, Operations, PipelineError, PipelinePolicy, Pubkey, TransferParams,
};
use solana_sdk::signature::Signer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Print Prometheus metrics after the command finishes
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Burn tokens and pay the service fee
    Burn {
        /// Decimal token amount, e.g. 1.5
        #[arg(long)]
        amount: String,
        /// Mint to burn (defaults to the first holding account)
        #[arg(long)]
        mint: Option<Pubkey>,
        /// User keypair file
        #[arg(long, env = "COSIGNER_WALLET")]
        wallet: String,
        /// Sign without confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Send SOL and pay the service fee
    Transfer {
        #[arg(long)]
        to: Pubkey,
        /// Decimal SOL amount
        #[arg(long)]
        sol: String,
        #[arg(long, env = "COSIGNER_WALLET")]
        wallet: String,
        #[arg(long)]
        yes: bool,
    },
    /// Swap through the aggregator
    Swap {
        #[arg(long)]
        input_mint: Pubkey,
        #[arg(long)]
        output_mint: Pubkey,
        /// Raw amount of the fixed side
        #[arg(long)]
        amount: u64,
        /// exact-in | exact-out
        #[arg(long, default_value = "exact-in")]
        mode: SwapMode,
        #[arg(long, env = "COSIGNER_WALLET")]
        wallet: String,
        #[arg(long)]
        yes: bool,
    },
    /// Show a quote without signing anything
    Quote {
        #[arg(long)]
        input_mint: Pubkey,
        #[arg(long)]
        output_mint: Pubkey,
        #[arg(long)]
        amount: u64,
        #[arg(long, default_value = "exact-in")]
        mode: SwapMode,
    },
    /// List an owner's token holding accounts
    Accounts {
        #[arg(long)]
        owner: Pubkey,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config))?;

    init_logging(args.verbose, args.json_logs || config.monitoring.json_logs)?;
    info!(version = env!("CARGO_PKG_VERSION"), rpc = %config.rpc.url, "Starting cosigner");

    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let rpc: Arc<dyn LedgerRpc> = Arc::new(SolanaRpc::new(
        config.rpc.url.clone(),
        config.rpc.commitment_config()?,
        config.rpc.timeout(),
    ));
    let quotes = Arc::new(JupiterClient::new(&config.aggregator)?);

    let outcome = run(args.command, &config, rpc, quotes, metrics.clone()).await;

    if args.print_metrics || config.monitoring.print_metrics {
        print!("{}", metrics.encode()?);
    }

    match outcome {
        Err(PipelineError::UserRejected) => {
            eprintln!("Cancelled: the signing request was declined.");
            Ok(())
        }
        other => other.map_err(anyhow::Error::from),
    }
}

async fn run(
    command: Command,
    config: &Config,
    rpc: Arc<dyn LedgerRpc>,
    quotes: Arc<JupiterClient>,
    metrics: Arc<Metrics>,
) -> Result<(), PipelineError> {
    let operations = |service: ServiceKey| {
        Operations::new(
            rpc.clone(),
            quotes.clone(),
            service,
            metrics.clone(),
            PipelinePolicy::from_config(config),
        )
    };
    let fee = from_raw_units(config.fees.service_fee_lamports, SOL_DECIMALS);

    match command {
        Command::Burn {
            amount,
            mint,
            wallet,
            yes,
        } => {
            let ops = operations(ServiceKey::load(&config.service)?);
            let mint_label = mint.map_or_else(|| "first holding account".to_string(), |m| m.to_string());
            let summary = format!(
                "Burn {} tokens ({}) and pay a {} SOL fee to {}",
                amount,
                mint_label,
                fee,
                ops.service_pubkey()
            );
            let signer = user_wallet(&wallet, yes, summary)?;
            let receipt = ops.burn(signer.as_ref(), &BurnParams { mint, amount }).await?;
            print_receipt(&receipt);
        }
        Command::Transfer {
            to,
            sol,
            wallet,
            yes,
        } => {
            let ops = operations(ServiceKey::load(&config.service)?);
            let summary = format!(
                "Send {} SOL to {} and pay a {} SOL fee to {}",
                sol,
                to,
                fee,
                ops.service_pubkey()
            );
            let signer = user_wallet(&wallet, yes, summary)?;
            let params = TransferParams {
                destination: to,
                sol,
            };
            let receipt = ops.transfer(signer.as_ref(), &params).await?;
            print_receipt(&receipt);
        }
        Command::Swap {
            input_mint,
            output_mint,
            amount,
            mode,
            wallet,
            yes,
        } => {
            let ops = operations(ServiceKey::load(&config.service)?);
            let summary = format!(
                "Swap {} raw units of {} for {} ({})",
                amount,
                input_mint,
                output_mint,
                mode.as_str()
            );
            let signer = user_wallet(&wallet, yes, summary)?;
            let request = QuoteRequest {
                input_mint,
                output_mint,
                amount,
                mode,
            };
            let receipt = ops.swap(signer.as_ref(), &request).await?;
            print_receipt(&receipt);
        }
        Command::Quote {
            input_mint,
            output_mint,
            amount,
            mode,
        } => {
            let request = QuoteRequest {
                input_mint,
                output_mint,
                amount,
                mode,
            };
            let quote = quotes.get_quote(&request).await?;
            println!("in:          {} {}", quote.in_amount, quote.input_mint);
            println!("out:         {} {}", quote.out_amount, quote.output_mint);
            println!("threshold:   {}", quote.other_amount_threshold);
            println!("slippage:    {} bps", quote.slippage_bps);
            println!("impact:      {}%", quote.price_impact_pct);
            println!("route:       {}", quote.route_labels.join(" -> "));
        }
        Command::Accounts { owner } => {
            let resolver = cosigner::accounts::AccountResolver::new(rpc.clone());
            for account in resolver.holding_accounts(&owner).await? {
                println!(
                    "{}  mint={}  balance={}",
                    account.address,
                    account.mint,
                    from_raw_units(account.amount, account.decimals)
                );
            }
        }
    }
    Ok(())
}

fn user_wallet(path: &str, yes: bool, summary: String) -> Result<Box<dyn WalletSigner>, PipelineError> {
    let keypair = keypair_from_file(path)?;
    info!(user = %keypair.pubkey(), auto_approve = yes, "User wallet loaded");
    Ok(if yes {
        Box::new(KeypairWallet::new(keypair))
    } else {
        Box::new(ConsoleWallet::new(keypair, summary))
    })
}

fn print_receipt(receipt: &OperationReceipt) {
    println!("signature:   {}", receipt.signature);
    println!("correlation: {}", receipt.correlation_id);
    if let Some(units) = receipt.simulation.units_consumed {
        println!("compute:     {} units", units);
    }
    if receipt.rebuilds > 0 {
        println!("rebuilds:    {}", receipt.rebuilds);
    }
    if let Some(quote) = &receipt.quote {
        println!("quoted out:  {} {}", quote.out_amount, quote.output_mint);
    }
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "cosigner=debug,info"
    } else {
        "cosigner=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}
