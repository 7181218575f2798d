//! Swap quotes and vendor-built swap transactions (Jupiter v6)
//!
//! The aggregator is untrusted: its transaction is only sanity-checked here
//! (decodes, fee payer is the requesting user) and must still pass the
//! simulation gate. Nothing in this module retries; a quote that failed once
//! is reported, not silently re-fetched at a later price.

use crate::compat::get_fee_payer;
use crate::config::AggregatorConfig;
use crate::tx_builder::errors::PipelineError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which side of the swap the amount fixes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwapMode {
    ExactIn,
    ExactOut,
}

impl SwapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExactIn => "ExactIn",
            Self::ExactOut => "ExactOut",
        }
    }
}

impl FromStr for SwapMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "exactin" => Ok(Self::ExactIn),
            "exactout" => Ok(Self::ExactOut),
            _ => Err(PipelineError::invalid_amount(format!("unknown swap mode '{}'", s))),
        }
    }
}

/// Quote request in raw units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: u64,
    pub mode: SwapMode,
}

/// A priced route between two mints
///
/// `raw` is the aggregator's response verbatim; the swap endpoint expects it
/// back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    pub out_amount: u64,
    pub other_amount_threshold: u64,
    pub swap_mode: SwapMode,
    pub slippage_bps: u16,
    pub price_impact_pct: String,
    pub route_labels: Vec<String>,
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    other_amount_threshold: String,
    swap_mode: SwapMode,
    #[serde(default)]
    slippage_bps: u16,
    #[serde(default)]
    price_impact_pct: String,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
}

#[derive(Debug, Deserialize)]
struct SwapInfo {
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

/// Source of quotes and swap transactions
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, PipelineError>;

    /// Exchange `quote` for an unsigned transaction paid and signed by `user`
    async fn get_swap_transaction(
        &self,
        quote: &Quote,
        user: &Pubkey,
    ) -> Result<VersionedTransaction, PipelineError>;
}

/// HTTP client for the Jupiter v6 API
#[derive(Clone)]
pub struct JupiterClient {
    http: Client,
    base_url: String,
    auto_slippage: bool,
    slippage_bps: u16,
    limiter: Arc<DefaultDirectRateLimiter>,
}

impl std::fmt::Debug for JupiterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JupiterClient")
            .field("base_url", &self.base_url)
            .field("auto_slippage", &self.auto_slippage)
            .finish()
    }
}

impl JupiterClient {
    pub fn new(config: &AggregatorConfig) -> Result<Self, PipelineError> {
        let rate = NonZeroU32::new(config.requests_per_second).ok_or_else(|| {
            PipelineError::fatal_config("aggregator.requests_per_second must be greater than zero")
        })?;

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("cosigner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::fatal_config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auto_slippage: config.auto_slippage,
            slippage_bps: config.slippage_bps,
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn read_json(&self, response: reqwest::Response, what: &str) -> Result<Value, PipelineError> {
        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::quote_unavailable(format!("{} response unreadable: {}", what, e)))?;

        if !status.is_success() {
            let detail = body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            warn!(status = %status, error = %detail, "Aggregator returned an error");
            return Err(PipelineError::quote_unavailable(format!(
                "{} failed with {}: {}",
                what, status, detail
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl QuoteSource for JupiterClient {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<Quote, PipelineError> {
        if request.amount == 0 {
            return Err(PipelineError::invalid_amount("swap amount must be greater than zero"));
        }

        let mut query = vec![
            ("inputMint", request.input_mint.to_string()),
            ("outputMint", request.output_mint.to_string()),
            ("amount", request.amount.to_string()),
            ("swapMode", request.mode.as_str().to_string()),
        ];
        if self.auto_slippage {
            query.push(("autoSlippage", "true".to_string()));
        } else {
            query.push(("slippageBps", self.slippage_bps.to_string()));
        }

        self.limiter.until_ready().await;
        let response = self
            .http
            .get(format!("{}/quote", self.base_url))
            .query(&query)
            .send()
            .await
            .map_err(|e| PipelineError::quote_unavailable(format!("quote request failed: {}", e)))?;

        let quote = parse_quote(self.read_json(response, "quote").await?)?;
        check_quote_matches(request, &quote)?;
        info!(
            input_mint = %quote.input_mint,
            output_mint = %quote.output_mint,
            in_amount = quote.in_amount,
            out_amount = quote.out_amount,
            price_impact_pct = %quote.price_impact_pct,
            "Quote received"
        );
        Ok(quote)
    }

    async fn get_swap_transaction(
        &self,
        quote: &Quote,
        user: &Pubkey,
    ) -> Result<VersionedTransaction, PipelineError> {
        let body = json!({
            "quoteResponse": quote.raw,
            "userPublicKey": user.to_string(),
            "wrapAndUnwrapSol": true,
            "dynamicComputeUnitLimit": true,
        });

        self.limiter.until_ready().await;
        let response = self
            .http
            .post(format!("{}/swap", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::quote_unavailable(format!("swap request failed: {}", e)))?;

        let swap: SwapResponse = serde_json::from_value(self.read_json(response, "swap").await?)
            .map_err(|e| PipelineError::quote_unavailable(format!("malformed swap response: {}", e)))?;

        let tx = decode_swap_transaction(&swap.swap_transaction, user)?;
        debug!(user = %user, signatures = tx.signatures.len(), "Swap transaction decoded");
        Ok(tx)
    }
}

/// Interpret a `/quote` response body
pub fn parse_quote(raw: Value) -> Result<Quote, PipelineError> {
    let fields: QuoteFields = serde_json::from_value(raw.clone())
        .map_err(|e| PipelineError::quote_unavailable(format!("malformed quote: {}", e)))?;

    let pubkey = |s: &str| {
        Pubkey::from_str(s).map_err(|e| PipelineError::quote_unavailable(format!("bad mint '{}': {}", s, e)))
    };
    let amount = |s: &str| {
        s.parse::<u64>()
            .map_err(|e| PipelineError::quote_unavailable(format!("bad amount '{}': {}", s, e)))
    };

    let quote = Quote {
        input_mint: pubkey(&fields.input_mint)?,
        output_mint: pubkey(&fields.output_mint)?,
        in_amount: amount(&fields.in_amount)?,
        out_amount: amount(&fields.out_amount)?,
        other_amount_threshold: amount(&fields.other_amount_threshold)?,
        swap_mode: fields.swap_mode,
        slippage_bps: fields.slippage_bps,
        price_impact_pct: fields.price_impact_pct,
        route_labels: fields
            .route_plan
            .into_iter()
            .map(|step| step.swap_info.label)
            .collect(),
        raw,
    };

    if quote.in_amount == 0 || quote.out_amount == 0 {
        return Err(PipelineError::quote_unavailable("quote has an empty leg"));
    }
    Ok(quote)
}

/// Reject a quote that prices something other than what was asked for
pub fn check_quote_matches(request: &QuoteRequest, quote: &Quote) -> Result<(), PipelineError> {
    let fixed_amount = match request.mode {
        SwapMode::ExactIn => quote.in_amount,
        SwapMode::ExactOut => quote.out_amount,
    };
    let mismatch = if quote.input_mint != request.input_mint {
        Some(format!("input mint {} (requested {})", quote.input_mint, request.input_mint))
    } else if quote.output_mint != request.output_mint {
        Some(format!("output mint {} (requested {})", quote.output_mint, request.output_mint))
    } else if quote.swap_mode != request.mode {
        Some(format!("mode {} (requested {})", quote.swap_mode.as_str(), request.mode.as_str()))
    } else if fixed_amount != request.amount {
        Some(format!("amount {} (requested {})", fixed_amount, request.amount))
    } else {
        None
    };

    match mismatch {
        Some(detail) => {
            warn!(detail = %detail, "Quote does not match request");
            Err(PipelineError::quote_unavailable(format!("quote does not match request: {}", detail)))
        }
        None => Ok(()),
    }
}

/// Decode a base64 wire transaction and check it is paid by `user`
pub fn decode_swap_transaction(encoded: &str, user: &Pubkey) -> Result<VersionedTransaction, PipelineError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| PipelineError::quote_unavailable(format!("base64 decode error: {}", e)))?;
    let tx: VersionedTransaction = bincode::deserialize(&bytes)
        .map_err(|e| PipelineError::quote_unavailable(format!("transaction decode error: {}", e)))?;

    match get_fee_payer(&tx.message) {
        Some(payer) if payer == user => Ok(tx),
        Some(payer) => Err(PipelineError::quote_unavailable(format!(
            "swap transaction fee payer {} is not the requesting user {}",
            payer, user
        ))),
        None => Err(PipelineError::quote_unavailable("swap transaction has no signers")),
    }
}
