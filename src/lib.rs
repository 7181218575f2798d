//! Cosigner - dual-signature transaction pipeline for Solana
//!
//! A connected user wallet and a locally held service key jointly authorize
//! token burns, SOL transfers and aggregator-routed swaps. This library
//! exposes the pipeline stages for the CLI and for integration tests.

// Versioned message accessors
pub mod compat;

pub mod accounts;
pub mod aggregator;
pub mod config;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod rpc;
pub mod structured_logging;
pub mod tx_builder;
pub mod wallet;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use pipeline::{BurnParams, OperationReceipt, Operations, PipelinePolicy, TransferParams};
pub use solana_sdk::{message::VersionedMessage, pubkey::Pubkey, signature::Signature};
pub use tx_builder::{ErrorClass, PipelineError};
