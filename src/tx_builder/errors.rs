//! Error types for the co-signing pipeline
//!
//! A single error enum covers every stage of an operation: account
//! resolution, instruction construction, signing, simulation, quoting and
//! submission. Each variant maps onto one [`ErrorClass`] so callers can decide
//! between displaying, rebuilding, retrying or aborting without matching on
//! individual variants.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Coarse error classes used by callers to pick a recovery strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad caller input (amount, missing account, empty transaction)
    Validation,
    /// The wallet owner declined to sign; a clean cancellation
    UserRejected,
    /// Blockhash expired or balances moved; recoverable by rebuilding
    StaleState,
    /// Quote aggregator or simulation reported infeasibility
    Vendor,
    /// Transport failure; the same transaction may be resent
    NetworkUnreachable,
    /// The network refused the transaction for a non-expiry reason
    SubmissionRejected,
    /// Missing or corrupt service key; aborts startup
    FatalConfiguration,
}

/// Why the network refused a submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCause {
    /// The referenced blockhash is no longer valid
    BlockhashExpired,
    /// The same signature was already processed
    Duplicate,
    /// Any other validation failure reported by the node
    Other,
}

/// Error type for every pipeline operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// Amount is zero, non-integral in raw units, overflowing or above the
    /// available balance
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// A required holding account does not exist on-chain
    #[error("Holding account not found for owner {owner} (mint: {mint:?})")]
    AccountNotFound { owner: Pubkey, mint: Option<Pubkey> },

    /// Transaction builder was handed zero instructions
    #[error("Transaction has no instructions")]
    EmptyTransaction,

    /// The wallet owner rejected the signing prompt
    #[error("Signing request was rejected by the wallet owner")]
    UserRejected,

    /// A signing step was attempted out of order
    #[error("Cannot {action} while transaction is {state}")]
    InvalidSigningState {
        state: &'static str,
        action: &'static str,
    },

    /// Signing was attempted on an already fully signed transaction
    #[error("Transaction is already fully signed")]
    AlreadySigned,

    /// A signature does not verify over the current message bytes
    #[error("Signature from {signer} does not match the transaction message")]
    SignatureMismatch { signer: Pubkey },

    /// A required signer has not signed yet
    #[error("Missing signature from required signer {signer}")]
    MissingSignature { signer: Pubkey },

    /// The message changed after the user approved it
    #[error("Transaction body changed after user approval")]
    TransactionMutated,

    /// Simulation reported the transaction would fail
    #[error("Simulation failed: {reason}")]
    SimulationFailed {
        reason: String,
        logs: Vec<String>,
        units_consumed: Option<u64>,
    },

    /// Quote aggregator returned an error, an empty route or an unusable
    /// transaction
    #[error("Quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// Transport-level failure talking to the network
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// The network refused the transaction
    #[error("Submission rejected ({cause:?}): {reason}")]
    SubmissionRejected {
        reason: String,
        cause: RejectionCause,
    },

    /// Non-transport RPC failure on a read path
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Missing or corrupt service key material or configuration
    #[error("Fatal configuration error: {0}")]
    FatalConfiguration(String),
}

impl PipelineError {
    /// Map this error onto the caller-facing recovery class
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidAmount(_)
            | Self::AccountNotFound { .. }
            | Self::EmptyTransaction
            | Self::InvalidSigningState { .. }
            | Self::AlreadySigned
            | Self::SignatureMismatch { .. }
            | Self::MissingSignature { .. }
            | Self::TransactionMutated => ErrorClass::Validation,
            Self::UserRejected => ErrorClass::UserRejected,
            Self::SimulationFailed { .. } | Self::QuoteUnavailable(_) => ErrorClass::Vendor,
            Self::NetworkUnreachable(_) => ErrorClass::NetworkUnreachable,
            Self::SubmissionRejected {
                cause: RejectionCause::BlockhashExpired,
                ..
            } => ErrorClass::StaleState,
            Self::SubmissionRejected { .. } => ErrorClass::SubmissionRejected,
            Self::Rpc(_) => ErrorClass::Vendor,
            Self::FatalConfiguration(_) => ErrorClass::FatalConfiguration,
        }
    }

    /// Check if resending the *same* signed transaction might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkUnreachable(_))
    }

    /// Check if the operation should be rebuilt with a fresh blockhash
    pub fn is_stale(&self) -> bool {
        self.class() == ErrorClass::StaleState
    }

    /// Get the error category for metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "amount",
            Self::AccountNotFound { .. } => "account",
            Self::EmptyTransaction => "builder",
            Self::UserRejected => "user_rejected",
            Self::InvalidSigningState { .. }
            | Self::AlreadySigned
            | Self::SignatureMismatch { .. }
            | Self::MissingSignature { .. }
            | Self::TransactionMutated => "signing",
            Self::SimulationFailed { .. } => "simulation",
            Self::QuoteUnavailable(_) => "quote",
            Self::NetworkUnreachable(_) => "transport",
            Self::SubmissionRejected { .. } => "submission",
            Self::Rpc(_) => "rpc",
            Self::FatalConfiguration(_) => "config",
        }
    }
}

// Convenience constructors
impl PipelineError {
    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::InvalidAmount(reason.into())
    }

    pub fn quote_unavailable(reason: impl Into<String>) -> Self {
        Self::QuoteUnavailable(reason.into())
    }

    pub fn fatal_config(reason: impl Into<String>) -> Self {
        Self::FatalConfiguration(reason.into())
    }

    pub fn blockhash_expired(reason: impl Into<String>) -> Self {
        Self::SubmissionRejected {
            reason: reason.into(),
            cause: RejectionCause::BlockhashExpired,
        }
    }

    pub fn simulation_failed(reason: impl Into<String>, logs: Vec<String>) -> Self {
        Self::SimulationFailed {
            reason: reason.into(),
            logs,
            units_consumed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::invalid_amount("zero");
        assert_eq!(err.to_string(), "Invalid amount: zero");

        let err = PipelineError::InvalidSigningState {
            state: "unsigned",
            action: "co-sign",
        };
        assert_eq!(err.to_string(), "Cannot co-sign while transaction is unsigned");
    }

    #[test]
    fn test_error_classes() {
        assert_eq!(PipelineError::UserRejected.class(), ErrorClass::UserRejected);
        assert_eq!(PipelineError::EmptyTransaction.class(), ErrorClass::Validation);
        assert_eq!(
            PipelineError::blockhash_expired("expired").class(),
            ErrorClass::StaleState
        );
        assert_eq!(
            PipelineError::SubmissionRejected {
                reason: "dup".into(),
                cause: RejectionCause::Duplicate,
            }
            .class(),
            ErrorClass::SubmissionRejected
        );
        assert_eq!(
            PipelineError::simulation_failed("InsufficientFunds", vec![]).class(),
            ErrorClass::Vendor
        );
        assert_eq!(
            PipelineError::fatal_config("no key").class(),
            ErrorClass::FatalConfiguration
        );
    }

    #[test]
    fn test_error_retryability() {
        assert!(PipelineError::NetworkUnreachable("reset".into()).is_retryable());
        assert!(!PipelineError::UserRejected.is_retryable());
        assert!(!PipelineError::blockhash_expired("x").is_retryable());
        assert!(PipelineError::blockhash_expired("x").is_stale());
        assert!(!PipelineError::QuoteUnavailable("x".into()).is_stale());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(PipelineError::UserRejected.category(), "user_rejected");
        assert_eq!(PipelineError::AlreadySigned.category(), "signing");
        assert_eq!(
            PipelineError::simulation_failed("x", vec![]).category(),
            "simulation"
        );
    }
}
