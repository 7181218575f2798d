use crate::tx_builder::errors::{PipelineError, RejectionCause};
use solana_client::client_error::{ClientError, ClientErrorKind};

const EXPIRY_PATTERNS: &[&str] = &[
    "blockhash not found",
    "block height exceeded",
    "transaction expired",
];

const DUPLICATE_PATTERNS: &[&str] = &["already been processed", "alreadyprocessed"];

const TRANSPORT_PATTERNS: &[&str] = &[
    "error sending request",
    "connection refused",
    "connection reset",
    "timed out",
    "timeout",
    "dns error",
];

fn is_transport(err: &ClientError) -> bool {
    matches!(err.kind(), ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_))
}

/// Classify a failed submission
pub fn classify_client_error(err: &ClientError) -> PipelineError {
    classify_failure(&err.to_string(), is_transport(err))
}

/// Classify a failed read; anything that is not transport becomes `Rpc`
pub fn classify_read_error(err: &ClientError) -> PipelineError {
    let message = err.to_string();
    if is_transport(err) || matches_any(&message, TRANSPORT_PATTERNS) {
        PipelineError::NetworkUnreachable(message)
    } else {
        PipelineError::Rpc(message)
    }
}

/// Classify a submission failure from its message.
///
/// Expiry and duplicate markers win over the transport flag: a node that
/// answered with "blockhash not found" was reachable.
pub fn classify_failure(message: &str, transport: bool) -> PipelineError {
    if matches_any(message, EXPIRY_PATTERNS) {
        return PipelineError::SubmissionRejected {
            reason: message.to_string(),
            cause: RejectionCause::BlockhashExpired,
        };
    }
    if matches_any(message, DUPLICATE_PATTERNS) {
        return PipelineError::SubmissionRejected {
            reason: message.to_string(),
            cause: RejectionCause::Duplicate,
        };
    }
    if transport || matches_any(message, TRANSPORT_PATTERNS) {
        return PipelineError::NetworkUnreachable(message.to_string());
    }
    PipelineError::SubmissionRejected {
        reason: message.to_string(),
        cause: RejectionCause::Other,
    }
}

fn matches_any(message: &str, patterns: &[&str]) -> bool {
    let lower = message.to_lowercase();
    patterns.iter().any(|p| lower.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::errors::ErrorClass;

    #[test]
    fn test_expired_blockhash_is_stale() {
        let err = classify_failure(
            "RPC response error -32002: Transaction simulation failed: Blockhash not found",
            false,
        );
        assert_eq!(err.class(), ErrorClass::StaleState);

        let err = classify_failure("block height exceeded", true);
        assert!(matches!(
            err,
            PipelineError::SubmissionRejected {
                cause: RejectionCause::BlockhashExpired,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_is_rejected() {
        let err = classify_failure("This transaction has already been processed: AlreadyProcessed", false);
        assert!(matches!(
            err,
            PipelineError::SubmissionRejected {
                cause: RejectionCause::Duplicate,
                ..
            }
        ));
    }

    #[test]
    fn test_transport_failures() {
        assert!(classify_failure("io error", true).is_retryable());
        assert!(classify_failure("error sending request for url", false).is_retryable());
        assert!(!classify_failure("insufficient funds for rent", false).is_retryable());
    }

    #[test]
    fn test_other_rejection() {
        let err = classify_failure("Transaction signature verification failure", false);
        assert_eq!(err.class(), ErrorClass::SubmissionRejected);
    }
}
