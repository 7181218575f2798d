//! Dual-signature coordination
//!
//! A transaction moves through `Unsigned → UserSigned → FullySigned`:
//! 1. The external wallet signs the exact message bytes (the owner may take
//!    any amount of time, or decline).
//! 2. The service key appends its signature over the same bytes.
//!
//! The message is never rebuilt after step 1. Any change to it invalidates
//! the user's signature, so the co-signing step refuses to run when the
//! bytes differ from the ones the user approved.

use crate::compat;
use crate::tx_builder::errors::PipelineError;
use crate::wallet::ServiceKey;
use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use tracing::{debug, info};

/// Outcome of a wallet signing prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletDecision {
    /// Signature over the presented message bytes
    Approved(Signature),
    /// The owner declined; nothing is submitted
    Rejected,
}

/// External wallet signing interface
///
/// Receives serialized message bytes and returns a signature or an explicit
/// rejection. Errors are reserved for a wallet that could not be reached.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Public address of the wallet owner
    fn address(&self) -> Pubkey;

    /// Ask the owner to sign `message`
    async fn sign(&self, message: &[u8]) -> Result<WalletDecision, PipelineError>;
}

/// Signing progress of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    Unsigned,
    UserSigned,
    FullySigned,
}

impl SigningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsigned => "unsigned",
            Self::UserSigned => "user-signed",
            Self::FullySigned => "fully signed",
        }
    }
}

/// A transaction carrying every required signature
///
/// Only [`SigningSession::finish`] creates one, after verifying all
/// signatures against the message.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub(crate) tx: VersionedTransaction,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    /// Fee payer signature, which the network uses as the transaction id
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn into_inner(self) -> VersionedTransaction {
        self.tx
    }
}

/// One transaction's walk through the signing state machine
#[derive(Debug)]
pub struct SigningSession {
    tx: VersionedTransaction,
    user: Pubkey,
    state: SigningState,
    approved_message: Option<Vec<u8>>,
}

impl SigningSession {
    /// Start a session for `tx`, which `user` must be a required signer of
    pub fn new(tx: VersionedTransaction, user: Pubkey) -> Result<Self, PipelineError> {
        if compat::signer_index(&tx.message, &user).is_none() {
            return Err(PipelineError::InvalidSigningState {
                state: SigningState::Unsigned.as_str(),
                action: "request a signature from an account that is not a required signer",
            });
        }
        let num_signers = compat::get_required_signers(&tx.message).len();
        let mut tx = tx;
        tx.signatures.resize(num_signers, Signature::default());

        Ok(Self {
            tx,
            user,
            state: SigningState::Unsigned,
            approved_message: None,
        })
    }

    pub fn state(&self) -> SigningState {
        self.state
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    /// Present the message to the wallet and attach the user's signature
    pub async fn request_user_signature(&mut self, wallet: &dyn WalletSigner) -> Result<(), PipelineError> {
        match self.state {
            SigningState::Unsigned => {}
            SigningState::UserSigned => {
                return Err(PipelineError::InvalidSigningState {
                    state: self.state.as_str(),
                    action: "request the user signature again",
                })
            }
            SigningState::FullySigned => return Err(PipelineError::AlreadySigned),
        }

        let signer = wallet.address();
        if signer != self.user {
            return Err(PipelineError::SignatureMismatch { signer });
        }

        let message = self.tx.message.serialize();
        debug!(user = %self.user, bytes = message.len(), "Requesting wallet signature");

        let signature = match wallet.sign(&message).await? {
            WalletDecision::Approved(signature) => signature,
            WalletDecision::Rejected => {
                info!(user = %self.user, "Wallet owner rejected signing request");
                return Err(PipelineError::UserRejected);
            }
        };

        if !signature.verify(self.user.as_ref(), &message) {
            return Err(PipelineError::SignatureMismatch { signer: self.user });
        }

        let index = compat::signer_index(&self.tx.message, &self.user)
            .ok_or(PipelineError::MissingSignature { signer: self.user })?;
        self.tx.signatures[index] = signature;
        self.approved_message = Some(message);
        self.state = SigningState::UserSigned;
        Ok(())
    }

    /// Append the service signature over the bytes the user approved
    ///
    /// When the service is not a required signer (a swap paid by the user)
    /// nothing is attached, but the session still becomes fully signed.
    pub fn co_sign(&mut self, service: &ServiceKey) -> Result<(), PipelineError> {
        match self.state {
            SigningState::UserSigned => {}
            SigningState::Unsigned => {
                return Err(PipelineError::InvalidSigningState {
                    state: self.state.as_str(),
                    action: "co-sign",
                })
            }
            SigningState::FullySigned => return Err(PipelineError::AlreadySigned),
        }

        let message = self.tx.message.serialize();
        if self.approved_message.as_deref() != Some(message.as_slice()) {
            return Err(PipelineError::TransactionMutated);
        }

        match compat::signer_index(&self.tx.message, &service.pubkey()) {
            Some(index) => {
                self.tx.signatures[index] = service.sign_message(&message);
                debug!(service = %service.pubkey(), slot = index, "Service signature attached");
            }
            None => {
                debug!(service = %service.pubkey(), "Service is not a required signer, nothing to attach");
            }
        }

        self.state = SigningState::FullySigned;
        Ok(())
    }

    /// Close the session, verifying every required signature
    pub fn finish(self) -> Result<SignedTransaction, PipelineError> {
        if self.state != SigningState::FullySigned {
            return Err(PipelineError::InvalidSigningState {
                state: self.state.as_str(),
                action: "finish signing",
            });
        }
        verify_signatures(&self.tx)?;
        Ok(SignedTransaction { tx: self.tx })
    }
}

/// Verify that every required signer has a valid signature over the current
/// message bytes
pub fn verify_signatures(tx: &VersionedTransaction) -> Result<(), PipelineError> {
    let signers = compat::get_required_signers(&tx.message);
    if tx.signatures.len() != signers.len() {
        return Err(PipelineError::InvalidSigningState {
            state: "malformed",
            action: "verify signatures",
        });
    }

    let message = tx.message.serialize();
    for (signature, signer) in tx.signatures.iter().zip(signers) {
        if *signature == Signature::default() {
            return Err(PipelineError::MissingSignature { signer: *signer });
        }
        if !signature.verify(signer.as_ref(), &message) {
            return Err(PipelineError::SignatureMismatch { signer: *signer });
        }
    }
    Ok(())
}

/// Runs both signing steps in the mandated order
#[derive(Debug, Clone)]
pub struct DualSignatureCoordinator {
    service: ServiceKey,
}

impl DualSignatureCoordinator {
    pub fn new(service: ServiceKey) -> Self {
        Self { service }
    }

    pub fn service_pubkey(&self) -> Pubkey {
        self.service.pubkey()
    }

    /// User signs first, then the service co-signs
    pub async fn authorize(
        &self,
        tx: VersionedTransaction,
        wallet: &dyn WalletSigner,
    ) -> Result<SignedTransaction, PipelineError> {
        let mut session = SigningSession::new(tx, wallet.address())?;
        session.request_user_signature(wallet).await?;
        session.co_sign(&self.service)?;
        session.finish()
    }
}
