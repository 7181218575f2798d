//! Key material: the service identity and local user-wallet adapters
//!
//! The service keypair is loaded once at startup and shared read-only through
//! [`ServiceKey`]. User signatures arrive through a [`WalletSigner`]; the two
//! adapters here stand in for an external wallet on the command line.

use crate::config::ServiceConfig;
use crate::tx_builder::errors::PipelineError;
use crate::tx_builder::signing::{WalletDecision, WalletSigner};
use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use zeroize::Zeroizing;

const KEYPAIR_LEN: usize = 64;

/// The service-controlled signing identity
///
/// Cloning shares the same keypair; signing only needs `&self`, so one
/// instance can serve concurrent operations without locking.
#[derive(Clone)]
pub struct ServiceKey {
    keypair: Arc<Keypair>,
}

impl std::fmt::Debug for ServiceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceKey")
            .field("pubkey", &self.pubkey())
            .finish()
    }
}

impl ServiceKey {
    /// Load the service key from the configured environment variable, falling
    /// back to the configured keypair file.
    pub fn load(config: &ServiceConfig) -> Result<Self, PipelineError> {
        if let Ok(encoded) = std::env::var(&config.keypair_env) {
            let encoded = Zeroizing::new(encoded);
            let key = Self::from_base58(encoded.trim())?;
            info!(source = %config.keypair_env, pubkey = %key.pubkey(), "Service key loaded from environment");
            return Ok(key);
        }

        if let Some(path) = &config.keypair_path {
            let key = Self::from_keypair(keypair_from_file(path)?);
            info!(source = %path, pubkey = %key.pubkey(), "Service key loaded from file");
            return Ok(key);
        }

        Err(PipelineError::fatal_config(format!(
            "service key missing: set {} or service.keypair_path",
            config.keypair_env
        )))
    }

    /// Decode a base58-encoded 64-byte secret key
    pub fn from_base58(encoded: &str) -> Result<Self, PipelineError> {
        let bytes = Zeroizing::new(
            bs58::decode(encoded)
                .into_vec()
                .map_err(|e| PipelineError::fatal_config(format!("service key is not base58: {}", e)))?,
        );
        keypair_from_bytes(&bytes).map(Self::from_keypair)
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            keypair: Arc::new(keypair),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    /// Sign raw message bytes
    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

/// Validate and convert raw secret key bytes
pub fn keypair_from_bytes(bytes: &[u8]) -> Result<Keypair, PipelineError> {
    if bytes.len() != KEYPAIR_LEN {
        return Err(PipelineError::fatal_config(format!(
            "invalid keypair length: expected {} bytes, got {}",
            KEYPAIR_LEN,
            bytes.len()
        )));
    }
    if bytes.iter().all(|&b| b == 0) {
        return Err(PipelineError::fatal_config("invalid keypair: all-zero key rejected"));
    }
    Keypair::try_from(bytes)
        .map_err(|e| PipelineError::fatal_config(format!("invalid keypair bytes: {}", e)))
}

/// Read a keypair file, either raw 64 bytes or a JSON byte array
pub fn keypair_from_file(path: &str) -> Result<Keypair, PipelineError> {
    let contents = Zeroizing::new(
        std::fs::read(path)
            .map_err(|e| PipelineError::fatal_config(format!("failed to read keypair file {}: {}", path, e)))?,
    );

    if contents.len() == KEYPAIR_LEN {
        return keypair_from_bytes(&contents);
    }

    let json: Zeroizing<Vec<u8>> = Zeroizing::new(
        serde_json::from_slice(&contents)
            .map_err(|e| PipelineError::fatal_config(format!("failed to parse keypair JSON {}: {}", path, e)))?,
    );
    keypair_from_bytes(&json)
}

/// Wallet backed by a local keypair that approves every request
pub struct KeypairWallet {
    keypair: Keypair,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_file(path: &str) -> Result<Self, PipelineError> {
        keypair_from_file(path).map(Self::new)
    }
}

#[async_trait]
impl WalletSigner for KeypairWallet {
    fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign(&self, message: &[u8]) -> Result<WalletDecision, PipelineError> {
        Ok(WalletDecision::Approved(self.keypair.sign_message(message)))
    }
}

/// Wallet backed by a local keypair that asks for confirmation on the terminal
pub struct ConsoleWallet {
    keypair: Keypair,
    summary: String,
}

impl ConsoleWallet {
    pub fn new(keypair: Keypair, summary: impl Into<String>) -> Self {
        Self {
            keypair,
            summary: summary.into(),
        }
    }
}

#[async_trait]
impl WalletSigner for ConsoleWallet {
    fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn sign(&self, message: &[u8]) -> Result<WalletDecision, PipelineError> {
        let prompt = format!(
            "\n{}\nSigner: {}\nMessage: {} bytes\nApprove? [y/N] ",
            self.summary,
            self.keypair.pubkey(),
            message.len()
        );

        let terminal_err = |e: std::io::Error| PipelineError::fatal_config(format!("terminal unavailable: {}", e));

        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await.map_err(terminal_err)?;
        stdout.flush().await.map_err(terminal_err)?;

        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(terminal_err)?;

        if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
            Ok(WalletDecision::Approved(self.keypair.sign_message(message)))
        } else {
            Ok(WalletDecision::Rejected)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_base58_round_trip() {
        let keypair = Keypair::new();
        let encoded = bs58::encode(keypair.to_bytes()).into_string();

        let key = ServiceKey::from_base58(&encoded).expect("valid key");
        assert_eq!(key.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_rejects_bad_key_material() {
        let err = ServiceKey::from_base58("not-base58-0OIl").unwrap_err();
        assert!(matches!(err, PipelineError::FatalConfiguration(_)));

        let short = bs58::encode([7u8; 32]).into_string();
        assert!(ServiceKey::from_base58(&short).is_err());

        let zeros = bs58::encode([0u8; 64]).into_string();
        let err = ServiceKey::from_base58(&zeros).unwrap_err();
        assert!(err.to_string().contains("all-zero"));
    }

    #[test]
    fn test_load_missing_is_fatal() {
        let config = ServiceConfig {
            keypair_env: "COSIGNER_TEST_UNSET_SERVICE_KEY".to_string(),
            keypair_path: None,
        };
        let err = ServiceKey::load(&config).unwrap_err();
        assert!(matches!(err, PipelineError::FatalConfiguration(_)));
    }

    #[test]
    fn test_load_from_json_file() {
        let keypair = Keypair::new();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::to_string(&keypair.to_bytes().to_vec()).unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = ServiceConfig {
            keypair_env: "COSIGNER_TEST_UNSET_SERVICE_KEY_2".to_string(),
            keypair_path: Some(file.path().to_string_lossy().into_owned()),
        };
        let key = ServiceKey::load(&config).unwrap();
        assert_eq!(key.pubkey(), keypair.pubkey());
    }

    #[test]
    fn test_service_key_signature_verifies() {
        let key = ServiceKey::from_keypair(Keypair::new());
        let sig = key.sign_message(b"message");
        assert!(sig.verify(key.pubkey().as_ref(), b"message"));
        assert_eq!(key.clone().pubkey(), key.pubkey());
    }

    #[tokio::test]
    async fn test_keypair_wallet_approves() {
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let wallet = KeypairWallet::new(keypair);

        assert_eq!(wallet.address(), pubkey);
        match wallet.sign(b"abc").await.unwrap() {
            WalletDecision::Approved(sig) => assert!(sig.verify(pubkey.as_ref(), b"abc")),
            WalletDecision::Rejected => panic!("keypair wallet never rejects"),
        }
    }
}
