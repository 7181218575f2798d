use super::{
    rpc_errors::{classify_client_error, classify_read_error},
    HoldingAccount, LedgerRpc, MintInfo, SimulationResult,
};
use crate::tx_builder::errors::PipelineError;
use async_trait::async_trait;
use serde_json::Value;
use solana_account_decoder::UiAccountData;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::{config::RpcSimulateTransactionConfig, request::TokenAccountsFilter};
use solana_sdk::{
    commitment_config::CommitmentConfig, hash::Hash, pubkey::Pubkey, signature::Signature,
    transaction::VersionedTransaction,
};
use spl_token::{solana_program::program_pack::Pack, state::Mint};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// [`LedgerRpc`] over a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    client: RpcClient,
    commitment: CommitmentConfig,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("endpoint", &self.client.url())
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

impl SolanaRpc {
    pub fn new(url: impl Into<String>, commitment: CommitmentConfig, timeout: Duration) -> Self {
        Self {
            client: RpcClient::new_with_timeout_and_commitment(url.into(), timeout, commitment),
            commitment,
        }
    }

    pub fn endpoint(&self) -> String {
        self.client.url()
    }
}

#[async_trait]
impl LedgerRpc for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, PipelineError> {
        let hash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| classify_read_error(&e))?;
        debug!(blockhash = %hash, "Fetched latest blockhash");
        Ok(hash)
    }

    async fn balance(&self, address: &Pubkey) -> Result<u64, PipelineError> {
        self.client
            .get_balance(address)
            .await
            .map_err(|e| classify_read_error(&e))
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &Pubkey,
        token_program: &Pubkey,
    ) -> Result<Vec<HoldingAccount>, PipelineError> {
        let keyed = self
            .client
            .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(*token_program))
            .await
            .map_err(|e| classify_read_error(&e))?;

        let mut accounts = Vec::with_capacity(keyed.len());
        for entry in keyed {
            let parsed = match (&entry.account.data, Pubkey::from_str(&entry.pubkey)) {
                (UiAccountData::Json(parsed), Ok(address)) => {
                    parse_token_account(address, &parsed.parsed)
                }
                _ => None,
            };
            match parsed {
                Some(account) => accounts.push(account),
                None => warn!(account = %entry.pubkey, "Skipping token account with unexpected encoding"),
            }
        }
        Ok(accounts)
    }

    async fn mint_info(&self, mint: &Pubkey) -> Result<MintInfo, PipelineError> {
        let data = self
            .client
            .get_account_data(mint)
            .await
            .map_err(|e| classify_read_error(&e))?;
        let state = Mint::unpack(&data)
            .map_err(|e| PipelineError::Rpc(format!("account {} is not a mint: {}", mint, e)))?;
        Ok(MintInfo {
            decimals: state.decimals,
            supply: state.supply,
        })
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool, PipelineError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| classify_read_error(&e))?;
        Ok(response.value.is_some())
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationResult, PipelineError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(tx, config)
            .await
            .map_err(|e| classify_read_error(&e))?;

        let value = response.value;
        Ok(SimulationResult {
            err: value.err.map(|e| format!("{:?}", e)),
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
        })
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, PipelineError> {
        self.client
            .send_transaction(tx)
            .await
            .map_err(|e| classify_client_error(&e))
    }
}

/// Extract a holding account from a `jsonParsed` SPL token account
pub(crate) fn parse_token_account(address: Pubkey, parsed: &Value) -> Option<HoldingAccount> {
    let info = parsed.get("info")?;
    let mint = Pubkey::from_str(info.get("mint")?.as_str()?).ok()?;
    let owner = Pubkey::from_str(info.get("owner")?.as_str()?).ok()?;
    let token_amount = info.get("tokenAmount")?;
    let amount = token_amount.get("amount")?.as_str()?.parse().ok()?;
    let decimals = u8::try_from(token_amount.get("decimals")?.as_u64()?).ok()?;

    Some(HoldingAccount {
        address,
        mint,
        owner,
        amount,
        decimals,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_token_account() {
        let address = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let parsed = json!({
            "type": "account",
            "info": {
                "isNative": false,
                "mint": mint.to_string(),
                "owner": owner.to_string(),
                "state": "initialized",
                "tokenAmount": {
                    "amount": "1500000",
                    "decimals": 6,
                    "uiAmount": 1.5,
                    "uiAmountString": "1.5"
                }
            }
        });

        let account = parse_token_account(address, &parsed).expect("parses");
        assert_eq!(account.mint, mint);
        assert_eq!(account.owner, owner);
        assert_eq!(account.amount, 1_500_000);
        assert_eq!(account.decimals, 6);
    }

    #[test]
    fn test_parse_token_account_rejects_garbage() {
        let address = Pubkey::new_unique();
        assert!(parse_token_account(address, &json!({"info": {"mint": "xyz"}})).is_none());
        assert!(parse_token_account(address, &json!("base64")).is_none());
    }
}
