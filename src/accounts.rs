//! Holding-account resolution
//!
//! Derivation is pure (associated token account address of owner + mint).
//! Lookups go through [`LedgerRpc`] and never mutate anything.

use crate::rpc::{HoldingAccount, LedgerRpc, MintInfo};
use crate::tx_builder::errors::PipelineError;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address_with_program_id;
use std::sync::Arc;
use tracing::debug;

/// Resolves the accounts an instruction needs
#[derive(Clone)]
pub struct AccountResolver {
    rpc: Arc<dyn LedgerRpc>,
    token_program: Pubkey,
}

impl AccountResolver {
    /// Resolver for the SPL Token program
    pub fn new(rpc: Arc<dyn LedgerRpc>) -> Self {
        Self {
            rpc,
            token_program: spl_token::id(),
        }
    }

    pub fn token_program(&self) -> Pubkey {
        self.token_program
    }

    /// Associated holding-account address of `owner` for `mint`
    pub fn derive(&self, owner: &Pubkey, mint: &Pubkey) -> Pubkey {
        derive_holding_account(owner, mint, &self.token_program)
    }

    /// Every holding account `owner` has under the token program
    pub async fn holding_accounts(&self, owner: &Pubkey) -> Result<Vec<HoldingAccount>, PipelineError> {
        let accounts = self.rpc.token_accounts_by_owner(owner, &self.token_program).await?;
        debug!(owner = %owner, count = accounts.len(), "Enumerated holding accounts");
        Ok(accounts)
    }

    /// The owner's holding account for `mint`.
    ///
    /// The derived address is preferred; any other account of the same mint
    /// is accepted when the associated one is absent.
    pub async fn require_holding_account(
        &self,
        owner: &Pubkey,
        mint: &Pubkey,
    ) -> Result<HoldingAccount, PipelineError> {
        let derived = self.derive(owner, mint);
        let accounts = self.holding_accounts(owner).await?;

        let mut matching = accounts.into_iter().filter(|a| a.mint == *mint);
        let first = matching.next();
        let chosen = match first {
            Some(account) if account.address == derived => Some(account),
            other => matching.find(|a| a.address == derived).or(other),
        };

        chosen.ok_or(PipelineError::AccountNotFound {
            owner: *owner,
            mint: Some(*mint),
        })
    }

    /// The owner's first holding account, used when no mint was chosen
    pub async fn first_holding_account(&self, owner: &Pubkey) -> Result<HoldingAccount, PipelineError> {
        self.holding_accounts(owner)
            .await?
            .into_iter()
            .next()
            .ok_or(PipelineError::AccountNotFound {
                owner: *owner,
                mint: None,
            })
    }

    pub async fn mint_info(&self, mint: &Pubkey) -> Result<MintInfo, PipelineError> {
        self.rpc.mint_info(mint).await
    }
}

/// Pure associated-token-account derivation
pub fn derive_holding_account(owner: &Pubkey, mint: &Pubkey, token_program: &Pubkey) -> Pubkey {
    get_associated_token_address_with_program_id(owner, mint, token_program)
}
