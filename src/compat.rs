//! Compatibility layer for `VersionedMessage`
//!
//! Locally built transactions carry a legacy message while swap transactions
//! returned by the aggregator are usually v0. The signing and simulation
//! stages only need a handful of message properties, so this module exposes
//! them uniformly for both formats.
//!
//! ```rust,no_run
//! use solana_sdk::transaction::VersionedTransaction;
//! use cosigner::compat;
//!
//! fn fee_payer(tx: &VersionedTransaction) -> Option<solana_sdk::pubkey::Pubkey> {
//!     compat::get_required_signers(&tx.message).first().copied()
//! }
//! ```

use solana_sdk::{
    hash::Hash,
    instruction::CompiledInstruction,
    message::{MessageHeader, VersionedMessage},
    pubkey::Pubkey,
};

/// Get the message header (works for Legacy and V0)
#[inline]
#[must_use]
pub fn get_message_header(message: &VersionedMessage) -> &MessageHeader {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.header,
        VersionedMessage::V0(v0_msg) => &v0_msg.header,
    }
}

/// Get the static account keys.
///
/// Keys loaded through address lookup tables are not included; they can
/// never be signers.
#[inline]
#[must_use]
pub fn get_static_account_keys(message: &VersionedMessage) -> &[Pubkey] {
    match message {
        VersionedMessage::Legacy(legacy_msg) => &legacy_msg.account_keys,
        VersionedMessage::V0(v0_msg) => &v0_msg.account_keys,
    }
}

/// Get the accounts that must sign, fee payer first
#[inline]
#[must_use]
pub fn get_required_signers(message: &VersionedMessage) -> &[Pubkey] {
    let num_signers = get_message_header(message).num_required_signatures as usize;
    let keys = get_static_account_keys(message);
    &keys[..num_signers.min(keys.len())]
}

/// Get the fee payer (signer slot 0), if the message has any signer
#[inline]
#[must_use]
pub fn get_fee_payer(message: &VersionedMessage) -> Option<&Pubkey> {
    get_required_signers(message).first()
}

/// Position of `signer` among the required signers
#[inline]
#[must_use]
pub fn signer_index(message: &VersionedMessage, signer: &Pubkey) -> Option<usize> {
    get_required_signers(message).iter().position(|k| k == signer)
}

/// Get the blockhash bound into the message
#[inline]
#[must_use]
pub fn get_recent_blockhash(message: &VersionedMessage) -> &Hash {
    message.recent_blockhash()
}

/// Get the compiled instructions
#[inline]
#[must_use]
pub fn get_instructions(message: &VersionedMessage) -> &[CompiledInstruction] {
    message.instructions()
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        message::{v0::Message as MessageV0, Message},
        system_instruction,
    };

    #[test]
    fn test_required_signers_legacy() {
        let payer = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        let ix = system_instruction::transfer(&user, &Pubkey::new_unique(), 1);
        let message = VersionedMessage::Legacy(Message::new_with_blockhash(
            &[ix],
            Some(&payer),
            &Hash::new_unique(),
        ));

        assert_eq!(get_message_header(&message).num_required_signatures, 2);
        assert_eq!(get_required_signers(&message), &[payer, user]);
        assert_eq!(get_fee_payer(&message), Some(&payer));
        assert_eq!(signer_index(&message, &user), Some(1));
        assert_eq!(signer_index(&message, &Pubkey::new_unique()), None);
    }

    #[test]
    fn test_required_signers_v0() {
        let payer = Pubkey::new_unique();
        let blockhash = Hash::new_unique();
        let ix = system_instruction::transfer(&payer, &Pubkey::new_unique(), 1);
        let message = VersionedMessage::V0(
            MessageV0::try_compile(&payer, &[ix], &[], blockhash).expect("compile v0"),
        );

        assert_eq!(get_required_signers(&message), &[payer]);
        assert_eq!(*get_recent_blockhash(&message), blockhash);
        assert_eq!(get_instructions(&message).len(), 1);
    }
}
