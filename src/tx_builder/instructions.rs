//! Instruction construction and planning
//!
//! Stateless builders for the three instruction kinds the pipeline emits:
//! 1. SPL Token `burn_checked` against a holding account
//! 2. Plain lamport transfer from the user to a destination
//! 3. Service fee transfer from the user to the service identity
//!
//! Amounts entered by a human are converted to raw units with exact decimal
//! arithmetic. A value that does not land on an integral raw amount is
//! rejected instead of rounded.

use crate::tx_builder::errors::PipelineError;
use solana_sdk::{instruction::Instruction, pubkey::Pubkey, system_instruction, system_program};

/// Decimal precision of SOL (lamports per SOL = 10^9)
pub const SOL_DECIMALS: u8 = 9;

/// Which user operation an instruction plan belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Burn,
    Transfer,
    Swap,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Burn => "burn",
            Self::Transfer => "transfer",
            Self::Swap => "swap",
        }
    }
}

/// Parameters for a checked burn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnRequest {
    /// Holding account the tokens are burned from
    pub holding_account: Pubkey,
    /// Mint of the burned token
    pub mint: Pubkey,
    /// Owner of the holding account; must sign
    pub authority: Pubkey,
    /// Amount in raw units
    pub amount: u64,
    /// Mint decimals, re-checked on-chain by `burn_checked`
    pub decimals: u8,
}

/// Ordered list of instructions for one operation
#[derive(Debug, Clone)]
pub struct InstructionPlan {
    /// Instructions in execution order
    pub instructions: Vec<Instruction>,
    pub kind: OperationKind,
}

impl InstructionPlan {
    pub fn new(instructions: Vec<Instruction>, kind: OperationKind) -> Self {
        Self { instructions, kind }
    }
}

/// Convert a human-entered decimal amount into raw integer units.
///
/// `"1.5"` with 6 decimals becomes `1_500_000`. Extra fractional digits are
/// accepted only when they are zeros (`"1.50"` with 1 decimal is fine,
/// `"1.55"` is not).
pub fn to_raw_units(human: &str, decimals: u8) -> Result<u64, PipelineError> {
    let s = human.trim();
    if s.is_empty() {
        return Err(PipelineError::invalid_amount("amount is empty"));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(PipelineError::invalid_amount(format!("'{}' is not a number", s)));
    }
    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(PipelineError::invalid_amount(format!(
            "'{}' is not a non-negative decimal number",
            s
        )));
    }

    let decimals = decimals as usize;
    if frac_part.len() > decimals && frac_part[decimals..].bytes().any(|b| b != b'0') {
        return Err(PipelineError::invalid_amount(format!(
            "'{}' has more than {} fractional digits and cannot be burned exactly",
            s, decimals
        )));
    }
    let frac_kept = &frac_part[..frac_part.len().min(decimals)];

    let overflow = || PipelineError::invalid_amount(format!("'{}' exceeds the representable range", s));

    let scale = 10u128.checked_pow(decimals as u32).ok_or_else(overflow)?;
    let int_value: u128 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| overflow())?
    };
    let frac_value: u128 = if frac_kept.is_empty() {
        0
    } else {
        let padding = 10u128
            .checked_pow((decimals - frac_kept.len()) as u32)
            .ok_or_else(overflow)?;
        frac_kept
            .parse::<u128>()
            .map_err(|_| overflow())?
            .checked_mul(padding)
            .ok_or_else(overflow)?
    };

    let raw = int_value
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(overflow)?;

    if raw == 0 {
        return Err(PipelineError::invalid_amount("amount must be greater than zero"));
    }
    u64::try_from(raw).map_err(|_| overflow())
}

/// Render raw units back into a canonical decimal string (no trailing zeros)
pub fn from_raw_units(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0>width$}", raw, width = decimals as usize + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals as usize);
    let frac_trimmed = frac_part.trim_end_matches('0');
    if frac_trimmed.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_trimmed)
    }
}

/// Convert a SOL amount string into lamports
pub fn sol_to_lamports(sol: &str) -> Result<u64, PipelineError> {
    to_raw_units(sol, SOL_DECIMALS)
}

/// Reject zero amounts and amounts above the caller-supplied balance
pub fn validate_amount(amount: u64, available: u64) -> Result<(), PipelineError> {
    if amount == 0 {
        return Err(PipelineError::invalid_amount("amount must be greater than zero"));
    }
    if amount > available {
        return Err(PipelineError::invalid_amount(format!(
            "amount {} exceeds available balance {}",
            amount, available
        )));
    }
    Ok(())
}

/// Build a `burn_checked` instruction
pub fn burn_instruction(request: &BurnRequest, available: u64) -> Result<Instruction, PipelineError> {
    validate_amount(request.amount, available)?;

    spl_token::instruction::burn_checked(
        &spl_token::id(),
        &request.holding_account,
        &request.mint,
        &request.authority,
        &[],
        request.amount,
        request.decimals,
    )
    .map_err(|e| PipelineError::invalid_amount(format!("burn instruction rejected: {}", e)))
}

/// Build a plain lamport transfer
pub fn transfer_instruction(
    source: &Pubkey,
    destination: &Pubkey,
    lamports: u64,
    available: u64,
) -> Result<Instruction, PipelineError> {
    validate_amount(lamports, available)?;
    Ok(system_instruction::transfer(source, destination, lamports))
}

/// Build the fixed service fee transfer paid by the user to the service
pub fn fee_transfer_instruction(
    payer: &Pubkey,
    service: &Pubkey,
    lamports: u64,
) -> Result<Instruction, PipelineError> {
    transfer_instruction(payer, service, lamports, lamports)
}

/// Plan a burn: `burn_checked` followed by the service fee transfer.
///
/// A zero `fee_lamports` omits the fee instruction.
pub fn plan_burn_instructions(
    request: &BurnRequest,
    available: u64,
    service: &Pubkey,
    fee_lamports: u64,
) -> Result<InstructionPlan, PipelineError> {
    let mut instructions = Vec::with_capacity(2);
    instructions.push(burn_instruction(request, available)?);
    if fee_lamports > 0 {
        instructions.push(fee_transfer_instruction(&request.authority, service, fee_lamports)?);
    }
    Ok(InstructionPlan::new(instructions, OperationKind::Burn))
}

/// Plan a transfer: value transfer followed by the service fee transfer.
///
/// `available_lamports` must cover both the transfer and the fee.
pub fn plan_transfer_instructions(
    source: &Pubkey,
    destination: &Pubkey,
    lamports: u64,
    available_lamports: u64,
    service: &Pubkey,
    fee_lamports: u64,
) -> Result<InstructionPlan, PipelineError> {
    let spendable = available_lamports.saturating_sub(fee_lamports);
    let mut instructions = Vec::with_capacity(2);
    instructions.push(transfer_instruction(source, destination, lamports, spendable)?);
    if fee_lamports > 0 {
        instructions.push(fee_transfer_instruction(source, service, fee_lamports)?);
    }
    Ok(InstructionPlan::new(instructions, OperationKind::Transfer))
}

/// Check that a plan has the expected shape (debug/test only)
///
/// The primary instruction comes first; any system transfer after it is a
/// fee transfer. Release builds skip the check.
#[cfg(debug_assertions)]
pub fn sanity_check_ix_order(plan: &InstructionPlan) -> Result<(), PipelineError> {
    let first = plan
        .instructions
        .first()
        .ok_or(PipelineError::EmptyTransaction)?;

    let expected_program = match plan.kind {
        OperationKind::Burn => spl_token::id(),
        OperationKind::Transfer => system_program::id(),
        OperationKind::Swap => return Ok(()),
    };
    if first.program_id != expected_program {
        return Err(PipelineError::invalid_amount(format!(
            "{} plan must start with a {} instruction, got program {}",
            plan.kind.as_str(),
            expected_program,
            first.program_id
        )));
    }
    if let Some((idx, ix)) = plan
        .instructions
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, ix)| ix.program_id != system_program::id())
    {
        return Err(PipelineError::invalid_amount(format!(
            "unexpected program {} at position {}",
            ix.program_id, idx
        )));
    }
    Ok(())
}

#[cfg(not(debug_assertions))]
#[inline]
pub fn sanity_check_ix_order(_plan: &InstructionPlan) -> Result<(), PipelineError> {
    Ok(())
}
