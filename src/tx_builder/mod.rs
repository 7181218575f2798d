//! Dual-signature transaction pipeline
//!
//! The pipeline is split into focused modules:
//! - **errors**: error taxonomy shared by every stage
//! - **instructions**: amount scaling and instruction planning
//! - **builder**: wraps a plan into an unsigned transaction
//! - **signing**: user-then-service signing state machine
//! - **simulate**: pre-submission dry-run gate
//! - **submit**: network submission with bounded transport retries
//!
//! ## Ordering
//!
//! A transaction always moves `build -> user sign -> service co-sign ->
//! simulate -> submit`. The service key never signs bytes the user has not
//! approved, and nothing reaches the network without a passing simulation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use cosigner::tx_builder::{PipelineError, TransactionBuilder, DualSignatureCoordinator};
//!
//! # async fn example(
//! #     coordinator: DualSignatureCoordinator,
//! #     wallet: &dyn cosigner::tx_builder::WalletSigner,
//! #     ixs: Vec<solana_sdk::instruction::Instruction>,
//! #     anchor: solana_sdk::hash::Hash,
//! # ) -> Result<(), PipelineError> {
//! let tx = TransactionBuilder::new().build(&ixs, &coordinator.service_pubkey(), anchor)?;
//! let signed = coordinator.authorize(tx, wallet).await?;
//! println!("fully signed: {}", signed.signature());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod errors;
pub mod instructions;
pub mod signing;
pub mod simulate;
pub mod submit;

pub use builder::{sanity_check_transaction, TransactionBuilder};
pub use errors::{ErrorClass, PipelineError, RejectionCause};
pub use instructions::{
    from_raw_units, plan_burn_instructions, plan_transfer_instructions, sanity_check_ix_order,
    sol_to_lamports, to_raw_units, BurnRequest, InstructionPlan, OperationKind,
};
pub use signing::{
    verify_signatures, DualSignatureCoordinator, SignedTransaction, SigningSession, SigningState,
    WalletDecision, WalletSigner,
};
pub use simulate::{GatePolicy, SimulationGate};
pub use submit::SubmissionPipeline;

pub type Result<T> = std::result::Result<T, PipelineError>;
