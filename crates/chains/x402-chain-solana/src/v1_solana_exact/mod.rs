//! The x402 v1 "exact" scheme on Solana.
//!
//! A prepared payment is a versioned transaction with a fixed layout:
//! - Index 0: `SetComputeUnitLimit`
//! - Index 1: `SetComputeUnitPrice`
//! - Index 2: `TransferChecked` (SPL Token or Token-2022)
//! - Index 3+: a memo nonce, plus whatever instructions [`VerificationConfig`] allows
//!
//! [`prepare`] builds it, [`verify`] checks a signed copy against the payment requirements,
//! and [`SolanaExactFacilitator`] ties both to the settlement engine.

pub mod facilitator;
pub mod prepare;
pub mod types;
pub mod verify;

pub use facilitator::{SettleError, SolanaExactFacilitator};
pub use prepare::{Mint, PrepareError, TransferPlan, build_transfer_transaction};
pub use types::*;
pub use verify::{FeePayerRole, VerificationConfig, VerifiedTransfer, VerifyError, verify_transaction};
