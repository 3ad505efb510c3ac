//! Type definitions for the V1 Solana "exact" payment scheme.
//!
//! This module defines the wire format types for SPL Token based payments
//! on Solana using the V1 x402 protocol, along with the `extra` hints the
//! facilitator places into payment requirements during preparation.

use serde::{Deserialize, Serialize};
use solana_message::compiled_instruction::CompiledInstruction;
use solana_pubkey::{Pubkey, pubkey};
use x402_types::proto::SettleErrorReason;
use x402_types::proto::util::U64String;
use x402_types::{lit_str, proto};

use crate::chain::Address;
use crate::codec::PaymentTransaction;

lit_str!(ExactScheme, "exact");

/// SPL Memo program ID, used to make every prepared transaction unique.
pub static MEMO_PROGRAM_PUBKEY: Pubkey = pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// Phantom Lighthouse program ID, injected by Phantom wallet on mainnet.
pub static PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY: Pubkey =
    pubkey!("L2TExMFKdjpN9kozasaurPirfHy9P8sbXoAN1qA3S95");

pub const ATA_PROGRAM_PUBKEY: Pubkey = pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

pub type PaymentPayload = proto::v1::PaymentPayload<ExactScheme, ExactSolanaPayload>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExactSolanaPayload {
    /// Base64-encoded versioned transaction.
    pub transaction: String,
}

pub type PaymentRequirements =
    proto::v1::PaymentRequirements<ExactScheme, U64String, Address, ExactExtra>;

pub type SettleRequest = proto::v1::SettleRequest<PaymentPayload, PaymentRequirements>;

/// Typed view of `paymentRequirements.extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExactExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_custodial_wallet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trustless: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKindExtra {
    pub fee_payer: Address,
}

/// A compiled instruction together with the account keys it indexes into.
pub struct InstructionInt {
    index: usize,
    instruction: CompiledInstruction,
    account_keys: Vec<Pubkey>,
}

impl InstructionInt {
    pub fn at(transaction: &PaymentTransaction, index: usize) -> Result<Self, SolanaExactError> {
        let message = &transaction.inner().message;
        let instruction = message
            .instructions()
            .get(index)
            .cloned()
            .ok_or(SolanaExactError::NoInstructionAtIndex(index))?;
        Ok(Self {
            index,
            instruction,
            account_keys: message.static_account_keys().to_vec(),
        })
    }

    pub fn has_data(&self) -> bool {
        !self.instruction.data.is_empty()
    }

    pub fn has_accounts(&self) -> bool {
        !self.instruction.accounts.is_empty()
    }

    pub fn data_slice(&self) -> &[u8] {
        self.instruction.data.as_slice()
    }

    pub fn assert_not_empty(&self) -> Result<(), SolanaExactError> {
        if !self.has_data() || !self.has_accounts() {
            return Err(SolanaExactError::EmptyInstructionAtIndex(self.index));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Pubkey {
        *self.instruction.program_id(self.account_keys.as_slice())
    }

    pub fn account(&self, index: u8) -> Result<Pubkey, SolanaExactError> {
        let account_index = self
            .instruction
            .accounts
            .get(index as usize)
            .cloned()
            .ok_or(SolanaExactError::NoAccountAtIndex(index))?;
        self.account_keys
            .get(account_index as usize)
            .cloned()
            .ok_or(SolanaExactError::NoAccountAtIndex(index))
    }
}

/// Reasons a payment transaction is refused before the facilitator co-signs it.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SolanaExactError {
    #[error("Compute unit limit exceeds facilitator maximum")]
    MaxComputeUnitLimitExceeded,
    #[error("Compute unit price exceeds facilitator maximum")]
    MaxComputeUnitPriceExceeded,
    #[error("Too few instructions in transaction")]
    TooFewInstructions,
    #[error("Additional instructions not allowed")]
    AdditionalInstructionsNotAllowed,
    #[error("Instruction count exceeds maximum: {0}")]
    InstructionCountExceedsMax(usize),
    #[error("Blocked program in transaction: {0}")]
    BlockedProgram(Pubkey),
    #[error("Program not in allowed list: {0}")]
    ProgramNotAllowed(Pubkey),
    #[error("CreateATA instruction not supported - destination ATA must exist")]
    CreateATANotSupported,
    #[error("Fee payer included in instruction accounts")]
    FeePayerIncludedInInstructionAccounts,
    #[error("Fee payer found transferring funds")]
    FeePayerTransferringFunds,
    #[error("Fee payer {found} does not match expected {expected}")]
    FeePayerMismatch { expected: Pubkey, found: Pubkey },
    #[error("Instruction at index {0} not found")]
    NoInstructionAtIndex(usize),
    #[error("No account at index {0}")]
    NoAccountAtIndex(u8),
    #[error("Empty instruction at index {0}")]
    EmptyInstructionAtIndex(usize),
    #[error("Invalid compute limit instruction")]
    InvalidComputeLimitInstruction,
    #[error("Invalid compute price instruction")]
    InvalidComputePriceInstruction,
    #[error("Invalid token instruction")]
    InvalidTokenInstruction,
    #[error("Missing sender account in transaction")]
    MissingSenderAccount,
    #[error("Transfer mint does not match the required asset")]
    AssetMismatch,
    #[error("Transfer destination is not the payee's token account")]
    RecipientMismatch,
    #[error("Transfer amount does not match the required amount")]
    InvalidPaymentAmount,
}

impl SolanaExactError {
    /// Short machine-readable tag placed in the `reason` of a 400 response.
    pub fn reason(&self) -> &'static str {
        match self {
            SolanaExactError::AssetMismatch => "AssetMismatch",
            SolanaExactError::RecipientMismatch => "RecipientMismatch",
            SolanaExactError::InvalidPaymentAmount => "InvalidPaymentAmount",
            SolanaExactError::FeePayerTransferringFunds => "FeePayerTransferringFunds",
            _ => SettleErrorReason::InvalidPayload.as_str(),
        }
    }
}
