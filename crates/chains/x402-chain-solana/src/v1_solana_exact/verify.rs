//! Checks a payment transaction against its requirements before the facilitator signs it.
//!
//! Expected layout:
//! - Index 0: SetComputeUnitLimit instruction
//! - Index 1: SetComputeUnitPrice instruction
//! - Index 2: TransferChecked instruction (Token or Token-2022)
//! - Index 3+: Additional instructions (only if allowed by [`VerificationConfig`])
//!
//! CreateATA is not supported. The destination ATA must exist before payment.

use serde::{Deserialize, Serialize};
use solana_compute_budget_interface::ID as ComputeBudgetInstructionId;
use solana_pubkey::Pubkey;

use crate::chain::{Address, SolanaChainProviderError, SolanaChainProviderLike};
use crate::codec::PaymentTransaction;
use crate::v1_solana_exact::types::{
    ATA_PROGRAM_PUBKEY, InstructionInt, MEMO_PROGRAM_PUBKEY, PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY,
    SolanaExactError,
};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error(transparent)]
    Rejected(#[from] SolanaExactError),
    #[error(transparent)]
    Provider(#[from] SolanaChainProviderError),
}

/// Who pays the network fee of the transaction under verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePayerRole {
    /// The facilitator co-signs as fee payer and must never move funds.
    Sponsor(Pubkey),
    /// The payer's wallet pays its own fee, e.g. a custodial wallet.
    Wallet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferCheckedInstruction {
    pub amount: u64,
    pub source: Pubkey,
    pub mint: Pubkey,
    pub destination: Pubkey,
    pub authority: Pubkey,
    pub token_program: Pubkey,
}

pub struct TransferRequirement<'a> {
    pub asset: &'a Address,
    pub pay_to: &'a Address,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTransfer {
    pub payer: Address,
    pub transfer: TransferCheckedInstruction,
}

pub fn verify_compute_limit_instruction(
    transaction: &PaymentTransaction,
    instruction_index: usize,
) -> Result<u32, SolanaExactError> {
    let instruction = InstructionInt::at(transaction, instruction_index)?;
    let data = instruction.data_slice();

    // 1 byte discriminator + 4 bytes u32
    if ComputeBudgetInstructionId != instruction.program_id()
        || data.first().cloned().unwrap_or(0) != 2
        || data.len() != 5
    {
        return Err(SolanaExactError::InvalidComputeLimitInstruction);
    }

    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[1..5]);
    Ok(u32::from_le_bytes(buf))
}

pub fn verify_compute_price_instruction(
    max_compute_unit_price: u64,
    transaction: &PaymentTransaction,
    instruction_index: usize,
) -> Result<u64, SolanaExactError> {
    let instruction = InstructionInt::at(transaction, instruction_index)?;
    let data = instruction.data_slice();
    if ComputeBudgetInstructionId != instruction.program_id()
        || data.first().cloned().unwrap_or(0) != 3
        || data.len() != 9
    {
        return Err(SolanaExactError::InvalidComputePriceInstruction);
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[1..]);
    let microlamports = u64::from_le_bytes(buf);
    if microlamports > max_compute_unit_price {
        return Err(SolanaExactError::MaxComputeUnitPriceExceeded);
    }
    Ok(microlamports)
}

pub fn validate_instructions(
    transaction: &PaymentTransaction,
    config: &VerificationConfig,
) -> Result<(), SolanaExactError> {
    let instructions = transaction.inner().message.instructions();

    // ComputeLimit + ComputePrice + TransferChecked
    if instructions.len() < 3 {
        return Err(SolanaExactError::TooFewInstructions);
    }
    if instructions.len() > config.max_instruction_count {
        return Err(SolanaExactError::InstructionCountExceedsMax(
            config.max_instruction_count,
        ));
    }

    if InstructionInt::at(transaction, 2)?.program_id() == ATA_PROGRAM_PUBKEY {
        return Err(SolanaExactError::CreateATANotSupported);
    }

    if instructions.len() > 3 {
        if !config.allow_additional_instructions {
            return Err(SolanaExactError::AdditionalInstructionsNotAllowed);
        }
        for index in 3..instructions.len() {
            let program_id = InstructionInt::at(transaction, index)?.program_id();
            // Blocked list takes precedence over the allowed list.
            if config.is_blocked(&program_id) {
                return Err(SolanaExactError::BlockedProgram(program_id));
            }
            if !config.is_allowed(&program_id) {
                return Err(SolanaExactError::ProgramNotAllowed(program_id));
            }
        }
    }

    Ok(())
}

/// Decodes the `TransferChecked` at `instruction_index`, Token or Token-2022.
pub fn parse_transfer_instruction(
    transaction: &PaymentTransaction,
    instruction_index: usize,
) -> Result<TransferCheckedInstruction, SolanaExactError> {
    let instruction = InstructionInt::at(transaction, instruction_index)?;
    instruction.assert_not_empty()?;
    let program_id = instruction.program_id();
    let amount = if spl_token::ID == program_id {
        match spl_token::instruction::TokenInstruction::unpack(instruction.data_slice()) {
            Ok(spl_token::instruction::TokenInstruction::TransferChecked { amount, .. }) => amount,
            _ => return Err(SolanaExactError::InvalidTokenInstruction),
        }
    } else if spl_token_2022::ID == program_id {
        match spl_token_2022::instruction::TokenInstruction::unpack(instruction.data_slice()) {
            Ok(spl_token_2022::instruction::TokenInstruction::TransferChecked {
                amount, ..
            }) => amount,
            _ => return Err(SolanaExactError::InvalidTokenInstruction),
        }
    } else {
        return Err(SolanaExactError::InvalidTokenInstruction);
    };
    Ok(TransferCheckedInstruction {
        amount,
        source: instruction.account(0)?,
        mint: instruction.account(1)?,
        destination: instruction.account(2)?,
        authority: instruction.account(3)?,
        token_program: program_id,
    })
}

/// Derives the associated token account of `owner` for `mint`.
pub fn associated_token_address(owner: &Pubkey, token_program: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_PUBKEY,
    )
    .0
}

pub async fn verify_transfer_instruction<P: SolanaChainProviderLike>(
    provider: &P,
    transaction: &PaymentTransaction,
    instruction_index: usize,
    requirement: &TransferRequirement<'_>,
    fee_payer: FeePayerRole,
) -> Result<TransferCheckedInstruction, VerifyError> {
    let transfer = parse_transfer_instruction(transaction, instruction_index)?;

    if let FeePayerRole::Sponsor(sponsor) = fee_payer
        && transfer.authority == sponsor
    {
        return Err(SolanaExactError::FeePayerTransferringFunds.into());
    }

    if Address::new(transfer.mint) != *requirement.asset {
        return Err(SolanaExactError::AssetMismatch.into());
    }

    let ata = associated_token_address(
        requirement.pay_to.pubkey(),
        &transfer.token_program,
        requirement.asset.pubkey(),
    );
    if transfer.destination != ata {
        return Err(SolanaExactError::RecipientMismatch.into());
    }
    let accounts = provider
        .get_multiple_accounts(&[transfer.source, ata])
        .await?;
    if accounts.first().is_none_or(Option::is_none) {
        return Err(SolanaExactError::MissingSenderAccount.into());
    }
    if accounts.get(1).is_none_or(Option::is_none) {
        return Err(SolanaExactError::RecipientMismatch.into());
    }
    if transfer.amount != requirement.amount {
        return Err(SolanaExactError::InvalidPaymentAmount.into());
    }
    Ok(transfer)
}

/// Runs every structural and on-chain check; returns the transfer authority as payer.
pub async fn verify_transaction<P: SolanaChainProviderLike>(
    provider: &P,
    transaction: &PaymentTransaction,
    requirement: &TransferRequirement<'_>,
    fee_payer: FeePayerRole,
    config: &VerificationConfig,
) -> Result<VerifiedTransfer, VerifyError> {
    let compute_units = verify_compute_limit_instruction(transaction, 0)?;
    if compute_units > provider.max_compute_unit_limit() {
        return Err(SolanaExactError::MaxComputeUnitLimitExceeded.into());
    }
    tracing::debug!(compute_units, "Verified compute unit limit");
    verify_compute_price_instruction(provider.max_compute_unit_price(), transaction, 1)?;

    validate_instructions(transaction, config)?;

    if let FeePayerRole::Sponsor(sponsor) = fee_payer {
        let found = *transaction.fee_payer().pubkey();
        if found != sponsor {
            return Err(SolanaExactError::FeePayerMismatch {
                expected: sponsor,
                found,
            }
            .into());
        }
    }

    let transfer =
        verify_transfer_instruction(provider, transaction, 2, requirement, fee_payer).await?;

    if let FeePayerRole::Sponsor(sponsor) = fee_payer
        && config.require_fee_payer_not_in_instructions
    {
        let message = &transaction.inner().message;
        let account_keys = message.static_account_keys();
        for instruction in message.instructions() {
            for account_idx in instruction.accounts.iter() {
                let account = account_keys
                    .get(*account_idx as usize)
                    .ok_or(SolanaExactError::NoAccountAtIndex(*account_idx))?;
                if *account == sponsor {
                    return Err(SolanaExactError::FeePayerIncludedInInstructionAccounts.into());
                }
            }
        }
    }

    Ok(VerifiedTransfer {
        payer: Address::new(transfer.authority),
        transfer,
    })
}

/// Instruction policy applied to payment transactions.
///
/// Controls support for additional instructions from third-party wallets. By default the
/// Memo program (added by preparation) and the Phantom Lighthouse program are allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationConfig {
    #[serde(default = "verification_config::default_allow_additional_instructions")]
    pub allow_additional_instructions: bool,

    #[serde(default = "verification_config::default_max_instruction_count")]
    pub max_instruction_count: usize,

    /// Programs accepted at index 3 and beyond.
    ///
    /// An empty list with `allow_additional_instructions` rejects every additional
    /// instruction.
    #[serde(default = "verification_config::default_allowed_program_ids")]
    pub allowed_program_ids: Vec<Address>,

    /// Always rejected, takes precedence over `allowed_program_ids`.
    #[serde(default)]
    pub blocked_program_ids: Vec<Address>,

    /// Reject transactions that reference the sponsoring fee payer in any instruction.
    #[serde(default = "verification_config::default_require_fee_payer_not_in_instructions")]
    pub require_fee_payer_not_in_instructions: bool,
}

mod verification_config {
    use super::*;

    pub fn default_allow_additional_instructions() -> bool {
        true
    }

    pub fn default_max_instruction_count() -> usize {
        10
    }

    pub fn default_allowed_program_ids() -> Vec<Address> {
        vec![
            Address::new(MEMO_PROGRAM_PUBKEY),
            Address::new(PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY),
        ]
    }

    pub fn default_require_fee_payer_not_in_instructions() -> bool {
        true
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            allow_additional_instructions:
                verification_config::default_allow_additional_instructions(),
            max_instruction_count: verification_config::default_max_instruction_count(),
            allowed_program_ids: verification_config::default_allowed_program_ids(),
            blocked_program_ids: Vec::new(),
            require_fee_payer_not_in_instructions:
                verification_config::default_require_fee_payer_not_in_instructions(),
        }
    }
}

impl VerificationConfig {
    pub fn is_blocked(&self, program_id: &Pubkey) -> bool {
        self.blocked_program_ids
            .iter()
            .any(|addr| addr.pubkey() == program_id)
    }

    pub fn is_allowed(&self, program_id: &Pubkey) -> bool {
        self.allowed_program_ids
            .iter()
            .any(|addr| addr.pubkey() == program_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{keypair, unsigned};
    use crate::testing::{MockProvider, Watch};
    use solana_account::Account;
    use solana_compute_budget_interface::ComputeBudgetInstruction;
    use solana_keypair::Keypair;
    use solana_signer::Signer;
    use solana_transaction::Instruction;

    const MINT: Pubkey = Pubkey::new_from_array([5; 32]);

    struct Fixture {
        provider: MockProvider,
        payer: Keypair,
        pay_to: Address,
        asset: Address,
    }

    impl Fixture {
        fn new() -> Self {
            let payer = keypair(2);
            let pay_to = Address::new(Pubkey::new_from_array([6; 32]));
            let source = associated_token_address(&payer.pubkey(), &spl_token::ID, &MINT);
            let destination = associated_token_address(pay_to.pubkey(), &spl_token::ID, &MINT);
            let provider = MockProvider::new(Watch::Never, Watch::Never)
                .with_account(source, Account::default())
                .with_account(destination, Account::default());
            Self {
                provider,
                payer,
                pay_to,
                asset: Address::new(MINT),
            }
        }

        fn requirement(&self, amount: u64) -> TransferRequirement<'_> {
            TransferRequirement {
                asset: &self.asset,
                pay_to: &self.pay_to,
                amount,
            }
        }

        fn transfer(&self, authority: &Pubkey, amount: u64) -> Instruction {
            let source = associated_token_address(authority, &spl_token::ID, &MINT);
            let destination =
                associated_token_address(self.pay_to.pubkey(), &spl_token::ID, &MINT);
            spl_token::instruction::transfer_checked(
                &spl_token::ID,
                &source,
                &MINT,
                &destination,
                authority,
                &[],
                amount,
                6,
            )
            .unwrap()
        }

        fn transaction(&self, extra: Vec<Instruction>) -> PaymentTransaction {
            let mut instructions = vec![
                ComputeBudgetInstruction::set_compute_unit_limit(10_000),
                ComputeBudgetInstruction::set_compute_unit_price(10),
                self.transfer(&self.payer.pubkey(), 1_000),
            ];
            instructions.extend(extra);
            unsigned(&self.provider.pubkey(), &instructions)
        }

        fn sponsor(&self) -> FeePayerRole {
            FeePayerRole::Sponsor(self.provider.pubkey())
        }
    }

    fn memo() -> Instruction {
        Instruction::new_with_bytes(MEMO_PROGRAM_PUBKEY, b"nonce", Vec::new())
    }

    #[tokio::test]
    async fn test_valid_transfer_reports_authority_as_payer() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![memo()]);
        let verified = verify_transaction(
            &fixture.provider,
            &tx,
            &fixture.requirement(1_000),
            fixture.sponsor(),
            &VerificationConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(verified.payer, Address::new(fixture.payer.pubkey()));
        assert_eq!(verified.transfer.amount, 1_000);
    }

    #[tokio::test]
    async fn test_amount_mismatch_is_rejected() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![]);
        let result = verify_transaction(
            &fixture.provider,
            &tx,
            &fixture.requirement(999),
            fixture.sponsor(),
            &VerificationConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(VerifyError::Rejected(SolanaExactError::InvalidPaymentAmount))
        ));
    }

    #[tokio::test]
    async fn test_wrong_recipient_is_rejected() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![]);
        let other = Address::new(Pubkey::new_from_array([42; 32]));
        let requirement = TransferRequirement {
            asset: &fixture.asset,
            pay_to: &other,
            amount: 1_000,
        };
        let result = verify_transaction(
            &fixture.provider,
            &tx,
            &requirement,
            fixture.sponsor(),
            &VerificationConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(VerifyError::Rejected(SolanaExactError::RecipientMismatch))
        ));
    }

    #[tokio::test]
    async fn test_sponsor_as_authority_is_rejected() {
        let fixture = Fixture::new();
        let sponsor = fixture.provider.pubkey();
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(10_000),
            ComputeBudgetInstruction::set_compute_unit_price(10),
            fixture.transfer(&sponsor, 1_000),
        ];
        let tx = unsigned(&sponsor, &instructions);
        let result = verify_transaction(
            &fixture.provider,
            &tx,
            &fixture.requirement(1_000),
            fixture.sponsor(),
            &VerificationConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(VerifyError::Rejected(SolanaExactError::FeePayerTransferringFunds))
        ));
    }

    #[tokio::test]
    async fn test_wallet_paid_transaction_skips_sponsor_checks() {
        let fixture = Fixture::new();
        let wallet = fixture.payer.pubkey();
        let instructions = vec![
            ComputeBudgetInstruction::set_compute_unit_limit(10_000),
            ComputeBudgetInstruction::set_compute_unit_price(10),
            fixture.transfer(&wallet, 1_000),
        ];
        let tx = unsigned(&wallet, &instructions);
        let verified = verify_transaction(
            &fixture.provider,
            &tx,
            &fixture.requirement(1_000),
            FeePayerRole::Wallet,
            &VerificationConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(verified.payer, Address::new(wallet));
    }

    #[tokio::test]
    async fn test_foreign_fee_payer_is_rejected() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![]);
        let result = verify_transaction(
            &fixture.provider,
            &tx,
            &fixture.requirement(1_000),
            FeePayerRole::Sponsor(keypair(7).pubkey()),
            &VerificationConfig::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(VerifyError::Rejected(SolanaExactError::FeePayerMismatch { .. }))
        ));
    }

    #[test]
    fn test_compute_price_above_maximum_is_rejected() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![]);
        assert_eq!(verify_compute_price_instruction(10, &tx, 1), Ok(10));
        assert_eq!(
            verify_compute_price_instruction(9, &tx, 1),
            Err(SolanaExactError::MaxComputeUnitPriceExceeded)
        );
        assert_eq!(verify_compute_limit_instruction(&tx, 0), Ok(10_000));
    }

    #[test]
    fn test_blocked_program_wins_over_allowed() {
        let fixture = Fixture::new();
        let tx = fixture.transaction(vec![memo()]);
        let config = VerificationConfig {
            blocked_program_ids: vec![Address::new(MEMO_PROGRAM_PUBKEY)],
            ..VerificationConfig::default()
        };
        assert_eq!(
            validate_instructions(&tx, &config),
            Err(SolanaExactError::BlockedProgram(MEMO_PROGRAM_PUBKEY))
        );
        let config = VerificationConfig {
            allow_additional_instructions: false,
            ..VerificationConfig::default()
        };
        assert_eq!(
            validate_instructions(&tx, &config),
            Err(SolanaExactError::AdditionalInstructionsNotAllowed)
        );
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: VerificationConfig = serde_json::from_str("{}").unwrap();
        assert!(config.allow_additional_instructions);
        assert_eq!(config.max_instruction_count, 10);
        assert!(config.is_allowed(&MEMO_PROGRAM_PUBKEY));
        assert!(config.is_allowed(&PHANTOM_LIGHTHOUSE_PROGRAM_PUBKEY));
        assert!(config.require_fee_payer_not_in_instructions);
    }
}
