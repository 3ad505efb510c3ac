//! Builds unsigned transfer transactions from payment requirements.
//!
//! The prepared transaction always has the layout the verifier expects:
//! `[SetComputeUnitLimit, SetComputeUnitPrice, TransferChecked, Memo]`. The memo carries a
//! random nonce so two preparations for the same requirements never produce the same
//! message.

use solana_compute_budget_interface::ComputeBudgetInstruction;
use solana_message::v0::Message as MessageV0;
use solana_message::{Hash, VersionedMessage};
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::program_pack::Pack;
use spl_token_2022::extension::StateWithExtensions;
use x402_types::util::Base64Bytes;

use crate::chain::{Address, SolanaChainProviderError, SolanaChainProviderLike};
use crate::codec::{CodecError, PaymentTransaction};
use crate::v1_solana_exact::types::MEMO_PROGRAM_PUBKEY;
use crate::v1_solana_exact::verify::associated_token_address;

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("Invalid wallet address: {0}")]
    InvalidWallet(String),
    #[error("Network {0} is not served by this facilitator")]
    UnsupportedNetwork(String),
    #[error("Mint {0} not found")]
    MintNotFound(Pubkey),
    #[error("Can not read mint {mint}: {reason}")]
    InvalidMint { mint: Pubkey, reason: String },
    #[error("Can not build transaction: {0}")]
    Build(String),
    #[error("Simulation returned no units_consumed")]
    NoComputeEstimate,
    #[error(transparent)]
    Provider(#[from] SolanaChainProviderError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Mint information for SPL tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mint {
    Token { decimals: u8, token_program: Pubkey },
    Token2022 { decimals: u8, token_program: Pubkey },
}

impl Mint {
    pub fn token_program(&self) -> &Pubkey {
        match self {
            Mint::Token { token_program, .. } => token_program,
            Mint::Token2022 { token_program, .. } => token_program,
        }
    }

    pub fn decimals(&self) -> u8 {
        match self {
            Mint::Token { decimals, .. } | Mint::Token2022 { decimals, .. } => *decimals,
        }
    }
}

/// Fetches the mint account and reads its decimals, Token or Token-2022.
pub async fn fetch_mint<P: SolanaChainProviderLike>(
    provider: &P,
    mint_address: &Address,
) -> Result<Mint, PrepareError> {
    let mint = *mint_address.pubkey();
    let account = provider
        .get_multiple_accounts(&[mint])
        .await?
        .into_iter()
        .next()
        .flatten()
        .ok_or(PrepareError::MintNotFound(mint))?;
    let invalid = |reason: String| PrepareError::InvalidMint { mint, reason };
    if account.owner == spl_token::id() {
        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Mint::Token {
            decimals: state.decimals,
            token_program: spl_token::id(),
        })
    } else if account.owner == spl_token_2022::id() {
        // Token-2022 mints may carry extensions after the base state.
        let state = StateWithExtensions::<spl_token_2022::state::Mint>::unpack(&account.data)
            .map_err(|e| invalid(e.to_string()))?;
        Ok(Mint::Token2022 {
            decimals: state.base.decimals,
            token_program: spl_token_2022::id(),
        })
    } else {
        Err(invalid(format!("unknown owner {}", account.owner)))
    }
}

/// Lowest positive recent prioritization fee, or 1 micro-lamport when there is none.
pub async fn get_priority_fee_micro_lamports<P: SolanaChainProviderLike>(
    provider: &P,
    writeable_accounts: &[Pubkey],
) -> Result<u64, PrepareError> {
    let recent_fees = provider
        .get_recent_prioritization_fees(writeable_accounts)
        .await?;
    let fee = recent_fees
        .iter()
        .copied()
        .filter(|fee| *fee > 0)
        .min()
        .unwrap_or(1);
    Ok(fee)
}

/// Update the first set_compute_unit_limit ix if it exists, else append a new one.
pub fn update_or_append_set_compute_unit_limit(ixs: &mut Vec<Instruction>, units: u32) {
    let target_program = solana_compute_budget_interface::ID;
    let new_ix = ComputeBudgetInstruction::set_compute_unit_limit(units);

    let ix = ixs
        .iter_mut()
        .find(|ix| ix.program_id == target_program && ix.data.first() == Some(&2));
    if let Some(ix) = ix {
        *ix = new_ix;
    } else {
        ixs.push(new_ix);
    }
}

/// Build the message we want to simulate (priority fee + transfer Ixs).
pub fn build_message_to_simulate(
    fee_payer: Pubkey,
    transfer_instructions: &[Instruction],
    priority_micro_lamports: u64,
    recent_blockhash: Hash,
) -> Result<(MessageV0, Vec<Instruction>), PrepareError> {
    let set_price = ComputeBudgetInstruction::set_compute_unit_price(priority_micro_lamports);

    let mut ixs = Vec::with_capacity(1 + transfer_instructions.len());
    ixs.push(set_price);
    ixs.extend(transfer_instructions.to_owned());

    let with_cu_limit = {
        let mut ixs_mod = ixs.clone();
        update_or_append_set_compute_unit_limit(&mut ixs_mod, 1e5 as u32);
        ixs_mod
    };
    let message = MessageV0::try_compile(&fee_payer, &with_cu_limit, &[], recent_blockhash)
        .map_err(|e| PrepareError::Build(format!("{e:?}")))?;
    Ok((message, ixs))
}

/// Estimate compute units by simulating the unsigned transaction.
pub async fn estimate_compute_units<P: SolanaChainProviderLike>(
    provider: &P,
    message: &MessageV0,
) -> Result<u32, PrepareError> {
    let message = VersionedMessage::V0(message.clone());
    let num_required_signatures = message.header().num_required_signatures;
    let tx = VersionedTransaction {
        signatures: vec![Signature::default(); num_required_signatures as usize],
        message,
    };
    let simulation = provider.simulate(&tx).await?;
    if !simulation.success {
        tracing::warn!(
            error = ?simulation.error,
            "Compute estimate simulation failed, using its consumed units"
        );
    }
    let units = simulation
        .units_consumed
        .ok_or(PrepareError::NoComputeEstimate)?;
    Ok(u32::try_from(units).unwrap_or(u32::MAX))
}

/// Build a memo instruction with a random nonce for transaction uniqueness.
/// The SPL Memo program requires valid UTF-8 data, so the nonce is base64-encoded.
pub fn build_random_memo_ix() -> Instruction {
    let nonce: [u8; 16] = rand::random();
    let memo_data = Base64Bytes::encode(nonce).to_string();
    Instruction::new_with_bytes(MEMO_PROGRAM_PUBKEY, memo_data.as_bytes(), Vec::new())
}

/// What to transfer, from whom, and who pays the fee.
#[derive(Debug, Clone, Copy)]
pub struct TransferPlan<'a> {
    pub fee_payer: &'a Pubkey,
    pub wallet: &'a Pubkey,
    pub pay_to: &'a Address,
    pub asset: &'a Address,
    pub amount: u64,
}

/// Builds the unsigned payment transaction with every signature slot empty.
pub async fn build_transfer_transaction<P: SolanaChainProviderLike>(
    provider: &P,
    plan: TransferPlan<'_>,
) -> Result<PaymentTransaction, PrepareError> {
    let mint = fetch_mint(provider, plan.asset).await?;
    let token_program = mint.token_program();
    let source_ata = associated_token_address(plan.wallet, token_program, plan.asset.pubkey());
    let destination_ata =
        associated_token_address(plan.pay_to.pubkey(), token_program, plan.asset.pubkey());

    let transfer_instruction = match mint {
        Mint::Token {
            decimals,
            token_program,
        } => spl_token::instruction::transfer_checked(
            &token_program,
            &source_ata,
            plan.asset.pubkey(),
            &destination_ata,
            plan.wallet,
            &[],
            plan.amount,
            decimals,
        ),
        Mint::Token2022 {
            decimals,
            token_program,
        } => spl_token_2022::instruction::transfer_checked(
            &token_program,
            &source_ata,
            plan.asset.pubkey(),
            &destination_ata,
            plan.wallet,
            &[],
            plan.amount,
            decimals,
        ),
    }
    .map_err(|e| PrepareError::Build(e.to_string()))?;

    let recent_blockhash = provider.get_latest_blockhash().await?;
    let fee = get_priority_fee_micro_lamports(
        provider,
        &[*plan.fee_payer, destination_ata, source_ata],
    )
    .await?
    .min(provider.max_compute_unit_price());

    let transfer_instructions = vec![transfer_instruction, build_random_memo_ix()];
    let (msg_to_sim, instructions) = build_message_to_simulate(
        *plan.fee_payer,
        &transfer_instructions,
        fee,
        recent_blockhash,
    )?;
    let estimated_cu = estimate_compute_units(provider, &msg_to_sim).await?;
    tracing::debug!(estimated_cu, fee, "Estimated compute budget");

    let message = {
        let mut final_instructions = Vec::with_capacity(instructions.len() + 1);
        final_instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(estimated_cu));
        final_instructions.extend(instructions);
        MessageV0::try_compile(plan.fee_payer, &final_instructions, &[], recent_blockhash)
            .map_err(|e| PrepareError::Build(format!("{e:?}")))?
    };
    let message = VersionedMessage::V0(message);
    let required = message.header().num_required_signatures as usize;
    Ok(PaymentTransaction::new(VersionedTransaction {
        signatures: vec![Signature::default(); required],
        message,
    })?)
}
