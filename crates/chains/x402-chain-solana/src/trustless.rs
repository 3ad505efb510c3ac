//! On-chain job registration for trustless payments.
//!
//! After a sponsored settlement confirms, the facilitator can record the payment as a job in
//! the trustless Anchor program. The job record ties the client, the agent that was paid, the
//! settlement signature and the amount together so that feedback can later be attached to a
//! verifiable payment.

use serde::{Deserialize, Serialize};
use solana_message::v0::Message as MessageV0;
use solana_message::VersionedMessage;
use solana_pubkey::{Pubkey, pubkey};
use solana_signature::Signature;
use solana_transaction::Instruction;
use solana_transaction::versioned::VersionedTransaction;
use spl_token::solana_program::instruction::AccountMeta;
use x402_types::proto::SettleErrorReason;
use x402_types::util::TraceId;

use crate::chain::{Address, SolanaChainProviderError, SolanaChainProviderLike};
use crate::codec::{CodecError, PaymentTransaction};
use crate::observe::{Outcome, Stage, StageEvent};
use crate::settlement::SettlementEngine;
use crate::signer::PayerSigner;

/// Program id of the deployed trustless program.
pub const DEFAULT_PROGRAM_ID: Pubkey = pubkey!("CtZrqYPSzPipUnxB55hBzCHrQxtBfWPujyrnDBDeWpWe");

const SYSTEM_PROGRAM_ID: Pubkey = pubkey!("11111111111111111111111111111111");

/// Anchor discriminator of `register_job`: `sha256("global:register_job")[..8]`.
const REGISTER_JOB_DISCRIMINATOR: [u8; 8] = [87, 213, 177, 255, 131, 17, 178, 45];

/// Anchor discriminator of the `JobRecord` account: `sha256("account:JobRecord")[..8]`.
const JOB_RECORD_DISCRIMINATOR: [u8; 8] = [220, 194, 212, 58, 47, 65, 141, 196];

const JOB_RECORD_LEN: usize = 8 + 32 * 4 + 8 + 8;

#[derive(Debug, thiserror::Error)]
pub enum TrustlessError {
    #[error("Job record {0} not found")]
    NotFound(Pubkey),
    #[error("Invalid job record: {0}")]
    InvalidAccountData(String),
    #[error("Can not build job registration: {0}")]
    Build(String),
    #[error(transparent)]
    Provider(#[from] SolanaChainProviderError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("Job registration did not settle: {0}")]
    Settlement(SettleErrorReason),
}

/// Everything the program needs to record a paid job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRegistration {
    pub agent: Pubkey,
    pub client: Pubkey,
    /// First 32 bytes of the settlement signature.
    pub payment_tx: Pubkey,
    /// Fresh key used only to derive the job record address.
    pub job_id: Pubkey,
    pub payment_amount: u64,
}

impl JobRegistration {
    pub fn new(
        agent: Pubkey,
        client: Pubkey,
        settlement_signature: &Signature,
        payment_amount: u64,
    ) -> Self {
        Self {
            agent,
            client,
            payment_tx: payment_reference(settlement_signature),
            job_id: Pubkey::new_from_array(rand::random()),
            payment_amount,
        }
    }
}

/// Folds a 64-byte signature into an account-sized reference.
pub fn payment_reference(signature: &Signature) -> Pubkey {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&signature.as_ref()[..32]);
    Pubkey::new_from_array(bytes)
}

/// Decoded `JobRecord` account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub job_id: Address,
    pub client: Address,
    pub agent: Address,
    pub payment_tx: Address,
    pub payment_amount: u64,
    pub created_at: i64,
}

impl JobRecord {
    pub fn decode(data: &[u8]) -> Result<Self, TrustlessError> {
        if data.len() < JOB_RECORD_LEN {
            return Err(TrustlessError::InvalidAccountData(format!(
                "expected {JOB_RECORD_LEN} bytes, found {}",
                data.len()
            )));
        }
        if data[..8] != JOB_RECORD_DISCRIMINATOR {
            return Err(TrustlessError::InvalidAccountData(
                "account discriminator mismatch".to_string(),
            ));
        }
        let key = |offset: usize| {
            let mut bytes = [0u8; 32];
            bytes.copy_from_slice(&data[offset..offset + 32]);
            Address::new(Pubkey::new_from_array(bytes))
        };
        let mut amount = [0u8; 8];
        amount.copy_from_slice(&data[136..144]);
        let mut created_at = [0u8; 8];
        created_at.copy_from_slice(&data[144..152]);
        Ok(Self {
            job_id: key(8),
            client: key(40),
            agent: key(72),
            payment_tx: key(104),
            payment_amount: u64::from_le_bytes(amount),
            created_at: i64::from_le_bytes(created_at),
        })
    }

    #[cfg(test)]
    fn encode(&self) -> Vec<u8> {
        let mut data = JOB_RECORD_DISCRIMINATOR.to_vec();
        for key in [&self.job_id, &self.client, &self.agent, &self.payment_tx] {
            data.extend_from_slice(key.as_ref());
        }
        data.extend_from_slice(&self.payment_amount.to_le_bytes());
        data.extend_from_slice(&self.created_at.to_le_bytes());
        data
    }
}

/// Client-side view of the trustless program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustlessProgram {
    program_id: Pubkey,
}

impl Default for TrustlessProgram {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM_ID)
    }
}

impl TrustlessProgram {
    pub fn new(program_id: Pubkey) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    /// PDA `["agent", agent]`.
    pub fn agent_account(&self, agent: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"agent", agent.as_ref()], &self.program_id).0
    }

    /// PDA `["job", job_id]`.
    pub fn job_record(&self, job_id: &Pubkey) -> Pubkey {
        Pubkey::find_program_address(&[b"job", job_id.as_ref()], &self.program_id).0
    }

    pub fn register_job_instruction(
        &self,
        registration: &JobRegistration,
        facilitator: &Pubkey,
    ) -> Instruction {
        let mut data = REGISTER_JOB_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&registration.payment_amount.to_le_bytes());
        let accounts = vec![
            AccountMeta::new(self.agent_account(&registration.agent), false),
            AccountMeta::new(self.job_record(&registration.job_id), false),
            AccountMeta::new_readonly(registration.agent, false),
            AccountMeta::new_readonly(registration.client, false),
            AccountMeta::new_readonly(registration.payment_tx, false),
            AccountMeta::new_readonly(registration.job_id, false),
            AccountMeta::new(*facilitator, true),
            AccountMeta::new_readonly(SYSTEM_PROGRAM_ID, false),
        ];
        Instruction::new_with_bytes(self.program_id, &data, accounts)
    }

    /// Builds, fee-payer-signs and settles a `register_job` transaction.
    ///
    /// Returns the address of the new job record, which is also the job's id on-chain.
    pub async fn register_job<P>(
        &self,
        engine: &SettlementEngine<P>,
        registration: &JobRegistration,
        trace_id: &TraceId,
    ) -> Result<Address, TrustlessError>
    where
        P: SolanaChainProviderLike + Send + Sync,
    {
        let provider = engine.provider();
        let fee_payer = provider.pubkey();
        let blockhash = provider.get_latest_blockhash().await?;
        let instruction = self.register_job_instruction(registration, &fee_payer);
        let message = MessageV0::try_compile(&fee_payer, &[instruction], &[], blockhash)
            .map_err(|e| TrustlessError::Build(format!("{e:?}")))?;
        let message = VersionedMessage::V0(message);
        let required = message.header().num_required_signatures as usize;
        let transaction = PaymentTransaction::new(VersionedTransaction {
            signatures: vec![Signature::default(); required],
            message,
        })?;

        let signer = PayerSigner::Partial(provider.fee_payer_signer());
        let result = engine.settle(&transaction, Some(&signer), trace_id).await;
        let job_record = Address::new(self.job_record(&registration.job_id));
        let outcome = match (&result.error_reason, result.success) {
            (_, true) => Outcome::Info(job_record.to_string()),
            (Some(reason), false) => Outcome::Failed(reason.to_string()),
            (None, false) => Outcome::Failed("unknown".to_string()),
        };
        engine
            .observer()
            .on_event(StageEvent::new(trace_id, Stage::RegisterJob, outcome));
        if result.success {
            Ok(job_record)
        } else {
            Err(TrustlessError::Settlement(
                result
                    .error_reason
                    .unwrap_or(SettleErrorReason::UnexpectedSettleError),
            ))
        }
    }

    /// Reads and decodes a job record account.
    pub async fn fetch_job_record<P: SolanaChainProviderLike>(
        &self,
        provider: &P,
        job_record: &Pubkey,
    ) -> Result<JobRecord, TrustlessError> {
        let accounts = provider.get_multiple_accounts(&[*job_record]).await?;
        let account = accounts
            .into_iter()
            .next()
            .flatten()
            .ok_or(TrustlessError::NotFound(*job_record))?;
        if account.owner != self.program_id {
            return Err(TrustlessError::InvalidAccountData(
                "account is not owned by the trustless program".to_string(),
            ));
        }
        JobRecord::decode(&account.data)
    }
}
