//! Wire codec for payment transactions.
//!
//! Payment transactions travel between client, facilitator and custodian as base64-encoded
//! bincode serializations of a Solana [`VersionedTransaction`]. This module decodes and
//! validates them into an immutable [`PaymentTransaction`], encodes them back, and derives
//! the few semantic fields the rest of the pipeline needs.

use bincode::Options;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use std::collections::BTreeMap;
use x402_types::util::Base64Bytes;

use crate::chain::Address;
use crate::signer::SignatureMap;

/// Maximum size of a serialized transaction accepted by the network.
pub const PACKET_DATA_SIZE: u64 = 1232;

/// Length of an ed25519 signature in bytes.
pub const SIGNATURE_LENGTH: usize = 64;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes do not describe a well-formed transaction.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("{0} is not a required signer of the transaction")]
    NotARequiredSigner(Pubkey),
    #[error("Can not encode transaction: {0}")]
    Encoding(String),
}

impl CodecError {
    fn invalid(reason: impl Into<String>) -> Self {
        CodecError::InvalidPayload(reason.into())
    }
}

/// An immutable, structurally validated Solana transaction.
///
/// Every operation that changes signatures returns a new value, so a decoded transaction
/// can be shared freely between concurrent stages of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction(VersionedTransaction);

impl PaymentTransaction {
    /// Wraps a transaction after checking its structure.
    pub fn new(transaction: VersionedTransaction) -> Result<Self, CodecError> {
        validate(&transaction)?;
        Ok(Self(transaction))
    }

    pub fn inner(&self) -> &VersionedTransaction {
        &self.0
    }

    pub fn into_inner(self) -> VersionedTransaction {
        self.0
    }

    /// Accounts flagged as required signers in the message header, in slot order.
    pub fn required_signers(&self) -> &[Pubkey] {
        let required = self.0.message.header().num_required_signatures as usize;
        let keys = self.0.message.static_account_keys();
        &keys[..required.min(keys.len())]
    }

    /// Signature map keyed by required signer; `None` marks an empty slot.
    pub fn signatures(&self) -> BTreeMap<Pubkey, Option<Signature>> {
        let empty = Signature::default();
        self.required_signers()
            .iter()
            .zip(self.0.signatures.iter())
            .map(|(key, signature)| {
                let signature = (*signature != empty).then_some(*signature);
                (*key, signature)
            })
            .collect()
    }

    /// Returns a copy with the given signatures placed into their slots.
    ///
    /// Entries overwrite whatever the slot held before. A key that is not a required signer
    /// is rejected and the original value is left untouched.
    pub fn with_signatures(&self, signatures: &SignatureMap) -> Result<Self, CodecError> {
        let mut tx = self.0.clone();
        for (pubkey, signature) in signatures {
            let position = self
                .required_signers()
                .iter()
                .position(|k| k == pubkey)
                .ok_or(CodecError::NotARequiredSigner(*pubkey))?;
            tx.signatures[position] = *signature;
        }
        Ok(Self(tx))
    }

    /// True when every required signer slot holds a signature.
    pub fn is_fully_signed(&self) -> bool {
        let empty = Signature::default();
        self.0.signatures.iter().all(|s| *s != empty)
    }

    /// Transaction id: the fee payer's signature.
    pub fn signature(&self) -> Option<Signature> {
        self.0
            .signatures
            .first()
            .copied()
            .filter(|s| *s != Signature::default())
    }

    pub fn recent_blockhash(&self) -> &solana_message::Hash {
        self.0.message.recent_blockhash()
    }

    /// The first account key pays the network fee.
    pub fn fee_payer(&self) -> Address {
        // Validation guarantees at least one required signer.
        Address::new(self.required_signers()[0])
    }

    /// Serialized message bytes, the payload every signer signs.
    pub fn message_bytes(&self) -> Vec<u8> {
        self.0.message.serialize()
    }
}

fn validate(tx: &VersionedTransaction) -> Result<(), CodecError> {
    let message = &tx.message;
    let header = message.header();
    let keys = message.static_account_keys();
    let required = header.num_required_signatures as usize;
    if required == 0 {
        return Err(CodecError::invalid("transaction declares no required signers"));
    }
    if required + header.num_readonly_unsigned_accounts as usize > keys.len() {
        return Err(CodecError::invalid(
            "message header is inconsistent with the account list",
        ));
    }
    if header.num_readonly_signed_accounts as usize >= required {
        return Err(CodecError::invalid("fee payer must be a writable signer"));
    }
    if tx.signatures.len() != required {
        return Err(CodecError::invalid(format!(
            "expected {required} signature slots, found {}",
            tx.signatures.len()
        )));
    }
    let lookup_accounts: usize = message
        .address_table_lookups()
        .map(|lookups| {
            lookups
                .iter()
                .map(|l| l.writable_indexes.len() + l.readonly_indexes.len())
                .sum()
        })
        .unwrap_or(0);
    let total_accounts = keys.len() + lookup_accounts;
    for (index, instruction) in message.instructions().iter().enumerate() {
        if instruction.program_id_index as usize >= keys.len() {
            return Err(CodecError::invalid(format!(
                "instruction {index} references a missing program account"
            )));
        }
        if instruction
            .accounts
            .iter()
            .any(|a| *a as usize >= total_accounts)
        {
            return Err(CodecError::invalid(format!(
                "instruction {index} references a missing account"
            )));
        }
    }
    Ok(())
}

/// Decodes a base64 wire transaction.
///
/// Invalid base64, truncated or oversized bincode, trailing bytes and structurally invalid
/// messages all fail with [`CodecError::InvalidPayload`].
pub fn decode(encoded: &str) -> Result<PaymentTransaction, CodecError> {
    let bytes = Base64Bytes::from(encoded.trim().as_bytes())
        .decode()
        .map_err(|e| CodecError::invalid(format!("not base64: {e}")))?;
    let transaction: VersionedTransaction = bincode::DefaultOptions::new()
        .with_limit(PACKET_DATA_SIZE)
        .with_fixint_encoding()
        .reject_trailing_bytes()
        .deserialize(&bytes)
        .map_err(|e| CodecError::invalid(format!("malformed transaction: {e}")))?;
    PaymentTransaction::new(transaction)
}

/// Encodes a transaction to its base64 wire form.
pub fn encode(transaction: &PaymentTransaction) -> Result<String, CodecError> {
    let bytes =
        bincode::serialize(transaction.inner()).map_err(|e| CodecError::Encoding(e.to_string()))?;
    Ok(Base64Bytes::encode(bytes).to_string())
}

/// Returns the authority of the first SPL `TransferChecked` instruction.
///
/// Anything that does not look like a checked transfer is skipped; `None` is an expected
/// outcome.
pub fn extract_payer(transaction: &PaymentTransaction) -> Option<Address> {
    let message = &transaction.inner().message;
    let keys = message.static_account_keys();
    message.instructions().iter().find_map(|instruction| {
        let program_id = keys.get(instruction.program_id_index as usize)?;
        if !is_transfer_checked(program_id, &instruction.data) {
            return None;
        }
        let authority_index = *instruction.accounts.get(3)?;
        keys.get(authority_index as usize).copied().map(Address::new)
    })
}

/// True for SPL Token or Token-2022 `TransferChecked` instruction data.
pub fn is_transfer_checked(program_id: &Pubkey, data: &[u8]) -> bool {
    if *program_id == spl_token::ID {
        matches!(
            spl_token::instruction::TokenInstruction::unpack(data),
            Ok(spl_token::instruction::TokenInstruction::TransferChecked { .. })
        )
    } else if *program_id == spl_token_2022::ID {
        matches!(
            spl_token_2022::instruction::TokenInstruction::unpack(data),
            Ok(spl_token_2022::instruction::TokenInstruction::TransferChecked { .. })
        )
    } else {
        false
    }
}

/// Serialized form expected by the custodian: signature count, zeroed signature slots,
/// then the message bytes.
pub fn custodian_wire_bytes(transaction: &PaymentTransaction) -> Vec<u8> {
    let required = transaction.inner().message.header().num_required_signatures;
    let message = transaction.message_bytes();
    let mut bytes = Vec::with_capacity(1 + required as usize * SIGNATURE_LENGTH + message.len());
    bytes.push(required);
    bytes.resize(1 + required as usize * SIGNATURE_LENGTH, 0);
    bytes.extend_from_slice(&message);
    bytes
}

/// Base58 rendering of [`custodian_wire_bytes`].
pub fn custodian_wire_base58(transaction: &PaymentTransaction) -> String {
    bs58::encode(custodian_wire_bytes(transaction)).into_string()
}
