//! Solana settlement for the x402 payment protocol.
//!
//! The crate turns payment requirements into unsigned SPL `TransferChecked` transactions,
//! checks the signed copies that come back, and settles them. Who completes the signature
//! depends on the payer's wallet:
//!
//! - **Self-signing wallets** sign a transaction whose fee payer is the facilitator. The
//!   facilitator co-signs, submits, and races confirmation against blockhash expiry.
//! - **Custodial wallets** pay their own fees. The unsigned transaction is handed to the
//!   custodian, which signs and submits it; the facilitator polls until it lands.
//!
//! Confirmed self-signed payments can additionally be registered as jobs with an on-chain
//! escrow program (see [`trustless`]).
//!
//! # Architecture
//!
//! - [`chain`] - chain references, configuration and the RPC-backed provider
//! - [`codec`] - transaction wire format and payer extraction
//! - [`custodial`] - wallet directory and custodial signing clients
//! - [`signer`] - resolution of the signing strategy for one settlement
//! - [`settlement`] - signing, submission and confirmation
//! - [`trustless`] - job registration and lookup
//! - [`observe`] - stage events emitted along the pipeline
//! - [`v1_solana_exact`] - the v1 "exact" scheme: prepare, verify, settle
//!
//! # Example
//!
//! ```ignore
//! use x402_chain_solana::chain::config::SolanaChainConfig;
//! use x402_chain_solana::v1_solana_exact::SolanaExactFacilitator;
//! use x402_types::chain::FromConfig;
//!
//! let facilitator = SolanaExactFacilitator::from_config(&config).await?;
//! let prepared = facilitator.prepare(&prepare_request, &trace_id).await?;
//! // ... the wallet signs `prepared.transaction` ...
//! let settled = facilitator.settle(&settle_request, &trace_id).await?;
//! ```

pub mod chain;
pub mod codec;
pub mod custodial;
pub mod observe;
pub mod settlement;
pub mod signer;
pub mod trustless;
pub mod v1_solana_exact;

mod networks;
pub use networks::*;

pub use v1_solana_exact::SolanaExactFacilitator;

#[cfg(test)]
mod testing;
