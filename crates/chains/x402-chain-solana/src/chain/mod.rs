//! Solana chain support for x402 payments.
//!
//! # Key Types
//!
//! - [`SolanaChainReference`] - A 32-character genesis hash identifying a Solana network
//! - [`SolanaChainProvider`] - RPC-backed provider used to submit, watch and simulate transactions
//! - [`SolanaChainProviderLike`] - Chain operations the settlement engine is generic over
//! - [`Address`] - A Solana public key (base58-encoded)
//!
//! # Solana Networks
//!
//! Solana networks are identified by the first 32 characters of their genesis block hash:
//! - Mainnet: `5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`
//! - Devnet: `EtWTRABZaYq6iMfeYKouRu166VU2xqa1`

pub mod config;
pub mod provider;
pub mod types;

pub use provider::*;
pub use types::*;
