//! Blockchain-specific types and providers for x402 payment processing.
//!
//! - [`ChainId`] - A CAIP-2 compliant chain identifier (e.g., `solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp`)
//! - [`ChainRegistry`] - Registry of configured chain handlers keyed by chain id

mod chain_id;

pub use chain_id::*;

use std::collections::HashMap;
use std::sync::Arc;

/// Asynchronously constructs an instance of `Self` from a configuration type.
///
/// Used to build providers and per-chain facilitators from the parsed configuration file.
/// Implementations fail when configuration values are invalid or when a required external
/// connection (RPC, pubsub) cannot be established.
#[async_trait::async_trait]
pub trait FromConfig<TConfig>
where
    Self: Sized,
{
    async fn from_config(config: &TConfig) -> Result<Self, Box<dyn std::error::Error>>;
}

/// Common operations available on all chain providers.
pub trait ChainProviderOps {
    /// Returns the addresses of all configured signers for this chain.
    ///
    /// For Solana these are base58-encoded public keys.
    fn signer_addresses(&self) -> Vec<String>;

    /// Returns the CAIP-2 chain identifier for this provider.
    fn chain_id(&self) -> ChainId;
}

impl<T: ChainProviderOps> ChainProviderOps for Arc<T> {
    fn signer_addresses(&self) -> Vec<String> {
        (**self).signer_addresses()
    }
    fn chain_id(&self) -> ChainId {
        (**self).chain_id()
    }
}

/// Registry of configured chain handlers indexed by chain ID.
///
/// # Example
///
/// ```
/// use std::collections::HashMap;
/// use x402_types::chain::{ChainId, ChainRegistry};
///
/// let mut handlers = HashMap::new();
/// handlers.insert(ChainId::new("solana", "EtWTRABZaYq6iMfeYKouRu166VU2xqa1"), "devnet");
/// let registry = ChainRegistry::new(handlers);
///
/// let devnet = ChainId::from_network_name("solana-devnet").unwrap();
/// assert_eq!(registry.by_chain_id(&devnet), Some(&"devnet"));
/// ```
#[derive(Debug)]
pub struct ChainRegistry<P>(HashMap<ChainId, P>);

impl<P> ChainRegistry<P> {
    pub fn new(providers: HashMap<ChainId, P>) -> Self {
        Self(providers)
    }

    /// Looks up a handler by exact chain ID.
    pub fn by_chain_id(&self, chain_id: &ChainId) -> Option<&P> {
        self.0.get(chain_id)
    }

    /// Looks up a handler by an x402 network identifier.
    ///
    /// Accepts both v1 network names (`solana-devnet`) and CAIP-2 chain ids
    /// (`solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1`).
    pub fn by_network(&self, network: &str) -> Option<&P> {
        let chain_id = ChainId::from_network(network)?;
        self.by_chain_id(&chain_id)
    }

    /// Iterates over all registered handlers.
    pub fn values(&self) -> impl Iterator<Item = &P> {
        self.0.values()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
