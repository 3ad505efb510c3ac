use x402_types::chain::ChainId;

use crate::chain::SolanaChainReference;

/// Provides instances for the well-known Solana clusters.
///
/// Implemented for every type that has a natural per-cluster value: CAIP-2 chain ids,
/// chain references and the default public RPC endpoints.
///
/// ```
/// use x402_chain_solana::KnownNetworkSolana;
/// use x402_types::chain::ChainId;
///
/// let devnet = ChainId::solana_devnet();
/// assert_eq!(devnet.to_string(), "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
/// ```
pub trait KnownNetworkSolana<A> {
    /// Solana mainnet-beta (solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp)
    fn solana() -> A;
    /// Solana devnet (solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1)
    fn solana_devnet() -> A;
}

impl KnownNetworkSolana<ChainId> for ChainId {
    fn solana() -> ChainId {
        SolanaChainReference::solana().into()
    }

    fn solana_devnet() -> ChainId {
        SolanaChainReference::solana_devnet().into()
    }
}

/// Public RPC endpoint used when a chain is configured without an explicit `rpc` URL.
pub struct DefaultRpcUrl;

impl KnownNetworkSolana<&'static str> for DefaultRpcUrl {
    fn solana() -> &'static str {
        "https://api.mainnet-beta.solana.com"
    }

    fn solana_devnet() -> &'static str {
        "https://api.devnet.solana.com"
    }
}

impl DefaultRpcUrl {
    /// Looks up the default endpoint for a chain reference, if the cluster is well known.
    pub fn for_chain(chain: &SolanaChainReference) -> Option<&'static str> {
        if *chain == SolanaChainReference::solana() {
            Some(<Self as KnownNetworkSolana<&'static str>>::solana())
        } else if *chain == SolanaChainReference::solana_devnet() {
            Some(<Self as KnownNetworkSolana<&'static str>>::solana_devnet())
        } else {
            None
        }
    }
}
