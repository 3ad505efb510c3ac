//! Known x402 v1 network names and their CAIP-2 chain ids.
//!
//! x402 v1 payment requirements carry human-readable network names (`"solana"`,
//! `"solana-devnet"`). The facilitator keys its configuration by CAIP-2 chain id, so this
//! registry translates between the two.
//!
//! ```
//! use x402_types::chain::ChainId;
//! use x402_types::networks::chain_id_by_network_name;
//!
//! let devnet = chain_id_by_network_name("solana-devnet").unwrap();
//! assert_eq!(devnet.reference, "EtWTRABZaYq6iMfeYKouRu166VU2xqa1");
//!
//! let chain_id = ChainId::new("solana", "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp");
//! assert_eq!(chain_id.as_network_name(), Some("solana"));
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use crate::chain::ChainId;

/// A known network definition with its chain ID and human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Human-readable network name (e.g., "solana-devnet")
    pub name: &'static str,
    /// CAIP-2 namespace
    pub namespace: &'static str,
    /// Chain reference, the genesis hash prefix for Solana clusters
    pub reference: &'static str,
}

impl NetworkInfo {
    pub fn chain_id(&self) -> ChainId {
        ChainId::new(self.namespace, self.reference)
    }
}

pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "solana",
        namespace: "solana",
        reference: "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp",
    },
    NetworkInfo {
        name: "solana-devnet",
        namespace: "solana",
        reference: "EtWTRABZaYq6iMfeYKouRu166VU2xqa1",
    },
];

pub static NAME_TO_CHAIN_ID: LazyLock<HashMap<&'static str, ChainId>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|n| (n.name, n.chain_id()))
        .collect()
});

pub static CHAIN_ID_TO_NAME: LazyLock<HashMap<ChainId, &'static str>> = LazyLock::new(|| {
    KNOWN_NETWORKS
        .iter()
        .map(|n| (n.chain_id(), n.name))
        .collect()
});

/// Retrieves a ChainId by its network name. The lookup is case-sensitive.
pub fn chain_id_by_network_name(name: &str) -> Option<&ChainId> {
    NAME_TO_CHAIN_ID.get(name)
}

/// Retrieves a network name by its ChainId.
pub fn network_name_by_chain_id(chain_id: &ChainId) -> Option<&'static str> {
    CHAIN_ID_TO_NAME.get(chain_id).copied()
}
