//! CAIP-2 chain identifier types.
//!
//! A CAIP-2 chain ID consists of a namespace and a reference separated by a colon.
//! For Solana the namespace is `solana` and the reference is the first 32 characters
//! of the base58-encoded genesis hash.
//!
//! ```
//! use x402_types::chain::ChainId;
//!
//! let devnet: ChainId = "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1".parse().unwrap();
//! assert_eq!(devnet.namespace, "solana");
//! assert_eq!(devnet.as_network_name(), Some("solana-devnet"));
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use std::str::FromStr;

use crate::networks;

/// A CAIP-2 compliant blockchain identifier.
///
/// Serializes to/from a colon-separated string: `"solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainId {
    /// The blockchain namespace, `solana` for Solana clusters.
    pub namespace: String,
    /// The chain-specific reference (genesis hash prefix for Solana).
    pub reference: String,
}

impl ChainId {
    pub fn new<N: Into<String>, R: Into<String>>(namespace: N, reference: R) -> Self {
        Self {
            namespace: namespace.into(),
            reference: reference.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// Creates a chain ID from a well-known x402 v1 network name.
    ///
    /// ```
    /// use x402_types::chain::ChainId;
    ///
    /// let mainnet = ChainId::from_network_name("solana").unwrap();
    /// assert_eq!(mainnet.to_string(), "solana:5eykt4UsFv8P8NJdTREpY1vzqKqZKvdp");
    /// assert!(ChainId::from_network_name("unknown").is_none());
    /// ```
    pub fn from_network_name(network_name: &str) -> Option<Self> {
        networks::chain_id_by_network_name(network_name).cloned()
    }

    /// Resolves either a v1 network name or a CAIP-2 string into a chain ID.
    ///
    /// Network names win; anything else must parse as `namespace:reference`.
    pub fn from_network(network: &str) -> Option<Self> {
        Self::from_network_name(network).or_else(|| network.parse().ok())
    }

    /// Returns the well-known network name for this chain ID, if any.
    pub fn as_network_name(&self) -> Option<&'static str> {
        networks::network_name_by_chain_id(self)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.reference)
    }
}

impl From<ChainId> for String {
    fn from(value: ChainId) -> Self {
        value.to_string()
    }
}

/// Error returned when parsing an invalid chain ID string.
///
/// A valid chain ID must be in the format `namespace:reference` where both
/// components are non-empty strings.
#[derive(Debug, thiserror::Error)]
#[error("Invalid chain id format {0}")]
pub struct ChainIdFormatError(String);

impl FromStr for ChainId {
    type Err = ChainIdFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, reference) = s.split_once(':').ok_or(ChainIdFormatError(s.into()))?;
        if namespace.is_empty() || reference.is_empty() {
            return Err(ChainIdFormatError(s.into()));
        }
        Ok(ChainId::new(namespace, reference))
    }
}

impl Serialize for ChainId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ChainId::from_str(&s).map_err(de::Error::custom)
    }
}
