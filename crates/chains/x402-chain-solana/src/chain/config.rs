use serde::{Deserialize, Serialize};
use solana_commitment_config::CommitmentConfig;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;
use url::Url;
use x402_types::chain::ChainId;
use x402_types::config::LiteralOrEnv;

use crate::chain::{Address, SolanaChainReference};
use crate::custodial::retry::PollPolicy;
use crate::networks::DefaultRpcUrl;
use crate::v1_solana_exact::VerificationConfig;

/// Configuration for one Solana cluster served by the facilitator.
///
/// Keyed by CAIP-2 chain id in the `chains` map of the configuration file:
///
/// ```json
/// {
///   "solana:EtWTRABZaYq6iMfeYKouRu166VU2xqa1": {
///     "signer": "$SOLANA_FEE_PAYER_KEY",
///     "commitment": "confirmed",
///     "custodian": { "url": "https://custodian.example.com/api/2022-06-09", "apiKey": "$CUSTODIAN_API_KEY" },
///     "directory": { "url": "https://directory.example.com" },
///     "trustless": { "programId": "CtZrqYPSzPipUnxB55hBzCHrQxtBfWPujyrnDBDeWpWe" }
///   }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SolanaChainConfig {
    /// The Solana network identifier (genesis hash prefix).
    pub chain_reference: SolanaChainReference,
    /// Chain-specific configuration details.
    pub inner: SolanaChainConfigInner,
}

impl SolanaChainConfig {
    pub fn signer(&self) -> &SolanaSignerConfig {
        &self.inner.signer
    }

    /// Returns the configured RPC endpoint, falling back to the public endpoint of a
    /// well-known cluster.
    pub fn rpc(&self) -> Result<Url, SolanaConfigError> {
        if let Some(rpc) = &self.inner.rpc {
            return Ok(rpc.inner().clone());
        }
        let default = DefaultRpcUrl::for_chain(&self.chain_reference)
            .ok_or(SolanaConfigError::MissingRpc(self.chain_id()))?;
        Url::parse(default).map_err(|e| SolanaConfigError::InvalidUrl(e.to_string()))
    }

    pub fn pubsub(&self) -> Option<&Url> {
        self.inner.pubsub.as_deref()
    }

    pub fn max_compute_unit_limit(&self) -> u32 {
        self.inner.max_compute_unit_limit
    }

    /// Returns the maximum compute unit price (in micro-lamports).
    pub fn max_compute_unit_price(&self) -> u64 {
        self.inner.max_compute_unit_price
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.inner.commitment.into()
    }

    pub fn custodian(&self) -> Option<&CustodianConfig> {
        self.inner.custodian.as_ref()
    }

    pub fn directory(&self) -> Option<&DirectoryConfig> {
        self.inner.directory.as_ref()
    }

    pub fn trustless(&self) -> Option<&TrustlessConfig> {
        self.inner.trustless.as_ref()
    }

    pub fn verification(&self) -> &VerificationConfig {
        &self.inner.verification
    }

    pub fn chain_reference(&self) -> SolanaChainReference {
        self.chain_reference
    }

    /// Returns the CAIP-2 chain ID for this configuration.
    pub fn chain_id(&self) -> ChainId {
        self.chain_reference.into()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SolanaConfigError {
    #[error("No rpc endpoint configured for {0} and no public default is known")]
    MissingRpc(ChainId),
    #[error("Invalid url: {0}")]
    InvalidUrl(String),
    #[error("Invalid signer key: {0}")]
    InvalidSigner(String),
}

/// Configuration specific to Solana chains.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolanaChainConfigInner {
    /// Fee payer key: base58-encoded 64-byte keypair, or an env var reference.
    pub signer: SolanaSignerConfig,
    /// RPC endpoint. Defaults to the public endpoint for mainnet-beta and devnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc: Option<LiteralOrEnv<Url>>,
    /// WebSocket endpoint for signature subscriptions. Confirmation is polled without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubsub: Option<LiteralOrEnv<Url>>,
    #[serde(default = "solana_chain_config::default_max_compute_unit_limit")]
    pub max_compute_unit_limit: u32,
    #[serde(default = "solana_chain_config::default_max_compute_unit_price")]
    pub max_compute_unit_price: u64,
    #[serde(default)]
    pub commitment: Commitment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custodian: Option<CustodianConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<DirectoryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trustless: Option<TrustlessConfig>,
    #[serde(default)]
    pub verification: VerificationConfig,
}

mod solana_chain_config {
    pub fn default_max_compute_unit_limit() -> u32 {
        400_000
    }
    pub fn default_max_compute_unit_price() -> u64 {
        1_000_000
    }
    pub fn default_poll_interval_ms() -> u64 {
        1_000
    }
    pub fn default_max_attempts() -> u32 {
        30
    }
    pub fn default_request_timeout_ms() -> u64 {
        10_000
    }
}

/// Commitment level a settlement must reach before it is reported as confirmed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl From<Commitment> for CommitmentConfig {
    fn from(value: Commitment) -> Self {
        match value {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

/// Remote signing service for custodial wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodianConfig {
    pub url: LiteralOrEnv<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<LiteralOrEnv<String>>,
    #[serde(default = "solana_chain_config::default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "solana_chain_config::default_max_attempts")]
    pub max_attempts: u32,
    /// Deadline for a single custodian request, status polls included.
    #[serde(default = "solana_chain_config::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl CustodianConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.max_attempts,
            interval: Duration::from_millis(self.poll_interval_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Wallet directory used to classify wallets as custodial.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryConfig {
    pub url: LiteralOrEnv<Url>,
    #[serde(default = "solana_chain_config::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl DirectoryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// On-chain job registry invoked after trustless settlements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustlessConfig {
    pub program_id: Address,
}

// ============================================================================
// Solana Private Key
// ============================================================================

/// A validated Solana private key (64 bytes in standard Solana format).
///
/// This type represents a standard Solana keypair in its 64-byte format:
/// - First 32 bytes: the Ed25519 secret key (seed)
/// - Last 32 bytes: the Ed25519 public key
///
/// The key is stored and parsed as a base58-encoded 64-byte array,
/// which is the standard format used by Solana CLI and wallets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolanaPrivateKey([u8; 64]);

impl SolanaPrivateKey {
    /// Parse a base58 string into a private key (64 bytes in standard Solana format).
    ///
    /// The standard Solana keypair format is 64 bytes:
    /// - First 32 bytes: secret key (seed)
    /// - Last 32 bytes: public key
    pub fn from_base58(s: &str) -> Result<Self, String> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| format!("Invalid base58: {}", e))?;

        if bytes.len() != 64 {
            return Err(format!(
                "Private key must be 64 bytes (standard Solana format), got {} bytes",
                bytes.len()
            ));
        }

        let mut arr = [0u8; 64];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Encode the keypair back to base58.
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl Serialize for SolanaPrivateKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl FromStr for SolanaPrivateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl std::fmt::Display for SolanaPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_base58())
    }
}

/// Type alias for Solana signer configuration.
///
/// Uses `LiteralOrEnv` to support both literal base58 keys and environment variable references.
///
/// Example JSON:
/// ```json
/// {
///   "signer": "$SOLANA_FEE_PAYER_KEY"
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolanaSignerConfig(LiteralOrEnv<SolanaPrivateKey>);

impl Deref for SolanaSignerConfig {
    type Target = SolanaPrivateKey;

    fn deref(&self) -> &Self::Target {
        self.0.inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KnownNetworkSolana;
    use serde_json::json;

    const KEY: &str = "2Ana1pUpv2ZbMVkwF5FXapYeBEjdxDatLn7nvJkhgTSdZd8hbDHTd21as7EAsg7ypityqfsw2pMQKJcVDVcAEsd";

    fn config(inner: serde_json::Value, chain: SolanaChainReference) -> SolanaChainConfig {
        SolanaChainConfig {
            chain_reference: chain,
            inner: serde_json::from_value(inner).unwrap(),
        }
    }

    #[test]
    fn defaults_apply_to_minimal_config() {
        let config = config(json!({ "signer": KEY }), SolanaChainReference::solana_devnet());
        assert_eq!(config.rpc().unwrap().as_str(), "https://api.devnet.solana.com/");
        assert_eq!(config.max_compute_unit_limit(), 400_000);
        assert_eq!(config.inner.commitment, Commitment::Confirmed);
        assert!(config.custodian().is_none());
        assert!(config.pubsub().is_none());
    }

    #[test]
    fn custodian_poll_policy_defaults() {
        let config = config(
            json!({
                "signer": KEY,
                "rpc": "http://127.0.0.1:8899",
                "commitment": "finalized",
                "custodian": { "url": "https://custodian.example.com/api", "apiKey": "secret" },
                "trustless": { "programId": "CtZrqYPSzPipUnxB55hBzCHrQxtBfWPujyrnDBDeWpWe" }
            }),
            SolanaChainReference::solana(),
        );
        let policy = config.custodian().unwrap().poll_policy();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(1));
        assert_eq!(config.inner.commitment, Commitment::Finalized);
        assert_eq!(config.rpc().unwrap().as_str(), "http://127.0.0.1:8899/");
    }

    #[test]
    fn collaborator_requests_are_bounded() {
        let config = config(
            json!({
                "signer": KEY,
                "custodian": { "url": "https://custodian.example.com/api" },
                "directory": { "url": "https://directory.example.com", "requestTimeoutMs": 2500 }
            }),
            SolanaChainReference::solana(),
        );
        assert_eq!(
            config.custodian().unwrap().request_timeout(),
            Duration::from_secs(10)
        );
        assert_eq!(
            config.directory().unwrap().request_timeout(),
            Duration::from_millis(2500)
        );
    }

    #[test]
    fn unknown_cluster_requires_rpc() {
        let custom = SolanaChainReference::new(*b"4uhcVJyU9pJkvQyS88uRDiswHXSCkY3z");
        let config = config(json!({ "signer": KEY }), custom);
        assert!(matches!(config.rpc(), Err(SolanaConfigError::MissingRpc(_))));
    }

    #[test]
    fn private_key_must_be_64_bytes() {
        assert!(SolanaPrivateKey::from_base58(KEY).is_ok());
        assert!(SolanaPrivateKey::from_base58("3yZe7d").is_err());
        assert!(SolanaPrivateKey::from_base58("0OIl").is_err());
    }
}
