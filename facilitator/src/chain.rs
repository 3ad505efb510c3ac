//! Construction of the per-cluster facilitators from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use x402_chain_solana::chain::SolanaChainProvider;
use x402_chain_solana::v1_solana_exact::SolanaExactFacilitator;
use x402_types::chain::{ChainProviderOps, ChainRegistry, FromConfig};

use crate::config::ChainsConfig;

/// The exact-scheme facilitator of one configured cluster.
pub type ChainFacilitator = SolanaExactFacilitator<Arc<SolanaChainProvider>>;

/// Connects to every configured cluster.
///
/// # Errors
///
/// Fails on the first chain whose provider or collaborators can not be set up.
#[async_trait::async_trait]
impl FromConfig<ChainsConfig> for ChainRegistry<ChainFacilitator> {
    async fn from_config(chains: &ChainsConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let mut facilitators = HashMap::new();
        for chain in chains.iter() {
            let facilitator = ChainFacilitator::from_config(chain).await?;
            facilitators.insert(facilitator.provider().chain_id(), facilitator);
        }
        Ok(Self::new(facilitators))
    }
}
