//! Local facilitator for x402 payments on Solana.
//!
//! [`FacilitatorLocal`] wraps a [`ChainRegistry`] of per-cluster
//! [`SolanaExactFacilitator`]s and routes every request to the cluster named by its
//! `network` field. Networks may be given as v1 names (`solana-devnet`) or CAIP-2 ids.
//!
//! # Example
//!
//! ```ignore
//! use x402_facilitator_local::FacilitatorLocal;
//! use x402_types::chain::{ChainRegistry, FromConfig};
//!
//! let chain_registry = ChainRegistry::from_config(&chains_config).await?;
//! let facilitator = FacilitatorLocal::new(chain_registry);
//! let response = facilitator.settle(&settle_request, &trace_id).await?;
//! ```

use std::collections::HashMap;
use std::str::FromStr;
use x402_chain_solana::chain::{Address, SolanaChainProviderLike};
use x402_chain_solana::trustless::{JobRecord, TrustlessError};
use x402_chain_solana::v1_solana_exact::{PrepareError, SettleError, SolanaExactFacilitator};
use x402_types::chain::{ChainProviderOps, ChainRegistry};
use x402_types::facilitator::Facilitator;
use x402_types::proto;
use x402_types::proto::v1;
use x402_types::util::TraceId;

/// A [`Facilitator`] that prepares and settles payments against its own RPC nodes.
pub struct FacilitatorLocal<A> {
    chains: A,
}

impl<A> FacilitatorLocal<A> {
    pub fn new(chains: A) -> Self {
        FacilitatorLocal { chains }
    }

    pub fn chains(&self) -> &A {
        &self.chains
    }
}

impl<P> FacilitatorLocal<ChainRegistry<SolanaExactFacilitator<P>>> {
    fn chain(&self, network: &str) -> Result<&SolanaExactFacilitator<P>, FacilitatorLocalError> {
        self.chains
            .by_network(network)
            .ok_or_else(|| FacilitatorLocalError::UnsupportedNetwork(network.to_string()))
    }
}

impl<P> Facilitator for FacilitatorLocal<ChainRegistry<SolanaExactFacilitator<P>>>
where
    P: SolanaChainProviderLike + ChainProviderOps + Send + Sync,
{
    type Error = FacilitatorLocalError;

    async fn prepare(
        &self,
        request: &v1::PrepareRequest,
        trace_id: &TraceId,
    ) -> Result<v1::PrepareResponse, Self::Error> {
        let chain = self.chain(&request.payment_requirements.network)?;
        let response = chain
            .prepare(request, trace_id)
            .await
            .map_err(FacilitatorLocalError::Prepare)?;
        Ok(response)
    }

    async fn settle(
        &self,
        request: &v1::SettleRequest,
        trace_id: &TraceId,
    ) -> Result<v1::SettleResponse, Self::Error> {
        let chain = self.chain(&request.payment_requirements.network)?;
        let response = chain
            .settle(request, trace_id)
            .await
            .map_err(FacilitatorLocalError::Settle)?;
        Ok(response)
    }

    async fn simulate(
        &self,
        request: &v1::SimulateRequest,
        trace_id: &TraceId,
    ) -> Result<v1::SimulateResponse, Self::Error> {
        let chain = self.chain(&request.network)?;
        let response = chain
            .simulate(request, trace_id)
            .await
            .map_err(FacilitatorLocalError::Settle)?;
        Ok(response)
    }

    /// Looks the record up on every configured cluster; the first hit wins.
    async fn job(&self, job_id: &str) -> Result<Option<v1::JobResponse>, Self::Error> {
        let address = Address::from_str(job_id)
            .map_err(|_| FacilitatorLocalError::InvalidJobId(job_id.to_string()))?;
        for chain in self.chains.values() {
            let record = chain
                .job(address.pubkey())
                .await
                .map_err(FacilitatorLocalError::Job)?;
            if let Some(record) = record {
                return Ok(Some(job_response(record, chain.network())));
            }
        }
        Ok(None)
    }

    async fn supported(&self) -> Result<proto::SupportedResponse, Self::Error> {
        let mut kinds = vec![];
        let mut signers = HashMap::new();
        for chain in self.chains.values() {
            let mut supported = chain.supported();
            kinds.append(&mut supported.kinds);
            for (chain_id, signer_addresses) in supported.signers {
                signers.entry(chain_id).or_insert(signer_addresses);
            }
        }
        Ok(proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        })
    }
}

fn job_response(record: JobRecord, network: String) -> v1::JobResponse {
    v1::JobResponse {
        job_id: record.job_id.to_string(),
        client: record.client.to_string(),
        agent: record.agent.to_string(),
        payment_tx: record.payment_tx.to_string(),
        payment_amount: record.payment_amount.into(),
        created_at: record.created_at,
        network,
    }
}

/// Errors that can occur during local facilitator operations.
///
/// All of them are detected before a transaction is submitted. Settlement outcomes,
/// failed ones included, travel in [`v1::SettleResponse`] instead.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    /// No configured chain serves the requested network.
    #[error("Network {0} is not served by this facilitator")]
    UnsupportedNetwork(String),
    #[error("Invalid job id: {0}")]
    InvalidJobId(String),
    #[error(transparent)]
    Prepare(PrepareError),
    #[error(transparent)]
    Settle(SettleError),
    #[error(transparent)]
    Job(TrustlessError),
}

impl FacilitatorLocalError {
    /// Short machine-readable tag for the `reason` field of an error body.
    pub fn reason(&self) -> &'static str {
        match self {
            FacilitatorLocalError::UnsupportedNetwork(_) => {
                proto::SettleErrorReason::UnsupportedNetwork.as_str()
            }
            FacilitatorLocalError::InvalidJobId(_) => "InvalidJobId",
            FacilitatorLocalError::Prepare(error) => error.reason(),
            FacilitatorLocalError::Settle(error) => error.reason(),
            FacilitatorLocalError::Job(_) => proto::SettleErrorReason::UnexpectedSettleError.as_str(),
        }
    }

    /// Whether the caller sent something unusable, as opposed to a node or collaborator
    /// failing underneath us.
    pub fn is_client_error(&self) -> bool {
        match self {
            FacilitatorLocalError::UnsupportedNetwork(_) | FacilitatorLocalError::InvalidJobId(_) => {
                true
            }
            FacilitatorLocalError::Prepare(error) => error.is_client_error(),
            FacilitatorLocalError::Settle(error) => error.is_client_error(),
            FacilitatorLocalError::Job(TrustlessError::InvalidAccountData(_)) => true,
            FacilitatorLocalError::Job(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use x402_chain_solana::chain::SolanaChainProvider;

    type Local = FacilitatorLocal<ChainRegistry<SolanaExactFacilitator<Arc<SolanaChainProvider>>>>;

    fn empty() -> Local {
        FacilitatorLocal::new(ChainRegistry::new(HashMap::new()))
    }

    #[tokio::test]
    async fn test_unknown_network_is_a_client_error() {
        let request: v1::SimulateRequest = serde_json::from_value(serde_json::json!({
            "network": "solana",
            "transaction": "AQID"
        }))
        .unwrap();
        let error = empty().simulate(&request, &TraceId::new()).await.unwrap_err();
        assert!(matches!(error, FacilitatorLocalError::UnsupportedNetwork(_)));
        assert!(error.is_client_error());
        assert_eq!(error.reason(), "UnsupportedNetwork");
    }

    #[tokio::test]
    async fn test_job_lookup_validates_id() {
        let facilitator = empty();
        let error = facilitator.job("not-a-pubkey").await.unwrap_err();
        assert!(matches!(error, FacilitatorLocalError::InvalidJobId(_)));
        let job = facilitator
            .job("11111111111111111111111111111111")
            .await
            .unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_supported_is_empty_without_chains() {
        let supported = empty().supported().await.unwrap();
        assert!(supported.kinds.is_empty());
        assert!(supported.signers.is_empty());
    }
}
