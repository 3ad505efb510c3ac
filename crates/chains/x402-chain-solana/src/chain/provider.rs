use futures_util::stream::StreamExt;
use solana_account::Account;
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::pubsub_client::PubsubClientError;
use solana_client::rpc_config::{
    RpcSendTransactionConfig, RpcSignatureSubscribeConfig, RpcSimulateTransactionConfig,
};
use solana_client::rpc_response::{RpcSignatureResult, UiTransactionError};
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_keypair::Signer;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction::versioned::VersionedTransaction;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;
use x402_types::chain::{ChainId, ChainProviderOps, FromConfig};

use crate::chain::config::{SolanaChainConfig, SolanaConfigError};
use crate::chain::types::{Address, SolanaChainReference};

/// Errors that can occur when interacting with a Solana chain provider.
#[derive(thiserror::Error, Debug)]
pub enum SolanaChainProviderError {
    /// The transaction was rejected or its execution failed.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(#[from] UiTransactionError),
    /// RPC transport error.
    #[error(transparent)]
    Transport(Box<ClientErrorKind>),
    /// WebSocket pubsub transport error.
    #[error(transparent)]
    PubsubTransport(#[from] PubsubClientError),
    #[error("{0}")]
    Custom(String),
}

impl From<ClientError> for SolanaChainProviderError {
    fn from(value: ClientError) -> Self {
        SolanaChainProviderError::Transport(value.kind)
    }
}

/// Result of a read-only transaction simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub success: bool,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
    pub error: Option<String>,
}

/// Provider for interacting with a Solana cluster.
///
/// Holds the fee payer keypair, the RPC client and, when configured, a WebSocket client
/// used for signature subscriptions. Everything is immutable after construction and shared
/// across concurrent requests behind `Arc`.
pub struct SolanaChainProvider {
    /// The Solana network this provider connects to.
    chain: SolanaChainReference,
    /// Fee payer keypair.
    keypair: Arc<Keypair>,
    rpc_client: Arc<RpcClient>,
    /// Optional WebSocket client for signature subscriptions.
    pubsub_client: Option<Arc<PubsubClient>>,
    /// Maximum compute units allowed per transaction.
    max_compute_unit_limit: u32,
    /// Maximum price per compute unit (in micro-lamports).
    max_compute_unit_price: u64,
    commitment: CommitmentConfig,
    /// Interval between signature status polls when no pubsub client is available.
    confirmation_poll_interval: Duration,
    /// Interval between blockhash validity checks.
    expiry_poll_interval: Duration,
}

impl Debug for SolanaChainProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaChainProvider")
            .field("pubkey", &self.keypair.pubkey())
            .field("chain", &self.chain)
            .field("rpc_url", &self.rpc_client.url())
            .field("commitment", &self.commitment)
            .finish()
    }
}

impl SolanaChainProvider {
    /// Creates a new Solana chain provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the WebSocket connection fails to establish.
    pub async fn new(
        keypair: Keypair,
        rpc_url: String,
        pubsub_url: Option<String>,
        chain: SolanaChainReference,
        max_compute_unit_limit: u32,
        max_compute_unit_price: u64,
        commitment: CommitmentConfig,
    ) -> Result<Self, PubsubClientError> {
        let chain_id: ChainId = chain.into();
        tracing::info!(
            chain = %chain_id,
            rpc = rpc_url,
            pubsub = ?pubsub_url,
            fee_payer = %keypair.pubkey(),
            max_compute_unit_limit,
            max_compute_unit_price,
            commitment = ?commitment.commitment,
            "Using Solana provider"
        );
        let rpc_client = RpcClient::new_with_commitment(rpc_url, commitment);
        let pubsub_client = if let Some(pubsub_url) = pubsub_url {
            let client = PubsubClient::new(pubsub_url).await?;
            Some(client)
        } else {
            None
        };
        Ok(Self {
            keypair: Arc::new(keypair),
            chain,
            rpc_client: Arc::new(rpc_client),
            pubsub_client: pubsub_client.map(Arc::new),
            max_compute_unit_limit,
            max_compute_unit_price,
            commitment,
            confirmation_poll_interval: Duration::from_millis(200),
            expiry_poll_interval: Duration::from_secs(2),
        })
    }

    pub fn rpc_client(&self) -> Arc<RpcClient> {
        Arc::clone(&self.rpc_client)
    }

    pub fn chain_reference(&self) -> SolanaChainReference {
        self.chain
    }

    async fn poll_confirmation(&self, signature: &Signature) -> Result<(), SolanaChainProviderError> {
        loop {
            if let Some(status) = self.signature_status(signature).await? {
                return status;
            }
            tokio::time::sleep(self.confirmation_poll_interval).await;
        }
    }

    /// `None` while the signature has not reached the configured commitment.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), SolanaChainProviderError>>, SolanaChainProviderError> {
        let status = self
            .rpc_client
            .get_signature_status_with_commitment(signature, self.commitment)
            .await?;
        Ok(status.map(|result| {
            result.map_err(|e| SolanaChainProviderError::InvalidTransaction(e.into()))
        }))
    }
}

#[async_trait::async_trait]
impl FromConfig<SolanaChainConfig> for SolanaChainProvider {
    async fn from_config(config: &SolanaChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let rpc_url = config.rpc()?;
        let pubsub_url = config.pubsub().map(|url| url.to_string());
        let keypair = Keypair::try_from(config.signer().as_bytes().as_slice())
            .map_err(|e| SolanaConfigError::InvalidSigner(e.to_string()))?;
        let provider = Self::new(
            keypair,
            rpc_url.to_string(),
            pubsub_url,
            config.chain_reference(),
            config.max_compute_unit_limit(),
            config.max_compute_unit_price(),
            config.commitment(),
        )
        .await?;
        Ok(provider)
    }
}

impl ChainProviderOps for SolanaChainProvider {
    fn signer_addresses(&self) -> Vec<String> {
        vec![self.fee_payer().to_string()]
    }

    fn chain_id(&self) -> ChainId {
        self.chain.into()
    }
}

/// Chain operations needed to prepare, settle and register x402 payments on Solana.
///
/// The settlement engine and the exact-scheme facilitator are generic over this trait, so
/// tests substitute an in-memory implementation for the RPC-backed [`SolanaChainProvider`].
pub trait SolanaChainProviderLike {
    /// Returns the public key of the fee payer.
    fn pubkey(&self) -> Pubkey;

    /// Returns the fee payer address.
    fn fee_payer(&self) -> Address;

    /// Returns the fee payer keypair for local partial signing.
    fn fee_payer_signer(&self) -> Arc<Keypair>;

    fn max_compute_unit_limit(&self) -> u32;

    /// Returns the maximum compute unit price in micro-lamports.
    fn max_compute_unit_price(&self) -> u64;

    /// Commitment level a settlement must reach.
    fn commitment(&self) -> CommitmentConfig;

    /// Fetches multiple accounts in a single RPC call.
    fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<Option<Account>>, SolanaChainProviderError>> + Send;

    fn get_latest_blockhash(
        &self,
    ) -> impl Future<Output = Result<Hash, SolanaChainProviderError>> + Send;

    /// Recent prioritization fees (micro-lamports per compute unit) paid for the given accounts.
    fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<u64>, SolanaChainProviderError>> + Send;

    /// Submits a signed transaction without waiting for confirmation.
    fn send(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send;

    /// Resolves once `signature` reaches the configured commitment.
    ///
    /// Fails with [`SolanaChainProviderError::InvalidTransaction`] when the transaction landed
    /// but its execution failed.
    fn watch_confirmation(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send;

    /// Resolves once `blockhash` is no longer valid for new transactions.
    fn watch_blockhash_expiry(
        &self,
        blockhash: &Hash,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send;

    /// Simulates a transaction without verifying signatures, against the latest blockhash.
    fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<SimulationOutcome, SolanaChainProviderError>> + Send;
}

impl SolanaChainProviderLike for SolanaChainProvider {
    fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn fee_payer(&self) -> Address {
        Address::new(self.keypair.pubkey())
    }

    fn fee_payer_signer(&self) -> Arc<Keypair> {
        Arc::clone(&self.keypair)
    }

    fn max_compute_unit_limit(&self) -> u32 {
        self.max_compute_unit_limit
    }

    fn max_compute_unit_price(&self) -> u64 {
        self.max_compute_unit_price
    }

    fn commitment(&self) -> CommitmentConfig {
        self.commitment
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SolanaChainProviderError> {
        let accounts = self.rpc_client.get_multiple_accounts(pubkeys).await?;
        Ok(accounts)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SolanaChainProviderError> {
        let blockhash = self.rpc_client.get_latest_blockhash().await?;
        Ok(blockhash)
    }

    async fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SolanaChainProviderError> {
        let fees = self
            .rpc_client
            .get_recent_prioritization_fees(accounts)
            .await?;
        Ok(fees.into_iter().map(|f| f.prioritization_fee).collect())
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, SolanaChainProviderError> {
        let signature = self
            .rpc_client
            .send_transaction_with_config(
                tx,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await?;
        Ok(signature)
    }

    async fn watch_confirmation(&self, signature: &Signature) -> Result<(), SolanaChainProviderError> {
        let Some(pubsub_client) = self.pubsub_client.as_ref() else {
            return self.poll_confirmation(signature).await;
        };
        let config = RpcSignatureSubscribeConfig {
            commitment: Some(self.commitment),
            enable_received_notification: None,
        };
        let (mut stream, unsubscribe) = pubsub_client
            .signature_subscribe(signature, Some(config))
            .await?;
        let _unsubscribe = UnsubscribeOnDrop(Some(unsubscribe));
        // The transaction may have landed before the subscription was registered.
        if let Some(status) = self.signature_status(signature).await? {
            return status;
        }
        match stream.next().await {
            Some(response) => match response.value {
                RpcSignatureResult::ProcessedSignature(processed) => match processed.err {
                    None => Ok(()),
                    Some(error) => Err(SolanaChainProviderError::InvalidTransaction(error)),
                },
                RpcSignatureResult::ReceivedSignature(_) => self.poll_confirmation(signature).await,
            },
            None => Err(SolanaChainProviderError::Custom(
                "Can not get response from signatureSubscribe".to_string(),
            )),
        }
    }

    async fn watch_blockhash_expiry(&self, blockhash: &Hash) -> Result<(), SolanaChainProviderError> {
        loop {
            let valid = self
                .rpc_client
                .is_blockhash_valid(blockhash, self.commitment)
                .await?;
            if !valid {
                return Ok(());
            }
            tokio::time::sleep(self.expiry_poll_interval).await;
        }
    }

    async fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SolanaChainProviderError> {
        let cfg = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(self.commitment),
            ..RpcSimulateTransactionConfig::default()
        };
        let sim = self
            .rpc_client
            .simulate_transaction_with_config(tx, cfg)
            .await?;
        let value = sim.value;
        Ok(SimulationOutcome {
            success: value.err.is_none(),
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
            error: value.err.map(|e| e.to_string()),
        })
    }
}

type UnsubscribeFn = Box<dyn FnOnce() -> futures_util::future::BoxFuture<'static, ()> + Send>;

/// Tears down a signature subscription when the watcher future is dropped, including when
/// it loses the confirmation race.
struct UnsubscribeOnDrop(Option<UnsubscribeFn>);

impl Drop for UnsubscribeOnDrop {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.0.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(unsubscribe());
        }
    }
}

impl<T: SolanaChainProviderLike> SolanaChainProviderLike for Arc<T> {
    fn pubkey(&self) -> Pubkey {
        (**self).pubkey()
    }

    fn fee_payer(&self) -> Address {
        (**self).fee_payer()
    }

    fn fee_payer_signer(&self) -> Arc<Keypair> {
        (**self).fee_payer_signer()
    }

    fn max_compute_unit_limit(&self) -> u32 {
        (**self).max_compute_unit_limit()
    }

    fn max_compute_unit_price(&self) -> u64 {
        (**self).max_compute_unit_price()
    }

    fn commitment(&self) -> CommitmentConfig {
        (**self).commitment()
    }

    fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<Option<Account>>, SolanaChainProviderError>> + Send {
        (**self).get_multiple_accounts(pubkeys)
    }

    fn get_latest_blockhash(
        &self,
    ) -> impl Future<Output = Result<Hash, SolanaChainProviderError>> + Send {
        (**self).get_latest_blockhash()
    }

    fn get_recent_prioritization_fees(
        &self,
        accounts: &[Pubkey],
    ) -> impl Future<Output = Result<Vec<u64>, SolanaChainProviderError>> + Send {
        (**self).get_recent_prioritization_fees(accounts)
    }

    fn send(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, SolanaChainProviderError>> + Send {
        (**self).send(tx)
    }

    fn watch_confirmation(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send {
        (**self).watch_confirmation(signature)
    }

    fn watch_blockhash_expiry(
        &self,
        blockhash: &Hash,
    ) -> impl Future<Output = Result<(), SolanaChainProviderError>> + Send {
        (**self).watch_blockhash_expiry(blockhash)
    }

    fn simulate(
        &self,
        tx: &VersionedTransaction,
    ) -> impl Future<Output = Result<SimulationOutcome, SolanaChainProviderError>> + Send {
        (**self).simulate(tx)
    }
}
