//! In-memory chain provider for unit tests.

use solana_account::Account;
use solana_client::rpc_response::{TransactionError, UiTransactionError};
use solana_commitment_config::CommitmentConfig;
use solana_keypair::Keypair;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use solana_transaction::versioned::VersionedTransaction;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use x402_types::chain::{ChainId, ChainProviderOps};

use crate::chain::{Address, SimulationOutcome, SolanaChainProviderError, SolanaChainProviderLike};
use crate::chain::SolanaChainReference;
use crate::networks::KnownNetworkSolana;
use crate::observe::{SettlementObserver, Stage, StageEvent};

/// Keeps every stage event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<StageEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events().into_iter().map(|e| e.stage).collect()
    }
}

impl SettlementObserver for RecordingObserver {
    fn on_event(&self, event: StageEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Scripted behavior of a watcher future.
#[derive(Debug, Clone, Copy)]
pub enum Watch {
    Never,
    After(Duration),
    ExecutionError,
    TransportError,
}

impl Watch {
    async fn run(self) -> Result<(), SolanaChainProviderError> {
        match self {
            Watch::Never => std::future::pending().await,
            Watch::After(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Watch::ExecutionError => Err(SolanaChainProviderError::InvalidTransaction(
                UiTransactionError::from(TransactionError::InsufficientFundsForFee),
            )),
            Watch::TransportError => Err(SolanaChainProviderError::Custom(
                "connection reset".to_string(),
            )),
        }
    }
}

pub struct MockProvider {
    pub keypair: Arc<Keypair>,
    pub accounts: HashMap<Pubkey, Account>,
    pub confirmation: Watch,
    pub expiry: Watch,
    pub fail_send: bool,
    pub fees: Vec<u64>,
    pub blockhash: Hash,
    pub simulation: SimulationOutcome,
    sent: Mutex<Vec<VersionedTransaction>>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider")
            .field("fee_payer", &self.keypair.pubkey())
            .finish()
    }
}

impl MockProvider {
    pub fn new(confirmation: Watch, expiry: Watch) -> Self {
        Self {
            keypair: Arc::new(Keypair::new_from_array([1; 32])),
            accounts: HashMap::new(),
            confirmation,
            expiry,
            fail_send: false,
            fees: vec![0, 25, 10],
            blockhash: Hash::new_from_array([8; 32]),
            simulation: SimulationOutcome {
                success: true,
                logs: vec!["Program log: ok".to_string()],
                units_consumed: Some(1_500),
                error: None,
            },
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_account(mut self, pubkey: Pubkey, account: Account) -> Self {
        self.accounts.insert(pubkey, account);
        self
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

impl ChainProviderOps for MockProvider {
    fn signer_addresses(&self) -> Vec<String> {
        vec![self.keypair.pubkey().to_string()]
    }

    fn chain_id(&self) -> ChainId {
        SolanaChainReference::solana_devnet().into()
    }
}

impl SolanaChainProviderLike for MockProvider {
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
        400_000
    }

    fn max_compute_unit_price(&self) -> u64 {
        1_000_000
    }

    fn commitment(&self) -> CommitmentConfig {
        CommitmentConfig::confirmed()
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
    ) -> Result<Vec<Option<Account>>, SolanaChainProviderError> {
        Ok(pubkeys
            .iter()
            .map(|p| self.accounts.get(p).cloned())
            .collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, SolanaChainProviderError> {
        Ok(self.blockhash)
    }

    async fn get_recent_prioritization_fees(
        &self,
        _accounts: &[Pubkey],
    ) -> Result<Vec<u64>, SolanaChainProviderError> {
        Ok(self.fees.clone())
    }

    async fn send(&self, tx: &VersionedTransaction) -> Result<Signature, SolanaChainProviderError> {
        if self.fail_send {
            return Err(SolanaChainProviderError::Custom("node unavailable".to_string()));
        }
        self.sent.lock().unwrap().push(tx.clone());
        Ok(tx.signatures[0])
    }

    async fn watch_confirmation(&self, _signature: &Signature) -> Result<(), SolanaChainProviderError> {
        self.confirmation.run().await
    }

    async fn watch_blockhash_expiry(&self, _blockhash: &Hash) -> Result<(), SolanaChainProviderError> {
        self.expiry.run().await
    }

    async fn simulate(
        &self,
        _tx: &VersionedTransaction,
    ) -> Result<SimulationOutcome, SolanaChainProviderError> {
        Ok(self.simulation.clone())
    }
}
