//! Remote signing through a wallet custodian.
//!
//! A custodial wallet's key never leaves the custodian. The facilitator hands over the
//! unsigned transaction, the custodian signs and submits it, and the facilitator polls until
//! the custodian reports a terminal status:
//!
//! ```text
//! Created -> Polling -> Confirmed | Failed | TimedOut
//! ```

pub mod directory;
pub mod http;
pub mod retry;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::chain::Address;
use crate::codec::{self, PaymentTransaction};
use crate::custodial::http::{HttpClientError, JsonHttpClient};
use crate::custodial::retry::{PollPolicy, PollStatus, Sleeper, TokioSleeper, poll_until};

pub use directory::{DirectoryClient, NonCustodial, WalletClassifier, WalletLookupResult};

#[derive(Debug, thiserror::Error)]
pub enum CustodialError {
    /// The custodian could not be reached or rejected the request.
    #[error("Custodian request failed: {0}")]
    Transport(#[from] HttpClientError),
    #[error("Invalid custodian API key")]
    InvalidApiKey,
    #[error("Custodian confirmed transaction {transaction_id} without an on-chain signature")]
    MissingSignature { transaction_id: String },
    #[error("Custodian transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Custodian transaction {transaction_id} still pending after {attempts} attempts")]
    Timeout {
        transaction_id: String,
        attempts: u32,
    },
}

#[derive(Debug, Serialize)]
struct CreateTransactionRequest<'a> {
    params: CreateTransactionParams<'a>,
}

#[derive(Debug, Serialize)]
struct CreateTransactionParams<'a> {
    transaction: &'a str,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CreatedTransaction {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub status: String,
    #[serde(default)]
    pub on_chain: Option<OnChain>,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OnChain {
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub tx_id: Option<String>,
}

impl TransactionStatusResponse {
    fn signature(&self) -> Option<&str> {
        let on_chain = self.on_chain.as_ref()?;
        on_chain
            .signature
            .as_deref()
            .or(on_chain.tx_id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Client for the custodian's transaction API.
///
/// Holds only a pooled HTTP client and immutable settings, so one instance serves all
/// concurrent settlements.
#[derive(Clone)]
pub struct CustodialSigningClient {
    http: JsonHttpClient,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for CustodialSigningClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodialSigningClient")
            .field("base_url", &self.http.base_url().as_str())
            .field("policy", &self.policy)
            .finish()
    }
}

impl CustodialSigningClient {
    pub fn new(base_url: &Url, api_key: Option<&str>) -> Result<Self, CustodialError> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = api_key {
            let value = HeaderValue::from_str(api_key).map_err(|_| CustodialError::InvalidApiKey)?;
            headers.insert("X-API-KEY", value);
        }
        let http = JsonHttpClient::new(base_url)?.with_headers(headers);
        Ok(Self {
            http,
            policy: PollPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        })
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Bounds each custodian request. A status poll that runs out of time uses up its
    /// attempt and polling goes on.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Hands the unsigned transaction to the custodian. Returns the custodian's transaction id.
    pub async fn create_transaction(
        &self,
        wallet: &Address,
        transaction: &PaymentTransaction,
    ) -> Result<CreatedTransaction, CustodialError> {
        let url = self.http.url(
            &format!("wallets/{wallet}/transactions"),
            "Failed to construct custodian transactions URL",
        )?;
        let encoded = codec::custodian_wire_base58(transaction);
        let request = CreateTransactionRequest {
            params: CreateTransactionParams {
                transaction: &encoded,
            },
        };
        let created = self
            .http
            .post_json(&url, "POST /wallets/{address}/transactions", &request)
            .await?;
        Ok(created)
    }

    pub async fn transaction_status(
        &self,
        wallet: &Address,
        transaction_id: &str,
    ) -> Result<TransactionStatusResponse, HttpClientError> {
        let url = self.http.url(
            &format!("wallets/{wallet}/transactions/{transaction_id}"),
            "Failed to construct custodian transaction status URL",
        )?;
        self.http
            .get_json(&url, "GET /wallets/{address}/transactions/{id}")
            .await
    }

    /// Has the custodian sign and submit `transaction` for `wallet`, then waits for it to land.
    ///
    /// Returns the on-chain signature reported by the custodian. The custodian-side record may
    /// still resolve after a [`CustodialError::Timeout`].
    pub async fn sign_and_submit(
        &self,
        wallet: &Address,
        transaction: &PaymentTransaction,
    ) -> Result<String, CustodialError> {
        let created = self.create_transaction(wallet, transaction).await?;
        let transaction_id = created.id;
        tracing::debug!(
            wallet = %wallet,
            transaction_id = %transaction_id,
            status = ?created.status,
            "Custodian transaction created"
        );
        let id = transaction_id.as_str();
        let signature = poll_until(&self.policy, self.sleeper.as_ref(), |attempt| {
            self.poll_once(wallet, id, attempt)
        })
        .await?;
        signature.ok_or_else(|| CustodialError::Timeout {
            transaction_id: transaction_id.clone(),
            attempts: self.policy.max_attempts,
        })
    }

    async fn poll_once(
        &self,
        wallet: &Address,
        transaction_id: &str,
        attempt: u32,
    ) -> Result<PollStatus<String>, CustodialError> {
        let response = match self.transaction_status(wallet, transaction_id).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    transaction_id,
                    attempt,
                    error = %error,
                    "Custodian status poll failed"
                );
                return Ok(PollStatus::Pending);
            }
        };
        match response.status.to_ascii_lowercase().as_str() {
            "success" | "confirmed" => match response.signature() {
                Some(signature) => Ok(PollStatus::Ready(signature.to_string())),
                None => Err(CustodialError::MissingSignature {
                    transaction_id: transaction_id.to_string(),
                }),
            },
            "failed" => Err(CustodialError::TransactionFailed(
                response
                    .error_message
                    .unwrap_or_else(|| "no error message".to_string()),
            )),
            status => {
                tracing::trace!(transaction_id, attempt, status, "Custodian transaction pending");
                Ok(PollStatus::Pending)
            }
        }
    }
}
