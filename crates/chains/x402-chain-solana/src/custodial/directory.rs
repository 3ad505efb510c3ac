//! Wallet classification against the custodian's public wallet directory.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::chain::Address;
use crate::custodial::http::{HttpClientError, JsonHttpClient};

/// Directory entry for a wallet address.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WalletLookupResult {
    pub found: bool,
    #[serde(default)]
    pub is_crossmint: bool,
    #[serde(default)]
    pub custodian: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub chain: Option<String>,
}

impl WalletLookupResult {
    pub fn is_custodial(&self) -> bool {
        self.found && self.is_crossmint
    }
}

/// Decides whether a payer wallet is managed by a custodian.
///
/// Classification never fails: when the answer is unknown the wallet is treated as
/// self-signing.
#[async_trait::async_trait]
pub trait WalletClassifier: Send + Sync {
    async fn is_custodial(&self, wallet: &Address) -> bool;
}

/// Classifier used when no directory is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonCustodial;

#[async_trait::async_trait]
impl WalletClassifier for NonCustodial {
    async fn is_custodial(&self, _wallet: &Address) -> bool {
        false
    }
}

/// Queries `GET {directory}/public/wallets/{address}` on every call. Results are not cached.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: JsonHttpClient,
}

impl DirectoryClient {
    pub fn new(base_url: &Url) -> Result<Self, HttpClientError> {
        Ok(Self {
            http: JsonHttpClient::new(base_url)?,
        })
    }

    /// Bounds each lookup. A lookup that runs out of time classifies the wallet as
    /// non-custodial.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http = self.http.with_timeout(timeout);
        self
    }

    pub async fn lookup(&self, wallet: &Address) -> Result<WalletLookupResult, HttpClientError> {
        let url = self.http.url(
            &format!("public/wallets/{wallet}"),
            "Failed to construct wallet lookup URL",
        )?;
        self.http
            .get_json(&url, "GET /public/wallets/{address}")
            .await
    }
}

#[async_trait::async_trait]
impl WalletClassifier for DirectoryClient {
    async fn is_custodial(&self, wallet: &Address) -> bool {
        match self.lookup(wallet).await {
            Ok(result) => {
                tracing::debug!(
                    wallet = %wallet,
                    found = result.found,
                    custodian = ?result.custodian,
                    "Wallet directory lookup"
                );
                result.is_custodial()
            }
            Err(error) => {
                tracing::warn!(
                    wallet = %wallet,
                    error = %error,
                    "Wallet directory lookup failed, treating wallet as non-custodial"
                );
                false
            }
        }
    }
}
