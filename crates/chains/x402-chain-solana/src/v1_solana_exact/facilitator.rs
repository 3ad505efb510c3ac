use solana_pubkey::Pubkey;
use solana_signature::Signature;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use x402_types::chain::{ChainId, ChainProviderOps, FromConfig};
use x402_types::proto;
use x402_types::proto::v1;
use x402_types::util::TraceId;

use crate::chain::config::SolanaChainConfig;
use crate::chain::{Address, SolanaChainProvider, SolanaChainProviderError, SolanaChainProviderLike};
use crate::codec::{self, CodecError, PaymentTransaction};
use crate::custodial::{CustodialSigningClient, DirectoryClient, NonCustodial, WalletClassifier};
use crate::observe::{Outcome, SettlementObserver, Stage, StageEvent};
use crate::settlement::{SettlementEngine, SettlementResult};
use crate::signer::{PayerSigner, SignerCapabilities, SignerError};
use crate::trustless::{JobRecord, JobRegistration, TrustlessError, TrustlessProgram};
use crate::v1_solana_exact::prepare::{PrepareError, TransferPlan, build_transfer_transaction};
use crate::v1_solana_exact::types::{
    ExactExtra, ExactScheme, PaymentRequirements, SettleRequest, SolanaExactError,
    SupportedPaymentKindExtra,
};
use crate::v1_solana_exact::verify::{
    FeePayerRole, TransferRequirement, VerificationConfig, VerifiedTransfer, VerifyError,
    verify_transaction,
};

/// Faults detected before anything is submitted. Reported with HTTP 400.
#[derive(Debug, thiserror::Error)]
pub enum SettleError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    #[error("Network {0} is not served by this facilitator")]
    UnsupportedNetwork(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Verification(#[from] SolanaExactError),
    #[error(transparent)]
    Provider(#[from] SolanaChainProviderError),
    #[error("No custodian configured for custodial wallet {0}")]
    NoCustodian(Address),
    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl From<VerifyError> for SettleError {
    fn from(value: VerifyError) -> Self {
        match value {
            VerifyError::Rejected(error) => SettleError::Verification(error),
            VerifyError::Provider(error) => SettleError::Provider(error),
        }
    }
}

impl SettleError {
    pub fn reason(&self) -> &'static str {
        match self {
            SettleError::Verification(error) => error.reason(),
            SettleError::UnsupportedNetwork(_) => proto::SettleErrorReason::UnsupportedNetwork.as_str(),
            SettleError::NoCustodian(_) | SettleError::Signer(_) => {
                proto::SettleErrorReason::UnsupportedSigner.as_str()
            }
            SettleError::Provider(_) => proto::SettleErrorReason::UnexpectedSettleError.as_str(),
            SettleError::InvalidPayload(_) | SettleError::Codec(_) => {
                proto::SettleErrorReason::InvalidPayload.as_str()
            }
        }
    }

    /// Whether the request itself is at fault, as opposed to the chain or a collaborator.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, SettleError::Provider(_))
    }
}

impl PrepareError {
    pub fn reason(&self) -> &'static str {
        match self {
            PrepareError::UnsupportedNetwork(_) => {
                proto::SettleErrorReason::UnsupportedNetwork.as_str()
            }
            PrepareError::Provider(_) => proto::SettleErrorReason::UnexpectedSettleError.as_str(),
            _ => proto::SettleErrorReason::InvalidPayload.as_str(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            PrepareError::Provider(_) | PrepareError::NoComputeEstimate
        )
    }
}

/// The `exact` scheme on one Solana cluster: prepare, settle, simulate and job lookup.
pub struct SolanaExactFacilitator<P> {
    engine: SettlementEngine<P>,
    classifier: Arc<dyn WalletClassifier>,
    custodian: Option<Arc<CustodialSigningClient>>,
    trustless: Option<TrustlessProgram>,
    config: VerificationConfig,
}

impl<P: std::fmt::Debug> std::fmt::Debug for SolanaExactFacilitator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaExactFacilitator")
            .field("engine", &self.engine)
            .field("custodian", &self.custodian)
            .field("trustless", &self.trustless)
            .finish()
    }
}

impl<P> SolanaExactFacilitator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            engine: SettlementEngine::new(provider),
            classifier: Arc::new(NonCustodial),
            custodian: None,
            trustless: None,
            config: VerificationConfig::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn WalletClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_custodian(mut self, custodian: Arc<CustodialSigningClient>) -> Self {
        self.custodian = Some(custodian);
        self
    }

    pub fn with_trustless(mut self, program: TrustlessProgram) -> Self {
        self.trustless = Some(program);
        self
    }

    pub fn with_config(mut self, config: VerificationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SettlementObserver>) -> Self {
        self.engine = self.engine.with_observer(observer);
        self
    }

    pub fn provider(&self) -> &P {
        self.engine.provider()
    }

    pub fn engine(&self) -> &SettlementEngine<P> {
        &self.engine
    }

    fn observe(&self, trace_id: &TraceId, stage: Stage, outcome: Outcome) {
        self.engine
            .observer()
            .on_event(StageEvent::new(trace_id, stage, outcome));
    }
}

#[async_trait::async_trait]
impl FromConfig<SolanaChainConfig> for SolanaExactFacilitator<Arc<SolanaChainProvider>> {
    async fn from_config(config: &SolanaChainConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let provider = SolanaChainProvider::from_config(config).await?;
        let mut facilitator =
            Self::new(Arc::new(provider)).with_config(config.verification().clone());
        if let Some(directory) = config.directory() {
            let client = DirectoryClient::new(directory.url.inner())?
                .with_request_timeout(directory.request_timeout());
            facilitator = facilitator.with_classifier(Arc::new(client));
        }
        if let Some(custodian) = config.custodian() {
            let api_key = custodian.api_key.as_ref().map(|key| key.inner().as_str());
            let client = CustodialSigningClient::new(custodian.url.inner(), api_key)?
                .with_policy(custodian.poll_policy())
                .with_request_timeout(custodian.request_timeout());
            facilitator = facilitator.with_custodian(Arc::new(client));
        }
        if let Some(trustless) = config.trustless() {
            facilitator =
                facilitator.with_trustless(TrustlessProgram::new(*trustless.program_id.pubkey()));
        }
        Ok(facilitator)
    }
}

impl<P> SolanaExactFacilitator<P>
where
    P: SolanaChainProviderLike + ChainProviderOps + Send + Sync,
{
    /// Network name for well-known clusters, CAIP-2 id otherwise.
    pub fn network(&self) -> String {
        let chain_id = self.provider().chain_id();
        chain_id
            .as_network_name()
            .map(str::to_string)
            .unwrap_or_else(|| chain_id.to_string())
    }

    fn serves(&self, network: &str) -> bool {
        ChainId::from_network(network).is_some_and(|id| id == self.provider().chain_id())
    }

    /// Builds an unsigned transfer for `walletAddress` and enriches the requirements.
    ///
    /// The fee payer is the wallet itself when the directory classifies it as custodial,
    /// and the facilitator otherwise.
    pub async fn prepare(
        &self,
        request: &v1::PrepareRequest,
        trace_id: &TraceId,
    ) -> Result<v1::PrepareResponse, PrepareError> {
        let generic = &request.payment_requirements;
        if !self.serves(&generic.network) {
            return Err(PrepareError::UnsupportedNetwork(generic.network.clone()));
        }
        let requirements: PaymentRequirements = generic
            .as_concrete()
            .ok_or_else(|| PrepareError::InvalidWallet("unparseable payment requirements".into()))?;
        let wallet = Address::from_str(&request.wallet_address)
            .map_err(|e| PrepareError::InvalidWallet(e.to_string()))?;

        let is_custodial = self.classifier.is_custodial(&wallet).await;
        self.observe(
            trace_id,
            Stage::Classify,
            Outcome::Info(if is_custodial { "custodial" } else { "self-signing" }.to_string()),
        );
        let fee_payer = if is_custodial {
            wallet
        } else {
            self.provider().fee_payer()
        };
        let trustless = request
            .trustless
            .or(requirements.extra.as_ref().and_then(|e| e.trustless))
            .unwrap_or(false);

        let result = build_transfer_transaction(
            self.provider(),
            TransferPlan {
                fee_payer: fee_payer.pubkey(),
                wallet: wallet.pubkey(),
                pay_to: &requirements.pay_to,
                asset: &requirements.asset,
                amount: requirements.max_amount_required.inner(),
            },
        )
        .await;
        let transaction = match result {
            Ok(transaction) => transaction,
            Err(error) => {
                self.observe(trace_id, Stage::Prepare, Outcome::Failed(error.to_string()));
                return Err(error);
            }
        };
        let encoded = codec::encode(&transaction)?;
        self.observe(trace_id, Stage::Prepare, Outcome::Ok);

        let extra = ExactExtra {
            fee_payer: Some(fee_payer),
            is_custodial_wallet: Some(is_custodial),
            trustless: Some(trustless),
        };
        let fields = match serde_json::to_value(extra) {
            Ok(serde_json::Value::Object(fields)) => fields,
            _ => serde_json::Map::new(),
        };
        Ok(v1::PrepareResponse {
            transaction: encoded,
            payment_requirements: generic.with_extra_fields(fields),
        })
    }

    /// Verifies the transfer, completes signing and settles.
    ///
    /// Pre-submission faults are errors; everything after signing starts is reported in
    /// the returned response.
    pub async fn settle(
        &self,
        request: &v1::SettleRequest,
        trace_id: &TraceId,
    ) -> Result<v1::SettleResponse, SettleError> {
        for network in [
            &request.payment_payload.network,
            &request.payment_requirements.network,
        ] {
            if !self.serves(network) {
                return Err(SettleError::UnsupportedNetwork(network.clone()));
            }
        }
        let request = SettleRequest::from_generic(request)
            .map_err(|e| SettleError::InvalidPayload(e.to_string()))?;
        let requirements = &request.payment_requirements;
        let extra = requirements.extra.clone().unwrap_or_default();
        let transaction = codec::decode(&request.payment_payload.payload.transaction)?;

        let is_custodial = request
            .is_custodial_wallet
            .or(extra.is_custodial_wallet)
            .unwrap_or(false);
        let (signer, role) = if is_custodial {
            let wallet = codec::extract_payer(&transaction)
                .or(extra.fee_payer)
                .ok_or_else(|| SettleError::InvalidPayload("no payer wallet".to_string()))?;
            let client = self
                .custodian
                .clone()
                .ok_or(SettleError::NoCustodian(wallet))?;
            let capabilities = SignerCapabilities::new().with_custodian(client, wallet);
            (PayerSigner::resolve(capabilities)?, FeePayerRole::Wallet)
        } else {
            let fee_payer = self.provider().fee_payer_signer();
            let capabilities = SignerCapabilities::new().with_partial(fee_payer);
            (
                PayerSigner::resolve(capabilities)?,
                FeePayerRole::Sponsor(self.provider().pubkey()),
            )
        };

        let verified = self
            .verify(&transaction, requirements, role, trace_id)
            .await?;
        let result = self.engine.settle(&transaction, Some(&signer), trace_id).await;

        let job_id = if result.success && !is_custodial && extra.trustless == Some(true) {
            self.register_job(&result, &verified, requirements, trace_id)
                .await
        } else {
            None
        };

        Ok(v1::SettleResponse {
            success: result.success,
            error_reason: result.error_reason,
            payer: result.payer.or(Some(verified.payer)).map(|p| p.to_string()),
            transaction: result.transaction,
            network: self.network(),
            job_id,
        })
    }

    async fn verify(
        &self,
        transaction: &PaymentTransaction,
        requirements: &PaymentRequirements,
        role: FeePayerRole,
        trace_id: &TraceId,
    ) -> Result<VerifiedTransfer, SettleError> {
        let requirement = TransferRequirement {
            asset: &requirements.asset,
            pay_to: &requirements.pay_to,
            amount: requirements.max_amount_required.inner(),
        };
        let result =
            verify_transaction(self.provider(), transaction, &requirement, role, &self.config)
                .await;
        let outcome = match &result {
            Ok(verified) => Outcome::Info(verified.payer.to_string()),
            Err(error) => Outcome::Failed(error.to_string()),
        };
        self.observe(trace_id, Stage::Verify, outcome);
        Ok(result?)
    }

    /// Registers the confirmed payment as a job. Failures are logged and never fail the
    /// settlement.
    async fn register_job(
        &self,
        result: &SettlementResult,
        verified: &VerifiedTransfer,
        requirements: &PaymentRequirements,
        trace_id: &TraceId,
    ) -> Option<String> {
        let Some(program) = self.trustless.as_ref() else {
            tracing::warn!(
                trace_id = trace_id.as_str(),
                "Trustless settlement requested but no program is configured"
            );
            return None;
        };
        let signature = result
            .transaction
            .as_deref()
            .and_then(|s| Signature::from_str(s).ok())?;
        let registration = JobRegistration::new(
            *requirements.pay_to.pubkey(),
            *verified.payer.pubkey(),
            &signature,
            requirements.max_amount_required.inner(),
        );
        match program
            .register_job(&self.engine, &registration, trace_id)
            .await
        {
            Ok(job_record) => Some(job_record.to_string()),
            Err(error) => {
                tracing::warn!(
                    trace_id = trace_id.as_str(),
                    error = %error,
                    "Job registration failed"
                );
                None
            }
        }
    }

    pub async fn simulate(
        &self,
        request: &v1::SimulateRequest,
        trace_id: &TraceId,
    ) -> Result<v1::SimulateResponse, SettleError> {
        if !self.serves(&request.network) {
            return Err(SettleError::UnsupportedNetwork(request.network.clone()));
        }
        let transaction = codec::decode(&request.transaction)?;
        let simulation = self.engine.simulate(&transaction, trace_id).await?;
        Ok(v1::SimulateResponse {
            success: simulation.success,
            logs: simulation.logs,
            units_consumed: simulation.units_consumed,
            error: simulation.error,
        })
    }

    /// Reads a job record; `Ok(None)` when trustless registration is not configured or the
    /// record does not exist on this cluster.
    pub async fn job(&self, job_id: &Pubkey) -> Result<Option<JobRecord>, TrustlessError> {
        let Some(program) = self.trustless.as_ref() else {
            return Ok(None);
        };
        match program.fetch_job_record(self.provider(), job_id).await {
            Ok(record) => Ok(Some(record)),
            Err(TrustlessError::NotFound(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub fn supported(&self) -> proto::SupportedResponse {
        let chain_id = self.provider().chain_id();
        let extra = serde_json::to_value(SupportedPaymentKindExtra {
            fee_payer: self.provider().fee_payer(),
        })
        .ok();
        let kinds = vec![proto::SupportedPaymentKind {
            x402_version: v1::X402Version1.into(),
            scheme: ExactScheme.to_string(),
            network: self.network(),
            extra,
        }];
        let signers = HashMap::from([(chain_id, self.provider().signer_addresses())]);
        proto::SupportedResponse {
            kinds,
            extensions: Vec::new(),
            signers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::keypair;
    use crate::custodial::retry::tests::RecordingSleeper;
    use crate::testing::RecordingObserver;
    use crate::testing::{MockProvider, Watch};
    use crate::v1_solana_exact::prepare::tests::{MINT, funded_provider};
    use async_trait::async_trait;
    use serde_json::json;
    use solana_keypair::Keypair;
    use solana_signer::Signer;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use x402_types::proto::SettleErrorReason;

    const PAY_TO: Pubkey = Pubkey::new_from_array([6; 32]);

    struct Fixed(bool);

    #[async_trait]
    impl WalletClassifier for Fixed {
        async fn is_custodial(&self, _wallet: &Address) -> bool {
            self.0
        }
    }

    fn requirements(extra: Option<serde_json::Value>) -> v1::PaymentRequirements {
        serde_json::from_value(json!({
            "scheme": "exact",
            "network": "solana-devnet",
            "maxAmountRequired": "1000",
            "resource": "https://api.example.com/weather",
            "payTo": PAY_TO.to_string(),
            "maxTimeoutSeconds": 60,
            "asset": MINT.to_string(),
            "extra": extra,
        }))
        .unwrap()
    }

    fn prepare_request(wallet: &Keypair) -> v1::PrepareRequest {
        v1::PrepareRequest {
            payment_requirements: requirements(None),
            wallet_address: wallet.pubkey().to_string(),
            trustless: None,
        }
    }

    fn settle_request(
        transaction: String,
        requirements: v1::PaymentRequirements,
        is_custodial_wallet: Option<bool>,
    ) -> v1::SettleRequest {
        serde_json::from_value(json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana-devnet",
                "payload": { "transaction": transaction }
            },
            "paymentRequirements": requirements,
            "isCustodialWallet": is_custodial_wallet,
        }))
        .unwrap()
    }

    fn facilitator(provider: MockProvider, custodial: bool) -> SolanaExactFacilitator<MockProvider> {
        SolanaExactFacilitator::new(provider).with_classifier(Arc::new(Fixed(custodial)))
    }

    /// Prepares for `wallet`, then signs the result with it.
    async fn prepared_and_signed(
        facilitator: &SolanaExactFacilitator<MockProvider>,
        wallet: &Keypair,
    ) -> (String, v1::PaymentRequirements) {
        let trace_id = TraceId::new();
        let prepared = facilitator
            .prepare(&prepare_request(wallet), &trace_id)
            .await
            .unwrap();
        let tx = codec::decode(&prepared.transaction).unwrap();
        let signatures = crate::signer::TransactionPartialSigner::sign_partial(wallet, &tx)
            .await
            .unwrap();
        let signed = crate::signer::merge(&tx, &signatures).unwrap();
        (codec::encode(&signed).unwrap(), prepared.payment_requirements)
    }

    #[tokio::test]
    async fn test_prepare_uses_facilitator_fee_payer_for_self_signing_wallet() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), false);
        let response = facilitator
            .prepare(&prepare_request(&wallet), &TraceId::new())
            .await
            .unwrap();
        let extra = response.payment_requirements.extra.unwrap();
        assert_eq!(extra["feePayer"], json!(facilitator.provider().pubkey().to_string()));
        assert_eq!(extra["isCustodialWallet"], json!(false));
        assert_eq!(extra["trustless"], json!(false));
        let tx = codec::decode(&response.transaction).unwrap();
        assert_eq!(tx.fee_payer(), facilitator.provider().fee_payer());
        assert!(!tx.is_fully_signed());
    }

    #[tokio::test]
    async fn test_prepare_uses_wallet_as_fee_payer_when_custodial() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), true);
        let mut request = prepare_request(&wallet);
        request.trustless = Some(true);
        let response = facilitator.prepare(&request, &TraceId::new()).await.unwrap();
        let extra = response.payment_requirements.extra.unwrap();
        assert_eq!(extra["feePayer"], json!(wallet.pubkey().to_string()));
        assert_eq!(extra["isCustodialWallet"], json!(true));
        assert_eq!(extra["trustless"], json!(true));
        let tx = codec::decode(&response.transaction).unwrap();
        assert_eq!(tx.required_signers(), &[wallet.pubkey()]);
    }

    #[tokio::test]
    async fn test_prepare_rejects_foreign_network() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), false);
        let mut request = prepare_request(&wallet);
        request.payment_requirements.network = "solana".to_string();
        let result = facilitator.prepare(&request, &TraceId::new()).await;
        assert!(matches!(result, Err(PrepareError::UnsupportedNetwork(_))));
    }

    #[tokio::test]
    async fn test_settle_confirms_cosigned_transfer() {
        let wallet = keypair(2);
        let mut provider = funded_provider(&wallet.pubkey(), &PAY_TO);
        provider.confirmation = Watch::After(Duration::from_millis(5));
        let observer = Arc::new(RecordingObserver::default());
        let facilitator = facilitator(provider, false).with_observer(observer.clone());
        let (transaction, requirements) = prepared_and_signed(&facilitator, &wallet).await;

        let response = facilitator
            .settle(&settle_request(transaction, requirements, None), &TraceId::new())
            .await
            .unwrap();
        assert!(response.success, "{response:?}");
        assert_eq!(response.payer, Some(wallet.pubkey().to_string()));
        assert_eq!(response.network, "solana-devnet");
        assert_eq!(response.job_id, None);
        let sent = facilitator.provider().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(response.transaction, Some(sent[0].signatures[0].to_string()));
        assert!(observer.stages().contains(&Stage::Verify));
    }

    #[tokio::test]
    async fn test_settle_reports_expired_blockhash() {
        let wallet = keypair(2);
        let mut provider = funded_provider(&wallet.pubkey(), &PAY_TO);
        provider.expiry = Watch::After(Duration::from_millis(5));
        let facilitator = facilitator(provider, false);
        let (transaction, requirements) = prepared_and_signed(&facilitator, &wallet).await;

        let response = facilitator
            .settle(&settle_request(transaction, requirements, None), &TraceId::new())
            .await
            .unwrap();
        assert!(!response.success);
        assert_eq!(response.error_reason, Some(SettleErrorReason::BlockhashExpired));
        assert!(response.transaction.is_some());
    }

    #[tokio::test]
    async fn test_settle_rejects_amount_mismatch_before_submission() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), false);
        let (transaction, mut requirements) = prepared_and_signed(&facilitator, &wallet).await;
        requirements.max_amount_required = "999".to_string();

        let error = facilitator
            .settle(&settle_request(transaction, requirements, None), &TraceId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            SettleError::Verification(SolanaExactError::InvalidPaymentAmount)
        ));
        assert_eq!(error.reason(), "InvalidPaymentAmount");
        assert!(facilitator.provider().sent().is_empty());
    }

    #[tokio::test]
    async fn test_settle_rejects_garbage_payload() {
        let facilitator = facilitator(MockProvider::new(Watch::Never, Watch::Never), false);
        let error = facilitator
            .settle(
                &settle_request("not base64!".to_string(), requirements(None), None),
                &TraceId::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.reason(), "InvalidPayload");
    }

    #[tokio::test]
    async fn test_custodial_settle_returns_custodian_signature() {
        let server = MockServer::start().await;
        let wallet = keypair(2);
        Mock::given(method("POST"))
            .and(path(format!("/wallets/{}/transactions", wallet.pubkey())))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "tx-1", "status": "pending"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/wallets/{}/transactions/tx-1", wallet.pubkey())))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "onChain": { "signature": "custodian-signature" }
            })))
            .mount(&server)
            .await;
        let client = CustodialSigningClient::new(&Url::parse(&server.uri()).unwrap(), Some("key"))
            .unwrap()
            .with_sleeper(Arc::new(RecordingSleeper::default()));
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), true)
            .with_custodian(Arc::new(client));

        let prepared = facilitator
            .prepare(&prepare_request(&wallet), &TraceId::new())
            .await
            .unwrap();
        let response = facilitator
            .settle(
                &settle_request(prepared.transaction, prepared.payment_requirements, None),
                &TraceId::new(),
            )
            .await
            .unwrap();
        assert!(response.success, "{response:?}");
        assert_eq!(response.transaction, Some("custodian-signature".to_string()));
        assert_eq!(response.payer, Some(wallet.pubkey().to_string()));
        assert!(facilitator.provider().sent().is_empty());
    }

    #[tokio::test]
    async fn test_custodial_settle_without_custodian_is_rejected() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), true);
        let prepared = facilitator
            .prepare(&prepare_request(&wallet), &TraceId::new())
            .await
            .unwrap();
        let error = facilitator
            .settle(
                &settle_request(prepared.transaction, prepared.payment_requirements, Some(true)),
                &TraceId::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, SettleError::NoCustodian(_)));
        assert_eq!(error.reason(), "UnsupportedSigner");
    }

    #[tokio::test]
    async fn test_trustless_settle_registers_job() {
        let wallet = keypair(2);
        let mut provider = funded_provider(&wallet.pubkey(), &PAY_TO);
        provider.confirmation = Watch::After(Duration::from_millis(5));
        let program = TrustlessProgram::default();
        let program_id = *program.program_id();
        let facilitator = facilitator(provider, false).with_trustless(program);
        let (transaction, requirements) = prepared_and_signed(&facilitator, &wallet).await;
        let requirements = requirements.with_extra_fields(
            json!({ "trustless": true }).as_object().cloned().unwrap(),
        );

        let response = facilitator
            .settle(&settle_request(transaction, requirements, None), &TraceId::new())
            .await
            .unwrap();
        assert!(response.success);
        assert!(response.job_id.is_some());
        let sent = facilitator.provider().sent();
        assert_eq!(sent.len(), 2);
        let registration = &sent[1];
        let keys = registration.message.static_account_keys();
        assert!(keys.contains(&program_id));
    }

    #[tokio::test]
    async fn test_simulate_reports_units() {
        let wallet = keypair(2);
        let facilitator = facilitator(funded_provider(&wallet.pubkey(), &PAY_TO), false);
        let prepared = facilitator
            .prepare(&prepare_request(&wallet), &TraceId::new())
            .await
            .unwrap();
        let response = facilitator
            .simulate(
                &v1::SimulateRequest {
                    network: "solana-devnet".to_string(),
                    transaction: prepared.transaction,
                },
                &TraceId::new(),
            )
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.units_consumed, Some(1_500));
    }

    #[tokio::test]
    async fn test_supported_lists_fee_payer() {
        let facilitator = facilitator(MockProvider::new(Watch::Never, Watch::Never), false);
        let supported = facilitator.supported();
        assert_eq!(supported.kinds.len(), 1);
        assert_eq!(supported.kinds[0].network, "solana-devnet");
        assert_eq!(supported.kinds[0].scheme, "exact");
        assert_eq!(
            supported.kinds[0].extra,
            Some(json!({ "feePayer": facilitator.provider().pubkey().to_string() }))
        );
    }

    #[tokio::test]
    async fn test_job_lookup_without_program_is_none() {
        let facilitator = facilitator(MockProvider::new(Watch::Never, Watch::Never), false);
        let job = facilitator.job(&Pubkey::new_from_array([1; 32])).await.unwrap();
        assert_eq!(job, None);
    }
}
