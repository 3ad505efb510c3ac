//! Submission and confirmation of payment transactions.
//!
//! After a transaction is submitted, two watchers race:
//!
//! - the confirmation watcher resolves once the signature reaches the configured commitment,
//! - the expiry watcher resolves once the transaction's recent blockhash is no longer valid.
//!
//! Whichever finishes first decides the result and the other one is dropped. An expired
//! blockhash means the transaction can never land, so the caller has to prepare and sign a
//! fresh one.

use solana_signature::Signature;
use std::sync::Arc;
use x402_types::proto::SettleErrorReason;
use x402_types::util::TraceId;

use crate::chain::{Address, SimulationOutcome, SolanaChainProviderError, SolanaChainProviderLike};
use crate::codec::{self, PaymentTransaction};
use crate::custodial::CustodialError;
use crate::observe::{Outcome, SettlementObserver, Stage, StageEvent, TracingObserver};
use crate::signer::{PayerSigner, SignerError, SigningOutcome};

/// Terminal result of one settlement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementResult {
    pub success: bool,
    /// On-chain signature; on failure, the best-effort signature when one is known.
    pub transaction: Option<String>,
    pub error_reason: Option<SettleErrorReason>,
    /// Transfer authority observed in the transaction.
    pub payer: Option<Address>,
}

impl SettlementResult {
    pub fn confirmed(signature: String, payer: Option<Address>) -> Self {
        Self {
            success: true,
            transaction: Some(signature),
            error_reason: None,
            payer,
        }
    }

    pub fn failed(
        reason: SettleErrorReason,
        signature: Option<String>,
        payer: Option<Address>,
    ) -> Self {
        Self {
            success: false,
            transaction: signature,
            error_reason: Some(reason),
            payer,
        }
    }
}

impl From<&SignerError> for SettleErrorReason {
    fn from(value: &SignerError) -> Self {
        match value {
            SignerError::UnsupportedSigner | SignerError::NotARequiredSigner(_) => {
                SettleErrorReason::UnsupportedSigner
            }
            SignerError::Signing(_) => SettleErrorReason::UnexpectedSettleError,
            SignerError::Custodial(error) => error.into(),
        }
    }
}

impl From<&CustodialError> for SettleErrorReason {
    fn from(value: &CustodialError) -> Self {
        match value {
            CustodialError::MissingSignature { .. } => SettleErrorReason::MissingSignature,
            CustodialError::TransactionFailed(_) => SettleErrorReason::CustodialTransactionFailed,
            CustodialError::Timeout { .. } => SettleErrorReason::CustodialTimeout,
            CustodialError::Transport(_) | CustodialError::InvalidApiKey => {
                SettleErrorReason::UnexpectedSettleError
            }
        }
    }
}

enum Race {
    Confirmed(Result<(), SolanaChainProviderError>),
    Expired(Result<(), SolanaChainProviderError>),
}

/// Drives signing, submission and the confirmation race.
///
/// Settlement never returns an error: every fault becomes a [`SettlementResult`] with a
/// reason code.
pub struct SettlementEngine<P> {
    provider: P,
    observer: Arc<dyn SettlementObserver>,
}

impl<P: std::fmt::Debug> std::fmt::Debug for SettlementEngine<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementEngine")
            .field("provider", &self.provider)
            .finish()
    }
}

impl<P> SettlementEngine<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SettlementObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn observer(&self) -> &Arc<dyn SettlementObserver> {
        &self.observer
    }

    fn observe(&self, trace_id: &TraceId, stage: Stage, outcome: Outcome) {
        self.observer
            .on_event(StageEvent::new(trace_id, stage, outcome));
    }
}

impl<P> SettlementEngine<P>
where
    P: SolanaChainProviderLike + Send + Sync,
{
    /// Completes signing with `signer` when one is given, then submits and confirms.
    ///
    /// A custodial signer submits on its own; its reported signature is the result.
    pub async fn settle(
        &self,
        transaction: &PaymentTransaction,
        signer: Option<&PayerSigner>,
        trace_id: &TraceId,
    ) -> SettlementResult {
        let payer = codec::extract_payer(transaction);
        let transaction = match signer {
            None => transaction.clone(),
            Some(signer) => match signer.sign(transaction).await {
                Ok(SigningOutcome::Signed(signed)) => {
                    self.observe(trace_id, Stage::Sign, Outcome::Ok);
                    signed
                }
                Ok(SigningOutcome::Submitted { signature }) => {
                    self.observe(trace_id, Stage::Sign, Outcome::Info(signature.clone()));
                    return SettlementResult::confirmed(signature, payer);
                }
                Err(error) => {
                    self.observe(trace_id, Stage::Sign, Outcome::Failed(error.to_string()));
                    return SettlementResult::failed((&error).into(), None, payer);
                }
            },
        };
        self.submit_and_confirm(&transaction, payer, trace_id).await
    }

    /// Submits a fully signed transaction and races confirmation against blockhash expiry.
    pub async fn submit_and_confirm(
        &self,
        transaction: &PaymentTransaction,
        payer: Option<Address>,
        trace_id: &TraceId,
    ) -> SettlementResult {
        let expected = transaction.signature().map(|s| s.to_string());
        if !transaction.is_fully_signed() {
            self.observe(
                trace_id,
                Stage::Submit,
                Outcome::Failed("transaction is not fully signed".to_string()),
            );
            return SettlementResult::failed(SettleErrorReason::InvalidPayload, expected, payer);
        }

        let signature = match self.provider.send(transaction.inner()).await {
            Ok(signature) => signature,
            Err(error) => {
                self.observe(trace_id, Stage::Submit, Outcome::Failed(error.to_string()));
                return SettlementResult::failed(
                    SettleErrorReason::UnexpectedSettleError,
                    expected,
                    payer,
                );
            }
        };
        self.observe(trace_id, Stage::Submit, Outcome::Info(signature.to_string()));

        let (reason, detail) = match self.race(&signature, transaction).await {
            Race::Confirmed(Ok(())) => {
                self.observe(trace_id, Stage::Confirm, Outcome::Info(signature.to_string()));
                return SettlementResult::confirmed(signature.to_string(), payer);
            }
            Race::Confirmed(Err(SolanaChainProviderError::InvalidTransaction(error))) => {
                (SettleErrorReason::TransactionFailed, error.to_string())
            }
            Race::Confirmed(Err(error)) | Race::Expired(Err(error)) => {
                (SettleErrorReason::UnexpectedSettleError, error.to_string())
            }
            Race::Expired(Ok(())) => (
                SettleErrorReason::BlockhashExpired,
                format!("blockhash {} expired", transaction.recent_blockhash()),
            ),
        };
        self.observe(trace_id, Stage::Confirm, Outcome::Failed(detail));
        SettlementResult::failed(reason, Some(signature.to_string()), payer)
    }

    async fn race(&self, signature: &Signature, transaction: &PaymentTransaction) -> Race {
        let blockhash = *transaction.recent_blockhash();
        tokio::select! {
            biased;
            confirmed = self.provider.watch_confirmation(signature) => Race::Confirmed(confirmed),
            expired = self.provider.watch_blockhash_expiry(&blockhash) => Race::Expired(expired),
        }
    }

    /// Read-only pre-flight against the latest blockhash, without signature verification.
    pub async fn simulate(
        &self,
        transaction: &PaymentTransaction,
        trace_id: &TraceId,
    ) -> Result<SimulationOutcome, SolanaChainProviderError> {
        let result = self.provider.simulate(transaction.inner()).await;
        let outcome = match &result {
            Ok(simulation) if simulation.success => Outcome::Ok,
            Ok(simulation) => Outcome::Failed(simulation.error.clone().unwrap_or_default()),
            Err(error) => Outcome::Failed(error.to_string()),
        };
        self.observe(trace_id, Stage::Simulate, outcome);
        result
    }
}
