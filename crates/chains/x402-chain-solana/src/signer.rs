//! Signing strategies for payment transactions.
//!
//! A payer signer comes in one of three shapes, fixed once when the request is accepted:
//!
//! - [`PayerSigner::Modifying`] may rewrite the transaction; its output is authoritative.
//! - [`PayerSigner::Partial`] only contributes its own signatures, merged into a new value.
//! - [`PayerSigner::Custodial`] hands the transaction to a custodian that signs and submits it.

use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_signer::Signer;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::chain::Address;
use crate::codec::{CodecError, PaymentTransaction};
use crate::custodial::{CustodialError, CustodialSigningClient};

/// Signatures keyed by the signing account.
pub type SignatureMap = BTreeMap<Pubkey, Signature>;

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("Signer supports neither transaction modification nor partial signing")]
    UnsupportedSigner,
    #[error("{0} is not a required signer of the transaction")]
    NotARequiredSigner(Pubkey),
    #[error("Can not sign transaction: {0}")]
    Signing(String),
    #[error(transparent)]
    Custodial(#[from] CustodialError),
}

impl From<CodecError> for SignerError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::NotARequiredSigner(pubkey) => SignerError::NotARequiredSigner(pubkey),
            other => SignerError::Signing(other.to_string()),
        }
    }
}

/// A signer that may rewrite the transaction before signing it.
#[async_trait::async_trait]
pub trait TransactionModifyingSigner: Send + Sync {
    fn address(&self) -> Pubkey;

    async fn modify_and_sign(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<PaymentTransaction, SignerError>;
}

/// A signer that only produces its own signatures over the unchanged message.
#[async_trait::async_trait]
pub trait TransactionPartialSigner: Send + Sync {
    fn address(&self) -> Pubkey;

    async fn sign_partial(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<SignatureMap, SignerError>;
}

#[async_trait::async_trait]
impl TransactionPartialSigner for Keypair {
    fn address(&self) -> Pubkey {
        self.pubkey()
    }

    async fn sign_partial(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<SignatureMap, SignerError> {
        let pubkey = self.pubkey();
        if !transaction.required_signers().contains(&pubkey) {
            return Err(SignerError::NotARequiredSigner(pubkey));
        }
        let signature = self
            .try_sign_message(&transaction.message_bytes())
            .map_err(|e| SignerError::Signing(e.to_string()))?;
        Ok(SignatureMap::from([(pubkey, signature)]))
    }
}

/// Overlays `signatures` onto the transaction's signature map, new entries winning.
///
/// Returns a new transaction; merging the same map twice gives the same result as merging
/// it once.
pub fn merge(
    transaction: &PaymentTransaction,
    signatures: &SignatureMap,
) -> Result<PaymentTransaction, SignerError> {
    Ok(transaction.with_signatures(signatures)?)
}

/// What a signer declares it can do. Resolved once into a [`PayerSigner`].
#[derive(Default, Clone)]
pub struct SignerCapabilities {
    modifying: Option<Arc<dyn TransactionModifyingSigner>>,
    partial: Option<Arc<dyn TransactionPartialSigner>>,
    custodial: Option<(Arc<CustodialSigningClient>, Address)>,
}

impl SignerCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_modifying(mut self, signer: Arc<dyn TransactionModifyingSigner>) -> Self {
        self.modifying = Some(signer);
        self
    }

    pub fn with_partial(mut self, signer: Arc<dyn TransactionPartialSigner>) -> Self {
        self.partial = Some(signer);
        self
    }

    pub fn with_custodian(mut self, client: Arc<CustodialSigningClient>, wallet: Address) -> Self {
        self.custodial = Some((client, wallet));
        self
    }
}

/// Outcome of running a [`PayerSigner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningOutcome {
    /// The transaction carries new signatures and still has to be submitted.
    Signed(PaymentTransaction),
    /// A custodian signed and submitted it; the value is the on-chain signature.
    Submitted { signature: String },
}

#[derive(Clone)]
pub enum PayerSigner {
    Modifying(Arc<dyn TransactionModifyingSigner>),
    Partial(Arc<dyn TransactionPartialSigner>),
    Custodial {
        client: Arc<CustodialSigningClient>,
        wallet: Address,
    },
}

impl std::fmt::Debug for PayerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayerSigner::Modifying(signer) => f
                .debug_tuple("Modifying")
                .field(&signer.address())
                .finish(),
            PayerSigner::Partial(signer) => {
                f.debug_tuple("Partial").field(&signer.address()).finish()
            }
            PayerSigner::Custodial { wallet, .. } => f
                .debug_struct("Custodial")
                .field("wallet", wallet)
                .finish(),
        }
    }
}

impl PayerSigner {
    /// Picks the strategy: modifying over partial, then custodial.
    pub fn resolve(capabilities: SignerCapabilities) -> Result<Self, SignerError> {
        if let Some(signer) = capabilities.modifying {
            Ok(PayerSigner::Modifying(signer))
        } else if let Some(signer) = capabilities.partial {
            Ok(PayerSigner::Partial(signer))
        } else if let Some((client, wallet)) = capabilities.custodial {
            Ok(PayerSigner::Custodial { client, wallet })
        } else {
            Err(SignerError::UnsupportedSigner)
        }
    }

    pub fn address(&self) -> Pubkey {
        match self {
            PayerSigner::Modifying(signer) => signer.address(),
            PayerSigner::Partial(signer) => signer.address(),
            PayerSigner::Custodial { wallet, .. } => *wallet.pubkey(),
        }
    }

    pub async fn sign(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<SigningOutcome, SignerError> {
        match self {
            PayerSigner::Modifying(signer) => {
                let signed = signer.modify_and_sign(transaction).await?;
                Ok(SigningOutcome::Signed(signed))
            }
            PayerSigner::Partial(signer) => {
                let signatures = signer.sign_partial(transaction).await?;
                let merged = merge(transaction, &signatures)?;
                Ok(SigningOutcome::Signed(merged))
            }
            PayerSigner::Custodial { client, wallet } => {
                let signature = client.sign_and_submit(wallet, transaction).await?;
                Ok(SigningOutcome::Submitted { signature })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::{keypair, transfer_transaction};

    fn sample() -> (Keypair, Keypair, PaymentTransaction) {
        let fee_payer = keypair(1);
        let payer = keypair(2);
        let tx = transfer_transaction(
            &fee_payer.pubkey(),
            &payer.pubkey(),
            &Pubkey::new_from_array([5; 32]),
            &Pubkey::new_from_array([6; 32]),
            42,
        );
        (fee_payer, payer, tx)
    }

    /// Replaces the transaction wholesale with a pre-built one.
    struct Replacing(PaymentTransaction, Pubkey);

    #[async_trait::async_trait]
    impl TransactionModifyingSigner for Replacing {
        fn address(&self) -> Pubkey {
            self.1
        }

        async fn modify_and_sign(
            &self,
            _transaction: &PaymentTransaction,
        ) -> Result<PaymentTransaction, SignerError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_resolve_prefers_modifying() {
        let (_, payer, tx) = sample();
        let payer = Arc::new(payer);
        let capabilities = SignerCapabilities::new()
            .with_partial(payer.clone())
            .with_modifying(Arc::new(Replacing(tx, payer.pubkey())));
        assert!(matches!(
            PayerSigner::resolve(capabilities),
            Ok(PayerSigner::Modifying(_))
        ));
    }

    #[test]
    fn test_resolve_without_capability_fails() {
        assert!(matches!(
            PayerSigner::resolve(SignerCapabilities::new()),
            Err(SignerError::UnsupportedSigner)
        ));
    }

    #[tokio::test]
    async fn test_modifying_output_is_authoritative() {
        let (fee_payer, payer, tx) = sample();
        let replacement = transfer_transaction(
            &fee_payer.pubkey(),
            &payer.pubkey(),
            &Pubkey::new_from_array([5; 32]),
            &Pubkey::new_from_array([6; 32]),
            43,
        );
        let signer = PayerSigner::Modifying(Arc::new(Replacing(
            replacement.clone(),
            payer.pubkey(),
        )));
        let outcome = signer.sign(&tx).await.unwrap();
        assert_eq!(outcome, SigningOutcome::Signed(replacement));
    }

    #[tokio::test]
    async fn test_partial_signature_is_merged_into_new_value() {
        let (fee_payer, payer, tx) = sample();
        let signer = PayerSigner::Partial(Arc::new(payer));
        let SigningOutcome::Signed(signed) = signer.sign(&tx).await.unwrap() else {
            panic!("expected a signed transaction");
        };
        assert!(tx.signatures().values().all(Option::is_none));
        let signatures = signed.signatures();
        assert!(signatures[&signer.address()].is_some());
        assert!(signatures[&fee_payer.pubkey()].is_none());
        assert!(!signed.is_fully_signed());
    }

    #[tokio::test]
    async fn test_merge_is_idempotent_and_new_entries_win() {
        let (fee_payer, payer, tx) = sample();
        let first = payer.sign_partial(&tx).await.unwrap();
        let once = merge(&tx, &first).unwrap();
        let twice = merge(&once, &first).unwrap();
        assert_eq!(once, twice);

        let replacement = SignatureMap::from([(payer.pubkey(), Signature::from([9u8; 64]))]);
        let replaced = merge(&once, &replacement).unwrap();
        assert_eq!(
            replaced.signatures()[&payer.pubkey()],
            Some(Signature::from([9u8; 64]))
        );

        let fee_payer_signatures = fee_payer.sign_partial(&once).await.unwrap();
        let full = merge(&once, &fee_payer_signatures).unwrap();
        assert!(full.is_fully_signed());
    }

    #[tokio::test]
    async fn test_partial_signer_outside_required_set_is_rejected() {
        let (_, _, tx) = sample();
        let stranger = keypair(9);
        assert!(matches!(
            stranger.sign_partial(&tx).await,
            Err(SignerError::NotARequiredSigner(_))
        ));
    }
}
