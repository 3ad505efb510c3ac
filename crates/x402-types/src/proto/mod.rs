//! Protocol types for x402 prepare/settle messages.
//!
//! - [`v1`] - x402 version 1 payment requirements, payloads and the prepare/settle bodies
//! - [`SettleErrorReason`] - Machine-readable failure codes carried in settlement results
//! - [`SupportedResponse`] - Body of the facilitator's `/supported` endpoint
//! - [`ErrorResponse`] - Body returned for requests rejected before settlement starts
//!
//! All types serialize to JSON using camelCase field names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::chain::ChainId;

pub mod util;
pub mod v1;

/// Machine-readable reason attached to an unsuccessful settlement.
///
/// Serialized by variant name, e.g. `"BlockhashExpired"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettleErrorReason {
    /// Malformed transaction bytes or requirements. Client fault.
    InvalidPayload,
    /// The supplied signer offers no usable signing capability.
    UnsupportedSigner,
    /// The custodian reported success without an on-chain signature.
    MissingSignature,
    /// The custodian reported the transaction as failed.
    CustodialTransactionFailed,
    /// The custodian did not reach a terminal status within the polling budget.
    CustodialTimeout,
    /// The reference blockhash expired before confirmation. Re-prepare and re-sign.
    BlockhashExpired,
    /// Transport or runtime fault during submission or confirmation.
    UnexpectedSettleError,
    /// The transaction landed but its execution failed on-chain.
    TransactionFailed,
    /// No chain is configured for the requested network.
    UnsupportedNetwork,
}

impl SettleErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettleErrorReason::InvalidPayload => "InvalidPayload",
            SettleErrorReason::UnsupportedSigner => "UnsupportedSigner",
            SettleErrorReason::MissingSignature => "MissingSignature",
            SettleErrorReason::CustodialTransactionFailed => "CustodialTransactionFailed",
            SettleErrorReason::CustodialTimeout => "CustodialTimeout",
            SettleErrorReason::BlockhashExpired => "BlockhashExpired",
            SettleErrorReason::UnexpectedSettleError => "UnexpectedSettleError",
            SettleErrorReason::TransactionFailed => "TransactionFailed",
            SettleErrorReason::UnsupportedNetwork => "UnsupportedNetwork",
        }
    }
}

impl fmt::Display for SettleErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes a payment method supported by a facilitator.
///
/// ```json
/// { "x402Version": 1, "scheme": "exact", "network": "solana-devnet", "extra": { "feePayer": "..." } }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedPaymentKind {
    pub x402_version: u8,
    pub scheme: String,
    /// The network name for known networks, CAIP-2 id otherwise.
    pub network: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Response from a facilitator's `/supported` endpoint.
#[derive(Clone, Default, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedPaymentKind>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Fee payer addresses per chain.
    #[serde(default)]
    pub signers: HashMap<ChainId, Vec<String>>,
}

/// Body returned with a 4xx/5xx status when a request is rejected before settlement.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ErrorResponse {
    pub fn new<E: fmt::Display>(error: E, reason: Option<&str>) -> Self {
        Self {
            error: error.to_string(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_reason_serializes_by_variant_name() {
        let json = serde_json::to_string(&SettleErrorReason::BlockhashExpired).unwrap();
        assert_eq!(json, "\"BlockhashExpired\"");
        let parsed: SettleErrorReason = serde_json::from_str("\"CustodialTimeout\"").unwrap();
        assert_eq!(parsed, SettleErrorReason::CustodialTimeout);
        assert_eq!(
            SettleErrorReason::UnexpectedSettleError.to_string(),
            "UnexpectedSettleError"
        );
    }
}
