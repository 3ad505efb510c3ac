//! Protocol version 1 (V1) types for x402.
//!
//! V1 identifies networks by name (`"solana"`, `"solana-devnet"`). Besides the payment
//! requirements and payloads shared with every x402 facilitator, this module defines the
//! bodies of the prepare and settle endpoints:
//!
//! - [`PrepareRequest`] / [`PrepareResponse`] - Build an unsigned transfer for a wallet
//! - [`SettleRequest`] / [`SettleResponse`] - Submit a signed transfer and await the outcome
//! - [`SimulateRequest`] / [`SimulateResponse`] - Dry-run a transaction against the node

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::proto::SettleErrorReason;
use crate::proto::util::U64String;

/// Version marker for x402 protocol version 1. Serializes as the integer `1`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct X402Version1;

impl X402Version1 {
    pub const VALUE: u8 = 1;
}

impl PartialEq<u8> for X402Version1 {
    fn eq(&self, other: &u8) -> bool {
        *other == Self::VALUE
    }
}

impl From<X402Version1> for u8 {
    fn from(_: X402Version1) -> Self {
        X402Version1::VALUE
    }
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let num = u8::deserialize(deserializer)?;
        if num == Self::VALUE {
            Ok(X402Version1)
        } else {
            Err(serde::de::Error::custom(format!(
                "expected version {}, got {}",
                Self::VALUE,
                num
            )))
        }
    }
}

impl Display for X402Version1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Self::VALUE)
    }
}

/// A payment authorization produced by the buyer.
///
/// # Type Parameters
///
/// - `TScheme` - The scheme identifier type (default: `String`)
/// - `TPayload` - The scheme-specific payload type (default: raw JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload<TScheme = String, TPayload = Box<serde_json::value::RawValue>> {
    pub x402_version: X402Version1,
    pub scheme: TScheme,
    /// The network name (e.g., "solana-devnet").
    pub network: String,
    pub payload: TPayload,
}

/// Payment requirements set by the seller.
///
/// # Type Parameters
///
/// - `TScheme` - The scheme identifier type (default: `String`)
/// - `TAmount` - The amount type (default: `String`)
/// - `TAddress` - The address type (default: `String`)
/// - `TExtra` - Scheme-specific extra data type (default: `serde_json::Value`)
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements<
    TScheme = String,
    TAmount = String,
    TAddress = String,
    TExtra = serde_json::Value,
> {
    pub scheme: TScheme,
    pub network: String,
    /// Amount in the asset's smallest unit.
    pub max_amount_required: TAmount,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
    pub pay_to: TAddress,
    pub max_timeout_seconds: u64,
    /// Token mint address.
    pub asset: TAddress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<TExtra>,
}

impl PaymentRequirements {
    /// Parses the string-typed requirements into scheme-specific types.
    ///
    /// Returns `None` when any typed field fails to parse. A missing or unparseable
    /// `extra` becomes `None` rather than failing the whole conversion.
    pub fn as_concrete<
        TScheme: FromStr,
        TAmount: FromStr,
        TAddress: FromStr,
        TExtra: DeserializeOwned,
    >(
        &self,
    ) -> Option<PaymentRequirements<TScheme, TAmount, TAddress, TExtra>> {
        let scheme = self.scheme.parse::<TScheme>().ok()?;
        let max_amount_required = self.max_amount_required.parse::<TAmount>().ok()?;
        let pay_to = self.pay_to.parse::<TAddress>().ok()?;
        let asset = self.asset.parse::<TAddress>().ok()?;
        let extra = self
            .extra
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Some(PaymentRequirements {
            scheme,
            network: self.network.clone(),
            max_amount_required,
            resource: self.resource.clone(),
            description: self.description.clone(),
            mime_type: self.mime_type.clone(),
            output_schema: self.output_schema.clone(),
            pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            asset,
            extra,
        })
    }

    /// Returns a copy with `fields` merged into `extra`, overwriting existing keys.
    ///
    /// A non-object `extra` is replaced by an object holding only `fields`.
    pub fn with_extra_fields(&self, fields: serde_json::Map<String, serde_json::Value>) -> Self {
        let mut extra = match &self.extra {
            Some(serde_json::Value::Object(existing)) => existing.clone(),
            _ => serde_json::Map::new(),
        };
        extra.extend(fields);
        Self {
            extra: Some(serde_json::Value::Object(extra)),
            ..self.clone()
        }
    }
}

/// Body of `POST /prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub payment_requirements: PaymentRequirements,
    /// The buyer's wallet; owner of the source token account.
    pub wallet_address: String,
    /// Requests on-chain job registration after settlement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trustless: Option<bool>,
}

/// Response of `POST /prepare`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    /// Base64-encoded unsigned versioned transaction.
    pub transaction: String,
    /// Requirements enriched with `extra.feePayer`, `extra.isCustodialWallet` and `extra.trustless`.
    pub payment_requirements: PaymentRequirements,
}

/// Body of `POST /settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest<TPayload = PaymentPayload, TRequirements = PaymentRequirements> {
    pub x402_version: X402Version1,
    pub payment_payload: TPayload,
    pub payment_requirements: TRequirements,
    /// Overrides `paymentRequirements.extra.isCustodialWallet` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_custodial_wallet: Option<bool>,
}

impl<TPayload, TRequirements> SettleRequest<TPayload, TRequirements>
where
    Self: DeserializeOwned,
{
    /// Re-reads a generic settle request with scheme-specific payload and requirement types.
    pub fn from_generic(request: &SettleRequest) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_value(request)?;
        serde_json::from_value(json)
    }
}

/// Response of `POST /settle`.
///
/// Settlement outcomes, failed ones included, are always delivered with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<SettleErrorReason>,
    /// Authority observed in the transfer instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    /// On-chain signature, or the best-effort signature when the outcome is unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    pub network: String,
    /// Job record address when trustless registration succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl SettleResponse {
    pub fn failure(reason: SettleErrorReason, network: String) -> Self {
        Self {
            success: false,
            error_reason: Some(reason),
            payer: None,
            transaction: None,
            network,
            job_id: None,
        }
    }
}

/// Body of `POST /simulate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub network: String,
    /// Base64-encoded versioned transaction; signatures are not verified.
    pub transaction: String,
}

/// Response of `POST /simulate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub success: bool,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units_consumed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response of `GET /jobs/{jobId}`: a decoded on-chain job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: String,
    pub client: String,
    pub agent: String,
    /// Reference derived from the settlement signature.
    pub payment_tx: String,
    pub payment_amount: U64String,
    /// Unix timestamp of registration.
    pub created_at: i64,
    pub network: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn requirements_json() -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": "solana-devnet",
            "maxAmountRequired": "1000",
            "resource": "https://api.example.com/weather",
            "description": "Weather",
            "mimeType": "application/json",
            "payTo": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin",
            "maxTimeoutSeconds": 60,
            "asset": "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU",
            "extra": { "memo": "keep" }
        })
    }

    #[test]
    fn with_extra_fields_merges_without_touching_original() {
        let requirements: PaymentRequirements = serde_json::from_value(requirements_json()).unwrap();
        let mut fields = serde_json::Map::new();
        fields.insert("feePayer".into(), json!("FeePayer111"));
        fields.insert("memo".into(), json!("replaced"));
        let enriched = requirements.with_extra_fields(fields);
        assert_eq!(
            enriched.extra,
            Some(json!({ "memo": "replaced", "feePayer": "FeePayer111" }))
        );
        assert_eq!(requirements.extra, Some(json!({ "memo": "keep" })));
    }

    #[test]
    fn settle_request_reads_custodial_override() {
        let body = json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana-devnet",
                "payload": { "transaction": "AAAA" }
            },
            "paymentRequirements": requirements_json(),
            "isCustodialWallet": true
        });
        let request: SettleRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.is_custodial_wallet, Some(true));
        assert_eq!(request.payment_payload.network, "solana-devnet");
    }

    #[test]
    fn settle_request_rejects_other_versions() {
        let body = json!({
            "x402Version": 2,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": "solana-devnet",
                "payload": {}
            },
            "paymentRequirements": requirements_json()
        });
        assert!(serde_json::from_value::<SettleRequest>(body).is_err());
    }

    #[test]
    fn settle_response_skips_absent_fields() {
        let response = SettleResponse::failure(
            SettleErrorReason::BlockhashExpired,
            "solana-devnet".to_string(),
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            json!({
                "success": false,
                "errorReason": "BlockhashExpired",
                "network": "solana-devnet"
            })
        );
    }
}
