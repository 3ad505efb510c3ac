//! HTTP endpoints implemented by the x402 **facilitator**.
//!
//! - `POST /prepare` builds an unsigned payment transaction for a wallet
//! - `POST /settle` completes signing and settles a signed payment
//! - `POST /simulate` dry-runs a transaction
//! - `GET /jobs/{jobId}` reads a job registered after a trustless settlement
//! - `GET /supported` lists the payment kinds and fee payers of this facilitator
//! - `GET /health` liveness probe
//!
//! Requests rejected before anything reaches the chain get a 4xx with an
//! [`ErrorResponse`] body. Settlement outcomes, failed ones included, are always 200.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::Serialize;
use serde_json::json;
use tracing::instrument;
use x402_types::facilitator::Facilitator;
use x402_types::proto::ErrorResponse;
use x402_types::proto::v1;
use x402_types::util::TraceId;

use crate::facilitator_local::FacilitatorLocalError;
use crate::util::TraceIdLayer;

/// All facilitator endpoints, each request tagged with a fresh [`TraceId`].
pub fn routes<A>() -> Router<A>
where
    A: Facilitator<Error = FacilitatorLocalError> + Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/prepare", post(post_prepare::<A>))
        .route("/settle", post(post_settle::<A>))
        .route("/simulate", post(post_simulate::<A>))
        .route("/jobs/{job_id}", get(get_job::<A>))
        .route("/supported", get(get_supported::<A>))
        .route("/health", get(get_health))
        .layer(TraceIdLayer)
}

impl IntoResponse for FacilitatorLocalError {
    fn into_response(self) -> Response {
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = ErrorResponse::new(&self, Some(self.reason()));
        (status, Json(body)).into_response()
    }
}

fn body_for_log<T: Serialize>(body: &T) -> String {
    serde_json::to_string(body).unwrap_or_else(|_| "<can-not-serialize>".to_string())
}

/// `GET /health`
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// `GET /supported`: payment kinds and fee payer addresses per configured cluster.
#[instrument(skip_all)]
pub async fn get_supported<A>(State(facilitator): State<A>) -> Response
where
    A: Facilitator<Error = FacilitatorLocalError>,
{
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(supported)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// `POST /prepare`: builds the unsigned transfer the wallet has to sign.
///
/// The returned `paymentRequirements` carry `extra.feePayer`, `extra.isCustodialWallet` and
/// `extra.trustless`; clients pass them back unchanged to `/settle`.
#[instrument(skip_all)]
pub async fn post_prepare<A>(
    State(facilitator): State<A>,
    Extension(trace_id): Extension<TraceId>,
    Json(body): Json<v1::PrepareRequest>,
) -> Response
where
    A: Facilitator<Error = FacilitatorLocalError>,
{
    match facilitator.prepare(&body, &trace_id).await {
        Ok(prepared) => (StatusCode::OK, Json(prepared)).into_response(),
        Err(error) => {
            tracing::warn!(
                trace_id = trace_id.as_str(),
                error = ?error,
                body = %body_for_log(&body),
                "Preparation failed"
            );
            error.into_response()
        }
    }
}

/// `POST /settle`: settles a signed payment on-chain.
///
/// Responds 200 with a [`v1::SettleResponse`] whenever settlement was attempted, whether
/// or not it succeeded.
#[instrument(skip_all)]
pub async fn post_settle<A>(
    State(facilitator): State<A>,
    Extension(trace_id): Extension<TraceId>,
    Json(body): Json<v1::SettleRequest>,
) -> Response
where
    A: Facilitator<Error = FacilitatorLocalError>,
{
    match facilitator.settle(&body, &trace_id).await {
        Ok(settled) => {
            if !settled.success {
                tracing::info!(
                    trace_id = trace_id.as_str(),
                    reason = ?settled.error_reason,
                    transaction = ?settled.transaction,
                    "Settlement unsuccessful"
                );
            }
            (StatusCode::OK, Json(settled)).into_response()
        }
        Err(error) => {
            tracing::warn!(
                trace_id = trace_id.as_str(),
                error = ?error,
                body = %body_for_log(&body),
                "Settlement rejected"
            );
            error.into_response()
        }
    }
}

/// `POST /simulate`
#[instrument(skip_all)]
pub async fn post_simulate<A>(
    State(facilitator): State<A>,
    Extension(trace_id): Extension<TraceId>,
    Json(body): Json<v1::SimulateRequest>,
) -> Response
where
    A: Facilitator<Error = FacilitatorLocalError>,
{
    match facilitator.simulate(&body, &trace_id).await {
        Ok(simulated) => (StatusCode::OK, Json(simulated)).into_response(),
        Err(error) => {
            tracing::warn!(trace_id = trace_id.as_str(), error = ?error, "Simulation failed");
            error.into_response()
        }
    }
}

/// `GET /jobs/{jobId}`: 404 when no configured cluster holds the record.
#[instrument(skip_all)]
pub async fn get_job<A>(State(facilitator): State<A>, Path(job_id): Path<String>) -> Response
where
    A: Facilitator<Error = FacilitatorLocalError>,
{
    match facilitator.job(&job_id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                format!("Job {job_id} not found"),
                Some("NotFound"),
            )),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(job_id, error = ?error, "Job lookup failed");
            error.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use http::Request;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;
    use x402_chain_solana::v1_solana_exact::PrepareError;
    use x402_types::proto;
    use x402_types::proto::SettleErrorReason;

    /// Answers every call from canned values and records the trace ids it was given.
    #[derive(Default)]
    struct Canned {
        settle_success: bool,
        traces: Mutex<Vec<TraceId>>,
    }

    impl Facilitator for Canned {
        type Error = FacilitatorLocalError;

        async fn prepare(
            &self,
            request: &v1::PrepareRequest,
            trace_id: &TraceId,
        ) -> Result<v1::PrepareResponse, Self::Error> {
            self.traces.lock().unwrap().push(trace_id.clone());
            if request.wallet_address == "bad" {
                return Err(FacilitatorLocalError::Prepare(PrepareError::InvalidWallet(
                    "bad".to_string(),
                )));
            }
            Ok(v1::PrepareResponse {
                transaction: "AQID".to_string(),
                payment_requirements: request.payment_requirements.clone(),
            })
        }

        async fn settle(
            &self,
            request: &v1::SettleRequest,
            trace_id: &TraceId,
        ) -> Result<v1::SettleResponse, Self::Error> {
            self.traces.lock().unwrap().push(trace_id.clone());
            if request.payment_requirements.network != "solana-devnet" {
                return Err(FacilitatorLocalError::UnsupportedNetwork(
                    request.payment_requirements.network.clone(),
                ));
            }
            let mut response = v1::SettleResponse::failure(
                SettleErrorReason::BlockhashExpired,
                "solana-devnet".to_string(),
            );
            if self.settle_success {
                response.success = true;
                response.error_reason = None;
                response.transaction = Some("5ig".to_string());
            }
            Ok(response)
        }

        async fn simulate(
            &self,
            _request: &v1::SimulateRequest,
            _trace_id: &TraceId,
        ) -> Result<v1::SimulateResponse, Self::Error> {
            Ok(v1::SimulateResponse {
                success: true,
                logs: vec![],
                units_consumed: Some(1),
                error: None,
            })
        }

        async fn job(&self, job_id: &str) -> Result<Option<v1::JobResponse>, Self::Error> {
            match job_id {
                "missing" => Ok(None),
                "garbage" => Err(FacilitatorLocalError::InvalidJobId(job_id.to_string())),
                _ => Ok(Some(v1::JobResponse {
                    job_id: job_id.to_string(),
                    client: "client".to_string(),
                    agent: "agent".to_string(),
                    payment_tx: "ref".to_string(),
                    payment_amount: 1000u64.into(),
                    created_at: 1_700_000_000,
                    network: "solana-devnet".to_string(),
                })),
            }
        }

        async fn supported(&self) -> Result<proto::SupportedResponse, Self::Error> {
            Ok(proto::SupportedResponse {
                kinds: vec![],
                extensions: vec![],
                signers: HashMap::new(),
            })
        }
    }

    fn app(facilitator: Arc<Canned>) -> Router {
        routes::<Arc<Canned>>().with_state(facilitator)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn requirements(network: &str) -> serde_json::Value {
        json!({
            "scheme": "exact",
            "network": network,
            "maxAmountRequired": "1000",
            "payTo": "pay-to",
            "maxTimeoutSeconds": 60,
            "asset": "mint"
        })
    }

    fn settle_body(network: &str) -> serde_json::Value {
        json!({
            "x402Version": 1,
            "paymentPayload": {
                "x402Version": 1,
                "scheme": "exact",
                "network": network,
                "payload": { "transaction": "AQID" }
            },
            "paymentRequirements": requirements(network)
        })
    }

    #[tokio::test]
    async fn test_failed_settlement_is_still_200() {
        let response = app(Arc::new(Canned::default()))
            .oneshot(post_json("/settle", settle_body("solana-devnet")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["errorReason"], json!("BlockhashExpired"));
    }

    #[tokio::test]
    async fn test_successful_settlement() {
        let facilitator = Arc::new(Canned {
            settle_success: true,
            ..Default::default()
        });
        let response = app(facilitator)
            .oneshot(post_json("/settle", settle_body("solana-devnet")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["transaction"], json!("5ig"));
    }

    #[tokio::test]
    async fn test_pre_submission_fault_is_400_with_reason() {
        let response = app(Arc::new(Canned::default()))
            .oneshot(post_json("/settle", settle_body("base")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["reason"], json!("UnsupportedNetwork"));
        assert!(body["error"].as_str().unwrap().contains("base"));
    }

    #[tokio::test]
    async fn test_prepare_rejects_invalid_wallet() {
        let response = app(Arc::new(Canned::default()))
            .oneshot(post_json(
                "/prepare",
                json!({ "paymentRequirements": requirements("solana-devnet"), "walletAddress": "bad" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["reason"], json!("InvalidPayload"));
    }

    #[tokio::test]
    async fn test_each_request_gets_its_own_trace_id() {
        let facilitator = Arc::new(Canned::default());
        let body = json!({ "paymentRequirements": requirements("solana-devnet"), "walletAddress": "w" });
        for _ in 0..2 {
            let response = app(facilitator.clone())
                .oneshot(post_json("/prepare", body.clone()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        let traces = facilitator.traces.lock().unwrap().clone();
        assert_eq!(traces.len(), 2);
        assert_ne!(traces[0], traces[1]);
    }

    #[tokio::test]
    async fn test_job_lookup() {
        let app = app(Arc::new(Canned::default()));
        let found = app
            .clone()
            .oneshot(Request::get("/jobs/abc").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(found.status(), StatusCode::OK);
        assert_eq!(json_body(found).await["paymentAmount"], json!("1000"));

        let missing = app
            .clone()
            .oneshot(Request::get("/jobs/missing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let garbage = app
            .oneshot(Request::get("/jobs/garbage").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(garbage.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Arc::new(Canned::default()))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
