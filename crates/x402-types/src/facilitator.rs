//! Core trait for x402 facilitators that prepare, settle and simulate payments.

use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::proto;
use crate::proto::v1;
use crate::util::TraceId;

/// Asynchronous interface of an x402 prepare/settle facilitator.
///
/// Every operation receives the [`TraceId`] of the inbound request so that all stage
/// events of one payment can be correlated.
pub trait Facilitator {
    /// The error type returned by this facilitator.
    type Error: Debug + Display;

    /// Builds an unsigned transfer transaction for the wallet named in the request.
    fn prepare(
        &self,
        request: &v1::PrepareRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::PrepareResponse, Self::Error>> + Send;

    /// Completes signing, submits the transaction and waits for a definitive outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] only for faults detected before anything is submitted.
    /// Settlement outcomes, unsuccessful ones included, are reported in the response.
    fn settle(
        &self,
        request: &v1::SettleRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::SettleResponse, Self::Error>> + Send;

    /// Dry-runs a transaction without submitting it.
    fn simulate(
        &self,
        request: &v1::SimulateRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::SimulateResponse, Self::Error>> + Send;

    /// Reads a job record registered after a trustless settlement.
    ///
    /// Resolves to `Ok(None)` when no configured chain holds the record.
    fn job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<v1::JobResponse>, Self::Error>> + Send;

    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync + Send> Facilitator for Arc<T> {
    type Error = T::Error;

    fn prepare(
        &self,
        request: &v1::PrepareRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::PrepareResponse, Self::Error>> + Send {
        self.as_ref().prepare(request, trace_id)
    }

    fn settle(
        &self,
        request: &v1::SettleRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request, trace_id)
    }

    fn simulate(
        &self,
        request: &v1::SimulateRequest,
        trace_id: &TraceId,
    ) -> impl Future<Output = Result<v1::SimulateResponse, Self::Error>> + Send {
        self.as_ref().simulate(request, trace_id)
    }

    fn job(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<Option<v1::JobResponse>, Self::Error>> + Send {
        self.as_ref().job(job_id)
    }

    fn supported(
        &self,
    ) -> impl Future<Output = Result<proto::SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }
}
