//! Per-request [`TraceId`] minting.
//!
//! [`TraceIdLayer`] stores a fresh [`TraceId`] in the request extensions, where handlers
//! pick it up with `Extension<TraceId>` and pass it down to the settlement pipeline.

use http::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use x402_types::util::TraceId;

#[derive(Debug, Clone, Copy, Default)]
pub struct TraceIdLayer;

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TraceIdService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for TraceIdService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.extensions_mut().insert(TraceId::new());
        self.inner.call(req)
    }
}
