//! Utility modules for the x402-facilitator-local crate.
//!
//! | Module | Description | Feature |
//! |--------|-------------|---------|
//! | [`sig_down`] | Graceful shutdown signal handling | - |
//! | [`trace_id`] | Per-request trace id layer | - |
//! | [`telemetry`] | OpenTelemetry tracing and metrics setup | `telemetry` |

pub mod sig_down;
#[cfg(feature = "telemetry")]
pub mod telemetry;
pub mod trace_id;

pub use sig_down::*;
#[cfg(feature = "telemetry")]
pub use telemetry::*;
pub use trace_id::*;
