//! x402 Facilitator Server
//!
//! An HTTP server that prepares and settles [x402](https://www.x402.org) payments on Solana,
//! including custodial wallets and trustless job registration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`chain`] | Per-cluster facilitators built from configuration |
//! | [`config`] | Configuration types and loading |
//! | [`run`] | Server initialization and runtime |
//!
//! # Running the Server
//!
//! ```bash
//! cargo run --package x402-facilitator -- --config /path/to/config.json
//!
//! # With OpenTelemetry export
//! cargo run --package x402-facilitator --features telemetry
//! ```

pub mod chain;
pub mod config;
pub mod run;

pub use run::run;
