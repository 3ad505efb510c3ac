#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the x402 prepare/settle facilitator.
//!
//! This crate holds the chain-agnostic pieces shared by the Solana settlement crate and the
//! HTTP facilitator: CAIP-2 chain identifiers, the x402 v1 wire format for payment
//! requirements and payloads, the prepare/settle/simulate request and response bodies, and
//! the [`facilitator::Facilitator`] trait the HTTP layer dispatches to.
//!
//! # Modules
//!
//! - [`chain`] - CAIP-2 chain identifiers and provider abstractions
//! - [`config`] - Environment variable resolution for configuration values
//! - [`facilitator`] - Core trait for preparing, settling and simulating payments
//! - [`networks`] - Registry of well-known network names (x402 v1)
//! - [`proto`] - Wire format types for protocol messages
//! - [`util`] - Helper types (base64, string literals, trace ids)

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod util;
