#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Local facilitator for x402 payments settled on Solana.
//!
//! [`FacilitatorLocal`] implements [`Facilitator`](x402_types::facilitator::Facilitator) on
//! top of a [`ChainRegistry`](x402_types::chain::ChainRegistry) of per-cluster
//! [`SolanaExactFacilitator`](x402_chain_solana::SolanaExactFacilitator)s, and
//! [`handlers`] exposes it over HTTP.
//!
//! # Modules
//!
//! - [`facilitator_local`] - routing of requests to the configured clusters
//! - [`handlers`] - HTTP endpoints
//! - [`util`] - graceful shutdown, trace ids and telemetry
//!
//! # Example
//!
//! ```ignore
//! use x402_facilitator_local::{FacilitatorLocal, handlers};
//! use x402_types::chain::{ChainRegistry, FromConfig};
//! use std::sync::Arc;
//!
//! let chain_registry = ChainRegistry::from_config(&chains_config).await?;
//! let state = Arc::new(FacilitatorLocal::new(chain_registry));
//! let app = axum::Router::new().merge(handlers::routes().with_state(state));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

pub mod facilitator_local;
pub mod handlers;
pub mod util;

pub use facilitator_local::*;
pub use handlers::*;
