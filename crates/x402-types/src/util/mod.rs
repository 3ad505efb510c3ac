//! Utility types shared across the facilitator crates.
//!
//! - [`b64`] - Base64 encoding/decoding utilities
//! - [`lit_str`] - Compile-time string literal types
//! - [`trace_id`] - Per-request correlation ids

pub mod b64;
pub mod lit_str;
pub mod trace_id;

pub use b64::*;
pub use trace_id::*;
