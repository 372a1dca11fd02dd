//! Firefly III API integration
//!
//! The REST client that talks to Firefly III and the translation of frontend
//! requests into the shapes its API expects.

pub mod client;
pub mod transaction;

pub use client::{FireflyClient, Params, Upstream, UpstreamError, REQUEST_TIMEOUT};
pub use transaction::{build_transaction_payload, ValidationError};
