//! Firefly Proxy Library
//!
//! Caching proxy between a single-page frontend and the Firefly III API.
//! Modules are exposed for the binary and for integration tests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod firefly;
pub mod resources;
pub mod server;
