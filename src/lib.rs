//! CareGate Backend Library
//!
//! Exposes the access-control core and API surface for the binary and
//! the integration tests.

pub mod api;
pub mod auth;
pub mod config;
pub mod middleware;
