//! Signed HTTP transport for SeedVault.
//!
//! This module provides:
//! - Vector clocks for optimistic concurrency detection
//! - Parsing for the challenge-response auth headers
//! - The `SignedTransport` client: eager auth from cached nonces, a single
//!   bounded retry after a 401 challenge, and 409 conflict surfacing

pub mod challenge;
pub mod client;
pub mod vclock;

pub use challenge::{AuthInfo, Challenge, AUTH_SCHEME};
pub use client::{SignedRequest, SignedTransport, NEXT_AUTH_TTL_SECONDS, VCLOCK_HEADER};
pub use vclock::VectorClock;
