//! Cryptographic primitives for SeedVault.
//!
//! This module provides:
//! - The master `Seed` type with automatic zeroization
//! - Ed25519 request signing and identity derivation
//! - The tuned blake3 challenge-response digest
//! - Authenticated document encryption using XChaCha20-Poly1305
//!
//! # Security Guarantees
//! - All seed material is automatically zeroized on drop
//! - No plaintext or seed material is ever logged

pub mod aead;
pub mod digest;
pub mod seed;
pub mod signing;

pub use aead::{
    decrypt_document, decrypt_with_key, encrypt_document, encrypt_with_key, DOCUMENT_KEY_CONTEXT,
};
pub use digest::challenge_response_digest;
pub use seed::{Seed, SEED_LENGTH};
pub use signing::{identity, sign};
