//! Ed25519 request signing.
//!
//! The signing key is derived directly from the master seed; the verifying
//! key doubles as the client's identity in the challenge-response auth
//! header.

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};

use crate::seed::Seed;

fn signing_key(seed: &Seed) -> SigningKey {
    SigningKey::from_bytes(seed.as_bytes())
}

/// Derive the public identity key for a seed.
pub fn identity(seed: &Seed) -> VerifyingKey {
    signing_key(seed).verifying_key()
}

/// Sign a message (normally a challenge-response digest) with the seed's
/// signing key.
pub fn sign(seed: &Seed, message: &[u8]) -> Signature {
    signing_key(seed).sign(message)
}
