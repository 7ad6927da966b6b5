//! Master seed type with secure memory handling.
//!
//! The seed is the root secret of a vault: the signing identity, the
//! document encryption key, and the session-share key are all derived from
//! it. It is supplied externally (generated at onboarding or recovered from
//! a phrase) and zeroized on drop.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use seedvault_common::{Error, Result};

/// Length of the master seed in bytes (256-bit).
pub const SEED_LENGTH: usize = 32;

/// Master seed for one vault.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; SEED_LENGTH],
}

impl Seed {
    /// Create a seed from raw bytes.
    pub fn from_bytes(bytes: [u8; SEED_LENGTH]) -> Self {
        Self { bytes }
    }

    /// Generate a fresh random seed.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; SEED_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Decode a seed from its base64 transfer encoding.
    ///
    /// # Errors
    /// - Returns error if the input is not base64 or not SEED_LENGTH bytes
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let decoded = BASE64
            .decode(encoded)
            .map_err(|e| Error::Crypto(format!("Invalid seed encoding: {}", e)))?;
        let bytes: [u8; SEED_LENGTH] = decoded.try_into().map_err(|v: Vec<u8>| {
            Error::Crypto(format!(
                "Invalid seed length: expected {}, got {}",
                SEED_LENGTH,
                v.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Derive a seed from a human-memorable recovery phrase.
    ///
    /// This is the alternate recovery path: failure means the user has no
    /// recoverable seed and should be routed to onboarding, not retried.
    ///
    /// # Errors
    /// - `NeedsOnboarding` if the phrase is not a valid BIP-39 mnemonic
    pub fn from_phrase(phrase: &str) -> Result<Self> {
        let mnemonic = bip39::Mnemonic::parse_normalized(phrase)
            .map_err(|e| Error::NeedsOnboarding(format!("Unrecognized recovery phrase: {}", e)))?;
        let long = mnemonic.to_seed("");
        let mut bytes = [0u8; SEED_LENGTH];
        bytes.copy_from_slice(&long[..SEED_LENGTH]);
        Ok(Self { bytes })
    }

    /// Get the seed bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; SEED_LENGTH] {
        &self.bytes
    }

    /// Encode the seed as base64 for transfer (e.g. inside a session share).
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.bytes)
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_roundtrip() {
        let seed = Seed::generate();
        let encoded = seed.to_base64();
        let decoded = Seed::from_base64(&encoded).unwrap();
        assert_eq!(seed.as_bytes(), decoded.as_bytes());
    }

    #[test]
    fn test_generate_unique() {
        let s1 = Seed::generate();
        let s2 = Seed::generate();
        assert_ne!(s1.as_bytes(), s2.as_bytes());
    }

    #[test]
    fn test_from_base64_wrong_length() {
        let encoded = BASE64.encode([0u8; 16]);
        assert!(Seed::from_base64(&encoded).is_err());
    }

    #[test]
    fn test_from_phrase_deterministic() {
        let phrase = "legal winner thank year wave sausage worth useful legal winner thank yellow";
        let s1 = Seed::from_phrase(phrase).unwrap();
        let s2 = Seed::from_phrase(phrase).unwrap();
        assert_eq!(s1.as_bytes(), s2.as_bytes());
    }

    #[test]
    fn test_from_phrase_garbage_needs_onboarding() {
        let result = Seed::from_phrase("definitely not a mnemonic");
        match result {
            Err(seedvault_common::Error::NeedsOnboarding(_)) => {}
            other => panic!("expected NeedsOnboarding, got {:?}", other.map(|_| ())),
        }
    }
}
