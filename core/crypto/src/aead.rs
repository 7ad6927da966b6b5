//! Authenticated document encryption using XChaCha20-Poly1305.
//!
//! Vault documents are JSON on the inside and opaque bytes on the wire:
//! `encrypt_document` serializes and seals, `decrypt_document` opens and
//! parses. The 24-byte nonce is randomly generated and prepended to the
//! ciphertext.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};

use crate::seed::{Seed, SEED_LENGTH};
use seedvault_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Key-derivation context for vault document encryption.
pub const DOCUMENT_KEY_CONTEXT: &str = "seedvault 2024-01 vault document";

/// Derive the 256-bit document encryption key from the master seed.
fn document_key(seed: &Seed) -> [u8; SEED_LENGTH] {
    blake3::derive_key(DOCUMENT_KEY_CONTEXT, seed.as_bytes())
}

/// Encrypt arbitrary plaintext under a raw 256-bit key.
///
/// Returns nonce || ciphertext || tag.
pub fn encrypt_with_key(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt nonce-prefixed ciphertext under a raw 256-bit key.
///
/// # Errors
/// - Ciphertext shorter than nonce + tag
/// - Authentication failure (wrong key or tampered data)
pub fn decrypt_with_key(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key));

    cipher
        .decrypt(GenericArray::from_slice(nonce_bytes), encrypted)
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

/// Serialize and encrypt a vault document under the seed's document key.
pub fn encrypt_document(seed: &Seed, document: &serde_json::Value) -> Result<Vec<u8>> {
    let plaintext = serde_json::to_vec(document)
        .map_err(|e| Error::Fatal(format!("Document serialization failed: {}", e)))?;
    encrypt_with_key(&document_key(seed), &plaintext)
}

/// Decrypt and parse a vault document.
pub fn decrypt_document(seed: &Seed, ciphertext: &[u8]) -> Result<serde_json::Value> {
    let plaintext = decrypt_with_key(&document_key(seed), ciphertext)?;
    serde_json::from_slice(&plaintext)
        .map_err(|e| Error::Fatal(format!("Decrypted vault is not valid JSON: {}", e)))
}
