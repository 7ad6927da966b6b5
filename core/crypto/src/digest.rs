//! Tuned blake3 challenge-response digest.
//!
//! The server's challenge names `blake3$<cost>`: the client must compute a
//! work-tuned digest over the request before signing it. The digest input
//! canonicalizes the nonce, HTTP method, signing endpoint, and a hash of
//! the body; `cost` is an iteration count chosen by the server.

use seedvault_common::{Error, Result};

/// Upper bound on the server-supplied cost. A challenge above this is a
/// protocol violation rather than a legitimate tuning value.
pub const MAX_COST: u32 = 1 << 22;

/// Compute the challenge-response digest for a request.
///
/// The digest is `blake3` applied `cost + 1` times to the canonical input
/// `nonce:METHOD:path:hex(blake3(body))`. The method is uppercased so the
/// signing domain is insensitive to caller casing.
///
/// # Errors
/// - `Fatal` if `cost` exceeds [`MAX_COST`]
pub fn challenge_response_digest(
    nonce: &str,
    method: &str,
    path: &str,
    cost: u32,
    body: &[u8],
) -> Result<[u8; 32]> {
    if cost > MAX_COST {
        return Err(Error::Fatal(format!(
            "Challenge cost {} exceeds maximum {}",
            cost, MAX_COST
        )));
    }

    let body_hash = blake3::hash(body);
    let canonical = format!(
        "{}:{}:{}:{}",
        nonce,
        method.to_ascii_uppercase(),
        path,
        body_hash.to_hex()
    );

    let mut digest = *blake3::hash(canonical.as_bytes()).as_bytes();
    for _ in 0..cost {
        digest = *blake3::hash(&digest).as_bytes();
    }
    Ok(digest)
}
