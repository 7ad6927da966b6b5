//! Common error types for SeedVault.

use thiserror::Error;

/// Top-level error type for vault service operations.
///
/// Constructed at the transport or engine boundary and propagated
/// unchanged; nothing in the core translates these into user-facing copy.
#[derive(Debug, Error)]
pub enum Error {
    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server rejected a write because its vector clock is ahead.
    /// The caller must re-fetch, reapply its change, and retry.
    #[error("Vault out of sync with server, re-fetch required")]
    NeedsSync,

    /// Terminal authentication failure (a second 401 after re-signing).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Transport-level failure (DNS, connect, TLS). Transient; a higher
    /// layer may retry.
    #[error("Network error: {0}")]
    Network(String),

    /// Protocol or internal invariant violation. Not retryable.
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// The vault's schema major is ahead of what this client supports.
    #[error("Vault schema v{vault_major} exceeds supported v{supported_major}, client update required")]
    ClientOutOfDate {
        vault_major: u32,
        supported_major: u32,
    },

    /// The decrypted document failed structural validation.
    ///
    /// `errors` carries the raw validator output in development builds and
    /// is redacted to an empty list in production builds.
    #[error("Vault document failed schema validation ({} errors)", errors.len())]
    SchemaValidation { errors: Vec<String> },

    /// A handoff session held more than one seed share.
    #[error("Expected exactly one session share, found {0}")]
    BadSessionShares(usize),

    /// A recovery phrase did not produce a usable seed. The caller should
    /// route the user to onboarding, not retry.
    #[error("No seed recoverable: {0}")]
    NeedsOnboarding(String),

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
