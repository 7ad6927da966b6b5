//! Parsing for the challenge-response auth protocol headers.
//!
//! Two header shapes matter:
//!
//! - `www-authenticate` / `uno-www-authn` on a 401:
//!   `asym-tuned-digest-signature nonce=...;algorithm=blake3$<cost>;actions=...`
//! - `authentication-info` / `uno-authn-info` on a 2xx:
//!   `nextnonce=...;blake3=<cost>;scopes=...`

use seedvault_common::{Error, Result};

/// The auth scheme this transport speaks.
pub const AUTH_SCHEME: &str = "asym-tuned-digest-signature";

/// Challenge header names, checked in order.
pub const CHALLENGE_HEADERS: [&str; 2] = ["www-authenticate", "uno-www-authn"];

/// Authentication-info header names, checked in order.
pub const AUTH_INFO_HEADERS: [&str; 2] = ["authentication-info", "uno-authn-info"];

/// A parsed 401 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    /// Server-issued nonce to sign over.
    pub nonce: String,
    /// Digest work factor from `algorithm=blake3$<cost>`.
    pub cost: u32,
    /// Actions the challenge grants, verbatim.
    pub actions: Option<String>,
}

/// A parsed `authentication-info` header, amortizing the next request's
/// challenge round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthInfo {
    /// Nonce to use for the next request against the same endpoint.
    pub next_nonce: String,
    /// Digest work factor for that nonce.
    pub cost: u32,
    /// Scopes the nonce is valid for, verbatim.
    pub scopes: Option<String>,
}

fn split_params(input: &str) -> Vec<(&str, &str)> {
    input
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .collect()
}

impl Challenge {
    /// Parse a challenge header value.
    ///
    /// # Errors
    /// - `Fatal` if the scheme, nonce, or algorithm are missing or malformed
    pub fn parse(header: &str) -> Result<Self> {
        let rest = header.trim().strip_prefix(AUTH_SCHEME).ok_or_else(|| {
            Error::Fatal(format!("Unsupported auth scheme in challenge: {:?}", header))
        })?;

        let mut nonce = None;
        let mut cost = None;
        let mut actions = None;
        for (key, value) in split_params(rest.trim_start()) {
            match key {
                "nonce" => nonce = Some(value.to_string()),
                "algorithm" => {
                    let raw = value.strip_prefix("blake3$").ok_or_else(|| {
                        Error::Fatal(format!("Unsupported challenge algorithm: {:?}", value))
                    })?;
                    cost = Some(raw.parse().map_err(|_| {
                        Error::Fatal(format!("Malformed challenge cost: {:?}", value))
                    })?);
                }
                "actions" => actions = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            nonce: nonce
                .ok_or_else(|| Error::Fatal("Challenge missing nonce".to_string()))?,
            cost: cost
                .ok_or_else(|| Error::Fatal("Challenge missing algorithm".to_string()))?,
            actions,
        })
    }
}

impl AuthInfo {
    /// Parse an authentication-info header value.
    ///
    /// # Errors
    /// - `Fatal` if nextnonce or the blake3 cost are missing or malformed
    pub fn parse(header: &str) -> Result<Self> {
        let mut next_nonce = None;
        let mut cost = None;
        let mut scopes = None;
        for (key, value) in split_params(header) {
            match key {
                "nextnonce" => next_nonce = Some(value.to_string()),
                "blake3" => {
                    cost = Some(value.parse().map_err(|_| {
                        Error::Fatal(format!("Malformed authentication-info cost: {:?}", value))
                    })?);
                }
                "scopes" => scopes = Some(value.to_string()),
                _ => {}
            }
        }

        Ok(Self {
            next_nonce: next_nonce
                .ok_or_else(|| Error::Fatal("authentication-info missing nextnonce".to_string()))?,
            cost: cost
                .ok_or_else(|| Error::Fatal("authentication-info missing blake3 cost".to_string()))?,
            scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_challenge() {
        let header = "asym-tuned-digest-signature nonce=abc123;algorithm=blake3$8;actions=read write";
        let challenge = Challenge::parse(header).unwrap();
        assert_eq!(challenge.nonce, "abc123");
        assert_eq!(challenge.cost, 8);
        assert_eq!(challenge.actions.as_deref(), Some("read write"));
    }

    #[test]
    fn test_parse_challenge_wrong_scheme() {
        assert!(Challenge::parse("Basic realm=x").is_err());
    }

    #[test]
    fn test_parse_challenge_missing_nonce() {
        assert!(Challenge::parse("asym-tuned-digest-signature algorithm=blake3$8").is_err());
    }

    #[test]
    fn test_parse_challenge_bad_algorithm() {
        assert!(
            Challenge::parse("asym-tuned-digest-signature nonce=a;algorithm=sha256$8").is_err()
        );
        assert!(
            Challenge::parse("asym-tuned-digest-signature nonce=a;algorithm=blake3$x").is_err()
        );
    }

    #[test]
    fn test_parse_auth_info() {
        let info = AuthInfo::parse("nextnonce=def456;blake3=10;scopes=vault").unwrap();
        assert_eq!(info.next_nonce, "def456");
        assert_eq!(info.cost, 10);
        assert_eq!(info.scopes.as_deref(), Some("vault"));
    }

    #[test]
    fn test_parse_auth_info_missing_fields() {
        assert!(AuthInfo::parse("blake3=10").is_err());
        assert!(AuthInfo::parse("nextnonce=a").is_err());
    }
}
