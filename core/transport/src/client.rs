//! Signed HTTP client for the vault server.
//!
//! Implements the two-phase challenge-response scheme: if a `(nonce, cost)`
//! pair is cached for the signing endpoint, the auth header is computed
//! eagerly; otherwise the first 401's challenge is signed and the request
//! retried exactly once. A second 401 is a hard failure, never a third
//! request.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header, Client, Method, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use seedvault_cache::{TtlCache, TTL_NEVER};
use seedvault_common::{Error, Result, VaultId};
use seedvault_crypto::{challenge_response_digest, identity, sign, Seed};

use crate::challenge::{AuthInfo, Challenge, AUTH_INFO_HEADERS, AUTH_SCHEME, CHALLENGE_HEADERS};
use crate::vclock::VectorClock;

/// Response header carrying the server's vector clock.
pub const VCLOCK_HEADER: &str = "vclock";

/// TTL for a cached `(nonce, cost)` pair (1 hour).
pub const NEXT_AUTH_TTL_SECONDS: i64 = 3600;

/// Cached auth material for one signing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AuthPair {
    nonce: String,
    cost: u32,
}

/// A request to be signed and issued.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: Method,
    /// Literal request path, appended to the base URL.
    pub path: String,
    /// Canonical signing domain for this request. Distinct from `path`:
    /// nonce caching and the digest both key off this value.
    pub endpoint_to_sign: String,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl SignedRequest {
    /// Create a request whose signing domain equals its path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method,
            endpoint_to_sign: path.clone(),
            path,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Override the signing domain.
    pub fn with_endpoint_to_sign(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint_to_sign = endpoint.into();
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }
}

/// Authenticated HTTP client with conflict detection.
#[derive(Clone)]
pub struct SignedTransport {
    http: Client,
    base_url: String,
    seed: Seed,
    vault_id: VaultId,
    cache: TtlCache,
}

impl SignedTransport {
    /// Create a new transport for one vault.
    pub fn new(base_url: impl Into<String>, seed: Seed, vault_id: VaultId, cache: TtlCache) -> Self {
        let http = Client::builder()
            .user_agent("SeedVault/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            seed,
            vault_id,
            cache,
        }
    }

    fn authn_key(&self, endpoint_to_sign: &str) -> String {
        format!("authn:{}", endpoint_to_sign)
    }

    fn vclock_key(&self) -> String {
        format!("vclock:{}", self.vault_id)
    }

    /// Read the last cached vector clock for this vault, if any.
    ///
    /// Cache failures and unparseable clocks read as absent; the affected
    /// key is invalidated.
    pub async fn cached_vclock(&self) -> Option<VectorClock> {
        let key = self.vclock_key();
        let raw: Option<String> = match self.cache.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Vclock cache read failed, invalidating");
                let _ = self.cache.delete(&key).await;
                None
            }
        };
        let raw = raw?;
        match VectorClock::parse(&raw) {
            Ok(clock) => Some(clock),
            Err(e) => {
                warn!(error = %e, "Cached vclock unparseable, invalidating");
                let _ = self.cache.delete(&key).await;
                None
            }
        }
    }

    /// Remember a locally computed clock (a write's own increment). The
    /// server's response clock, when present, replaces it.
    pub async fn cache_vclock(&self, clock: &VectorClock) {
        self.store_vclock(&clock.encode()).await;
    }

    async fn store_vclock(&self, raw: &str) {
        // Stored verbatim: the server is the authority on clock contents.
        if let Err(e) = self
            .cache
            .set(&self.vclock_key(), &raw.to_string(), TTL_NEVER)
            .await
        {
            warn!(error = %e, "Failed to cache vclock");
        }
    }

    fn auth_header_value(&self, req: &SignedRequest, nonce: &str, cost: u32) -> Result<String> {
        let digest = challenge_response_digest(
            nonce,
            req.method.as_str(),
            &req.endpoint_to_sign,
            cost,
            &req.body,
        )?;
        let signature = sign(&self.seed, &digest);
        let id = identity(&self.seed);

        Ok(format!(
            "{} identity={};nonce={};response={};signature={}",
            AUTH_SCHEME,
            BASE64.encode(id.as_bytes()),
            nonce,
            BASE64.encode(digest),
            BASE64.encode(signature.to_bytes()),
        ))
    }

    fn response_header(response: &Response, names: &[&str]) -> Option<String> {
        names
            .iter()
            .find_map(|name| response.headers().get(*name))
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Issue a signed request and return the response body.
    ///
    /// # Errors
    /// - `Unauthorized` after the single 401 retry is exhausted
    /// - `NeedsSync` on a 409 conflict (the server's clock is cached first)
    /// - `NotFound` on 404, `Fatal` on other statuses or protocol
    ///   violations, `Network` on connection-level failures
    pub async fn request(&self, req: SignedRequest) -> Result<Vec<u8>> {
        let authn_key = self.authn_key(&req.endpoint_to_sign);

        let mut auth_header = match self.cache.get::<AuthPair>(&authn_key).await {
            Ok(Some(pair)) => {
                debug!(endpoint = %req.endpoint_to_sign, "Using cached auth nonce");
                Some(self.auth_header_value(&req, &pair.nonce, pair.cost)?)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Auth cache read failed, invalidating");
                let _ = self.cache.delete(&authn_key).await;
                None
            }
        };

        let url = format!("{}{}", self.base_url, req.path);
        let mut fail_on_unauthorized = false;

        loop {
            let mut builder = self.http.request(req.method.clone(), &url);
            for (name, value) in &req.headers {
                builder = builder.header(name, value);
            }
            if let Some(value) = &auth_header {
                builder = builder.header(header::AUTHORIZATION, value);
            }

            let response = builder
                .body(req.body.clone())
                .send()
                .await
                .map_err(|e| Error::Network(format!("Request to {} failed: {}", req.path, e)))?;

            let status = response.status();

            if status.is_success() {
                if let Some(raw) = Self::response_header(&response, &[VCLOCK_HEADER]) {
                    self.store_vclock(&raw).await;
                }
                if let Some(raw) = Self::response_header(&response, &AUTH_INFO_HEADERS) {
                    match AuthInfo::parse(&raw) {
                        Ok(info) => {
                            let pair = AuthPair {
                                nonce: info.next_nonce,
                                cost: info.cost,
                            };
                            if let Err(e) = self
                                .cache
                                .set(&authn_key, &pair, NEXT_AUTH_TTL_SECONDS)
                                .await
                            {
                                warn!(error = %e, "Failed to cache next auth nonce");
                            }
                        }
                        Err(e) => warn!(error = %e, "Ignoring malformed authentication-info"),
                    }
                }
                return response
                    .bytes()
                    .await
                    .map(|b| b.to_vec())
                    .map_err(|e| Error::Network(format!("Failed to read response body: {}", e)));
            }

            match status.as_u16() {
                401 if !fail_on_unauthorized => {
                    let raw = Self::response_header(&response, &CHALLENGE_HEADERS)
                        .ok_or_else(|| Error::Fatal("401 without a challenge header".to_string()))?;
                    let challenge = Challenge::parse(&raw)?;
                    debug!(endpoint = %req.endpoint_to_sign, cost = challenge.cost, "Signing fresh challenge");
                    auth_header =
                        Some(self.auth_header_value(&req, &challenge.nonce, challenge.cost)?);
                    fail_on_unauthorized = true;
                }
                401 => {
                    return Err(Error::Unauthorized(format!(
                        "Server rejected signed request to {}",
                        req.path
                    )));
                }
                404 => return Err(Error::NotFound(req.path.clone())),
                409 => {
                    // The server's clock is authoritative; remember it so
                    // the caller's next write carries a current base.
                    if let Some(raw) = Self::response_header(&response, &[VCLOCK_HEADER]) {
                        self.store_vclock(&raw).await;
                    }
                    return Err(Error::NeedsSync);
                }
                _ => {
                    return Err(Error::Fatal(format!(
                        "Unexpected status {} from {}",
                        status, req.path
                    )));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use seedvault_cache::MemoryStore;
    use std::sync::Arc;

    const CHALLENGE: &str = "asym-tuned-digest-signature nonce=n1;algorithm=blake3$4;actions=read";

    fn transport(base_url: &str) -> SignedTransport {
        let cache = TtlCache::new(Arc::new(MemoryStore::new()));
        SignedTransport::new(
            base_url,
            Seed::from_bytes([9u8; 32]),
            VaultId::new("vault-1").unwrap(),
            cache,
        )
    }

    #[tokio::test]
    async fn test_401_challenge_retried_exactly_once_then_succeeds() {
        let mut server = mockito::Server::new_async().await;

        let unauth = server
            .mock("GET", "/v2/vaults/vault-1")
            .match_header("authorization", Matcher::Missing)
            .with_status(401)
            .with_header("www-authenticate", CHALLENGE)
            .expect(1)
            .create_async()
            .await;

        let authed = server
            .mock("GET", "/v2/vaults/vault-1")
            .match_header(
                "authorization",
                Matcher::Regex("^asym-tuned-digest-signature identity=".to_string()),
            )
            .with_status(200)
            .with_body("ciphertext")
            .expect(1)
            .create_async()
            .await;

        let transport = transport(&server.url());
        let body = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await
            .unwrap();

        assert_eq!(body, b"ciphertext");
        unauth.assert_async().await;
        authed.assert_async().await;
    }

    #[tokio::test]
    async fn test_second_401_is_unauthorized_no_third_request() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/v2/vaults/vault-1")
            .with_status(401)
            .with_header("uno-www-authn", CHALLENGE)
            .expect(2)
            .create_async()
            .await;

        let transport = transport(&server.url());
        let result = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await;

        assert!(matches!(result, Err(Error::Unauthorized(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_401_without_challenge_is_fatal() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/v2/vaults/vault-1")
            .with_status(401)
            .create_async()
            .await;

        let transport = transport(&server.url());
        let result = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await;

        assert!(matches!(result, Err(Error::Fatal(_))));
    }

    #[tokio::test]
    async fn test_409_surfaces_needs_sync_and_caches_server_vclock() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("PUT", "/v2/vaults/vault-1")
            .with_status(409)
            .with_header("vclock", "other=4,me=1")
            .create_async()
            .await;

        let transport = transport(&server.url());
        let result = transport
            .request(SignedRequest::new(Method::PUT, "/v2/vaults/vault-1"))
            .await;

        assert!(matches!(result, Err(Error::NeedsSync)));

        let clock = transport.cached_vclock().await.unwrap();
        assert_eq!(clock, VectorClock::parse("other=4,me=1").unwrap());
    }

    #[tokio::test]
    async fn test_success_caches_vclock_and_next_nonce() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/v2/vaults/vault-1")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_header("vclock", "me=3")
            .with_header("uno-authn-info", "nextnonce=n2;blake3=4;scopes=vault")
            .with_body("v1")
            .create_async()
            .await;

        let eager = server
            .mock("GET", "/v2/vaults/vault-1")
            .match_header(
                "authorization",
                Matcher::Regex("nonce=n2;".to_string()),
            )
            .with_status(200)
            .with_body("v2")
            .expect(1)
            .create_async()
            .await;

        let transport = transport(&server.url());

        let first = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await
            .unwrap();
        assert_eq!(first, b"v1");
        assert_eq!(
            transport.cached_vclock().await.unwrap(),
            VectorClock::parse("me=3").unwrap()
        );

        // Second call signs eagerly with the cached nextnonce.
        let second = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await
            .unwrap();
        assert_eq!(second, b"v2");
        eager.assert_async().await;
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found_and_500_to_fatal() {
        let mut server = mockito::Server::new_async().await;

        server
            .mock("GET", "/v2/vaults/vault-1")
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("GET", "/v2/verify/entries/vault-1")
            .with_status(500)
            .create_async()
            .await;

        let transport = transport(&server.url());

        assert!(matches!(
            transport
                .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
                .await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            transport
                .request(SignedRequest::new(Method::GET, "/v2/verify/entries/vault-1"))
                .await,
            Err(Error::Fatal(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        // Nothing listens on this port.
        let transport = transport("http://127.0.0.1:9");
        let result = transport
            .request(SignedRequest::new(Method::GET, "/v2/vaults/vault-1"))
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
    }
}
