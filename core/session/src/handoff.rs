//! The session rendezvous protocol.
//!
//! Session endpoints are unauthenticated by design: the record id is
//! derived from entropy only the two participating devices hold, and the
//! seed share inside it is encrypted under a second derivation of the same
//! entropy. The server never sees key material. Session records are left
//! behind after recovery; the server expires them on its own schedule.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL},
    Engine,
};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use seedvault_common::{Error, Result};
use seedvault_crypto::{decrypt_with_key, encrypt_with_key, Seed};

/// Bytes of shared entropy behind a session (80-bit).
pub const SESSION_ENTROPY_LENGTH: usize = 10;

/// Key-derivation context for the session record id.
const SESSION_ID_CONTEXT: &str = "seedvault 2024-01 session id";

/// Key-derivation context for the seed-share encryption key.
const SESSION_SHARE_CONTEXT: &str = "seedvault 2024-01 session share";

/// A session as held by the initiating (new) device.
#[derive(Debug, Clone)]
pub struct Session {
    /// Server-side record id, derived from the entropy.
    pub id: String,
    /// Base64 entropy to hand to the established device out of band.
    pub entropy: String,
}

/// Outcome of a recovery poll.
#[derive(Debug)]
pub enum Recovery {
    /// No share posted yet; poll again.
    Pending,
    /// The real seed, decrypted from the single share.
    Recovered(Seed),
}

/// Wire shape of the session record.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    user: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    shares: Vec<String>,
}

fn decode_entropy(entropy: &str) -> Result<Vec<u8>> {
    let bytes = BASE64
        .decode(entropy)
        .map_err(|e| Error::InvalidInput(format!("Invalid session entropy: {}", e)))?;
    if bytes.len() != SESSION_ENTROPY_LENGTH {
        return Err(Error::InvalidInput(format!(
            "Invalid session entropy length: expected {}, got {}",
            SESSION_ENTROPY_LENGTH,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Derive the session record id from its entropy.
pub fn session_id(entropy: &str) -> Result<String> {
    let bytes = decode_entropy(entropy)?;
    Ok(BASE64_URL.encode(blake3::derive_key(SESSION_ID_CONTEXT, &bytes)))
}

fn share_key(entropy: &str) -> Result<[u8; 32]> {
    let bytes = decode_entropy(entropy)?;
    Ok(blake3::derive_key(SESSION_SHARE_CONTEXT, &bytes))
}

/// Client for the session rendezvous endpoints.
#[derive(Clone)]
pub struct SessionHandoff {
    http: Client,
    base_url: String,
}

impl SessionHandoff {
    /// Create a handoff client against a server base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("SeedVault/0.1")
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn session_path(id: &str) -> String {
        format!("/v2/ssss/{}", id)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&SessionRecord>,
    ) -> Result<Vec<u8>> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.http.request(method, &url);
        if let Some(record) = body {
            builder = builder.json(record);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request to {} failed: {}", path, e)))?;

        match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| Error::Network(format!("Failed to read response body: {}", e))),
            StatusCode::NOT_FOUND => Err(Error::NotFound(path.to_string())),
            status => Err(Error::Fatal(format!(
                "Unexpected status {} from {}",
                status, path
            ))),
        }
    }

    async fn fetch_record(&self, id: &str) -> Result<SessionRecord> {
        let body = self.send(Method::GET, &Self::session_path(id), None).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Fatal(format!("Malformed session record: {}", e)))
    }

    /// Create a fresh session record on the server.
    ///
    /// The returned entropy is the only copy; hand it to the established
    /// device out of band and keep it until recovery completes.
    pub async fn create_session(&self) -> Result<Session> {
        use rand::RngCore;
        let mut bytes = [0u8; SESSION_ENTROPY_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        let entropy = BASE64.encode(bytes);
        let id = session_id(&entropy)?;

        debug!(session = %id, "Creating session record");
        self.send(
            Method::PUT,
            &Self::session_path(&id),
            Some(&SessionRecord::default()),
        )
        .await?;

        Ok(Session { id, entropy })
    }

    /// Post the real seed into the session, encrypted under the shared
    /// entropy. Called by the established device.
    ///
    /// # Errors
    /// - `NotFound` if the session record does not exist (expired or
    ///   never created)
    pub async fn share_seed(&self, entropy: &str, seed: &Seed) -> Result<()> {
        let id = session_id(entropy)?;
        let key = share_key(entropy)?;
        let ciphertext = encrypt_with_key(&key, seed.as_bytes())?;

        let mut record = self.fetch_record(&id).await?;
        record.shares.push(BASE64.encode(ciphertext));

        debug!(session = %id, "Posting seed share");
        self.send(Method::PUT, &Self::session_path(&id), Some(&record))
            .await?;
        Ok(())
    }

    /// Poll the session for the seed share. Called by the new device.
    ///
    /// # Errors
    /// - `NotFound` if the session record does not exist
    /// - `BadSessionShares` if the record holds more than one share: the
    ///   session is ambiguous and must be restarted, never guessed at
    /// - `Crypto` if the share does not decrypt under this entropy
    pub async fn recover_seed(&self, entropy: &str) -> Result<Recovery> {
        let id = session_id(entropy)?;
        let record = self.fetch_record(&id).await?;

        match record.shares.as_slice() {
            [] => Ok(Recovery::Pending),
            [share] => {
                let ciphertext = BASE64
                    .decode(share)
                    .map_err(|e| Error::Crypto(format!("Invalid share encoding: {}", e)))?;
                let key = share_key(entropy)?;
                let plaintext = decrypt_with_key(&key, &ciphertext)?;
                let bytes: [u8; 32] = plaintext.as_slice().try_into().map_err(|_| {
                    Error::Crypto(format!("Invalid seed share length: {}", plaintext.len()))
                })?;
                debug!(session = %id, "Seed recovered from session share");
                Ok(Recovery::Recovered(Seed::from_bytes(bytes)))
            }
            shares => Err(Error::BadSessionShares(shares.len())),
        }
    }

    /// Recover a seed from a BIP-39 phrase instead of a live session.
    ///
    /// # Errors
    /// - `NeedsOnboarding` if the phrase is not a valid mnemonic
    pub fn seed_from_phrase(phrase: &str) -> Result<Seed> {
        Seed::from_phrase(phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entropy() -> String {
        BASE64.encode([7u8; SESSION_ENTROPY_LENGTH])
    }

    fn encrypted_share(entropy: &str, seed: &Seed) -> String {
        let key = share_key(entropy).unwrap();
        BASE64.encode(encrypt_with_key(&key, seed.as_bytes()).unwrap())
    }

    #[test]
    fn test_session_id_deterministic_and_url_safe() {
        let id1 = session_id(&entropy()).unwrap();
        let id2 = session_id(&entropy()).unwrap();
        assert_eq!(id1, id2);
        assert!(!id1.contains('/') && !id1.contains('+') && !id1.contains('='));
    }

    #[test]
    fn test_session_id_rejects_bad_entropy() {
        assert!(matches!(
            session_id("not base64!"),
            Err(Error::InvalidInput(_))
        ));
        let short = BASE64.encode([1u8; 4]);
        assert!(matches!(session_id(&short), Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_create_session_puts_record_at_derived_id() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", mockito::Matcher::Regex(r"^/v2/ssss/[A-Za-z0-9_-]+$".to_string()))
            .match_body(mockito::Matcher::Json(json!({"user": {}})))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        let session = handoff.create_session().await.unwrap();

        assert_eq!(session.id, session_id(&session.entropy).unwrap());
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_share_then_recover_roundtrip() {
        let mut server = mockito::Server::new_async().await;
        let entropy = entropy();
        let id = session_id(&entropy).unwrap();
        let path = format!("/v2/ssss/{}", id);
        let real_seed = Seed::from_bytes([3u8; 32]);

        // share_seed reads the empty record and writes one share back.
        server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(r#"{"user": {}, "shares": []}"#)
            .expect(1)
            .create_async()
            .await;
        let put = server
            .mock("PUT", path.as_str())
            .match_body(mockito::Matcher::Regex(r#""shares":\[".+"\]"#.to_string()))
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        handoff.share_seed(&entropy, &real_seed).await.unwrap();
        put.assert_async().await;

        // recover_seed decrypts a served share.
        server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(
                json!({"user": {}, "shares": [encrypted_share(&entropy, &real_seed)]})
                    .to_string(),
            )
            .create_async()
            .await;

        match handoff.recover_seed(&entropy).await.unwrap() {
            Recovery::Recovered(seed) => assert_eq!(seed.as_bytes(), real_seed.as_bytes()),
            Recovery::Pending => panic!("expected a recovered seed"),
        }
    }

    #[tokio::test]
    async fn test_recover_empty_record_is_pending() {
        let mut server = mockito::Server::new_async().await;
        let entropy = entropy();
        let path = format!("/v2/ssss/{}", session_id(&entropy).unwrap());

        server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(r#"{"user": {}, "shares": []}"#)
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        assert!(matches!(
            handoff.recover_seed(&entropy).await.unwrap(),
            Recovery::Pending
        ));
    }

    #[tokio::test]
    async fn test_recover_multiple_shares_is_ambiguous() {
        let mut server = mockito::Server::new_async().await;
        let entropy = entropy();
        let path = format!("/v2/ssss/{}", session_id(&entropy).unwrap());
        let seed = Seed::from_bytes([4u8; 32]);

        server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(
                json!({
                    "user": {},
                    "shares": [
                        encrypted_share(&entropy, &seed),
                        encrypted_share(&entropy, &seed)
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        assert!(matches!(
            handoff.recover_seed(&entropy).await,
            Err(Error::BadSessionShares(2))
        ));
    }

    #[tokio::test]
    async fn test_missing_session_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let entropy = entropy();
        let path = format!("/v2/ssss/{}", session_id(&entropy).unwrap());

        server
            .mock("GET", path.as_str())
            .with_status(404)
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        assert!(matches!(
            handoff.recover_seed(&entropy).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_wrong_entropy_fails_decryption() {
        let mut server = mockito::Server::new_async().await;
        let posted_with = BASE64.encode([9u8; SESSION_ENTROPY_LENGTH]);
        let polling_with = entropy();
        let path = format!("/v2/ssss/{}", session_id(&polling_with).unwrap());
        let seed = Seed::from_bytes([5u8; 32]);

        server
            .mock("GET", path.as_str())
            .with_status(200)
            .with_body(
                json!({"user": {}, "shares": [encrypted_share(&posted_with, &seed)]})
                    .to_string(),
            )
            .create_async()
            .await;

        let handoff = SessionHandoff::new(server.url());
        assert!(matches!(
            handoff.recover_seed(&polling_with).await,
            Err(Error::Crypto(_))
        ));
    }
}
