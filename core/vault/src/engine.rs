//! The vault engine: public surface for vault access and mutation.
//!
//! The decrypted document is never held in long-lived memory: every
//! operation materializes it from cache or network, mutates, re-encrypts,
//! and writes back. Serializing same-process concurrent callers is the
//! calling layer's responsibility; cross-device conflicts surface as
//! `NeedsSync` from the server's vector-clock check.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use seedvault_cache::{TtlCache, TTL_NEVER};
use seedvault_common::{ClientId, Error, Result, VaultId};
use seedvault_crypto::{decrypt_document, encrypt_document, Seed};
use seedvault_transport::{SignedRequest, SignedTransport, VCLOCK_HEADER};

use crate::items::LoginView;
use crate::migrate::{maybe_migrate, CURRENT_SCHEMA_MAJOR};
use crate::schema::{
    AddressItem, CreditCardItem, PrivateKeyItem, RefreshTokenItem, SecureNoteItem, Vault,
    VaultItem, COLLECTION_KEYS,
};
use crate::validate::Validator;

const SERVICES_CACHE_KEY: &str = "services";

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Highest schema major this client will write. Writes of a newer
    /// format are rejected with `ClientOutOfDate` so an older client never
    /// produces a vault it cannot later read.
    pub max_schema_major: u32,
    /// Redact schema-validation errors to an empty list (production
    /// fail-soft). Development builds return the raw validator output.
    pub redact_validation_errors: bool,
    /// TTL for the known-service catalog cache.
    pub service_list_ttl_seconds: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_schema_major: CURRENT_SCHEMA_MAJOR,
            redact_validation_errors: !cfg!(debug_assertions),
            service_list_ttl_seconds: 24 * 3600,
        }
    }
}

/// Result of cross-checking the remote email-verification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedStatus {
    /// The record matches the vault email and is verified.
    Verified,
    /// The record matches the vault email but is not yet verified.
    Pending,
    /// No record, or it names a different email.
    NotEmailed,
}

/// One entry of the known-service catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntry {
    pub name: String,
    pub domain: String,
}

/// The typed, UI-facing view of the vault.
#[derive(Debug, Clone)]
pub struct VaultView {
    pub uuid: Option<String>,
    pub email: Option<String>,
    pub logins: Vec<LoginView>,
    pub credit_cards: Vec<CreditCardItem>,
    pub addresses: Vec<AddressItem>,
    pub private_keys: Vec<PrivateKeyItem>,
    pub notes: Vec<SecureNoteItem>,
    pub refresh_tokens: Vec<RefreshTokenItem>,
}

impl VaultView {
    fn from_vault(vault: Vault) -> Self {
        Self {
            uuid: vault.uuid,
            email: vault.email,
            logins: vault.logins.into_iter().map(LoginView::from_item).collect(),
            credit_cards: vault.credit_cards,
            addresses: vault.addresses,
            private_keys: vault.private_keys,
            notes: vault.notes,
            refresh_tokens: vault.refresh_tokens,
        }
    }
}

/// CRUD, migration, validation, and encryption orchestration over the
/// vault document.
pub struct VaultEngine {
    transport: SignedTransport,
    cache: TtlCache,
    seed: Seed,
    vault_id: VaultId,
    client_id: ClientId,
    validator: Validator,
    config: EngineConfig,
}

impl VaultEngine {
    /// Create an engine for one vault.
    ///
    /// # Errors
    /// - `Fatal` if the embedded document schema fails to compile
    pub fn new(
        transport: SignedTransport,
        cache: TtlCache,
        seed: Seed,
        vault_id: VaultId,
        client_id: ClientId,
        config: EngineConfig,
    ) -> Result<Self> {
        let validator = Validator::new(config.redact_validation_errors)?;
        Ok(Self {
            transport,
            cache,
            seed,
            vault_id,
            client_id,
            validator,
            config,
        })
    }

    fn vault_key(&self) -> String {
        format!("vault:{}", self.vault_id)
    }

    fn vault_path(&self) -> String {
        format!("/v2/vaults/{}", self.vault_id)
    }

    async fn fetch_ciphertext(&self) -> Result<Vec<u8>> {
        self.transport
            .request(SignedRequest::new(Method::GET, self.vault_path()))
            .await
    }

    async fn cache_ciphertext(&self, ciphertext: &[u8]) {
        if let Err(e) = self
            .cache
            .set(&self.vault_key(), &ciphertext.to_vec(), TTL_NEVER)
            .await
        {
            warn!(error = %e, "Failed to cache vault ciphertext");
        }
    }

    /// Fetch, decrypt, and migrate the raw vault document.
    ///
    /// Without `force_sync`, a cached ciphertext blob (already migrated and
    /// validated when it was cached) is decrypted and returned with no
    /// network call. The network path migrates and validates; a migrated
    /// document is written back immediately and the ciphertext re-fetched
    /// before caching, so the cache always reflects server state.
    ///
    /// # Errors
    /// - Transport errors pass through unchanged
    /// - `SchemaValidation` if a current-era document fails the schema
    pub async fn get_raw_vault(&self, force_sync: bool) -> Result<Value> {
        match self.get_raw_vault_inner(force_sync).await {
            Ok(doc) => Ok(doc),
            Err(e) => {
                // Never leave stale or corrupt ciphertext behind a failure.
                let _ = self.cache.delete(&self.vault_key()).await;
                Err(e)
            }
        }
    }

    async fn get_raw_vault_inner(&self, force_sync: bool) -> Result<Value> {
        let key = self.vault_key();

        if !force_sync {
            let cached: Option<Vec<u8>> = match self.cache.get(&key).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(error = %e, "Vault cache read failed, invalidating");
                    let _ = self.cache.delete(&key).await;
                    None
                }
            };
            if let Some(ciphertext) = cached {
                debug!(vault = %self.vault_id, "Vault cache hit");
                return decrypt_document(&self.seed, &ciphertext);
            }
        }

        let ciphertext = self.fetch_ciphertext().await?;
        let doc = decrypt_document(&self.seed, &ciphertext)?;
        let (doc, needs_write) = maybe_migrate(doc)?;
        self.validator.validate(&doc)?;

        if needs_write {
            debug!(vault = %self.vault_id, "Migration changed the vault, writing back");
            self.write_vault(&doc).await?;
            let refreshed = self.fetch_ciphertext().await?;
            self.cache_ciphertext(&refreshed).await;
        } else {
            self.cache_ciphertext(&ciphertext).await;
        }
        Ok(doc)
    }

    /// Encrypt and write the document with the next vector-clock value.
    ///
    /// # Errors
    /// - `ClientOutOfDate` if the document's schema major exceeds the
    ///   configured maximum
    /// - `NeedsSync` if the server detects a concurrent write
    pub async fn put_raw_vault(&self, doc: &Value) -> Result<()> {
        let major = doc
            .get("schemaMajor")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32;
        if major > self.config.max_schema_major {
            return Err(Error::ClientOutOfDate {
                vault_major: major,
                supported_major: self.config.max_schema_major,
            });
        }
        self.validator.validate(doc)?;

        self.write_vault(doc).await?;

        // Invalidate, then eagerly repopulate from the server.
        let _ = self.cache.delete(&self.vault_key()).await;
        let ciphertext = self.fetch_ciphertext().await?;
        self.cache_ciphertext(&ciphertext).await;
        Ok(())
    }

    async fn write_vault(&self, doc: &Value) -> Result<()> {
        let mut clock = self.transport.cached_vclock().await.unwrap_or_default();
        clock.increment(&self.client_id);
        self.transport.cache_vclock(&clock).await;

        let ciphertext = encrypt_document(&self.seed, doc)?;
        let request = SignedRequest::new(Method::PUT, self.vault_path())
            .with_header("content-type", "application/octet-stream")
            .with_header(VCLOCK_HEADER, clock.encode())
            .with_body(ciphertext);
        self.transport.request(request).await?;
        Ok(())
    }

    /// Materialize the typed, annotated view of the vault.
    pub async fn get_vault(&self) -> Result<VaultView> {
        let doc = self.get_raw_vault(false).await?;
        let vault: Vault = serde_json::from_value(doc).map_err(|e| {
            Error::Fatal(format!("Vault document does not match the typed model: {}", e))
        })?;
        Ok(VaultView::from_vault(vault))
    }

    // ---- item CRUD ------------------------------------------------------

    async fn create_item(
        &self,
        collection: &'static str,
        mut fields: Map<String, Value>,
    ) -> Result<Value> {
        fields.insert("id".to_string(), json!(Uuid::new_v4().to_string()));
        let item = Value::Object(fields);

        let mut doc = self.get_raw_vault(false).await?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| Error::Fatal("Vault document is not a JSON object".to_string()))?;
        let entry = obj.entry(collection.to_string()).or_insert(json!([]));
        let items = entry
            .as_array_mut()
            .ok_or_else(|| Error::Fatal(format!("Collection {} is not a list", collection)))?;
        items.push(item.clone());

        self.put_raw_vault(&doc).await?;
        Ok(item)
    }

    /// Apply a patch to the item with the patch's `id`.
    ///
    /// Patch semantics: a JSON `null` value deletes that field from the
    /// stored item; a key absent from the patch leaves the stored value
    /// unchanged. The distinction is deliberate and load-bearing.
    async fn update_item(
        &self,
        collection: &'static str,
        patch: Map<String, Value>,
    ) -> Result<Value> {
        let id = patch
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidInput("Update patch requires an id".to_string()))?
            .to_string();

        let mut doc = self.get_raw_vault(false).await?;
        let items = doc
            .get_mut(collection)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| Error::NotFound(format!("Collection {} is empty", collection)))?;
        let item = items
            .iter_mut()
            .filter_map(Value::as_object_mut)
            .find(|item| item.get("id").and_then(Value::as_str) == Some(id.as_str()))
            .ok_or_else(|| Error::NotFound(format!("No item {} in {}", id, collection)))?;

        for (key, value) in patch {
            if key == "id" {
                continue;
            }
            if value.is_null() {
                item.remove(&key);
            } else {
                item.insert(key, value);
            }
        }
        let updated = Value::Object(item.clone());

        self.put_raw_vault(&doc).await?;
        Ok(updated)
    }

    /// Remove an item by id, searching collections in fixed priority
    /// order, and return it.
    ///
    /// # Errors
    /// - `NotFound` if no collection holds the id
    pub async fn delete_item(&self, id: &str) -> Result<Value> {
        let mut doc = self.get_raw_vault(false).await?;
        let mut removed = None;

        for collection in COLLECTION_KEYS {
            if let Some(items) = doc.get_mut(collection).and_then(Value::as_array_mut) {
                if let Some(pos) = items
                    .iter()
                    .position(|item| item.get("id").and_then(Value::as_str) == Some(id))
                {
                    removed = Some(items.remove(pos));
                    break;
                }
            }
        }

        let removed =
            removed.ok_or_else(|| Error::NotFound(format!("No vault item with id {}", id)))?;
        self.put_raw_vault(&doc).await?;
        Ok(removed)
    }

    /// Create a login, tagging its origin against the service catalog when
    /// the caller did not set one. Catalog lookup is best-effort.
    pub async fn create_login(&self, mut fields: Map<String, Value>) -> Result<Value> {
        if !fields.contains_key("origin") {
            let origin = if self.matches_catalog(&fields).await {
                "matched"
            } else {
                "manual"
            };
            fields.insert("origin".to_string(), json!(origin));
        }
        self.create_item("logins", fields).await
    }

    async fn matches_catalog(&self, fields: &Map<String, Value>) -> bool {
        let Some(host) = fields
            .get("url")
            .and_then(Value::as_str)
            .and_then(|raw| Url::parse(raw).ok())
            .and_then(|url| url.host_str().map(str::to_string))
        else {
            return false;
        };
        match self.get_service_list().await {
            Ok(services) => services
                .iter()
                .any(|s| host == s.domain || host.ends_with(&format!(".{}", s.domain))),
            Err(e) => {
                warn!(error = %e, "Service catalog unavailable, treating login as manual");
                false
            }
        }
    }

    /// Update a login by patch.
    pub async fn update_login(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("logins", patch).await
    }

    /// Create a credit card.
    pub async fn create_credit_card(&self, fields: Map<String, Value>) -> Result<Value> {
        self.create_item("creditCards", fields).await
    }

    /// Update a credit card by patch.
    pub async fn update_credit_card(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("creditCards", patch).await
    }

    /// Create an address.
    pub async fn create_address(&self, fields: Map<String, Value>) -> Result<Value> {
        self.create_item("addresses", fields).await
    }

    /// Update an address by patch.
    pub async fn update_address(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("addresses", patch).await
    }

    /// Create a private key.
    pub async fn create_private_key(&self, fields: Map<String, Value>) -> Result<Value> {
        self.create_item("privateKeys", fields).await
    }

    /// Update a private key by patch.
    pub async fn update_private_key(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("privateKeys", patch).await
    }

    /// Create a secure note.
    pub async fn create_secure_note(&self, fields: Map<String, Value>) -> Result<Value> {
        self.create_item("notes", fields).await
    }

    /// Update a secure note by patch.
    pub async fn update_secure_note(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("notes", patch).await
    }

    /// Create a refresh token record.
    pub async fn create_refresh_token(&self, fields: Map<String, Value>) -> Result<Value> {
        self.create_item("refreshTokens", fields).await
    }

    /// Update a refresh token record by patch.
    pub async fn update_refresh_token(&self, patch: Map<String, Value>) -> Result<Value> {
        self.update_item("refreshTokens", patch).await
    }

    fn split_tagged(item: Value) -> Result<(String, Map<String, Value>)> {
        let mut fields = match item {
            Value::Object(map) => map,
            _ => {
                return Err(Error::InvalidInput(
                    "Vault item must be a JSON object".to_string(),
                ))
            }
        };
        let tag = match fields.remove("schema_type") {
            Some(Value::String(tag)) => tag,
            _ => {
                return Err(Error::InvalidInput(
                    "Vault item requires a schema_type tag".to_string(),
                ))
            }
        };
        Ok((tag, fields))
    }

    fn collection_for(tag: &str) -> Result<&'static str> {
        VaultItem::collection_for_tag(tag)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown schema_type {:?}", tag)))
    }

    /// Create an item routed by its explicit `schema_type` tag.
    pub async fn create_vault_item(&self, item: Value) -> Result<Value> {
        let (tag, fields) = Self::split_tagged(item)?;
        let collection = Self::collection_for(&tag)?;
        if collection == "logins" {
            self.create_login(fields).await
        } else {
            self.create_item(collection, fields).await
        }
    }

    /// Update an item routed by its explicit `schema_type` tag.
    pub async fn update_vault_item(&self, item: Value) -> Result<Value> {
        let (tag, patch) = Self::split_tagged(item)?;
        let collection = Self::collection_for(&tag)?;
        self.update_item(collection, patch).await
    }

    // ---- ancillary remote records ---------------------------------------

    /// Fetch the known-service catalog, cached for the configured TTL.
    pub async fn get_service_list(&self) -> Result<Vec<ServiceEntry>> {
        match self.cache.get::<Vec<ServiceEntry>>(SERVICES_CACHE_KEY).await {
            Ok(Some(list)) => return Ok(list),
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Service cache read failed, invalidating");
                let _ = self.cache.delete(SERVICES_CACHE_KEY).await;
            }
        }

        let body = self
            .transport
            .request(SignedRequest::new(Method::GET, "/v2/services"))
            .await?;
        let list: Vec<ServiceEntry> = serde_json::from_slice(&body)
            .map_err(|e| Error::Fatal(format!("Malformed service catalog: {}", e)))?;
        if let Err(e) = self
            .cache
            .set(SERVICES_CACHE_KEY, &list, self.config.service_list_ttl_seconds)
            .await
        {
            warn!(error = %e, "Failed to cache service catalog");
        }
        Ok(list)
    }

    /// Cross-check the remote email-verification record against the
    /// vault's own email. Mismatch or absence is `NotEmailed`, not an
    /// error.
    pub async fn get_verified_status(&self) -> Result<VerifiedStatus> {
        #[derive(Deserialize)]
        struct VerifyRecord {
            #[serde(default)]
            email: Option<String>,
            #[serde(default)]
            verified: bool,
        }

        let doc = self.get_raw_vault(false).await?;
        let vault_email = doc
            .get("email")
            .and_then(Value::as_str)
            .map(str::to_lowercase);

        let path = format!("/v2/verify/entries/{}", self.vault_id);
        let body = match self
            .transport
            .request(SignedRequest::new(Method::GET, path))
            .await
        {
            Ok(body) => body,
            Err(Error::NotFound(_)) => return Ok(VerifiedStatus::NotEmailed),
            Err(e) => return Err(e),
        };
        let record: VerifyRecord = serde_json::from_slice(&body)
            .map_err(|e| Error::Fatal(format!("Malformed verification record: {}", e)))?;

        match (vault_email, record.email.map(|e| e.to_lowercase())) {
            (Some(ours), Some(theirs)) if ours == theirs => Ok(if record.verified {
                VerifiedStatus::Verified
            } else {
                VerifiedStatus::Pending
            }),
            _ => Ok(VerifiedStatus::NotEmailed),
        }
    }

    /// Ask the server to start email verification for this vault.
    pub async fn request_verification(&self, email: &str) -> Result<()> {
        let body = serde_json::to_vec(&json!({
            "email": email,
            "vaultId": self.vault_id.as_str(),
        }))
        .map_err(|e| Error::Fatal(format!("Failed to encode verification request: {}", e)))?;
        let request = SignedRequest::new(Method::POST, "/v2/verify/entries")
            .with_header("content-type", "application/json")
            .with_body(body);
        self.transport.request(request).await?;
        Ok(())
    }

    /// Check whether any verification entry exists for an email.
    pub async fn lookup_verification(&self, email: &str) -> Result<bool> {
        let body = serde_json::to_vec(&json!({"email": email}))
            .map_err(|e| Error::Fatal(format!("Failed to encode verification lookup: {}", e)))?;
        let request = SignedRequest::new(Method::POST, "/v2/verify/lookup")
            .with_header("content-type", "application/json")
            .with_body(body);
        match self.transport.request(request).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
