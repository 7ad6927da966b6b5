//! Typed vault document model.
//!
//! The wire document is camelCase JSON. Every struct carries a flattened
//! `extra` map so fields this client does not know about survive a
//! read-modify-write cycle untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document keys of the item collections, in delete-priority order.
pub const COLLECTION_KEYS: [&str; 6] = [
    "logins",
    "creditCards",
    "addresses",
    "privateKeys",
    "notes",
    "refreshTokens",
];

/// How a login entered the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOrigin {
    /// Entered by hand; display metadata is preserved verbatim.
    #[default]
    Manual,
    /// Matched against the known-service catalog.
    Matched,
}

/// One SSO provider association on a login.
///
/// Exactly this shape after the terminal hotfix pass; see `migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SsoProvider {
    pub default: bool,
    pub provider: String,
    pub username: String,
}

/// A credential for one site or service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginItem {
    pub id: String,
    #[serde(default)]
    pub origin: ItemOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sso_provider: Vec<SsoProvider>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvv: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKeyItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureNoteItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An OAuth refresh token; unrelated to credential items, kept for a
/// separate feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// API-boundary item union, tagged by the explicit `schema_type`
/// discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_type")]
pub enum VaultItem {
    #[serde(rename = "login")]
    Login(LoginItem),
    #[serde(rename = "credit_card")]
    CreditCard(CreditCardItem),
    #[serde(rename = "address")]
    Address(AddressItem),
    #[serde(rename = "private_key")]
    PrivateKey(PrivateKeyItem),
    #[serde(rename = "secure_note")]
    SecureNote(SecureNoteItem),
    #[serde(rename = "refresh_token")]
    RefreshToken(RefreshTokenItem),
}

impl VaultItem {
    /// The document collection this item variant lives in.
    pub fn collection_key(&self) -> &'static str {
        match self {
            VaultItem::Login(_) => "logins",
            VaultItem::CreditCard(_) => "creditCards",
            VaultItem::Address(_) => "addresses",
            VaultItem::PrivateKey(_) => "privateKeys",
            VaultItem::SecureNote(_) => "notes",
            VaultItem::RefreshToken(_) => "refreshTokens",
        }
    }

    /// Map a `schema_type` tag to its collection key.
    pub fn collection_for_tag(tag: &str) -> Option<&'static str> {
        match tag {
            "login" => Some("logins"),
            "credit_card" => Some("creditCards"),
            "address" => Some("addresses"),
            "private_key" => Some("privateKeys"),
            "secure_note" => Some("notes"),
            "refresh_token" => Some("refreshTokens"),
            _ => None,
        }
    }
}

/// The decrypted, current-era vault document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub schema_major: u32,
    pub schema_minor: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default)]
    pub logins: Vec<LoginItem>,
    #[serde(default)]
    pub credit_cards: Vec<CreditCardItem>,
    #[serde(default)]
    pub addresses: Vec<AddressItem>,
    #[serde(default)]
    pub private_keys: Vec<PrivateKeyItem>,
    #[serde(default)]
    pub notes: Vec<SecureNoteItem>,
    #[serde(default)]
    pub refresh_tokens: Vec<RefreshTokenItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
