//! Vault engine for SeedVault.
//!
//! This module provides:
//! - The typed vault document model and tagged item union
//! - The sequential schema migration chain with its terminal hotfix pass
//! - JSON-schema validation of current-era documents
//! - The `VaultEngine`: cached, signed, conflict-aware CRUD over the
//!   decrypted vault document

pub mod engine;
pub mod items;
pub mod migrate;
pub mod schema;
pub mod validate;

pub use engine::{EngineConfig, ServiceEntry, VaultEngine, VaultView, VerifiedStatus};
pub use items::{login_display_name, LoginView};
pub use migrate::{maybe_migrate, migrate_next, CURRENT_SCHEMA_MAJOR, CURRENT_SCHEMA_MINOR};
pub use schema::{
    AddressItem, CreditCardItem, ItemOrigin, LoginItem, PrivateKeyItem, RefreshTokenItem,
    SecureNoteItem, SsoProvider, Vault, VaultItem,
};
pub use validate::{Validator, SCHEMA_VALIDATED_FROM};
