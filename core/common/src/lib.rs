//! Common error and identifier types for SeedVault.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{ClientId, VaultId};
