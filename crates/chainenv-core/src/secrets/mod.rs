//! Secret storage abstractions and implementations
//!
//! This module provides a pluggable secret storage system with:
//! - `SecretStore` trait with the four operations every provider offers
//! - Built-in providers: `KeychainStore`, `OnePasswordStore`
//! - `MemoryStore` for tests and embedding
//! - A registry for creating stores by provider name

mod traits;
mod memory_store;
mod keychain_store;
mod op_cli;
mod onepassword_store;
mod registry;

pub use traits::{SecretStore, StoreError, StoreResult, WriteMode};
pub use memory_store::MemoryStore;
pub use keychain_store::{KeychainStore, DEFAULT_PREFIX};
pub use op_cli::{OpCli, OpOutput, OpRunner, SERVICE_ACCOUNT_TOKEN_ENV};
pub use onepassword_store::{
    resolve_service_account_token, OnePasswordStore, VaultHandle, DEFAULT_VAULT, ITEM_TAG,
};
pub use registry::{
    has_provider, list_providers, EnvLookup, ProviderDefinition, ProviderRegistry, StoreFactory,
    KEYCHAIN, ONEPASSWORD,
};
