//! chainenv core
//!
//! Credential resolution across password providers: the OS keychain and
//! 1Password. A project config maps each account to a provider and an
//! optional default, and the batch fetcher reads many accounts at once
//! with a single store per provider.
//!
//! ```rust,ignore
//! use chainenv_core::config::ConfigFile;
//! use chainenv_core::resolver::fetch_all;
//! use chainenv_core::secrets::ProviderRegistry;
//!
//! let config = ConfigFile::discover(&std::env::current_dir()?)?;
//! let document = config.as_ref().map(|c| &c.document);
//! let registry = ProviderRegistry::new();
//!
//! let keys = vec!["DB_PASS".to_string(), "API_KEY".to_string()];
//! let result = fetch_all(&keys, document, "keychain", &registry).await;
//! ```

pub mod secrets;
pub mod config;
pub mod resolver;
pub mod export;
pub mod diag;
pub mod logging;

// Re-export commonly used types
pub use secrets::{
    SecretStore, StoreError, StoreResult, WriteMode,
    KeychainStore, OnePasswordStore, MemoryStore,
    ProviderRegistry, StoreFactory, list_providers, has_provider,
};

pub use config::{ConfigDocument, ConfigError, ConfigFile, ConfigResult, KeyEntry};

pub use resolver::{fetch_all, fetch_one, resolve_key, BatchError, BatchResult, ResolvedKey};

pub use export::{format_exports, Shell};

pub use diag::{diagnose, ProviderState, ProviderStatus};
