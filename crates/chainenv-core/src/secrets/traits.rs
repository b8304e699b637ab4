//! Core traits and types for secret storage

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use thiserror::Error;

/// How `set_password` treats an existing item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with `AlreadyExists` if the account is already stored
    Create,
    /// Fail with `NotFoundForUpdate` if the account is not stored yet
    Update,
}

/// Errors that can occur during secret store operations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("the item '{0}' does not exist")]
    NotFound(String),

    #[error("item '{0}' already exists, use 'update' to update it")]
    AlreadyExists(String),

    #[error("item '{0}' not found for update")]
    NotFoundForUpdate(String),

    #[error("{provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether a configured default value may stand in for this failure.
    ///
    /// Missing items and providers that cannot be reached both fall back;
    /// anything else (auth rejected mid-call, malformed output) is reported.
    pub fn allows_default(&self) -> bool {
        matches!(self, StoreError::NotFound(_) | StoreError::Unavailable { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for secret storage providers
///
/// Implementations:
/// - `KeychainStore`: the OS credential vault
/// - `OnePasswordStore`: a 1Password vault driven through the `op` CLI
/// - `MemoryStore`: in-process, for tests and embedding
///
/// Every call that reaches an external provider is async; callers that
/// need several accounts at once should go through the batch fetcher so
/// the calls overlap.
#[async_trait]
pub trait SecretStore: Send + Sync + std::fmt::Debug {
    /// Provider identifier, e.g. "keychain"
    fn name(&self) -> &str;

    /// Retrieve the password stored for `account`
    ///
    /// Returns `StoreError::NotFound` when the provider has no such item.
    async fn get_password(&self, account: &str) -> StoreResult<String>;

    /// Store a password
    ///
    /// `WriteMode::Create` never overwrites, `WriteMode::Update` never creates.
    async fn set_password(&self, account: &str, password: &str, mode: WriteMode) -> StoreResult<()>;

    /// Accounts stored by this tool in the provider
    async fn list(&self) -> StoreResult<Vec<String>>;

    /// Best-effort lookup of several accounts
    ///
    /// Accounts whose lookup fails for any reason are left out of the result.
    async fn get_many(&self, accounts: &[String]) -> HashMap<String, String> {
        get_each(self, accounts).await
    }
}

/// One concurrent `get_password` per account, failures left out
pub(crate) async fn get_each<S>(store: &S, accounts: &[String]) -> HashMap<String, String>
where
    S: SecretStore + ?Sized,
{
    let lookups = accounts.iter().map(|account| async move {
        let result = store.get_password(account).await;
        (account, result)
    });

    join_all(lookups)
        .await
        .into_iter()
        .filter_map(|(account, result)| match result {
            Ok(password) => Some((account.clone(), password)),
            Err(e) => {
                tracing::debug!(account = %account, error = %e, "dropping account from get_many");
                None
            }
        })
        .collect()
}
