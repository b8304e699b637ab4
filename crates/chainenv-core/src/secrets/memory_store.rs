//! In-memory secret store

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::traits::{SecretStore, StoreError, StoreResult, WriteMode};

/// In-memory secret store for testing and embedding
///
/// Honours the same create/update rules as the real providers, so it can
/// stand in for them wherever a `SecretStore` is expected.
///
/// # Example
///
/// ```
/// use chainenv_core::secrets::{MemoryStore, SecretStore, WriteMode};
///
/// futures::executor::block_on(async {
///     let store = MemoryStore::new();
///     store.set_password("DB_PASS", "hunter2", WriteMode::Create).await.unwrap();
///     assert_eq!(store.get_password("DB_PASS").await.unwrap(), "hunter2");
/// });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    secrets: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty memory store named "memory"
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Create an empty store reporting a custom provider name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            secrets: RwLock::new(HashMap::new()),
        }
    }

    /// Create a memory store with initial values
    pub fn with_secrets(initial: HashMap<String, String>) -> Self {
        Self {
            name: "memory".to_string(),
            secrets: RwLock::new(initial),
        }
    }

    /// Get the number of secrets in the store
    pub fn len(&self) -> usize {
        self.secrets.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SecretStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_password(&self, account: &str) -> StoreResult<String> {
        self.secrets
            .read()
            .get(account)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account.to_string()))
    }

    async fn set_password(&self, account: &str, password: &str, mode: WriteMode) -> StoreResult<()> {
        let mut secrets = self.secrets.write();
        let exists = secrets.contains_key(account);
        match mode {
            WriteMode::Create if exists => Err(StoreError::AlreadyExists(account.to_string())),
            WriteMode::Update if !exists => Err(StoreError::NotFoundForUpdate(account.to_string())),
            _ => {
                secrets.insert(account.to_string(), password.to_string());
                Ok(())
            }
        }
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.secrets.read().keys().cloned().collect())
    }
}
