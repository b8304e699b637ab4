//! Provider registry: maps provider names to store constructors

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::debug;

use super::keychain_store::{KeychainStore, DEFAULT_PREFIX};
use super::onepassword_store::{resolve_service_account_token, OnePasswordStore, DEFAULT_VAULT};
use super::op_cli::OpCli;
use super::traits::{SecretStore, StoreError, StoreResult};

/// Provider name of the OS keychain store
pub const KEYCHAIN: &str = "keychain";

/// Provider name of the 1Password store
pub const ONEPASSWORD: &str = "1password";

/// Function used to look up environment variables
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Definition of a built-in provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDefinition {
    /// Unique name for this provider
    pub name: &'static str,
    /// Human-readable description
    pub description: &'static str,
}

static PROVIDERS: Lazy<Vec<ProviderDefinition>> = Lazy::new(|| {
    vec![
        ProviderDefinition {
            name: KEYCHAIN,
            description: "System keychain (macOS Keychain, Windows Credential Manager, Linux Secret Service)",
        },
        ProviderDefinition {
            name: ONEPASSWORD,
            description: "1Password vault via the op CLI",
        },
    ]
});

/// List all built-in providers
pub fn list_providers() -> &'static [ProviderDefinition] {
    &PROVIDERS
}

/// Check if a provider name is known
pub fn has_provider(name: &str) -> bool {
    PROVIDERS.iter().any(|p| p.name == name)
}

/// Creates stores by provider name
///
/// Creation may be expensive (session setup, token lookup), which is why
/// batch callers memoize the result per provider.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn create(&self, provider: &str) -> StoreResult<Arc<dyn SecretStore>>;
}

/// The production factory for the built-in providers
///
/// Everything a provider needs at construction time is passed in
/// explicitly: the 1Password vault name, the configured token key and an
/// environment lookup.
#[derive(Clone)]
pub struct ProviderRegistry {
    vault_name: String,
    keychain_prefix: String,
    token_key: Option<String>,
    env: EnvLookup,
}

impl ProviderRegistry {
    /// Registry reading the real process environment
    pub fn new() -> Self {
        Self {
            vault_name: DEFAULT_VAULT.to_string(),
            keychain_prefix: DEFAULT_PREFIX.to_string(),
            token_key: None,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
        }
    }

    /// 1Password vault to provision and use
    pub fn with_vault(mut self, vault_name: impl Into<String>) -> Self {
        self.vault_name = vault_name.into();
        self
    }

    /// Keychain key holding the 1Password service-account token
    pub fn with_token_key(mut self, token_key: Option<String>) -> Self {
        self.token_key = token_key;
        self
    }

    /// Replace the environment lookup
    pub fn with_env(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    /// The keychain store every other provider may lean on
    pub fn keychain(&self) -> KeychainStore {
        KeychainStore::with_prefix(self.keychain_prefix.clone())
    }

    /// An `op` runner authenticated the way the 1Password store will be
    pub async fn op_cli(&self) -> StoreResult<OpCli> {
        let keychain = self.keychain();
        let env = self.env.clone();
        let token = resolve_service_account_token(
            move |name: &str| env(name),
            self.token_key.as_deref(),
            &keychain,
        )
        .await?;

        Ok(OpCli::new().with_token(token))
    }

    async fn onepassword(&self) -> StoreResult<OnePasswordStore> {
        let runner = self.op_cli().await?;
        Ok(OnePasswordStore::new(Arc::new(runner), self.vault_name.clone()))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("vault_name", &self.vault_name)
            .field("keychain_prefix", &self.keychain_prefix)
            .field("token_key", &self.token_key)
            .finish()
    }
}

#[async_trait]
impl StoreFactory for ProviderRegistry {
    async fn create(&self, provider: &str) -> StoreResult<Arc<dyn SecretStore>> {
        debug!(provider, "creating store");
        match provider {
            KEYCHAIN => Ok(Arc::new(self.keychain())),
            ONEPASSWORD => Ok(Arc::new(self.onepassword().await?)),
            other => Err(StoreError::UnknownProvider(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> EnvLookup {
        Arc::new(|_: &str| None)
    }

    #[test]
    fn test_builtin_providers_registered() {
        assert!(has_provider(KEYCHAIN));
        assert!(has_provider(ONEPASSWORD));
        assert!(!has_provider("vault"));

        let names: Vec<_> = list_providers().iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["keychain", "1password"]);
    }

    #[tokio::test]
    async fn test_create_keychain_store() {
        let registry = ProviderRegistry::new().with_env(no_env());
        let store = registry.create(KEYCHAIN).await.unwrap();
        assert_eq!(store.name(), "keychain");
    }

    #[tokio::test]
    async fn test_create_onepassword_store_without_token() {
        let registry = ProviderRegistry::new().with_env(no_env()).with_vault("team");
        let store = registry.create(ONEPASSWORD).await.unwrap();
        assert_eq!(store.name(), "1password");
    }

    #[tokio::test]
    async fn test_create_onepassword_store_with_env_token() {
        let registry = ProviderRegistry::new()
            .with_env(Arc::new(|_: &str| Some("ops_token".to_string())))
            .with_token_key(Some("OP_TOKEN".to_string()));
        assert!(registry.create(ONEPASSWORD).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_unknown_provider() {
        let registry = ProviderRegistry::new().with_env(no_env());
        let err = registry.create("nonexistent_xyz").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownProvider(ref p) if p == "nonexistent_xyz"));
    }

    #[test]
    fn test_builder() {
        let registry = ProviderRegistry::new().with_vault("ops");
        assert_eq!(registry.vault_name(), "ops");
        assert_eq!(registry.keychain().service_for("A"), "chainenv-A");
    }
}
