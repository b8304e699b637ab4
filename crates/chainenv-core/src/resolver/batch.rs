//! Concurrent password retrieval across providers

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::key_resolver::resolve_key;
use crate::config::ConfigDocument;
use crate::secrets::{SecretStore, StoreError, StoreFactory, StoreResult};

/// A store failure tied to the account and provider it happened for
#[derive(Debug, Error)]
#[error("{account} ({provider}): {source}")]
pub struct BatchError {
    pub account: String,
    pub provider: String,
    #[source]
    pub source: StoreError,
}

impl BatchError {
    fn new(account: &str, provider: &str, source: StoreError) -> Self {
        Self {
            account: account.to_string(),
            provider: provider.to_string(),
            source,
        }
    }
}

/// Stores created so far, one per provider name
///
/// Concurrent requests for a provider that is not created yet wait on the
/// same initialization, so the factory runs once per provider. A failed
/// creation is not cached and the next request tries again.
#[derive(Default)]
pub struct StoreCache {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn SecretStore>>>>>,
}

impl StoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(
        &self,
        provider: &str,
        factory: &dyn StoreFactory,
    ) -> StoreResult<Arc<dyn SecretStore>> {
        let cell = {
            let mut cells = self.cells.lock();
            cells.entry(provider.to_string()).or_default().clone()
        };

        let store = cell.get_or_try_init(|| factory.create(provider)).await?;
        Ok(Arc::clone(store))
    }

    /// Number of providers with a live store
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a batch fetch
///
/// `passwords` holds every account that resolved, including defaults.
/// `first_error` is the first failure to complete; which one that is
/// depends on provider timing and is not stable across runs.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub passwords: HashMap<String, String>,
    pub first_error: Option<BatchError>,
}

impl BatchResult {
    pub fn is_empty(&self) -> bool {
        self.passwords.is_empty()
    }
}

/// Fetch every account concurrently, each from its resolved provider
///
/// Duplicate and empty account names are ignored. Accounts whose lookup
/// fails with a default-eligible error and that have a configured default
/// get the default. Everything else that fails is left out, and the first
/// such failure is reported alongside the partial result.
pub async fn fetch_all(
    accounts: &[String],
    config: Option<&ConfigDocument>,
    default_provider: &str,
    factory: &dyn StoreFactory,
) -> BatchResult {
    let cache = StoreCache::new();
    let mut seen = HashSet::new();

    let mut pending: FuturesUnordered<_> = accounts
        .iter()
        .filter(|account| !account.is_empty() && seen.insert(account.as_str()))
        .map(|account| {
            let cache = &cache;
            async move {
                let result = lookup(cache, account, config, default_provider, factory).await;
                (account, result)
            }
        })
        .collect();

    let mut result = BatchResult::default();
    while let Some((account, outcome)) = pending.next().await {
        match outcome {
            Ok(password) => {
                result.passwords.insert(account.clone(), password);
            }
            Err(e) => {
                warn!(account = %account, provider = %e.provider, error = %e.source, "lookup failed");
                if result.first_error.is_none() {
                    result.first_error = Some(e);
                }
            }
        }
    }

    debug!(
        requested = accounts.len(),
        resolved = result.passwords.len(),
        providers = cache.len(),
        "batch fetch complete"
    );
    result
}

/// Fetch a single account with the same provider and default rules
pub async fn fetch_one(
    account: &str,
    config: Option<&ConfigDocument>,
    default_provider: &str,
    factory: &dyn StoreFactory,
) -> Result<String, BatchError> {
    let cache = StoreCache::new();
    lookup(&cache, account, config, default_provider, factory).await
}

async fn lookup(
    cache: &StoreCache,
    account: &str,
    config: Option<&ConfigDocument>,
    default_provider: &str,
    factory: &dyn StoreFactory,
) -> Result<String, BatchError> {
    let resolved = resolve_key(config, account, default_provider);

    let outcome = match cache.get_or_create(&resolved.provider, factory).await {
        Ok(store) => store.get_password(account).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(password) => {
            debug!(account, provider = %resolved.provider, len = password.len(), "fetched");
            Ok(password)
        }
        Err(e) if e.allows_default() && resolved.default.is_some() => {
            debug!(account, provider = %resolved.provider, error = %e, "using configured default");
            Ok(resolved.default.unwrap_or_default())
        }
        Err(e) => Err(BatchError::new(account, &resolved.provider, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeyEntry;
    use crate::secrets::{MemoryStore, WriteMode};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Serves a fixed set of secrets per provider and counts creations
    struct CountingFactory {
        secrets: HashMap<String, HashMap<String, String>>,
        created: Mutex<HashMap<String, usize>>,
        total: AtomicUsize,
    }

    impl CountingFactory {
        fn new(secrets: &[(&str, &[(&str, &str)])]) -> Self {
            let secrets: HashMap<String, HashMap<String, String>> = secrets
                .iter()
                .map(|(provider, pairs)| {
                    let pairs: HashMap<String, String> = pairs
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    (provider.to_string(), pairs)
                })
                .collect();
            Self {
                secrets,
                created: Mutex::new(HashMap::new()),
                total: AtomicUsize::new(0),
            }
        }

        fn created(&self, provider: &str) -> usize {
            self.created.lock().get(provider).copied().unwrap_or(0)
        }
    }

    #[async_trait]
    impl StoreFactory for CountingFactory {
        async fn create(&self, provider: &str) -> StoreResult<Arc<dyn SecretStore>> {
            self.total.fetch_add(1, Ordering::SeqCst);
            *self.created.lock().entry(provider.to_string()).or_default() += 1;
            // widen the window for racing initializers
            tokio::time::sleep(Duration::from_millis(20)).await;

            match self.secrets.get(provider) {
                Some(secrets) => Ok(Arc::new(MemoryStore::with_secrets(secrets.clone()))),
                None if provider == "offline" => {
                    Err(StoreError::unavailable(provider, "service unreachable"))
                }
                None => Err(StoreError::UnknownProvider(provider.to_string())),
            }
        }
    }

    /// Store whose reads always fail with a non-recoverable error
    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl SecretStore for BrokenStore {
        fn name(&self) -> &str {
            "broken"
        }

        async fn get_password(&self, _account: &str) -> StoreResult<String> {
            Err(StoreError::provider("broken", "session expired"))
        }

        async fn set_password(&self, _: &str, _: &str, _: WriteMode) -> StoreResult<()> {
            Err(StoreError::provider("broken", "session expired"))
        }

        async fn list(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct BrokenFactory;

    #[async_trait]
    impl StoreFactory for BrokenFactory {
        async fn create(&self, _provider: &str) -> StoreResult<Arc<dyn SecretStore>> {
            Ok(Arc::new(BrokenStore))
        }
    }

    /// Store whose every read takes the same fixed time
    #[derive(Debug)]
    struct SlowStore {
        delay: Duration,
    }

    #[async_trait]
    impl SecretStore for SlowStore {
        fn name(&self) -> &str {
            "slow"
        }

        async fn get_password(&self, account: &str) -> StoreResult<String> {
            tokio::time::sleep(self.delay).await;
            Ok(format!("{}-value", account))
        }

        async fn set_password(&self, _: &str, _: &str, _: WriteMode) -> StoreResult<()> {
            Ok(())
        }

        async fn list(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
    }

    struct SlowFactory {
        delay: Duration,
    }

    #[async_trait]
    impl StoreFactory for SlowFactory {
        async fn create(&self, _provider: &str) -> StoreResult<Arc<dyn SecretStore>> {
            Ok(Arc::new(SlowStore { delay: self.delay }))
        }
    }

    fn names(accounts: &[&str]) -> Vec<String> {
        accounts.iter().map(|a| a.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_all_single_provider() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1"), ("B", "2")])]);

        let result = fetch_all(&names(&["A", "B"]), None, "keychain", &factory).await;
        assert!(result.first_error.is_none());
        assert_eq!(result.passwords.len(), 2);
        assert_eq!(result.passwords["A"], "1");
        assert_eq!(result.passwords["B"], "2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_store_created_once_per_provider() {
        let factory = CountingFactory::new(&[
            ("keychain", &[("A", "1"), ("B", "2"), ("C", "3")]),
            ("1password", &[("X", "x"), ("Y", "y"), ("Z", "z")]),
        ]);
        let config = ConfigDocument {
            keys: ["X", "Y", "Z"]
                .iter()
                .map(|name| KeyEntry::new(*name).with_provider("1password"))
                .collect(),
            onepassword: None,
        };

        let accounts = names(&["A", "X", "B", "Y", "C", "Z"]);
        let result = fetch_all(&accounts, Some(&config), "keychain", &factory).await;

        assert!(result.first_error.is_none());
        assert_eq!(result.passwords.len(), 6);
        assert_eq!(factory.created("keychain"), 1);
        assert_eq!(factory.created("1password"), 1);
        assert_eq!(factory.total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookups_overlap() {
        let factory = SlowFactory {
            delay: Duration::from_millis(200),
        };
        let accounts = names(&["A", "B", "C", "D", "E"]);

        let started = std::time::Instant::now();
        let result = fetch_all(&accounts, None, "keychain", &factory).await;
        let elapsed = started.elapsed();

        assert!(result.first_error.is_none());
        assert_eq!(result.passwords.len(), 5);
        assert_eq!(result.passwords["C"], "C-value");
        // five sequential reads would take a full second
        assert!(elapsed < Duration::from_millis(600), "batch took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_missing_account_with_default_is_not_an_error() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1"), ("B", "2")])]);
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("C").with_default("fallback")],
            onepassword: None,
        };

        let result = fetch_all(&names(&["A", "B", "C"]), Some(&config), "keychain", &factory).await;
        assert!(result.first_error.is_none());
        assert_eq!(result.passwords.len(), 3);
        assert_eq!(result.passwords["C"], "fallback");
    }

    #[tokio::test]
    async fn test_empty_default_is_substituted() {
        let factory = CountingFactory::new(&[("keychain", &[])]);
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("C").with_default("")],
            onepassword: None,
        };

        let result = fetch_all(&names(&["C"]), Some(&config), "keychain", &factory).await;
        assert!(result.first_error.is_none());
        assert_eq!(result.passwords["C"], "");
    }

    #[tokio::test]
    async fn test_unreachable_provider_uses_default() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1")])]);
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("DB_PASS")
                .with_provider("offline")
                .with_default("changeme")],
            onepassword: None,
        };

        let result = fetch_all(&names(&["A", "DB_PASS"]), Some(&config), "keychain", &factory).await;
        assert!(result.first_error.is_none());
        assert_eq!(result.passwords["DB_PASS"], "changeme");
    }

    #[tokio::test]
    async fn test_partial_result_with_first_error() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1")])]);

        let result = fetch_all(&names(&["A", "MISSING"]), None, "keychain", &factory).await;
        assert_eq!(result.passwords.len(), 1);
        assert_eq!(result.passwords["A"], "1");

        let err = result.first_error.unwrap();
        assert_eq!(err.account, "MISSING");
        assert_eq!(err.provider, "keychain");
        assert!(err.source.is_not_found());
    }

    #[tokio::test]
    async fn test_only_one_error_is_kept() {
        let factory = CountingFactory::new(&[("keychain", &[])]);

        let result = fetch_all(&names(&["A", "B", "C"]), None, "keychain", &factory).await;
        assert!(result.is_empty());
        let err = result.first_error.unwrap();
        assert!(["A", "B", "C"].contains(&err.account.as_str()));
    }

    #[tokio::test]
    async fn test_provider_error_ignores_default() {
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("A").with_default("fallback")],
            onepassword: None,
        };

        let result = fetch_all(&names(&["A"]), Some(&config), "keychain", &BrokenFactory).await;
        assert!(result.is_empty());
        assert!(matches!(
            result.first_error.unwrap().source,
            StoreError::Provider { .. }
        ));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_reported() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1")])]);
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("B").with_provider("vault")],
            onepassword: None,
        };

        let result = fetch_all(&names(&["A", "B"]), Some(&config), "keychain", &factory).await;
        assert_eq!(result.passwords.len(), 1);
        let err = result.first_error.unwrap();
        assert_eq!(err.provider, "vault");
        assert!(matches!(err.source, StoreError::UnknownProvider(_)));
    }

    #[tokio::test]
    async fn test_duplicates_and_blanks_skipped() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1")])]);

        let result = fetch_all(&names(&["A", "", "A"]), None, "keychain", &factory).await;
        assert!(result.first_error.is_none());
        assert_eq!(result.passwords.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_one() {
        let factory = CountingFactory::new(&[("keychain", &[("A", "1")])]);
        let config = ConfigDocument {
            keys: vec![KeyEntry::new("B").with_default("two")],
            onepassword: None,
        };

        assert_eq!(fetch_one("A", Some(&config), "keychain", &factory).await.unwrap(), "1");
        assert_eq!(fetch_one("B", Some(&config), "keychain", &factory).await.unwrap(), "two");

        let err = fetch_one("C", Some(&config), "keychain", &factory).await.unwrap_err();
        assert_eq!(err.to_string(), "C (keychain): the item 'C' does not exist");
    }

    #[tokio::test]
    async fn test_store_cache_reuses_store() {
        let factory = CountingFactory::new(&[("keychain", &[])]);
        let cache = StoreCache::new();
        assert!(cache.is_empty());

        let first = cache.get_or_create("keychain", &factory).await.unwrap();
        let second = cache.get_or_create("keychain", &factory).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert_eq!(factory.created("keychain"), 1);
    }

    #[tokio::test]
    async fn test_store_cache_retries_failed_creation() {
        let factory = CountingFactory::new(&[]);
        let cache = StoreCache::new();

        assert!(cache.get_or_create("offline", &factory).await.is_err());
        assert!(cache.get_or_create("offline", &factory).await.is_err());
        assert_eq!(factory.created("offline"), 2);
        assert!(cache.is_empty());
    }
}
