//! 1Password secret store
//!
//! Items live in a dedicated vault (created on first use) and are tagged so
//! that `list` only reports what this tool wrote.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::op_cli::{OpOutput, OpRunner, SERVICE_ACCOUNT_TOKEN_ENV};
use super::traits::{get_each, SecretStore, StoreError, StoreResult, WriteMode};

/// Vault used when none is configured
pub const DEFAULT_VAULT: &str = "chainenv";

/// Tag attached to every item this tool creates
pub const ITEM_TAG: &str = "chainenv";

const PROVIDER: &str = "1password";
const PASSWORD_FIELD: &str = "password";
const VAULT_DESCRIPTION: &str = "Created by chainenv";
const VAULT_ICON: &str = "treasure-chest";

/// A vault resolved by name for the current `op` session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VaultHandle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub content_version: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ItemSummary {
    id: String,
    title: String,
}

/// Secret store backed by a 1Password vault
///
/// The vault is looked up (or created) lazily, once per store instance;
/// every later operation reuses the cached handle. Two processes
/// provisioning the same missing vault at the same moment can still end up
/// with two vaults of that name.
pub struct OnePasswordStore {
    runner: Arc<dyn OpRunner>,
    vault_name: String,
    vault: OnceCell<VaultHandle>,
}

impl OnePasswordStore {
    pub fn new(runner: Arc<dyn OpRunner>, vault_name: impl Into<String>) -> Self {
        Self {
            runner,
            vault_name: vault_name.into(),
            vault: OnceCell::new(),
        }
    }

    pub fn vault_name(&self) -> &str {
        &self.vault_name
    }

    /// Resolve the configured vault, creating it if it does not exist yet
    pub async fn ensure_vault(&self) -> StoreResult<&VaultHandle> {
        self.vault.get_or_try_init(|| self.provision_vault()).await
    }

    async fn provision_vault(&self) -> StoreResult<VaultHandle> {
        let output = self.op(&["vault", "list", "--format", "json"]).await?;
        let vaults: Vec<VaultHandle> = parse_json(&output.stdout)?;

        if let Some(vault) = vaults.into_iter().find(|v| v.name == self.vault_name) {
            debug!(
                vault_id = %vault.id,
                vault = %vault.name,
                content_version = vault.content_version,
                "using existing 1Password vault"
            );
            return Ok(vault);
        }

        let output = self
            .op(&[
                "vault",
                "create",
                &self.vault_name,
                "--description",
                VAULT_DESCRIPTION,
                "--icon",
                VAULT_ICON,
                "--format",
                "json",
            ])
            .await?;
        let vault: VaultHandle = parse_json(&output.stdout)?;
        info!(vault_id = %vault.id, vault = %vault.name, "created 1Password vault");
        Ok(vault)
    }

    async fn find_item(&self, vault: &VaultHandle, account: &str) -> StoreResult<Option<ItemSummary>> {
        let output = self
            .op_raw(&["item", "get", account, "--vault", &vault.id, "--format", "json"])
            .await?;
        if output.success {
            return parse_json(&output.stdout).map(Some);
        }
        if is_missing_item(&output.stderr) {
            return Ok(None);
        }
        Err(failure(&output.stderr))
    }

    /// Run `op` and require a zero exit status
    async fn op(&self, args: &[&str]) -> StoreResult<OpOutput> {
        let output = self.op_raw(args).await?;
        if output.success {
            Ok(output)
        } else {
            Err(failure(&output.stderr))
        }
    }

    async fn op_raw(&self, args: &[&str]) -> StoreResult<OpOutput> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.runner.run(&args, None).await
    }

    /// Read several accounts with a single `op inject`
    ///
    /// Fails as a whole if any reference cannot be resolved.
    async fn inject_many(&self, accounts: &[String]) -> StoreResult<HashMap<String, String>> {
        let vault = self.ensure_vault().await?;
        let template: String = accounts
            .iter()
            .enumerate()
            .map(|(i, account)| {
                format!(
                    "{}\n{{{{ op://{}/{}/{} }}}}\n",
                    inject_marker(i),
                    vault.id,
                    account,
                    PASSWORD_FIELD
                )
            })
            .collect();

        let args = vec!["inject".to_string()];
        let output = self.runner.run(&args, Some(&template)).await?;
        if !output.success {
            return Err(failure(&output.stderr));
        }
        parse_injected(&output.stdout, accounts)
    }
}

impl std::fmt::Debug for OnePasswordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnePasswordStore")
            .field("vault_name", &self.vault_name)
            .field("vault", &self.vault.get())
            .finish()
    }
}

fn inject_marker(index: usize) -> String {
    format!("--chainenv-inject-{}--", index)
}

/// Split `op inject` output back into one value per account
fn parse_injected(output: &str, accounts: &[String]) -> StoreResult<HashMap<String, String>> {
    let malformed = || StoreError::provider(PROVIDER, "unexpected op inject output");

    let mut values = HashMap::with_capacity(accounts.len());
    let mut rest = output;
    for (i, account) in accounts.iter().enumerate() {
        let header = format!("{}\n", inject_marker(i));
        let start = rest.find(&header).ok_or_else(malformed)? + header.len();
        rest = &rest[start..];

        let end = if i + 1 < accounts.len() {
            rest.find(&inject_marker(i + 1)).ok_or_else(malformed)?
        } else {
            rest.len()
        };
        let value = &rest[..end];
        let value = value.strip_suffix('\n').unwrap_or(value);
        values.insert(account.clone(), value.to_string());
        rest = &rest[end..];
    }
    Ok(values)
}

fn is_missing_item(stderr: &str) -> bool {
    stderr.contains("isn't an item")
}

/// Sort an `op` failure into unavailable (no session) or a plain provider error
fn failure(stderr: &str) -> StoreError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("not currently signed in")
        || lowered.contains("no accounts configured")
        || lowered.contains("authorization prompt dismissed")
    {
        StoreError::unavailable(PROVIDER, stderr)
    } else {
        StoreError::provider(PROVIDER, stderr)
    }
}

fn parse_json<T: DeserializeOwned>(stdout: &str) -> StoreResult<T> {
    let trimmed = stdout.trim();
    // `op ... list` prints nothing at all when there is nothing to list
    let text = if trimmed.is_empty() { "[]" } else { trimmed };
    serde_json::from_str(text)
        .map_err(|e| StoreError::provider(PROVIDER, format!("unexpected op output: {}", e)))
}

fn item_notes(account: &str) -> String {
    format!(
        "This item was generated with `chainenv`. Access it with \n```\nchainenv get {}\n```",
        account
    )
}

#[async_trait]
impl SecretStore for OnePasswordStore {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn get_password(&self, account: &str) -> StoreResult<String> {
        let vault = self.ensure_vault().await?;
        let reference = format!("op://{}/{}/{}", vault.id, account, PASSWORD_FIELD);

        let output = self.op_raw(&["read", "--no-newline", &reference]).await?;
        if output.success {
            debug!(account, len = output.stdout.len(), "read 1Password item");
            return Ok(output.stdout);
        }
        if is_missing_item(&output.stderr) {
            return Err(StoreError::NotFound(account.to_string()));
        }
        Err(failure(&output.stderr))
    }

    async fn set_password(&self, account: &str, password: &str, mode: WriteMode) -> StoreResult<()> {
        let vault = self.ensure_vault().await?;
        let existing = self.find_item(vault, account).await?;
        let assignment = format!("{}={}", PASSWORD_FIELD, password);

        match (mode, existing) {
            (WriteMode::Update, None) => Err(StoreError::NotFoundForUpdate(account.to_string())),
            (WriteMode::Update, Some(item)) => {
                self.op(&["item", "edit", &item.id, "--vault", &vault.id, &assignment])
                    .await?;
                debug!(account, item_id = %item.id, "updated 1Password item");
                Ok(())
            }
            (WriteMode::Create, Some(_)) => Err(StoreError::AlreadyExists(account.to_string())),
            (WriteMode::Create, None) => {
                let notes = format!("notesPlain={}", item_notes(account));
                self.op(&[
                    "item",
                    "create",
                    "--category",
                    "password",
                    "--title",
                    account,
                    "--vault",
                    &vault.id,
                    "--tags",
                    ITEM_TAG,
                    "--format",
                    "json",
                    &assignment,
                    &notes,
                ])
                .await?;
                debug!(account, vault = %vault.name, "created 1Password item");
                Ok(())
            }
        }
    }

    /// One `op inject` for the whole batch, falling back to individual
    /// reads when it fails (typically because one item is missing)
    async fn get_many(&self, accounts: &[String]) -> HashMap<String, String> {
        if accounts.is_empty() {
            return HashMap::new();
        }
        match self.inject_many(accounts).await {
            Ok(values) => {
                debug!(count = values.len(), "read 1Password items with op inject");
                values
            }
            Err(e) => {
                debug!(error = %e, "op inject failed, reading items one by one");
                get_each(self, accounts).await
            }
        }
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let vault = self.ensure_vault().await?;
        let output = self
            .op(&["item", "list", "--vault", &vault.id, "--tags", ITEM_TAG, "--format", "json"])
            .await?;
        let items: Vec<ItemSummary> = parse_json(&output.stdout)?;
        Ok(items.into_iter().map(|item| item.title).collect())
    }
}

/// Find the service-account token `op` should authenticate with
///
/// The environment wins; otherwise, if a token key is configured, the
/// token is read from `local` (normally the keychain) under that key.
/// `Ok(None)` leaves `op` to its own session handling.
pub async fn resolve_service_account_token<E>(
    env: E,
    token_key: Option<&str>,
    local: &dyn SecretStore,
) -> StoreResult<Option<String>>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(token) = env(SERVICE_ACCOUNT_TOKEN_ENV).filter(|t| !t.is_empty()) {
        return Ok(Some(token));
    }

    let key = match token_key.filter(|k| !k.is_empty()) {
        Some(key) => key,
        None => return Ok(None),
    };

    debug!(key, store = local.name(), "loading 1Password service account token");
    local.get_password(key).await.map(Some).map_err(|e| {
        StoreError::unavailable(
            PROVIDER,
            format!("failed to load {} from {}: {}", key, local.name(), e),
        )
    })
}
