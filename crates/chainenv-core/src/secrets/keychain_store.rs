//! System keychain secret store
//!
//! Uses the OS keychain for secure secret storage:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring, KWallet)

use async_trait::async_trait;
use keyring::Entry;
use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use super::traits::{SecretStore, StoreError, StoreResult, WriteMode};

/// Prefix for the keychain service of every item this tool writes
pub const DEFAULT_PREFIX: &str = "chainenv";

const PROVIDER: &str = "keychain";
const PROBE_ACCOUNT: &str = "__chainenv_probe__";

/// Output layouts of the platform listing commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingFormat {
    /// `security dump-keychain` (macOS)
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    DumpKeychain,
    /// `secret-tool search --all` (Linux Secret Service)
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    SecretTool,
}

#[cfg_attr(not(any(target_os = "macos", target_os = "linux")), allow(dead_code))]
struct ListingCommand {
    program: &'static str,
    args: &'static [&'static str],
    format: ListingFormat,
}

#[cfg(target_os = "macos")]
const LISTING: Option<ListingCommand> = Some(ListingCommand {
    program: "security",
    args: &["dump-keychain"],
    format: ListingFormat::DumpKeychain,
});

// keyring tags every Secret Service item it creates with application=rust-keyring
#[cfg(target_os = "linux")]
const LISTING: Option<ListingCommand> = Some(ListingCommand {
    program: "secret-tool",
    args: &["search", "--all", "application", "rust-keyring"],
    format: ListingFormat::SecretTool,
});

#[cfg(not(any(target_os = "macos", target_os = "linux")))]
const LISTING: Option<ListingCommand> = None;

/// Secret store backed by the system keychain
///
/// Each account is stored under the service `<prefix>-<account>` with the
/// account as user name, so items written by this tool can be told apart
/// from everything else in a shared keychain.
///
/// # Example
///
/// ```no_run
/// use chainenv_core::secrets::{KeychainStore, SecretStore, WriteMode};
///
/// # async fn run() -> chainenv_core::secrets::StoreResult<()> {
/// let store = KeychainStore::new();
/// store.set_password("GITHUB_TOKEN", "ghp_...", WriteMode::Create).await?;
/// let token = store.get_password("GITHUB_TOKEN").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KeychainStore {
    prefix: String,
}

impl KeychainStore {
    /// Create a new keychain store with the default prefix "chainenv"
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    /// Create a new keychain store with a custom service prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Namespaced keychain service for an account
    pub fn service_for(&self, account: &str) -> String {
        service_name(&self.prefix, account)
    }

    /// Check that the keychain can be reached at all
    ///
    /// Looks up a sentinel entry; a clean "no entry" answer means the
    /// backing service responded.
    pub async fn probe(&self) -> StoreResult<()> {
        let prefix = self.prefix.clone();
        blocking(move || {
            let entry = open_entry(&prefix, PROBE_ACCOUNT)?;
            match entry.get_password() {
                Ok(_) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(map_keyring_error(PROBE_ACCOUNT, e)),
            }
        })
        .await
    }
}

impl Default for KeychainStore {
    fn default() -> Self {
        Self::new()
    }
}

fn service_name(prefix: &str, account: &str) -> String {
    format!("{}-{}", prefix, account)
}

fn open_entry(prefix: &str, account: &str) -> StoreResult<Entry> {
    Entry::new(&service_name(prefix, account), account)
        .map_err(|e| StoreError::provider(PROVIDER, format!("failed to create keychain entry: {}", e)))
}

fn map_keyring_error(account: &str, err: keyring::Error) -> StoreError {
    match err {
        keyring::Error::NoEntry => StoreError::NotFound(account.to_string()),
        keyring::Error::NoStorageAccess(e) | keyring::Error::PlatformFailure(e) => {
            StoreError::unavailable(PROVIDER, e.to_string())
        }
        other => StoreError::provider(PROVIDER, other.to_string()),
    }
}

/// Run a keyring call off the async executor
async fn blocking<T, F>(f: F) -> StoreResult<T>
where
    F: FnOnce() -> StoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::provider(PROVIDER, format!("keychain task failed: {}", e)))?
}

/// Extract bare account names from a platform listing
///
/// Only services carrying `<prefix>-` are reported; duplicates keep the
/// position of their first occurrence.
fn parse_listing(output: &str, prefix: &str, format: ListingFormat) -> Vec<String> {
    let escaped = regex::escape(prefix);
    let pattern = match format {
        ListingFormat::DumpKeychain => format!(r#""svce"<blob>="{}-(.+)""#, escaped),
        ListingFormat::SecretTool => format!(r"(?m)^attribute\.service = {}-(.+?)\s*$", escaped),
    };
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let mut accounts: Vec<String> = Vec::new();
    for caps in re.captures_iter(output) {
        let account = &caps[1];
        if !accounts.iter().any(|a| a == account) {
            accounts.push(account.to_string());
        }
    }
    accounts
}

#[async_trait]
impl SecretStore for KeychainStore {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn get_password(&self, account: &str) -> StoreResult<String> {
        debug!(account, service = %self.service_for(account), "keychain get");
        let prefix = self.prefix.clone();
        let account = account.to_string();
        blocking(move || {
            let entry = open_entry(&prefix, &account)?;
            entry
                .get_password()
                .map_err(|e| map_keyring_error(&account, e))
        })
        .await
    }

    async fn set_password(&self, account: &str, password: &str, mode: WriteMode) -> StoreResult<()> {
        debug!(account, ?mode, "keychain set");
        let prefix = self.prefix.clone();
        let account = account.to_string();
        let password = password.to_string();
        blocking(move || {
            let entry = open_entry(&prefix, &account)?;
            let exists = match entry.get_password() {
                Ok(_) => true,
                Err(keyring::Error::NoEntry) => false,
                Err(e) => return Err(map_keyring_error(&account, e)),
            };

            match mode {
                WriteMode::Create if exists => return Err(StoreError::AlreadyExists(account)),
                WriteMode::Update if !exists => return Err(StoreError::NotFoundForUpdate(account)),
                _ => {}
            }

            entry
                .set_password(&password)
                .map_err(|e| map_keyring_error(&account, e))
        })
        .await
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let listing = LISTING.ok_or_else(|| {
            StoreError::provider(PROVIDER, "listing keychain items is not supported on this platform")
        })?;

        debug!(program = listing.program, "listing keychain items");
        let output = Command::new(listing.program)
            .args(listing.args)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    StoreError::unavailable(PROVIDER, format!("{} not found", listing.program))
                }
                _ => StoreError::Io(e),
            })?;

        if !output.status.success() {
            return Err(StoreError::provider(
                PROVIDER,
                format!(
                    "{} failed: {}",
                    listing.program,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        // secret-tool splits item headers and attributes across both streams
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push('\n');
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(parse_listing(&text, &self.prefix, listing.format))
    }
}
