//! Command implementations
//!
//! Commands write their regular output to the writer they are given and
//! diagnostics to stderr.

pub mod copy;
pub mod diag;
pub mod get;
pub mod list;
pub mod set;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;

use chainenv_core::config::{ConfigDocument, ConfigFile};
use chainenv_core::secrets::{
    has_provider, list_providers, ProviderRegistry, SecretStore, StoreFactory, DEFAULT_VAULT,
    KEYCHAIN,
};

/// Flags accepted by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Backend to use (keychain or 1password)
    #[arg(long, global = true, env = "CHAINENV_BACKEND", default_value = KEYCHAIN)]
    pub backend: String,

    /// 1Password vault to use
    #[arg(long, global = true, env = "CHAINENV_VAULT", default_value = DEFAULT_VAULT)]
    pub vault: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Everything a command needs: where it runs, the config found there and
/// a way to create stores
pub struct Context {
    pub cwd: PathBuf,
    pub backend: String,
    pub config: Option<ConfigFile>,
    pub factory: Arc<dyn StoreFactory>,
}

impl Context {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        ensure_provider(&global.backend)?;

        let cwd = std::env::current_dir().context("failed to determine current directory")?;
        let config = ConfigFile::discover(&cwd).context("failed to load config")?;
        if let Some(config) = &config {
            tracing::debug!(path = %config.path().display(), "using config");
        }

        let registry = registry(global, config.as_ref());
        Ok(Self {
            cwd,
            backend: global.backend.clone(),
            config,
            factory: Arc::new(registry),
        })
    }

    pub fn document(&self) -> Option<&ConfigDocument> {
        self.config.as_ref().map(|config| &config.document)
    }

    /// The loaded config, or an error for commands that cannot run without one
    pub fn require_config(&self) -> Result<&ConfigFile> {
        match &self.config {
            Some(config) => Ok(config),
            None => bail!("No config found"),
        }
    }

    pub async fn store(&self, provider: &str) -> Result<Arc<dyn SecretStore>> {
        self.factory
            .create(provider)
            .await
            .with_context(|| format!("failed to initialize {} backend", provider))
    }
}

/// The production store factory for these flags and config
pub fn registry(global: &GlobalArgs, config: Option<&ConfigFile>) -> ProviderRegistry {
    let token_key = config
        .and_then(|config| config.document.token_key())
        .map(str::to_string);
    ProviderRegistry::new()
        .with_vault(global.vault.clone())
        .with_token_key(token_key)
}

pub fn ensure_provider(name: &str) -> Result<()> {
    if has_provider(name) {
        return Ok(());
    }
    let known: Vec<&str> = list_providers().iter().map(|p| p.name).collect();
    bail!("unknown backend '{}' (expected one of: {})", name, known.join(", "))
}

/// Split comma-separated account arguments, dropping blanks
pub fn split_accounts<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.as_ref().split(','))
        .map(str::trim)
        .filter(|account| !account.is_empty())
        .map(str::to_string)
        .collect()
}
