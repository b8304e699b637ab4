//! Provider availability checks

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::secrets::{
    list_providers, KeychainStore, OpOutput, OpRunner, ProviderRegistry, StoreError, KEYCHAIN,
    ONEPASSWORD,
};

/// What a probe found out about a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderState {
    Available,
    /// Installed, but no usable session
    NotSignedIn(String),
    Unavailable(String),
}

impl ProviderState {
    pub fn is_available(&self) -> bool {
        matches!(self, ProviderState::Available)
    }
}

impl fmt::Display for ProviderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderState::Available => write!(f, "available"),
            ProviderState::NotSignedIn(reason) => write!(f, "installed, not signed in ({})", reason),
            ProviderState::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderStatus {
    pub provider: String,
    pub state: ProviderState,
    /// Extra detail, e.g. the signed-in 1Password account
    pub detail: Option<String>,
}

impl ProviderStatus {
    fn new(provider: &str, state: ProviderState) -> Self {
        Self {
            provider: provider.to_string(),
            state,
            detail: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    user_type: Option<String>,
}

impl WhoAmI {
    fn describe(&self) -> Option<String> {
        match (&self.email, &self.url, &self.user_type) {
            (Some(email), Some(url), _) => Some(format!("{} on {}", email, url)),
            (Some(email), None, _) => Some(email.clone()),
            (None, _, Some(user_type)) => Some(user_type.to_lowercase().replace('_', " ")),
            _ => None,
        }
    }
}

pub async fn probe_keychain(store: &KeychainStore) -> ProviderStatus {
    let state = match store.probe().await {
        Ok(()) => ProviderState::Available,
        Err(e) => ProviderState::Unavailable(reason(&e)),
    };
    ProviderStatus::new(KEYCHAIN, state)
}

/// Check that `op` is installed, then that it has a session
pub async fn probe_onepassword(runner: &dyn OpRunner) -> ProviderStatus {
    let version = match run(runner, &["--version"]).await {
        Ok(output) if output.success => output.stdout.trim().to_string(),
        Ok(output) => {
            return ProviderStatus::new(ONEPASSWORD, ProviderState::Unavailable(output.stderr))
        }
        Err(e) => return ProviderStatus::new(ONEPASSWORD, ProviderState::Unavailable(reason(&e))),
    };
    debug!(version = %version, "found op CLI");

    let state = match run(runner, &["whoami", "--format", "json"]).await {
        Ok(output) if output.success => {
            let detail = serde_json::from_str::<WhoAmI>(output.stdout.trim())
                .ok()
                .and_then(|who| who.describe());
            return ProviderStatus {
                provider: ONEPASSWORD.to_string(),
                state: ProviderState::Available,
                detail,
            };
        }
        Ok(output) => ProviderState::NotSignedIn(output.stderr),
        Err(e) => ProviderState::Unavailable(reason(&e)),
    };

    ProviderStatus {
        provider: ONEPASSWORD.to_string(),
        state,
        detail: Some(format!("op {}", version)),
    }
}

/// Probe every built-in provider, in registry order
pub async fn diagnose(registry: &ProviderRegistry) -> Vec<ProviderStatus> {
    let mut statuses = Vec::with_capacity(list_providers().len());
    for provider in list_providers() {
        let status = match provider.name {
            KEYCHAIN => probe_keychain(&registry.keychain()).await,
            ONEPASSWORD => match registry.op_cli().await {
                Ok(cli) => probe_onepassword(&cli).await,
                Err(e) => ProviderStatus::new(ONEPASSWORD, ProviderState::Unavailable(reason(&e))),
            },
            other => ProviderStatus::new(other, ProviderState::Unavailable("no probe".to_string())),
        };
        debug!(provider = %status.provider, state = %status.state, "probed provider");
        statuses.push(status);
    }
    statuses
}

async fn run(runner: &dyn OpRunner, args: &[&str]) -> Result<OpOutput, StoreError> {
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    runner.run(&args, None).await
}

fn reason(err: &StoreError) -> String {
    match err {
        StoreError::Unavailable { reason, .. } => reason.clone(),
        StoreError::Provider { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
