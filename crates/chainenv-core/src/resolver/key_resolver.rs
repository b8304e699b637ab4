//! Per-account provider and default selection

use crate::config::ConfigDocument;

/// Where an account should be read from, and what to use if it is missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub provider: String,
    pub default: Option<String>,
}

/// Resolve the provider and default value for `account`
///
/// A config entry's provider overrides `fallback_provider` only when it is
/// non-empty. Its default is returned as is.
pub fn resolve_key(
    config: Option<&ConfigDocument>,
    account: &str,
    fallback_provider: &str,
) -> ResolvedKey {
    let entry = config.and_then(|config| config.find_key(account));

    let provider = entry
        .and_then(|entry| entry.provider.as_deref())
        .filter(|provider| !provider.is_empty())
        .unwrap_or(fallback_provider);

    ResolvedKey {
        provider: provider.to_string(),
        default: entry.and_then(|entry| entry.default.clone()),
    }
}
