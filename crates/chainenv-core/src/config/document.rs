//! In-memory form of the project config

use serde::{Deserialize, Serialize};

/// The project config: which provider and default each account uses
///
/// ```toml
/// [[keys]]
/// name = "DB_PASS"
/// provider = "1password"
/// default = "changeme"
///
/// [onepassword]
/// service_account_token_key = "OP_TOKEN"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub keys: Vec<KeyEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onepassword: Option<OnePasswordSettings>,
}

/// Resolution rule for one account
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,

    /// Overrides the global provider for this account when non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Returned instead of a not-found error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl KeyEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Settings for the 1Password provider
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OnePasswordSettings {
    /// Keychain account holding an `OP_SERVICE_ACCOUNT_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_token_key: Option<String>,
}

impl ConfigDocument {
    pub fn find_key(&self, name: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|entry| entry.name == name)
    }

    /// Replace the entry with the same name in place, or append it
    pub fn upsert_key(&mut self, entry: KeyEntry) {
        match self.keys.iter_mut().find(|existing| existing.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.keys.push(entry),
        }
    }

    /// Declared account names in file order, skipping blank entries
    pub fn key_names(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter(|entry| !entry.name.is_empty())
            .map(|entry| entry.name.clone())
            .collect()
    }

    pub fn token_key(&self) -> Option<&str> {
        self.onepassword
            .as_ref()
            .and_then(|settings| settings.service_account_token_key.as_deref())
    }
}
