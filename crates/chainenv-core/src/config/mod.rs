//! Project configuration
//!
//! A TOML document (`.chainenv.toml` or `chainenv.toml`) found by walking up
//! from the working directory. It maps account names to a preferred
//! provider and a fallback value.

mod error;
mod document;
mod discovery;
mod file;

pub use error::{ConfigError, ConfigResult};
pub use document::{ConfigDocument, KeyEntry, OnePasswordSettings};
pub use discovery::{default_config_path, find_config, CONFIG_NAME, DOT_CONFIG_NAME};
pub use file::{load, load_or_empty, save, ConfigFile};
