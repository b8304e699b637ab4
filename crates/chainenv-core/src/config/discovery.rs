//! Upward search for the project config file

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::error::{ConfigError, ConfigResult};

/// Hidden config file name, preferred within a directory
pub const DOT_CONFIG_NAME: &str = ".chainenv.toml";

/// Plain config file name
pub const CONFIG_NAME: &str = "chainenv.toml";

/// Walk from `start_dir` up to the filesystem root looking for a config
///
/// The innermost directory holding either file wins; within one directory
/// the dotfile wins over the plain file.
pub fn find_config(start_dir: &Path) -> ConfigResult<Option<PathBuf>> {
    for dir in start_dir.ancestors() {
        for name in [DOT_CONFIG_NAME, CONFIG_NAME] {
            let candidate = dir.join(name);
            if is_file(&candidate)? {
                return Ok(Some(candidate));
            }
        }
    }
    Ok(None)
}

/// Where `set` creates a config when none exists yet
pub fn default_config_path(dir: &Path) -> PathBuf {
    dir.join(DOT_CONFIG_NAME)
}

fn is_file(path: &Path) -> ConfigResult<bool> {
    match fs::metadata(path) {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}
