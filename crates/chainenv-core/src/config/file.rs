//! Reading and atomically writing the TOML config file

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use super::discovery::{default_config_path, find_config};
use super::document::ConfigDocument;
use super::error::{ConfigError, ConfigResult};

#[cfg(unix)]
const CONFIG_MODE: u32 = 0o644;

/// Load and parse a config file; an empty file is an empty document
pub fn load(path: &Path) -> ConfigResult<ConfigDocument> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
    parse(path, &content)
}

/// Like `load`, but a missing file is an empty document too
pub fn load_or_empty(path: &Path) -> ConfigResult<ConfigDocument> {
    match fs::read_to_string(path) {
        Ok(content) => parse(path, &content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(ConfigDocument::default()),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

fn parse(path: &Path, content: &str) -> ConfigResult<ConfigDocument> {
    if content.trim().is_empty() {
        return Ok(ConfigDocument::default());
    }
    toml::from_str(content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialize `config` and replace `path` atomically
///
/// The document is written to a temporary sibling, flushed, given its final
/// permissions and renamed over `path`. The temporary file is removed if any
/// step before the rename fails.
pub fn save(path: &Path, config: &ConfigDocument) -> ConfigResult<()> {
    let mut data = toml::to_string(config)?;
    if !data.ends_with('\n') {
        data.push('\n');
    }

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ConfigError::io(&dir, e))?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| ConfigError::io(&dir, e))?;
    tmp.write_all(data.as_bytes())
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ConfigError::io(tmp.path(), e))?;
    set_permissions(tmp.as_file()).map_err(|e| ConfigError::io(tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| ConfigError::io(path, e.error))?;
    debug!(path = %path.display(), keys = config.keys.len(), "saved config");
    Ok(())
}

#[cfg(unix)]
fn set_permissions(file: &fs::File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(CONFIG_MODE))
}

#[cfg(not(unix))]
fn set_permissions(_file: &fs::File) -> io::Result<()> {
    Ok(())
}

/// A config document together with the file it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    path: PathBuf,
    pub document: ConfigDocument,
}

impl ConfigFile {
    /// Find and load the nearest config above `dir`, if any
    pub fn discover(dir: &Path) -> ConfigResult<Option<Self>> {
        match find_config(dir)? {
            Some(path) => {
                debug!(path = %path.display(), "found config");
                let document = load(&path)?;
                Ok(Some(Self { path, document }))
            }
            None => Ok(None),
        }
    }

    /// The nearest config above `dir`, or an empty one at the default location
    pub fn open_or_default(dir: &Path) -> ConfigResult<Self> {
        let path = find_config(dir)?.unwrap_or_else(|| default_config_path(dir));
        let document = load_or_empty(&path)?;
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> ConfigResult<()> {
        save(&self.path, &self.document)
    }
}
