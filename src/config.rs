use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const CONFIG_FILE: &str = ".creel.toml";
const CONFIG_ENV: &str = "CREEL_CONFIG";

/// Durable process-wide config: where the database lives and who is
/// currently logged in. Read once at startup, rewritten in full whenever
/// the current user changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub db_url: String,
    #[serde(default)]
    pub current_user_name: Option<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl Config {
    /// Resolve the config file location: `$CREEL_CONFIG` if set, otherwise
    /// `$HOME/.creel.toml`.
    pub fn default_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        match std::env::var_os("HOME") {
            Some(home) => Path::new(&home).join(CONFIG_FILE),
            None => PathBuf::from(CONFIG_FILE),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Build a config in memory, backed by `path` for later saves.
    pub fn new(db_url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            db_url: db_url.into(),
            current_user_name: None,
            path: path.into(),
        }
    }

    /// Record `name` as the current user and rewrite the whole file.
    pub fn set_user(&mut self, name: &str) -> Result<()> {
        self.current_user_name = Some(name.to_string());
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(&self.path, content)
            .map_err(|e| Error::Config(format!("cannot write {}: {}", self.path.display(), e)))
    }
}
