//! Config file discovery and json5 loading.

use crate::{ConfigError, LifeagentConfig};
use log::{debug, info};
use serde_json::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default config filename.
const DEFAULT_CONFIG_FILE: &str = "lifeagent.json5";
/// Default config directory under the cwd or home.
const DEFAULT_CONFIG_DIR: &str = ".lifeagent";
/// Environment variable naming an explicit config path.
const CONFIG_PATH_ENV: &str = "LIFEAGENT_CONFIG";

impl LifeagentConfig {
    /// Load config from an explicit json5 file path.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!("loading config (path={})", path.display());
        let contents = fs::read_to_string(path)?;
        parse(&contents)
    }

    /// Load config from the env override or default locations.
    ///
    /// Falls back to built-in defaults when no config file exists.
    pub fn load_default(cwd: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(CONFIG_PATH_ENV) {
            return Self::load(PathBuf::from(path));
        }
        for candidate in default_paths(cwd.as_ref()) {
            if candidate.exists() {
                return Self::load(&candidate);
            }
            debug!("no config file at {}", candidate.display());
        }
        Ok(Self::default())
    }
}

/// Parse a json5 document into a config, applying field defaults.
fn parse(contents: &str) -> Result<LifeagentConfig, ConfigError> {
    let value: Value = json5::from_str(contents)?;
    Ok(serde_json::from_value(value)?)
}

/// Candidate config locations, nearest first.
fn default_paths(cwd: &Path) -> Vec<PathBuf> {
    let mut paths = vec![cwd.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_FILE)];
    if let Some(dirs) = directories::BaseDirs::new() {
        paths.push(
            dirs.home_dir()
                .join(DEFAULT_CONFIG_DIR)
                .join(DEFAULT_CONFIG_FILE),
        );
    }
    paths
}
