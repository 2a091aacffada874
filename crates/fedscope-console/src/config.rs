//! Console configuration.
//!
//! Read from `~/.config/fedscope/config.toml` when present. Every field
//! has a default, so a missing file and a partial file both work; CLI flags
//! override whatever the file said.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use fedscope_backend::BackendConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// REST base and feed URL of the monitoring backend.
    pub backend: BackendConfig,
    /// Directory CSV exports land in.
    pub export_dir: PathBuf,
    /// How long one frame waits for a key press.
    #[serde(with = "humantime_serde")]
    pub tick: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            export_dir: PathBuf::from("logs"),
            tick: Duration::from_millis(100),
        }
    }
}

/// Default config file location, `None` when the platform has no config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fedscope").join("config.toml"))
}

impl ConsoleConfig {
    /// Load the config file.
    ///
    /// An explicit path must exist and parse. Without one, the default
    /// location is tried and silently skipped when absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, anyhow::Error> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let Some(path) = default_config_path() else {
                    return Ok(Self::default());
                };
                if !path.exists() {
                    return Ok(Self::default());
                }
                path
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
