//! Settings file for the host.
//!
//! Read from `--config` if given, otherwise from `~/.usb-creator/usbcreator.toml`.
//! Every key is optional.

use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{escalation::Escalate, tool::DEFAULT_TOOL};

/// Per-user directory holding the shared log and the settings file.
pub const USER_DIR: &str = ".usb-creator";
pub const CONFIG_FILE_NAME: &str = "usbcreator.toml";

pub const DEFAULT_ICON_DIR: &str = "/usr/share/usb-creator/grub/themes/usb-creator/icons";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Poll interval must be at least 1 ms")]
    ZeroPollInterval,
    #[error("Could not determine the home directory")]
    NoHomeDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The writer tool to run.
    pub tool: String,
    /// Where the shared log lives. Defaults to [`user_dir`].
    pub log_dir: Option<PathBuf>,
    /// Directory of `<distribution>.png` icons.
    pub icon_dir: PathBuf,
    pub poll_interval_ms: u64,
    /// How many log lines to look at on each poll.
    pub tail_lines: usize,
    /// Size cap of the shared log in bytes.
    pub max_log_bytes: u64,
    pub escalate: Escalate,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tool: DEFAULT_TOOL.to_owned(),
            log_dir: None,
            icon_dir: PathBuf::from(DEFAULT_ICON_DIR),
            poll_interval_ms: 1000,
            tail_lines: 50,
            max_log_bytes: 1024 * 1024,
            escalate: Escalate::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if `None`. A missing
    /// file gives the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => user_dir()?.join(CONFIG_FILE_NAME),
        };

        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(?path, "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let config = Self::parse(&text).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.clone(),
                source,
            },
            other => other,
        })?;
        info!(?path, "Loaded config");
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        if config.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn log_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.log_dir {
            Some(dir) => Ok(dir.clone()),
            None => user_dir(),
        }
    }
}

/// `~/.usb-creator`. Fails rather than falling back to a relative path.
pub fn user_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(USER_DIR))
        .ok_or(ConfigError::NoHomeDir)
}
