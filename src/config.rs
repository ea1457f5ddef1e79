//! Settings read from ~/.meshdemo/config.yaml, overridable from the command line.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::Deserialize;
use thiserror::Error;

use crate::check::LINKERD_VERSION;
use crate::fetch::CACHE_PERIOD;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("user does not have a home directory")]
    NoHome,

    #[error("unable to read configuration at {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration at {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub context: Option<String>,
    pub kubectl: Option<String>,
    pub linkerd: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub cache_period_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
    pub linkerd_version: Option<String>,
}

fn timeout(secs: u64) -> Option<Duration> {
    match secs {
        0 => None,
        secs => Some(Duration::from_secs(secs)),
    }
}

impl Settings {
    pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;

        Ok(home.join(".meshdemo"))
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Settings::get_config_dir()?.join("config.yaml"))
    }

    /// A missing file means every default applies.
    pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Settings::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(Settings::default());
        }

        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn kubectl(&self) -> &str {
        self.kubectl.as_deref().unwrap_or("kubectl")
    }

    pub fn linkerd(&self) -> &str {
        self.linkerd.as_deref().unwrap_or("linkerd")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn cache_period(&self) -> Duration {
        self.cache_period_secs
            .map(Duration::from_secs)
            .unwrap_or(CACHE_PERIOD)
    }

    /// Zero disables the timeout for downloads.
    pub fn download_timeout(&self) -> Option<Duration> {
        timeout(self.download_timeout_secs.unwrap_or(60))
    }

    /// Zero disables the timeout for kubectl and linkerd.
    pub fn command_timeout(&self) -> Option<Duration> {
        timeout(self.command_timeout_secs.unwrap_or(300))
    }

    pub fn linkerd_version(&self) -> &str {
        self.linkerd_version.as_deref().unwrap_or(LINKERD_VERSION)
    }
}
