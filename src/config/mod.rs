// ABOUTME: Optional YAML settings for reimage.
// ABOUTME: Defaults for the proxy sidecar, status channel location, and runtime override.

mod proxy;

pub use proxy::ProxySettings;

use crate::error::{Error, Result};
use crate::runtime::{RuntimeConfig, RuntimeType};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub proxy: ProxySettings,

    /// Directory where status channel fifos are created.
    #[serde(default = "default_status_dir")]
    pub status_dir: PathBuf,

    /// Grace period when stopping containers still running an old image.
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub stop_timeout: Duration,

    /// Replacement for the bundled upgrade script.
    #[serde(default)]
    pub script: Option<PathBuf>,

    #[serde(default)]
    pub runtime: Option<RuntimeType>,

    #[serde(default)]
    pub socket: Option<String>,
}

fn default_status_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            proxy: ProxySettings::default(),
            status_dir: default_status_dir(),
            stop_timeout: default_stop_timeout(),
            script: None,
            runtime: None,
            socket: None,
        }
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml).map_err(Error::from)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from an explicit file, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                let yaml = std::fs::read_to_string(path)?;
                Self::from_yaml(&yaml)
            }
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.proxy.port == 0 {
            return Err(Error::InvalidConfig("proxy.port must not be 0".to_string()));
        }
        if self.proxy.probe_attempts == 0 {
            return Err(Error::InvalidConfig(
                "proxy.probe_attempts must be at least 1".to_string(),
            ));
        }
        if self.proxy.image.trim().is_empty() {
            return Err(Error::InvalidConfig("proxy.image must not be empty".to_string()));
        }
        if !self.status_dir.is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "status_dir must be an absolute path: {}",
                self.status_dir.display()
            )));
        }
        Ok(())
    }

    /// Runtime override for detection.
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            runtime: self.runtime,
            socket: self.socket.clone(),
        }
    }
}
