// ABOUTME: Settings for the forward-proxy sidecar.
// ABOUTME: Image, port, volume mount points, and readiness probe budget.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxySettings {
    #[serde(default = "default_image")]
    pub image: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_spool_path")]
    pub spool_path: String,

    #[serde(default = "default_log_path")]
    pub log_path: String,

    #[serde(default = "default_probe_interval", with = "humantime_serde")]
    pub probe_interval: Duration,

    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
}

fn default_image() -> String {
    "ubuntu/squid:latest".to_string()
}

fn default_port() -> u16 {
    3128
}

fn default_spool_path() -> String {
    "/var/spool/squid".to_string()
}

fn default_log_path() -> String {
    "/var/log/squid".to_string()
}

fn default_probe_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_probe_attempts() -> u32 {
    80
}

impl Default for ProxySettings {
    fn default() -> Self {
        ProxySettings {
            image: default_image(),
            port: default_port(),
            spool_path: default_spool_path(),
            log_path: default_log_path(),
            probe_interval: default_probe_interval(),
            probe_attempts: default_probe_attempts(),
        }
    }
}

impl ProxySettings {
    /// Proxy URL as seen from a container sharing the sidecar's network stack.
    pub fn local_url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }
}
