// ABOUTME: Shared types used across runtime trait definitions.
// ABOUTME: ContainerConfig, ImageInfo, CommitRequest, ContainerInfo, etc.

use crate::types::{ContainerId, ImageId, VolumeName};
use std::collections::HashMap;

/// Configuration for creating a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerConfig {
    /// Name for the container (runtime-generated when unset).
    pub name: Option<String>,
    /// Image to run (id or reference).
    pub image: String,
    /// Environment variables.
    pub env: HashMap<String, String>,
    /// Labels to apply.
    pub labels: HashMap<String, String>,
    /// Mounts.
    pub mounts: Vec<MountSpec>,
    /// Command to run (overrides image CMD).
    pub command: Option<Vec<String>>,
    /// Entrypoint (overrides image ENTRYPOINT). `Some(vec![])` resets it.
    pub entrypoint: Option<Vec<String>>,
    /// User to run as.
    pub user: Option<String>,
    /// Keep stdin open and close it when the single attached client detaches.
    pub interactive: bool,
    /// Network mode (`bridge`, `container:<id>`, ...).
    pub network_mode: Option<String>,
}

/// Kind of mount source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    /// Host path.
    Bind,
    /// Named volume.
    Volume,
}

/// Mount configuration.
#[derive(Debug, Clone)]
pub struct MountSpec {
    /// Host path or volume name.
    pub source: String,
    /// Target path in container.
    pub target: String,
    /// Read-only flag.
    pub read_only: bool,
    /// Bind or volume.
    pub kind: MountKind,
}

impl MountSpec {
    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
            kind: MountKind::Bind,
        }
    }

    pub fn volume(name: &VolumeName, target: impl Into<String>) -> Self {
        Self {
            source: name.to_string(),
            target: target.into(),
            read_only: false,
            kind: MountKind::Volume,
        }
    }
}

/// Image metadata as reported by inspect.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    /// Content id.
    pub id: ImageId,
    /// `repo:tag` strings currently pointing at this image.
    pub repo_tags: Vec<String>,
    /// Author recorded in the image.
    pub author: Option<String>,
    /// Declared runtime configuration, kept opaque so it can be handed back
    /// verbatim on commit.
    pub config: Option<serde_json::Value>,
    /// Number of filesystem layers.
    pub layers: usize,
}

/// Parameters for snapshotting a container into a new image.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// Runtime configuration of the new image.
    pub config: Option<serde_json::Value>,
    /// Commit message.
    pub comment: String,
    /// Author metadata.
    pub author: Option<String>,
}

/// Information about a container.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Container ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Image as declared at creation, never rewritten to an id.
    pub image: String,
    /// Network settings.
    pub network_settings: NetworkSettings,
}

/// Network settings for a container.
#[derive(Debug, Clone, Default)]
pub struct NetworkSettings {
    /// IP addresses by network name.
    pub networks: HashMap<String, NetworkInfo>,
}

impl NetworkSettings {
    /// First non-empty address, preferring the default bridge.
    pub fn primary_ip(&self) -> Option<&str> {
        self.networks
            .get("bridge")
            .map(|n| n.ip_address.as_str())
            .filter(|ip| !ip.is_empty())
            .or_else(|| {
                let mut names: Vec<&String> = self.networks.keys().collect();
                names.sort();
                names
                    .into_iter()
                    .map(|name| self.networks[name].ip_address.as_str())
                    .find(|ip| !ip.is_empty())
            })
    }
}

/// Network information for a container.
#[derive(Debug, Clone, Default)]
pub struct NetworkInfo {
    /// Network ID.
    pub network_id: String,
    /// IP address in this network.
    pub ip_address: String,
}

/// Runtime metadata.
#[derive(Debug, Clone)]
pub struct RuntimeMetadata {
    /// Runtime name (e.g., "docker", "podman").
    pub name: String,
    /// Runtime version.
    pub version: String,
    /// API version.
    pub api_version: String,
    /// Operating system.
    pub os: String,
    /// Architecture.
    pub arch: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(entries: &[(&str, &str)]) -> NetworkSettings {
        NetworkSettings {
            networks: entries
                .iter()
                .map(|(name, ip)| {
                    (
                        name.to_string(),
                        NetworkInfo {
                            network_id: format!("{name}-id"),
                            ip_address: ip.to_string(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn primary_ip_prefers_bridge() {
        let s = settings(&[("custom", "10.0.0.2"), ("bridge", "172.17.0.3")]);
        assert_eq!(s.primary_ip(), Some("172.17.0.3"));
    }

    #[test]
    fn primary_ip_falls_back_to_other_networks() {
        let s = settings(&[("bridge", ""), ("podman", "10.88.0.5")]);
        assert_eq!(s.primary_ip(), Some("10.88.0.5"));
    }

    #[test]
    fn primary_ip_none_without_addresses() {
        assert_eq!(NetworkSettings::default().primary_ip(), None);
    }
}
