// ABOUTME: Container operations trait for container runtimes.
// ABOUTME: Create, start, attach, wait, stop, remove, inspect, and list containers.

use super::sealed::Sealed;
use super::shared_types::{ContainerConfig, ContainerInfo};
use crate::types::ContainerId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Write half of an attached container stdin.
pub type StdinWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Container lifecycle operations.
#[async_trait]
pub trait ContainerOps: Sealed + Send + Sync {
    /// Create a container from the given configuration.
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError>;

    /// Start a created container.
    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError>;

    /// Attach to a container's stdin.
    ///
    /// Shutting the returned writer down signals end-of-input to the
    /// container when it was created interactive.
    async fn attach_stdin(&self, id: &ContainerId) -> Result<StdinWriter, ContainerError>;

    /// Block until the container exits and return its exit code.
    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError>;

    /// Stop a running container.
    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError>;

    /// Remove a container together with its anonymous volumes.
    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError>;

    /// Get detailed information about a container.
    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError>;

    /// List containers matching the given filters.
    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError>;
}

/// Filters for listing containers.
#[derive(Debug, Clone, Default)]
pub struct ContainerFilters {
    /// Filter by label (key=value).
    pub labels: HashMap<String, String>,
    /// Filter by name (supports partial match).
    pub name: Option<String>,
    /// Include stopped containers.
    pub all: bool,
}

impl ContainerFilters {
    /// Running containers only, no other filter.
    pub fn running() -> Self {
        Self::default()
    }
}

/// Summary information about a container.
#[derive(Debug, Clone)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: ContainerId,
    /// Container name.
    pub name: String,
    /// Image as listed by the runtime. Docker swaps the declared name for
    /// the image id once that name points elsewhere; inspect the container
    /// for the declared form.
    pub image: String,
    /// Current state.
    pub state: String,
}

/// Errors from container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("container not found: {0}")]
    NotFound(String),

    #[error("container already exists: {0}")]
    AlreadyExists(String),

    #[error("container not running: {0}")]
    NotRunning(String),

    #[error("container already running: {0}")]
    AlreadyRunning(String),

    #[error("image not found: {0}")]
    ImageNotFound(String),

    #[error("attach failed: {0}")]
    AttachFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
