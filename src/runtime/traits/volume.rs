// ABOUTME: Volume operations trait for container runtimes.
// ABOUTME: Create and remove named volumes.

use super::sealed::Sealed;
use crate::types::VolumeName;
use async_trait::async_trait;

/// Named volume operations.
#[async_trait]
pub trait VolumeOps: Sealed + Send + Sync {
    /// Create a named volume.
    async fn create_volume(&self, name: &str) -> Result<VolumeName, VolumeError>;

    /// Remove a named volume.
    async fn remove_volume(&self, name: &VolumeName, force: bool) -> Result<(), VolumeError>;
}

/// Errors from volume operations.
#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error("volume not found: {0}")]
    NotFound(String),

    #[error("volume in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
