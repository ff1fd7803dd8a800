// ABOUTME: Image operations trait for container runtimes.
// ABOUTME: Inspect, commit, tag, and remove container images.

use super::sealed::Sealed;
use super::shared_types::{CommitRequest, ImageInfo};
use crate::types::{ContainerId, ImageId};
use async_trait::async_trait;

/// Image operations: inspect, commit, tag, remove.
#[async_trait]
pub trait ImageOps: Sealed + Send + Sync {
    /// Inspect an image by id or reference.
    async fn inspect_image(&self, reference: &str) -> Result<ImageInfo, ImageError>;

    /// Snapshot a container's filesystem into a new image.
    async fn commit_container(
        &self,
        container: &ContainerId,
        request: &CommitRequest,
    ) -> Result<ImageId, ImageError>;

    /// Point `repo:tag` at an image, replacing any previous holder of the tag.
    async fn tag_image(&self, image: &ImageId, repo: &str, tag: &str) -> Result<(), ImageError>;

    /// Remove an image.
    async fn remove_image(&self, image: &ImageId, force: bool) -> Result<(), ImageError>;
}

/// Errors from image operations.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("commit failed: {0}")]
    CommitFailed(String),

    #[error("tag failed: {0}")]
    TagFailed(String),

    #[error("image in use, cannot remove: {0}")]
    InUse(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}
