// ABOUTME: Errors that abort an upgrade session as a whole.
// ABOUTME: Per-image failures are outcomes, not errors; see outcome.rs.

use super::interrupt::Interrupted;
use crate::runtime::{ContainerError, VolumeError};
use std::fmt;
use thiserror::Error;

/// Why a command-line reference could not be resolved to an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionReason {
    NotFound,
    Inspect(String),
}

/// One reference that failed to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionFailure {
    pub reference: String,
    pub reason: ResolutionReason,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ResolutionReason::NotFound => write!(f, "{}: no such image", self.reference),
            ResolutionReason::Inspect(msg) => write!(f, "{}: {}", self.reference, msg),
        }
    }
}

/// Failures while bringing the proxy sidecar up.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("volume setup failed: {0}")]
    Volume(#[from] VolumeError),

    #[error("container setup failed: {0}")]
    Container(#[from] ContainerError),

    #[error("sidecar has no network address")]
    NoAddress,

    #[error("sidecar reported an unusable address: {0}")]
    InvalidAddress(String),

    #[error("proxy at {address} not reachable after {attempts} attempts")]
    NotReachable { address: String, attempts: u32 },

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Session-level failures. Each one ends the run before or between images.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("could not resolve {}", join_failures(.0))]
    Unresolved(Vec<ResolutionFailure>),

    #[error("image {0} has no tag to carry the upgrade; use --force to commit it untagged")]
    Untagged(String),

    #[error("--http-proxy and --squid cannot be combined")]
    ConflictingProxy,

    #[error("proxy sidecar failed to start: {0}")]
    Sidecar(SidecarError),

    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Coarse category of an [`UpgradeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeErrorKind {
    /// Bad input detected before any runtime mutation.
    Precondition,
    /// The sidecar could not be brought up; partial resources were removed.
    SidecarStart,
    /// The operator interrupted the run; cleanup already happened.
    Interrupted,
}

impl UpgradeError {
    pub fn kind(&self) -> UpgradeErrorKind {
        match self {
            UpgradeError::Unresolved(_)
            | UpgradeError::Untagged(_)
            | UpgradeError::ConflictingProxy => UpgradeErrorKind::Precondition,
            UpgradeError::Sidecar(_) => UpgradeErrorKind::SidecarStart,
            UpgradeError::Interrupted(_) => UpgradeErrorKind::Interrupted,
        }
    }
}

impl From<SidecarError> for UpgradeError {
    fn from(err: SidecarError) -> Self {
        match err {
            SidecarError::Interrupted(i) => UpgradeError::Interrupted(i),
            other => UpgradeError::Sidecar(other),
        }
    }
}

fn join_failures(failures: &[ResolutionFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
