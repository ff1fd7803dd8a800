// ABOUTME: Application-wide error types for reimage.
// ABOUTME: Uses thiserror for ergonomic error handling.

use crate::guest::ScriptError;
use crate::runtime::RuntimeError;
use crate::upgrade::{UpgradeError, UpgradeErrorKind};
use std::path::PathBuf;
use thiserror::Error;

/// Exit status used when the operator interrupted the run.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Upgrade(#[from] UpgradeError),

    #[error("{0} image(s) failed to upgrade")]
    UpgradesFailed(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Upgrade(e) if e.kind() == UpgradeErrorKind::Interrupted => EXIT_INTERRUPTED,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
