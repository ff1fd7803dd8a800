// ABOUTME: Log operations trait for container runtimes.
// ABOUTME: Streams container output and collects it for the upgrade decision.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// Log streaming operations.
#[async_trait]
pub trait LogOps: Sealed + Send + Sync {
    /// Stream logs from a container.
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>, LogError>;
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Include stdout.
    pub stdout: bool,
    /// Include stderr.
    pub stderr: bool,
    /// Follow log output (like `tail -f`).
    pub follow: bool,
    /// Number of lines to show from end (None = all).
    pub tail: Option<u64>,
}

impl LogOptions {
    /// Everything the container has written so far, without following.
    pub fn all() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: false,
            tail: None,
        }
    }
}

/// A chunk of container output.
#[derive(Debug, Clone)]
pub struct LogLine {
    /// The log content.
    pub content: String,
    /// Whether this is from stdout or stderr.
    pub stream: LogStream,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

/// Errors from log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Drain a container's logs into one string, split by stream.
pub async fn collect_logs<R: LogOps + ?Sized>(
    runtime: &R,
    id: &ContainerId,
    opts: &LogOptions,
) -> Result<(String, String), LogError> {
    let mut stream = runtime.container_logs(id, opts).await?;
    let mut stdout = String::new();
    let mut stderr = String::new();
    while let Some(line) = stream.next().await {
        let line = line?;
        match line.stream {
            LogStream::Stdout => stdout.push_str(&line.content),
            LogStream::Stderr => stderr.push_str(&line.content),
        }
    }
    Ok((stdout, stderr))
}
