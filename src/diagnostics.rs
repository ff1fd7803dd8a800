// ABOUTME: Diagnostics accumulator for non-fatal warnings during an upgrade run.
// ABOUTME: Teardown failures land here instead of replacing the outcome they followed.

/// Collects non-fatal warnings during upgrade operations.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

/// A non-fatal warning collected during a run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn container_removal(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ContainerRemoval,
            message: message.into(),
        }
    }

    pub fn status_channel_removal(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StatusChannelRemoval,
            message: message.into(),
        }
    }

    pub fn volume_removal(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::VolumeRemoval,
            message: message.into(),
        }
    }

    pub fn rollback(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Rollback,
            message: message.into(),
        }
    }

    pub fn container_stop(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::ContainerStop,
            message: message.into(),
        }
    }

    pub fn layer_depth(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::LayerDepth,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// An ephemeral or sidecar container could not be removed.
    ContainerRemoval,
    /// A status fifo could not be removed from the host.
    StatusChannelRemoval,
    /// A sidecar volume could not be removed.
    VolumeRemoval,
    /// Undoing a partial commit or retag did not fully succeed.
    Rollback,
    /// A container still running an old image could not be stopped.
    ContainerStop,
    /// The image is close to the runtime's layer limit.
    LayerDepth,
}
