// ABOUTME: Per-image results and the session report that aggregates them.
// ABOUTME: Failures here are data; they never abort the remaining images.

use super::resolver::UpgradeTarget;
use crate::diagnostics::Warning;
use crate::guest::StatusToken;
use crate::types::ImageId;
use std::collections::BTreeSet;
use std::fmt;

/// Why a single image was not upgraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The guest script exited non-zero.
    Guest,
    /// The guest did not recognise the operating system.
    Unsupported,
    /// Snapshotting the container failed.
    Commit(String),
    /// Moving a tag to the new image failed; tags were rolled back.
    Tag(String),
    /// A runtime call before the commit decision failed.
    Runtime(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Guest => write!(f, "upgrade script failed"),
            FailureKind::Unsupported => write!(f, "unsupported distribution"),
            FailureKind::Commit(msg) => write!(f, "commit failed: {}", msg),
            FailureKind::Tag(msg) => write!(f, "retag failed: {}", msg),
            FailureKind::Runtime(msg) => write!(f, "{}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// A new image was committed and every tag moved to it.
    Upgraded { new_image: ImageId },
    /// Nothing needed upgrading and no commit was forced.
    Skipped,
    Failed(FailureKind),
}

/// What happened to one target.
#[derive(Debug, Clone)]
pub struct UpgradeOutcome {
    pub target: UpgradeTarget,
    pub disposition: Disposition,
    /// Token the guest reported, `Unknown("")` when it wrote nothing.
    pub status_token: StatusToken,
    /// Guest exit code, absent when the guest never ran to completion.
    pub exit_code: Option<i64>,
    /// Captured guest stdout.
    pub output: String,
}

impl UpgradeOutcome {
    /// A failure before the guest produced anything.
    pub(crate) fn failed_early(target: &UpgradeTarget, kind: FailureKind) -> Self {
        Self {
            target: target.clone(),
            disposition: Disposition::Failed(kind),
            status_token: StatusToken::Unknown(String::new()),
            exit_code: None,
            output: String::new(),
        }
    }

    pub fn upgraded(&self) -> bool {
        matches!(self.disposition, Disposition::Upgraded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.disposition, Disposition::Failed(_))
    }

    pub fn new_image_id(&self) -> Option<&ImageId> {
        match &self.disposition {
            Disposition::Upgraded { new_image } => Some(new_image),
            _ => None,
        }
    }
}

/// Everything a finished session produced.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub outcomes: Vec<UpgradeOutcome>,
    /// Tags now pointing at freshly committed images.
    pub upgraded_tags: BTreeSet<String>,
    /// Names of containers stopped because they ran a replaced image.
    pub stopped_containers: Vec<String>,
    pub warnings: Vec<Warning>,
}

impl SessionReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failure()).count()
    }

    pub fn upgrades(&self) -> usize {
        self.outcomes.iter().filter(|o| o.upgraded()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> UpgradeTarget {
        UpgradeTarget {
            id: ImageId::new("sha256:aaaa"),
            tags: BTreeSet::from(["app:1".to_string()]),
        }
    }

    #[test]
    fn new_image_id_only_for_upgrades() {
        let mut outcome = UpgradeOutcome::failed_early(&target(), FailureKind::Guest);
        assert!(outcome.is_failure());
        assert!(outcome.new_image_id().is_none());

        outcome.disposition = Disposition::Upgraded {
            new_image: ImageId::new("sha256:bbbb"),
        };
        assert!(outcome.upgraded());
        assert_eq!(outcome.new_image_id().unwrap().as_str(), "sha256:bbbb");
    }

    #[test]
    fn report_counts() {
        let mut skipped = UpgradeOutcome::failed_early(&target(), FailureKind::Guest);
        skipped.disposition = Disposition::Skipped;
        let report = SessionReport {
            outcomes: vec![
                skipped,
                UpgradeOutcome::failed_early(&target(), FailureKind::Unsupported),
            ],
            ..Default::default()
        };
        assert_eq!(report.failures(), 1);
        assert_eq!(report.upgrades(), 0);
    }

    #[test]
    fn failure_kind_display() {
        assert_eq!(
            FailureKind::Tag("boom".into()).to_string(),
            "retag failed: boom"
        );
        assert_eq!(FailureKind::Unsupported.to_string(), "unsupported distribution");
    }
}
