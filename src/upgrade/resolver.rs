// ABOUTME: Resolves command-line references to distinct images and their tags.
// ABOUTME: Produces the deterministic processing order used by the session.

use super::error::{ResolutionFailure, ResolutionReason, UpgradeError};
use crate::runtime::{ImageError, ImageOps};
use crate::types::{ImageId, TargetRef};
use std::collections::{BTreeMap, BTreeSet};

/// How lenient resolution is with references that do not resolve.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Skip references to images that do not exist.
    pub ignore_unknown: bool,
    /// Skip references whose inspection failed for any other reason.
    pub ignore_inspect_errors: bool,
}

/// One image to upgrade, with every requested tag that points at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTarget {
    pub id: ImageId,
    /// Fully qualified `repo:tag` strings; empty for id-only targets.
    pub tags: BTreeSet<String>,
}

impl UpgradeTarget {
    /// Human label: the smallest tag, or the short id.
    pub fn label(&self) -> String {
        self.tags
            .first()
            .cloned()
            .unwrap_or_else(|| self.id.short().to_string())
    }
}

/// Resolved images keyed by id.
#[derive(Debug, Default)]
pub struct TargetSet {
    images: BTreeMap<ImageId, BTreeSet<String>>,
}

impl TargetSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Processing order: tagged images by their smallest tag, then
    /// untagged images by id.
    pub fn into_ordered(self) -> Vec<UpgradeTarget> {
        let mut targets: Vec<UpgradeTarget> = self
            .images
            .into_iter()
            .map(|(id, tags)| UpgradeTarget { id, tags })
            .collect();
        targets.sort_by(|a, b| match (a.tags.first(), b.tags.first()) {
            (Some(x), Some(y)) => x.cmp(y).then_with(|| a.id.cmp(&b.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        targets
    }
}

/// Inspect every reference and merge the results by image id.
///
/// A reference contributes its tag only when the image actually lists it,
/// so a digest or id reference never names a tag. All failures are
/// collected before returning, so the operator sees every bad reference
/// at once.
pub async fn resolve_targets<R: ImageOps + ?Sized>(
    runtime: &R,
    references: &[TargetRef],
    opts: ResolveOptions,
) -> Result<TargetSet, UpgradeError> {
    let mut set = TargetSet::default();
    let mut failures = Vec::new();

    for reference in references {
        let key = reference.inspect_key();
        match runtime.inspect_image(&key).await {
            Ok(info) => {
                let tags = set.images.entry(info.id.clone()).or_default();
                let listed = reference.matching_tags(&info.repo_tags);
                if listed.is_empty()
                    && let Some(tag) = reference.qualified_tag()
                {
                    tracing::debug!(%tag, image = %info.id.short(), "tag not listed on image, ignoring");
                }
                tags.extend(listed.into_iter().map(str::to_string));
                tracing::debug!(reference = %reference, image = %info.id.short(), "resolved");
            }
            Err(ImageError::NotFound(_)) if opts.ignore_unknown => {
                tracing::info!(reference = %reference, "image not found, skipping");
            }
            Err(ImageError::NotFound(_)) => failures.push(ResolutionFailure {
                reference: reference.to_string(),
                reason: ResolutionReason::NotFound,
            }),
            Err(e) if opts.ignore_inspect_errors => {
                tracing::warn!(reference = %reference, "inspect failed, skipping: {}", e);
            }
            Err(e) => failures.push(ResolutionFailure {
                reference: reference.to_string(),
                reason: ResolutionReason::Inspect(e.to_string()),
            }),
        }
    }

    if !failures.is_empty() {
        return Err(UpgradeError::Unresolved(failures));
    }
    Ok(set)
}
