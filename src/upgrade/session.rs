// ABOUTME: One invocation of the tool: resolve, optionally start the proxy, upgrade in order.
// ABOUTME: Owns sidecar teardown and the optional stop of containers on replaced images.

use super::error::UpgradeError;
use super::executor::{Executor, ExecutorOptions};
use super::interrupt::{Interrupt, Interrupted};
use super::outcome::{SessionReport, UpgradeOutcome};
use super::proxy::ProxySidecar;
use super::resolver::{ResolveOptions, UpgradeTarget, resolve_targets};
use crate::config::ProxySettings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::guest::{GuestScript, ProxyEnv};
use crate::runtime::{ContainerError, ContainerFilters, FullRuntime};
use crate::types::{ContainerId, ImageRef, TargetRef};
use nonempty::NonEmpty;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// How upgrade containers reach package mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ProxyMode {
    #[default]
    Direct,
    /// An operator-supplied HTTP proxy URL.
    Http(String),
    /// A caching sidecar started for this session.
    Sidecar,
}

impl ProxyMode {
    /// Combine the `--http-proxy` and `--squid` flags.
    pub fn from_flags(http_proxy: Option<String>, squid: bool) -> Result<Self, UpgradeError> {
        match (http_proxy, squid) {
            (Some(_), true) => Err(UpgradeError::ConflictingProxy),
            (Some(url), false) => Ok(ProxyMode::Http(url)),
            (None, true) => Ok(ProxyMode::Sidecar),
            (None, false) => Ok(ProxyMode::Direct),
        }
    }

    /// Variables exported to the guest.
    ///
    /// With a sidecar, both schemes default to the sidecar unless an
    /// explicit HTTPS proxy was given.
    pub fn guest_env(&self, https_proxy: Option<&str>, sidecar: &ProxySettings) -> ProxyEnv {
        let https = https_proxy.map(str::to_string);
        match self {
            ProxyMode::Direct => ProxyEnv { http: None, https },
            ProxyMode::Http(url) => ProxyEnv {
                http: Some(url.clone()),
                https,
            },
            ProxyMode::Sidecar => ProxyEnv {
                http: Some(sidecar.local_url()),
                https: https.or_else(|| Some(sidecar.local_url())),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub force: bool,
    pub resolve: ResolveOptions,
    pub proxy: ProxyMode,
    pub https_proxy: Option<String>,
    /// Stop running containers whose image tag was upgraded.
    pub stop_affected: bool,
    pub stop_timeout: Duration,
    pub status_dir: PathBuf,
    pub sidecar: ProxySettings,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            force: false,
            resolve: ResolveOptions::default(),
            proxy: ProxyMode::Direct,
            https_proxy: None,
            stop_affected: false,
            stop_timeout: Duration::from_secs(10),
            status_dir: std::env::temp_dir(),
            sidecar: ProxySettings::default(),
        }
    }
}

pub struct Session<'a, R: FullRuntime + ?Sized> {
    runtime: &'a R,
    script: &'a GuestScript,
    options: SessionOptions,
    interrupt: Interrupt,
}

impl<'a, R: FullRuntime + ?Sized> Session<'a, R> {
    pub fn new(
        runtime: &'a R,
        script: &'a GuestScript,
        options: SessionOptions,
        interrupt: Interrupt,
    ) -> Self {
        Self {
            runtime,
            script,
            options,
            interrupt,
        }
    }

    /// Upgrade every image `references` resolves to, strictly one at a
    /// time. `on_outcome` sees each result as soon as it is known.
    ///
    /// Precondition failures return before anything is created. Once the
    /// sidecar exists it is removed on every path, including interrupts.
    pub async fn run<F>(
        self,
        references: &NonEmpty<TargetRef>,
        mut on_outcome: F,
    ) -> Result<SessionReport, UpgradeError>
    where
        F: FnMut(&UpgradeOutcome),
    {
        let references: Vec<TargetRef> = references.iter().cloned().collect();
        let targets = self
            .interrupt
            .interruptible(resolve_targets(
                self.runtime,
                &references,
                self.options.resolve,
            ))
            .await??
            .into_ordered();

        if !self.options.force
            && let Some(untagged) = targets.iter().find(|t| t.tags.is_empty())
        {
            return Err(UpgradeError::Untagged(untagged.id.to_string()));
        }

        let mut diag = Diagnostics::default();
        if targets.is_empty() {
            tracing::info!("nothing to upgrade");
            return Ok(SessionReport::default());
        }
        tracing::info!(images = targets.len(), "starting upgrade session");

        let sidecar = match self.options.proxy {
            ProxyMode::Sidecar => Some(
                ProxySidecar::start(
                    self.runtime,
                    &self.options.sidecar,
                    &self.interrupt,
                    &mut diag,
                )
                .await?,
            ),
            _ => None,
        };

        let mut report = SessionReport::default();
        let result = self
            .upgrade_all(&targets, sidecar.as_ref(), &mut report, &mut diag, &mut on_outcome)
            .await;

        if let Some(sidecar) = sidecar {
            sidecar.stop(self.runtime, &mut diag).await;
        }

        report.warnings = diag.into_warnings();
        result?;
        Ok(report)
    }

    async fn upgrade_all<F>(
        &self,
        targets: &[UpgradeTarget],
        sidecar: Option<&ProxySidecar>,
        report: &mut SessionReport,
        diag: &mut Diagnostics,
        on_outcome: &mut F,
    ) -> Result<(), Interrupted>
    where
        F: FnMut(&UpgradeOutcome),
    {
        let options = ExecutorOptions {
            force: self.options.force,
            proxy: self
                .options
                .proxy
                .guest_env(self.options.https_proxy.as_deref(), &self.options.sidecar),
            status_dir: self.options.status_dir.clone(),
        };
        let executor = Executor::new(self.runtime, self.script, &self.interrupt, options);

        for target in targets {
            self.interrupt.checkpoint()?;
            let outcome = executor.upgrade(target, sidecar, diag).await?;
            if outcome.upgraded() {
                report.upgraded_tags.extend(outcome.target.tags.iter().cloned());
            }
            on_outcome(&outcome);
            report.outcomes.push(outcome);
        }

        if self.options.stop_affected && !report.upgraded_tags.is_empty() {
            self.interrupt.checkpoint()?;
            report.stopped_containers = self
                .stop_affected(
                    &report.upgraded_tags,
                    sidecar.map(ProxySidecar::container_id),
                    diag,
                )
                .await;
        }
        Ok(())
    }

    /// Stop running containers created from a tag that now points at a new
    /// image. Returns the names of the ones stopped.
    ///
    /// The declared image comes from inspecting each container: listings
    /// show the image id instead once the tag has moved on.
    async fn stop_affected(
        &self,
        upgraded: &BTreeSet<String>,
        skip: Option<&ContainerId>,
        diag: &mut Diagnostics,
    ) -> Vec<String> {
        let running = match self.runtime.list_containers(&ContainerFilters::running()).await {
            Ok(running) => running,
            Err(e) => {
                diag.warn(Warning::container_stop(format!(
                    "could not list running containers: {}",
                    e
                )));
                return Vec::new();
            }
        };

        let upgraded: Vec<ImageRef> = upgraded
            .iter()
            .filter_map(|tag| ImageRef::parse(tag).ok())
            .collect();
        let mut stopped = Vec::new();
        for container in running {
            if Some(&container.id) == skip {
                continue;
            }
            let declared = match self.runtime.inspect_container(&container.id).await {
                Ok(info) => info.image,
                Err(ContainerError::NotFound(_)) => continue,
                Err(e) => {
                    diag.warn(Warning::container_stop(format!(
                        "could not inspect {}: {}",
                        container.name, e
                    )));
                    continue;
                }
            };
            if !declares_upgraded_tag(&declared, &upgraded) {
                continue;
            }
            tracing::info!(container = %container.name, image = %declared, "stopping container on replaced image");
            match self
                .runtime
                .stop_container(&container.id, self.options.stop_timeout)
                .await
            {
                Ok(()) => stopped.push(container.name),
                Err(e) => diag.warn(Warning::container_stop(format!(
                    "could not stop {}: {}",
                    container.name, e
                ))),
            }
        }
        stopped
    }
}

/// Whether a container's declared image names one of the upgraded tags.
/// Containers pinned by id or digest never do.
fn declares_upgraded_tag(declared: &str, upgraded: &[ImageRef]) -> bool {
    match TargetRef::parse(declared) {
        Ok(TargetRef::Named(image)) if image.digest().is_none() => {
            upgraded.iter().any(|tag| tag.same_tag(&image))
        }
        _ => false,
    }
}
