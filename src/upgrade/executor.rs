// ABOUTME: Upgrades one image in a disposable container and commits the result.
// ABOUTME: Teardown of the container and status channel runs on every exit path.

use super::interrupt::{Interrupt, Interrupted};
use super::outcome::{Disposition, FailureKind, UpgradeOutcome};
use super::proxy::{MANAGED_LABEL, ProxySidecar};
use super::resolver::UpgradeTarget;
use super::status_channel::StatusChannel;
use crate::diagnostics::{Diagnostics, Warning};
use crate::guest::{GUEST_SHELL, GuestScript, GuestVerdict, ProxyEnv, STATUS_PATH, StatusToken};
use crate::runtime::{
    CommitRequest, ContainerConfig, FullRuntime, ImageInfo, LogOptions, MountSpec, collect_logs,
};
use crate::types::{ContainerId, ImageId};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Images this deep get a warning; runtimes cap layers at 127.
pub const LAYER_WARNING_THRESHOLD: usize = 120;

/// Where a failed run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Setup,
    Launch,
    Inject,
    Await,
    Collect,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Launch => "launch",
            Phase::Inject => "script injection",
            Phase::Await => "wait",
            Phase::Collect => "result collection",
        };
        f.write_str(name)
    }
}

enum Abort {
    Interrupted(Interrupted),
    Failed(Phase, String),
}

impl From<Interrupted> for Abort {
    fn from(i: Interrupted) -> Self {
        Abort::Interrupted(i)
    }
}

/// What the guest left behind.
struct GuestRun {
    image: ImageInfo,
    exit_code: i64,
    token: StatusToken,
    stdout: String,
}

/// Settings shared by every image in a session.
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Commit even when the guest changed nothing.
    pub force: bool,
    pub proxy: ProxyEnv,
    /// Directory the status fifos are created in.
    pub status_dir: PathBuf,
}

/// Runs the upgrade protocol against one image at a time.
pub struct Executor<'a, R: FullRuntime + ?Sized> {
    runtime: &'a R,
    script: &'a GuestScript,
    interrupt: &'a Interrupt,
    options: ExecutorOptions,
}

impl<'a, R: FullRuntime + ?Sized> Executor<'a, R> {
    pub fn new(
        runtime: &'a R,
        script: &'a GuestScript,
        interrupt: &'a Interrupt,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            runtime,
            script,
            interrupt,
            options,
        }
    }

    /// Upgrade `target`, optionally routed through `sidecar`.
    ///
    /// Per-image problems come back as a failed outcome. Only an operator
    /// interrupt is an error, and it is returned after teardown finished.
    pub async fn upgrade(
        &self,
        target: &UpgradeTarget,
        sidecar: Option<&ProxySidecar>,
        diag: &mut Diagnostics,
    ) -> Result<UpgradeOutcome, Interrupted> {
        self.interrupt.checkpoint()?;
        tracing::info!(image = %target.label(), id = %target.id.short(), "upgrading");

        let mut channel = match StatusChannel::create(&self.options.status_dir, &target.id) {
            Ok(channel) => channel,
            Err(e) => {
                let kind = FailureKind::Runtime(format!("{}: status channel: {}", Phase::Setup, e));
                tracing::error!(image = %target.label(), "{}", kind);
                return Ok(UpgradeOutcome::failed_early(target, kind));
            }
        };

        let mut container = None;
        let run = self
            .run_guest(target, sidecar, &mut channel, &mut container, diag)
            .await;

        let result = match run {
            Ok(run) => {
                let outcome = self
                    .decide(target, container.as_ref(), run, diag)
                    .await;
                Ok(outcome)
            }
            Err(Abort::Failed(phase, message)) => {
                let kind = FailureKind::Runtime(format!("{}: {}", phase, message));
                tracing::error!(image = %target.label(), "{}", kind);
                Ok(UpgradeOutcome::failed_early(target, kind))
            }
            Err(Abort::Interrupted(i)) => Err(i),
        };

        self.teardown(container, channel, diag).await;
        result
    }

    async fn run_guest(
        &self,
        target: &UpgradeTarget,
        sidecar: Option<&ProxySidecar>,
        channel: &mut StatusChannel,
        container: &mut Option<ContainerId>,
        diag: &mut Diagnostics,
    ) -> Result<GuestRun, Abort> {
        let image = self
            .runtime
            .inspect_image(target.id.as_str())
            .await
            .map_err(|e| Abort::Failed(Phase::Setup, e.to_string()))?;
        if image.layers >= LAYER_WARNING_THRESHOLD {
            diag.warn(Warning::layer_depth(format!(
                "{} has {} layers; each upgrade adds one and runtimes stop at 127",
                target.label(),
                image.layers
            )));
        }

        self.interrupt.checkpoint()?;
        let config = self.container_config(target, channel, sidecar);
        let id = self
            .runtime
            .create_container(&config)
            .await
            .map_err(|e| Abort::Failed(Phase::Launch, e.to_string()))?;
        *container = Some(id.clone());
        tracing::debug!(container = %id.short(), "upgrade container created");

        self.interrupt.checkpoint()?;
        self.runtime
            .start_container(&id)
            .await
            .map_err(|e| Abort::Failed(Phase::Launch, e.to_string()))?;

        let payload = self.script.render(&self.options.proxy);
        let mut stdin = self
            .runtime
            .attach_stdin(&id)
            .await
            .map_err(|e| Abort::Failed(Phase::Inject, e.to_string()))?;
        self.interrupt
            .interruptible(async {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
                Ok::<_, std::io::Error>(())
            })
            .await?
            .map_err(|e| Abort::Failed(Phase::Inject, e.to_string()))?;
        drop(stdin);
        tracing::debug!(bytes = payload.len(), script = %self.script.origin(), "script delivered");

        let exit_code = self
            .interrupt
            .interruptible(self.runtime.wait_container(&id))
            .await?
            .map_err(|e| Abort::Failed(Phase::Await, e.to_string()))?;

        let token = StatusToken::decode(&channel.read_token());
        let (stdout, stderr) = collect_logs(self.runtime, &id, &LogOptions::all())
            .await
            .map_err(|e| Abort::Failed(Phase::Collect, e.to_string()))?;
        tracing::debug!(exit_code, %token, "guest finished");
        if !stderr.trim().is_empty() {
            tracing::debug!(stderr = %stderr.trim_end(), "guest stderr");
        }

        Ok(GuestRun {
            image,
            exit_code,
            token,
            stdout,
        })
    }

    fn container_config(
        &self,
        target: &UpgradeTarget,
        channel: &StatusChannel,
        sidecar: Option<&ProxySidecar>,
    ) -> ContainerConfig {
        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "upgrade".to_string());
        ContainerConfig {
            name: None,
            image: target.id.to_string(),
            env: HashMap::new(),
            labels,
            mounts: vec![MountSpec::bind(
                channel.path().display().to_string(),
                STATUS_PATH,
            )],
            command: Some(vec![GUEST_SHELL.to_string()]),
            entrypoint: Some(Vec::new()),
            user: Some("root".to_string()),
            interactive: true,
            network_mode: sidecar.map(ProxySidecar::network_mode),
        }
    }

    async fn decide(
        &self,
        target: &UpgradeTarget,
        container: Option<&ContainerId>,
        run: GuestRun,
        diag: &mut Diagnostics,
    ) -> UpgradeOutcome {
        let verdict = GuestVerdict::classify(run.exit_code, &run.stdout, &run.token);
        let disposition = match (verdict, container) {
            (GuestVerdict::Failed, _) => {
                tracing::error!(image = %target.label(), exit_code = run.exit_code, "upgrade script failed");
                Disposition::Failed(FailureKind::Guest)
            }
            (GuestVerdict::Unsupported, _) => {
                tracing::warn!(image = %target.label(), "no supported package manager found");
                Disposition::Failed(FailureKind::Unsupported)
            }
            (GuestVerdict::UpToDate, _) if !self.options.force => {
                tracing::info!(image = %target.label(), "already up to date");
                Disposition::Skipped
            }
            (_, None) => Disposition::Failed(FailureKind::Runtime(
                "no container to commit".to_string(),
            )),
            (_, Some(container)) => self.commit(target, container, &run.image, diag).await,
        };

        UpgradeOutcome {
            target: target.clone(),
            disposition,
            status_token: run.token,
            exit_code: Some(run.exit_code),
            output: run.stdout,
        }
    }

    async fn commit(
        &self,
        target: &UpgradeTarget,
        container: &ContainerId,
        image: &ImageInfo,
        diag: &mut Diagnostics,
    ) -> Disposition {
        let request = CommitRequest {
            config: image.config.clone(),
            comment: commit_message(&target.id),
            author: image.author.clone(),
        };
        let new_image = match self.runtime.commit_container(container, &request).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(image = %target.label(), "commit failed: {}", e);
                return Disposition::Failed(FailureKind::Commit(e.to_string()));
            }
        };
        tracing::debug!(new_image = %new_image.short(), "committed");

        if let Err(message) = self.retag(target, &new_image, diag).await {
            tracing::error!(image = %target.label(), "retag failed: {}", message);
            return Disposition::Failed(FailureKind::Tag(message));
        }

        tracing::info!(
            image = %target.label(),
            from = %target.id.short(),
            to = %new_image.short(),
            "upgraded"
        );
        Disposition::Upgraded { new_image }
    }

    /// Move every target tag to `new_image`. On the first failure, put the
    /// moved tags back and discard the new image.
    async fn retag(
        &self,
        target: &UpgradeTarget,
        new_image: &ImageId,
        diag: &mut Diagnostics,
    ) -> Result<(), String> {
        let mut moved: Vec<(&str, &str)> = Vec::new();
        let mut failure = None;

        for tag in &target.tags {
            let Some((repo, name)) = split_tag(tag) else {
                failure = Some(format!("malformed tag {}", tag));
                break;
            };
            match self.runtime.tag_image(new_image, repo, name).await {
                Ok(()) => moved.push((repo, name)),
                Err(e) => {
                    failure = Some(format!("{}: {}", tag, e));
                    break;
                }
            }
        }

        let Some(failure) = failure else {
            return Ok(());
        };

        let mut restored = true;
        for (repo, name) in moved {
            if let Err(e) = self.runtime.tag_image(&target.id, repo, name).await {
                restored = false;
                diag.warn(Warning::rollback(format!(
                    "could not point {}:{} back at {}: {}",
                    repo,
                    name,
                    target.id.short(),
                    e
                )));
            }
        }

        if restored {
            if let Err(e) = self.runtime.remove_image(new_image, true).await {
                diag.warn(Warning::rollback(format!(
                    "could not remove abandoned image {}: {}",
                    new_image.short(),
                    e
                )));
            }
        } else {
            diag.warn(Warning::rollback(format!(
                "kept image {} because some tags still point at it",
                new_image.short()
            )));
        }

        Err(failure)
    }

    /// Never raced against the interrupt flag.
    async fn teardown(
        &self,
        container: Option<ContainerId>,
        channel: StatusChannel,
        diag: &mut Diagnostics,
    ) {
        if let Some(id) = container
            && let Err(e) = self.runtime.remove_container(&id, true).await
        {
            diag.warn(Warning::container_removal(format!(
                "could not remove upgrade container {}: {}",
                id.short(),
                e
            )));
        }

        let path = channel.path().display().to_string();
        if let Err(e) = channel.close() {
            diag.warn(Warning::status_channel_removal(format!(
                "could not remove status channel {}: {}",
                path, e
            )));
        }
    }
}

/// Split `repo:tag` at the last colon that is not part of a registry port.
fn split_tag(full: &str) -> Option<(&str, &str)> {
    let (repo, tag) = full.rsplit_once(':')?;
    if repo.is_empty() || tag.is_empty() || tag.contains('/') {
        return None;
    }
    Some((repo, tag))
}

fn commit_message(source: &ImageId) -> String {
    let host = gethostname::gethostname();
    format!(
        "reimage: security upgrade of {} on {} at {}",
        source,
        host.to_string_lossy(),
        chrono::Utc::now().to_rfc3339()
    )
}
