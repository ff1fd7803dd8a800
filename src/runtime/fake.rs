// ABOUTME: In-memory runtime for unit tests of the upgrade engine.
// ABOUTME: Records every call, plays scripted guest runs, and injects failures.

use super::traits::sealed::Sealed;
use super::traits::*;
use crate::guest::STATUS_PATH;
use crate::types::{ContainerId, ImageId, TargetRef, VolumeName};
use crate::upgrade::InterruptHandle;
use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

/// What the guest does when a container of a given image runs.
#[derive(Debug, Clone)]
pub(crate) struct GuestRun {
    pub exit_code: i64,
    /// Written into the status fifo; `None` writes nothing.
    pub token: Option<Vec<u8>>,
    pub stdout: String,
    pub stderr: String,
}

impl GuestRun {
    pub fn upgraded(token: &str, packages: &str) -> Self {
        Self {
            exit_code: 0,
            token: Some(format!("{token}\n").into_bytes()),
            stdout: packages.to_string(),
            stderr: String::new(),
        }
    }

    pub fn up_to_date(token: &str) -> Self {
        Self::upgraded(token, "")
    }

    pub fn failing(exit_code: i64, token: Option<&str>) -> Self {
        Self {
            exit_code,
            token: token.map(|t| format!("{t}\n").into_bytes()),
            stdout: String::new(),
            stderr: "something broke\n".to_string(),
        }
    }
}

impl Default for GuestRun {
    fn default() -> Self {
        Self::up_to_date("debian")
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub config: ContainerConfig,
    /// Image the declared reference resolved to at creation.
    pub image_id: Option<ImageId>,
    pub running: bool,
}

#[derive(Debug, Default)]
pub(crate) struct StdinCapture {
    pub bytes: Vec<u8>,
    pub closed: bool,
}

#[derive(Default)]
struct FakeState {
    images: HashMap<String, ImageInfo>,
    containers: HashMap<String, FakeContainer>,
    /// Every container ever created, in creation order.
    created: Vec<(ContainerId, ContainerConfig)>,
    stdin: HashMap<String, Arc<Mutex<StdinCapture>>>,
    volumes: BTreeSet<String>,
    commits: Vec<CommitRequest>,
    calls: Vec<String>,
    guests: HashMap<String, GuestRun>,
    failures: HashSet<String>,
    interrupt_on: Option<(String, InterruptHandle)>,
    block_wait: bool,
    sidecar_ip: String,
    next_id: u64,
}

/// Test double for [`FullRuntime`].
///
/// Failure keys are the operation name (`"create_container"`), or the
/// operation plus its argument for per-target failures
/// (`"inspect_image app:1"`, `"tag_image app:1"`).
#[derive(Clone)]
pub(crate) struct FakeRuntime {
    state: Arc<Mutex<FakeState>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let state = FakeState {
            sidecar_ip: "127.0.0.1".to_string(),
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_image(self, id: &str, tags: &[&str]) -> Self {
        self.add_image(id, tags);
        self
    }

    pub fn add_image(&self, id: &str, tags: &[&str]) {
        let info = ImageInfo {
            id: ImageId::new(id),
            repo_tags: tags.iter().map(|t| t.to_string()).collect(),
            author: Some("ops@example.com".to_string()),
            config: Some(serde_json::json!({ "Cmd": ["/app"], "Env": ["A=1"] })),
            layers: 5,
        };
        self.state.lock().images.insert(id.to_string(), info);
    }

    pub fn set_layers(&self, id: &str, layers: usize) {
        if let Some(image) = self.state.lock().images.get_mut(id) {
            image.layers = layers;
        }
    }

    pub fn guest(&self, image_id: &str, run: GuestRun) {
        self.state.lock().guests.insert(image_id.to_string(), run);
    }

    pub fn fail(&self, key: &str) {
        self.state.lock().failures.insert(key.to_string());
    }

    /// Raise `handle` when operation `op` is called.
    pub fn interrupt_on(&self, op: &str, handle: InterruptHandle) {
        self.state.lock().interrupt_on = Some((op.to_string(), handle));
    }

    /// Make `wait_container` hang until the caller gives up.
    pub fn block_wait(&self) {
        self.state.lock().block_wait = true;
    }

    pub fn set_sidecar_ip(&self, ip: &str) {
        self.state.lock().sidecar_ip = ip.to_string();
    }

    /// A container running outside our control.
    pub fn add_running(&self, name: &str, image: &str) -> ContainerId {
        let config = ContainerConfig {
            name: Some(name.to_string()),
            image: image.to_string(),
            ..Default::default()
        };
        let mut state = self.state.lock();
        let id = next_container_id(&mut state);
        let image_id = find_image(&state.images, image).map(|i| i.id.clone());
        state.containers.insert(
            id.to_string(),
            FakeContainer {
                config,
                image_id,
                running: true,
            },
        );
        id
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn called(&self, op: &str) -> bool {
        self.state.lock().calls.iter().any(|c| c.starts_with(op))
    }

    pub fn created(&self) -> Vec<(ContainerId, ContainerConfig)> {
        self.state.lock().created.clone()
    }

    /// Containers that were created and not yet removed, including
    /// ones added with `add_running`.
    pub fn live_containers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().containers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn volumes(&self) -> Vec<String> {
        self.state.lock().volumes.iter().cloned().collect()
    }

    pub fn stdin_of(&self, id: &ContainerId) -> Option<(Vec<u8>, bool)> {
        let state = self.state.lock();
        state.stdin.get(id.as_str()).map(|capture| {
            let capture = capture.lock();
            (capture.bytes.clone(), capture.closed)
        })
    }

    pub fn commits(&self) -> Vec<CommitRequest> {
        self.state.lock().commits.clone()
    }

    pub fn has_image(&self, id: &str) -> bool {
        self.state.lock().images.contains_key(id)
    }

    /// Id of the image currently holding `repo:tag`.
    pub fn tag_owner(&self, tag: &str) -> Option<String> {
        self.state
            .lock()
            .images
            .values()
            .find(|image| image.repo_tags.iter().any(|t| t == tag))
            .map(|image| image.id.to_string())
    }

    fn enter(&self, op: &str, arg: &str) -> Result<(), String> {
        let mut state = self.state.lock();
        state.calls.push(format!("{op} {arg}"));
        if let Some((trigger_op, handle)) = &state.interrupt_on
            && trigger_op == op
        {
            handle.trigger();
        }
        if state.failures.contains(op) || state.failures.contains(&format!("{op} {arg}")) {
            return Err(format!("{op} failed for {arg}"));
        }
        Ok(())
    }
}

fn next_container_id(state: &mut FakeState) -> ContainerId {
    state.next_id += 1;
    ContainerId::new(format!("c{:04}", state.next_id))
}

/// Look an image up the way a daemon does: full id, id prefix, or any
/// spelling of one of its tags (`app`, `app:latest`, `localhost/app:latest`).
fn find_image<'a>(images: &'a HashMap<String, ImageInfo>, reference: &str) -> Option<&'a ImageInfo> {
    if let Some(image) = images.get(reference) {
        return Some(image);
    }
    match TargetRef::parse(reference).ok()? {
        TargetRef::Id(prefix) => {
            let bare = prefix.strip_prefix("sha256:").unwrap_or(&prefix).to_string();
            images.values().find(|image| {
                let id = image.id.as_str();
                id.strip_prefix("sha256:").unwrap_or(id).starts_with(&bare)
            })
        }
        named => images
            .values()
            .find(|image| !named.matching_tags(&image.repo_tags).is_empty()),
    }
}

/// Docker lists the declared reference only while it still resolves to the
/// container's image; after a retag it lists the image id instead.
fn listed_image(images: &HashMap<String, ImageInfo>, container: &FakeContainer) -> String {
    let current = find_image(images, &container.config.image).map(|i| &i.id);
    match &container.image_id {
        Some(created_from) if current != Some(created_from) => created_from.to_string(),
        _ => container.config.image.clone(),
    }
}

/// Play the guest's side of the status protocol into the bind-mounted fifo.
fn write_status(config: &ContainerConfig, token: &[u8]) {
    let Some(mount) = config.mounts.iter().find(|m| m.target == STATUS_PATH) else {
        return;
    };
    if let Ok(mut fifo) = std::fs::OpenOptions::new().write(true).open(&mount.source) {
        let _ = fifo.write_all(token);
    }
}

impl Sealed for FakeRuntime {}

#[async_trait]
impl RuntimeInfo for FakeRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        Ok(RuntimeMetadata {
            name: "fake".to_string(),
            version: "0.0.0".to_string(),
            api_version: "1.44".to_string(),
            os: "linux".to_string(),
            arch: "x86_64".to_string(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.enter("ping", "").map_err(RuntimeInfoError::ConnectionFailed)
    }
}

#[async_trait]
impl ImageOps for FakeRuntime {
    async fn inspect_image(&self, reference: &str) -> Result<ImageInfo, ImageError> {
        self.enter("inspect_image", reference)
            .map_err(ImageError::Runtime)?;
        let state = self.state.lock();
        find_image(&state.images, reference)
            .cloned()
            .ok_or_else(|| ImageError::NotFound(reference.to_string()))
    }

    async fn commit_container(
        &self,
        container: &ContainerId,
        request: &CommitRequest,
    ) -> Result<ImageId, ImageError> {
        self.enter("commit_container", container.as_str())
            .map_err(ImageError::CommitFailed)?;
        let mut state = self.state.lock();
        let Some(source) = state.containers.get(container.as_str()) else {
            return Err(ImageError::CommitFailed(format!("no container {container}")));
        };
        let layers = state
            .images
            .get(&source.config.image)
            .map(|image| image.layers + 1)
            .unwrap_or(1);
        state.next_id += 1;
        let id = ImageId::new(format!("sha256:{:064x}", state.next_id));
        state.images.insert(
            id.to_string(),
            ImageInfo {
                id: id.clone(),
                repo_tags: Vec::new(),
                author: request.author.clone(),
                config: request.config.clone(),
                layers,
            },
        );
        state.commits.push(request.clone());
        Ok(id)
    }

    async fn tag_image(&self, image: &ImageId, repo: &str, tag: &str) -> Result<(), ImageError> {
        let full = format!("{repo}:{tag}");
        self.enter("tag_image", &full).map_err(ImageError::TagFailed)?;
        let mut state = self.state.lock();
        if !state.images.contains_key(image.as_str()) {
            return Err(ImageError::NotFound(image.to_string()));
        }
        for existing in state.images.values_mut() {
            existing.repo_tags.retain(|t| *t != full);
        }
        if let Some(target) = state.images.get_mut(image.as_str()) {
            target.repo_tags.push(full);
        }
        Ok(())
    }

    async fn remove_image(&self, image: &ImageId, _force: bool) -> Result<(), ImageError> {
        self.enter("remove_image", image.as_str())
            .map_err(ImageError::Runtime)?;
        self.state
            .lock()
            .images
            .remove(image.as_str())
            .map(|_| ())
            .ok_or_else(|| ImageError::NotFound(image.to_string()))
    }
}

#[async_trait]
impl ContainerOps for FakeRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        self.enter("create_container", &config.image)
            .map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        if let Some(name) = &config.name
            && state
                .containers
                .values()
                .any(|c| c.config.name.as_deref() == Some(name))
        {
            return Err(ContainerError::AlreadyExists(name.clone()));
        }
        let id = next_container_id(&mut state);
        let image_id = find_image(&state.images, &config.image).map(|i| i.id.clone());
        state.containers.insert(
            id.to_string(),
            FakeContainer {
                config: config.clone(),
                image_id,
                running: false,
            },
        );
        state.created.push((id.clone(), config.clone()));
        Ok(id)
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.enter("start_container", id.as_str())
            .map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = true;
        Ok(())
    }

    async fn attach_stdin(&self, id: &ContainerId) -> Result<StdinWriter, ContainerError> {
        self.enter("attach_stdin", id.as_str())
            .map_err(ContainerError::AttachFailed)?;
        let capture = Arc::new(Mutex::new(StdinCapture::default()));
        self.state
            .lock()
            .stdin
            .insert(id.to_string(), Arc::clone(&capture));
        Ok(Box::pin(CaptureWriter { capture }))
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        self.enter("wait_container", id.as_str())
            .map_err(ContainerError::Runtime)?;
        let (config, run, block) = {
            let state = self.state.lock();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
            let run = state
                .guests
                .get(&container.config.image)
                .cloned()
                .unwrap_or_default();
            (container.config.clone(), run, state.block_wait)
        };
        if block {
            std::future::pending::<()>().await;
        }
        if let Some(token) = &run.token {
            write_status(&config, token);
        }
        if let Some(container) = self.state.lock().containers.get_mut(id.as_str()) {
            container.running = false;
        }
        Ok(run.exit_code)
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        _timeout: Duration,
    ) -> Result<(), ContainerError> {
        self.enter("stop_container", id.as_str())
            .map_err(ContainerError::Runtime)?;
        let mut state = self.state.lock();
        let container = state
            .containers
            .get_mut(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        container.running = false;
        Ok(())
    }

    async fn remove_container(&self, id: &ContainerId, _force: bool) -> Result<(), ContainerError> {
        self.enter("remove_container", id.as_str())
            .map_err(ContainerError::Runtime)?;
        self.state
            .lock()
            .containers
            .remove(id.as_str())
            .map(|_| ())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        self.enter("inspect_container", id.as_str())
            .map_err(ContainerError::Runtime)?;
        let state = self.state.lock();
        let container = state
            .containers
            .get(id.as_str())
            .ok_or_else(|| ContainerError::NotFound(id.to_string()))?;
        let mut networks = HashMap::new();
        networks.insert(
            "bridge".to_string(),
            NetworkInfo {
                network_id: "net0".to_string(),
                ip_address: state.sidecar_ip.clone(),
            },
        );
        Ok(ContainerInfo {
            id: id.clone(),
            name: container.config.name.clone().unwrap_or_default(),
            image: container.config.image.clone(),
            network_settings: NetworkSettings { networks },
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        self.enter("list_containers", "")
            .map_err(ContainerError::Runtime)?;
        let state = self.state.lock();
        let mut summaries: Vec<ContainerSummary> = state
            .containers
            .iter()
            .filter(|(_, c)| filters.all || c.running)
            .map(|(id, c)| ContainerSummary {
                id: ContainerId::new(id.clone()),
                name: c.config.name.clone().unwrap_or_else(|| id.clone()),
                image: listed_image(&state.images, c),
                state: if c.running { "running" } else { "exited" }.to_string(),
            })
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(summaries)
    }
}

#[async_trait]
impl VolumeOps for FakeRuntime {
    async fn create_volume(&self, name: &str) -> Result<VolumeName, VolumeError> {
        self.enter("create_volume", name)
            .map_err(VolumeError::Runtime)?;
        self.state.lock().volumes.insert(name.to_string());
        Ok(VolumeName::new(name))
    }

    async fn remove_volume(&self, name: &VolumeName, _force: bool) -> Result<(), VolumeError> {
        self.enter("remove_volume", name.as_str())
            .map_err(VolumeError::Runtime)?;
        if self.state.lock().volumes.remove(name.as_str()) {
            Ok(())
        } else {
            Err(VolumeError::NotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl LogOps for FakeRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>, LogError> {
        self.enter("container_logs", id.as_str())
            .map_err(LogError::Runtime)?;
        let run = {
            let state = self.state.lock();
            let container = state
                .containers
                .get(id.as_str())
                .ok_or_else(|| LogError::ContainerNotFound(id.to_string()))?;
            state
                .guests
                .get(&container.config.image)
                .cloned()
                .unwrap_or_default()
        };
        let mut lines = Vec::new();
        if opts.stdout && !run.stdout.is_empty() {
            lines.push(Ok(LogLine {
                content: run.stdout,
                stream: LogStream::Stdout,
            }));
        }
        if opts.stderr && !run.stderr.is_empty() {
            lines.push(Ok(LogLine {
                content: run.stderr,
                stream: LogStream::Stderr,
            }));
        }
        Ok(Box::pin(futures::stream::iter(lines)))
    }
}

struct CaptureWriter {
    capture: Arc<Mutex<StdinCapture>>,
}

impl AsyncWrite for CaptureWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.capture.lock().bytes.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.capture.lock().closed = true;
        Poll::Ready(Ok(()))
    }
}
