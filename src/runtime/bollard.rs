// ABOUTME: Bollard-based container runtime implementation.
// ABOUTME: Supports both Docker and Podman via Docker-compatible API.

use crate::runtime::traits::sealed::Sealed;
use crate::runtime::traits::{
    CommitRequest, ContainerConfig, ContainerError, ContainerFilters, ContainerInfo, ContainerOps,
    ContainerSummary, ImageError, ImageInfo, ImageOps, LogError, LogLine, LogOps,
    LogOptions, LogStream, MountKind, NetworkInfo, NetworkSettings, RuntimeInfo,
    RuntimeInfoError, RuntimeMetadata, StdinWriter, VolumeError, VolumeOps,
};
use crate::runtime::types::{RuntimeSocket, RuntimeType};
use crate::types::{ContainerId, ImageId, VolumeName};
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, HostConfig, Mount, MountTypeEnum, VolumeCreateRequest,
};
use bollard::query_parameters::{
    AttachContainerOptions, CommitContainerOptions, CreateContainerOptions,
    InspectContainerOptions, ListContainersOptions, LogsOptions, RemoveContainerOptions,
    RemoveImageOptions, RemoveVolumeOptions, StopContainerOptions, TagImageOptions,
    WaitContainerOptions,
};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;

// =============================================================================
// Error Mapping Helpers
// =============================================================================

fn map_image_inspect_error(e: bollard::errors::Error, reference: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(reference.to_string())
        }
        _ => ImageError::Runtime(format!("failed to inspect {}: {}", reference, e)),
    }
}

fn map_image_remove_error(e: bollard::errors::Error, image: &str) -> ImageError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            ImageError::NotFound(image.to_string())
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ImageError::InUse(message.clone()),
        _ => ImageError::Runtime(format!("failed to remove {}: {}", image, e)),
    }
}

fn map_container_create_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::ImageNotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => ContainerError::AlreadyExists(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_start_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::AlreadyRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_stop_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 304 => ContainerError::NotRunning(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_container_not_found_error(e: bollard::errors::Error) -> ContainerError {
    match &e {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 404 => ContainerError::NotFound(message.clone()),
        _ => ContainerError::Runtime(e.to_string()),
    }
}

fn map_volume_error(e: bollard::errors::Error, name: &str) -> VolumeError {
    match &e {
        bollard::errors::Error::DockerResponseServerError { status_code, .. }
            if *status_code == 404 =>
        {
            VolumeError::NotFound(name.to_string())
        }
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } if *status_code == 409 => VolumeError::InUse(message.clone()),
        _ => VolumeError::Runtime(e.to_string()),
    }
}

// =============================================================================
// BollardRuntime
// =============================================================================

/// Container runtime implementation using bollard.
///
/// Supports both Docker and Podman via Docker-compatible API.
pub struct BollardRuntime {
    client: Docker,
    runtime_type: RuntimeType,
}

impl BollardRuntime {
    /// Create a new BollardRuntime from a Docker client.
    pub fn new(client: Docker, runtime_type: RuntimeType) -> Self {
        Self {
            client,
            runtime_type,
        }
    }

    /// Connect to a container runtime using a detected socket.
    pub fn connect(socket: &RuntimeSocket) -> Result<Self, RuntimeInfoError> {
        let client =
            Docker::connect_with_unix(&socket.socket_path, 120, bollard::API_DEFAULT_VERSION)
                .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(Self::new(client, socket.runtime_type))
    }

    /// Get the runtime type (Docker or Podman).
    pub fn runtime_type(&self) -> RuntimeType {
        self.runtime_type
    }
}

// Implement Sealed trait to allow runtime trait implementations
impl Sealed for BollardRuntime {}

#[async_trait]
impl RuntimeInfo for BollardRuntime {
    async fn info(&self) -> Result<RuntimeMetadata, RuntimeInfoError> {
        let info = self
            .client
            .info()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;

        let name = match self.runtime_type {
            RuntimeType::Docker => "Docker".to_string(),
            RuntimeType::Podman => "Podman".to_string(),
        };

        Ok(RuntimeMetadata {
            name,
            version: info.server_version.unwrap_or_default(),
            api_version: bollard::API_DEFAULT_VERSION.to_string(),
            os: info.operating_system.unwrap_or_default(),
            arch: info.architecture.unwrap_or_default(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeInfoError> {
        self.client
            .ping()
            .await
            .map_err(|e| RuntimeInfoError::ConnectionFailed(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl ImageOps for BollardRuntime {
    async fn inspect_image(&self, reference: &str) -> Result<ImageInfo, ImageError> {
        let details = self
            .client
            .inspect_image(reference)
            .await
            .map_err(|e| map_image_inspect_error(e, reference))?;

        let id = details
            .id
            .ok_or_else(|| ImageError::Runtime(format!("{} has no id", reference)))?;

        // The image config and the commit config share their wire format, so
        // keep it as JSON and hand it back unchanged.
        let config = details
            .config
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ImageError::Runtime(format!("unreadable config of {}: {}", reference, e)))?;

        Ok(ImageInfo {
            id: ImageId::new(id),
            repo_tags: details.repo_tags.unwrap_or_default(),
            author: details.author.filter(|a| !a.is_empty()),
            config,
            layers: details
                .root_fs
                .and_then(|fs| fs.layers)
                .map(|layers| layers.len())
                .unwrap_or(0),
        })
    }

    async fn commit_container(
        &self,
        container: &ContainerId,
        request: &CommitRequest,
    ) -> Result<ImageId, ImageError> {
        let config: bollard::models::ContainerConfig = match &request.config {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| ImageError::CommitFailed(format!("invalid image config: {}", e)))?,
            None => Default::default(),
        };

        let opts = CommitContainerOptions {
            container: Some(container.to_string()),
            comment: Some(request.comment.clone()),
            author: request.author.clone(),
            pause: true,
            ..Default::default()
        };

        let response = self
            .client
            .commit_container(opts, config)
            .await
            .map_err(|e| ImageError::CommitFailed(format!("{}: {}", container.short(), e)))?;

        Ok(ImageId::new(response.id))
    }

    async fn tag_image(&self, image: &ImageId, repo: &str, tag: &str) -> Result<(), ImageError> {
        let opts = TagImageOptions {
            repo: Some(repo.to_string()),
            tag: Some(tag.to_string()),
        };

        self.client
            .tag_image(image.as_str(), Some(opts))
            .await
            .map_err(|e| ImageError::TagFailed(format!("{}:{}: {}", repo, tag, e)))
    }

    async fn remove_image(&self, image: &ImageId, force: bool) -> Result<(), ImageError> {
        let opts = RemoveImageOptions {
            force,
            ..Default::default()
        };

        self.client
            .remove_image(image.as_str(), Some(opts), None)
            .await
            .map_err(|e| map_image_remove_error(e, image.as_str()))?;

        Ok(())
    }
}

#[async_trait]
impl ContainerOps for BollardRuntime {
    async fn create_container(
        &self,
        config: &ContainerConfig,
    ) -> Result<ContainerId, ContainerError> {
        let env: Vec<String> = config
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let mounts: Vec<Mount> = config
            .mounts
            .iter()
            .map(|m| Mount {
                source: Some(m.source.clone()),
                target: Some(m.target.clone()),
                typ: Some(match m.kind {
                    MountKind::Bind => MountTypeEnum::BIND,
                    MountKind::Volume => MountTypeEnum::VOLUME,
                }),
                read_only: Some(m.read_only),
                ..Default::default()
            })
            .collect();

        let host_config = HostConfig {
            mounts: if mounts.is_empty() { None } else { Some(mounts) },
            network_mode: config.network_mode.clone(),
            ..Default::default()
        };

        // The runtime treats `[""]` as "no entrypoint"; an empty list would
        // fall back to the image's own.
        let entrypoint = config.entrypoint.as_ref().map(|ep| {
            if ep.is_empty() {
                vec![String::new()]
            } else {
                ep.clone()
            }
        });

        let container_config = ContainerCreateBody {
            image: Some(config.image.clone()),
            env: if env.is_empty() { None } else { Some(env) },
            labels: if config.labels.is_empty() {
                None
            } else {
                Some(config.labels.clone())
            },
            cmd: config.command.clone(),
            entrypoint,
            user: config.user.clone(),
            attach_stdin: Some(config.interactive),
            open_stdin: Some(config.interactive),
            stdin_once: Some(config.interactive),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let opts = CreateContainerOptions {
            name: config.name.clone(),
            ..Default::default()
        };

        let response = self
            .client
            .create_container(Some(opts), container_config)
            .await
            .map_err(map_container_create_error)?;

        Ok(ContainerId::new(response.id))
    }

    async fn start_container(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.client
            .start_container(
                id.as_str(),
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
            .map_err(map_container_start_error)
    }

    async fn attach_stdin(&self, id: &ContainerId) -> Result<StdinWriter, ContainerError> {
        let opts = AttachContainerOptions {
            stdin: true,
            stream: true,
            ..Default::default()
        };

        let attached = self
            .client
            .attach_container(id.as_str(), Some(opts))
            .await
            .map_err(|e| ContainerError::AttachFailed(e.to_string()))?;

        Ok(attached.input)
    }

    async fn wait_container(&self, id: &ContainerId) -> Result<i64, ContainerError> {
        let opts = WaitContainerOptions {
            condition: "not-running".to_string(),
        };

        let mut stream = self.client.wait_container(id.as_str(), Some(opts));
        let mut exit_code = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(response) => exit_code = Some(response.status_code),
                // bollard reports a non-zero exit status as an error
                Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                    exit_code = Some(code)
                }
                Err(e) => return Err(map_container_not_found_error(e)),
            }
        }

        exit_code.ok_or_else(|| {
            ContainerError::Runtime(format!("no exit status reported for {}", id.short()))
        })
    }

    async fn stop_container(
        &self,
        id: &ContainerId,
        timeout: Duration,
    ) -> Result<(), ContainerError> {
        let opts = StopContainerOptions {
            t: Some(timeout.as_secs() as i32),
            signal: None,
        };

        self.client
            .stop_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_stop_error)
    }

    async fn remove_container(&self, id: &ContainerId, force: bool) -> Result<(), ContainerError> {
        let opts = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.client
            .remove_container(id.as_str(), Some(opts))
            .await
            .map_err(map_container_not_found_error)?;

        Ok(())
    }

    async fn inspect_container(&self, id: &ContainerId) -> Result<ContainerInfo, ContainerError> {
        let details = self
            .client
            .inspect_container(id.as_str(), None::<InspectContainerOptions>)
            .await
            .map_err(map_container_not_found_error)?;

        let mut networks = HashMap::new();
        if let Some(ref network_settings) = details.network_settings
            && let Some(ref nets) = network_settings.networks
        {
            for (name, endpoint) in nets {
                networks.insert(
                    name.clone(),
                    NetworkInfo {
                        network_id: endpoint.network_id.clone().unwrap_or_default(),
                        ip_address: endpoint.ip_address.clone().unwrap_or_default(),
                    },
                );
            }
        }

        Ok(ContainerInfo {
            id: id.clone(),
            name: details
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            image: details
                .config
                .as_ref()
                .and_then(|c| c.image.clone())
                .unwrap_or_default(),
            network_settings: NetworkSettings { networks },
        })
    }

    async fn list_containers(
        &self,
        filters: &ContainerFilters,
    ) -> Result<Vec<ContainerSummary>, ContainerError> {
        let mut filter_map: HashMap<String, Vec<String>> = HashMap::new();

        if let Some(ref name) = filters.name {
            filter_map.insert("name".to_string(), vec![name.clone()]);
        }

        for (key, value) in &filters.labels {
            filter_map
                .entry("label".to_string())
                .or_default()
                .push(format!("{}={}", key, value));
        }

        let opts = ListContainersOptions {
            all: filters.all,
            filters: Some(filter_map),
            ..Default::default()
        };

        // Podman reports "stopping" as a container state during shutdown, but bollard
        // doesn't recognize it and fails deserialization. Retry after a short delay
        // since "stopping" is a transient state.
        let mut last_error = None;
        for attempt in 0..3 {
            match self.client.list_containers(Some(opts.clone())).await {
                Ok(containers) => {
                    return Ok(containers
                        .into_iter()
                        .map(|c| {
                            let names = c.names.unwrap_or_default();
                            let name = names
                                .first()
                                .map(|n| n.trim_start_matches('/').to_string())
                                .unwrap_or_default();

                            ContainerSummary {
                                id: ContainerId::new(c.id.unwrap_or_default()),
                                name,
                                image: c.image.unwrap_or_default(),
                                state: c
                                    .state
                                    .map(|s| format!("{:?}", s).to_lowercase())
                                    .unwrap_or_default(),
                            }
                        })
                        .collect());
                }
                Err(e) => {
                    let err_str = e.to_string();
                    if (err_str.contains("unknown variant `stopping`")
                        || err_str.contains("unknown variant `stopped`"))
                        && attempt < 2
                    {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        last_error = Some(err_str);
                        continue;
                    }
                    return Err(ContainerError::Runtime(err_str));
                }
            }
        }

        Err(ContainerError::Runtime(
            last_error.unwrap_or_else(|| "list_containers failed".to_string()),
        ))
    }
}

#[async_trait]
impl VolumeOps for BollardRuntime {
    async fn create_volume(&self, name: &str) -> Result<VolumeName, VolumeError> {
        let opts = VolumeCreateRequest {
            name: Some(name.to_string()),
            driver: Some("local".to_string()),
            ..Default::default()
        };

        let volume = self
            .client
            .create_volume(opts)
            .await
            .map_err(|e| map_volume_error(e, name))?;

        Ok(VolumeName::new(volume.name))
    }

    async fn remove_volume(&self, name: &VolumeName, force: bool) -> Result<(), VolumeError> {
        self.client
            .remove_volume(name.as_str(), Some(RemoveVolumeOptions { force }))
            .await
            .map_err(|e| map_volume_error(e, name.as_str()))
    }
}

#[async_trait]
impl LogOps for BollardRuntime {
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>, LogError> {
        let log_opts = LogsOptions {
            stdout: opts.stdout,
            stderr: opts.stderr,
            follow: opts.follow,
            tail: opts
                .tail
                .map(|n| n.to_string())
                .unwrap_or_else(|| "all".to_string()),
            ..Default::default()
        };

        let stream = self.client.logs(id.as_str(), Some(log_opts));

        let mapped_stream = stream.map(|result| {
            result
                .map(|output| {
                    let (stream_type, data) = match output {
                        bollard::container::LogOutput::StdErr { message } => {
                            (LogStream::Stderr, message)
                        }
                        bollard::container::LogOutput::StdOut { message }
                        | bollard::container::LogOutput::StdIn { message }
                        | bollard::container::LogOutput::Console { message } => {
                            (LogStream::Stdout, message)
                        }
                    };

                    LogLine {
                        content: String::from_utf8_lossy(&data).to_string(),
                        stream: stream_type,
                    }
                })
                .map_err(|e| LogError::StreamError(e.to_string()))
        });

        Ok(Box::pin(mapped_stream))
    }
}
