// ABOUTME: Caching HTTP proxy sidecar shared by every upgrade container in a session.
// ABOUTME: Two named volumes, one container, and a TCP readiness probe.

use super::error::SidecarError;
use super::interrupt::Interrupt;
use crate::config::ProxySettings;
use crate::diagnostics::{Diagnostics, Warning};
use crate::runtime::{
    ContainerConfig, ContainerError, ContainerOps, FullRuntime, MountSpec, VolumeError, VolumeOps,
};
use crate::types::{ContainerId, VolumeName};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

/// Label put on every container this tool creates.
pub const MANAGED_LABEL: &str = "reimage.managed";

/// A running proxy sidecar.
///
/// Dropping it leaks the runtime resources; call [`ProxySidecar::stop`].
#[derive(Debug)]
pub struct ProxySidecar {
    container: ContainerId,
    spool: VolumeName,
    log: VolumeName,
    address: SocketAddr,
}

/// Whatever part of a sidecar exists so far.
#[derive(Debug, Default)]
struct Partial {
    container: Option<ContainerId>,
    spool: Option<VolumeName>,
    log: Option<VolumeName>,
}

impl ProxySidecar {
    /// Create volumes and container, start it, and wait until it accepts
    /// connections. On any failure, including an interrupt, everything
    /// created so far is removed before the error is returned.
    pub async fn start<R: FullRuntime + ?Sized>(
        runtime: &R,
        settings: &ProxySettings,
        interrupt: &Interrupt,
        diag: &mut Diagnostics,
    ) -> Result<Self, SidecarError> {
        let mut partial = Partial::default();
        match bring_up(runtime, settings, interrupt, &mut partial).await {
            Ok(address) => match partial {
                Partial {
                    container: Some(container),
                    spool: Some(spool),
                    log: Some(log),
                } => {
                    tracing::info!(%address, container = %container.short(), "proxy sidecar ready");
                    Ok(Self {
                        container,
                        spool,
                        log,
                        address,
                    })
                }
                // bring_up fills every slot before returning Ok
                incomplete => {
                    release(runtime, incomplete, diag).await;
                    Err(SidecarError::NoAddress)
                }
            },
            Err(e) => {
                tracing::error!("proxy sidecar failed to start: {}", e);
                release(runtime, partial, diag).await;
                Err(e)
            }
        }
    }

    pub fn container_id(&self) -> &ContainerId {
        &self.container
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Network mode that puts a container into the sidecar's network
    /// namespace, where the proxy listens on loopback.
    pub fn network_mode(&self) -> String {
        format!("container:{}", self.container)
    }

    /// Remove container and volumes. Failures become warnings.
    pub async fn stop<R: FullRuntime + ?Sized>(self, runtime: &R, diag: &mut Diagnostics) {
        tracing::debug!(container = %self.container.short(), "stopping proxy sidecar");
        let partial = Partial {
            container: Some(self.container),
            spool: Some(self.spool),
            log: Some(self.log),
        };
        release(runtime, partial, diag).await;
    }
}

async fn bring_up<R: FullRuntime + ?Sized>(
    runtime: &R,
    settings: &ProxySettings,
    interrupt: &Interrupt,
    partial: &mut Partial,
) -> Result<SocketAddr, SidecarError> {
    let suffix = std::process::id();

    interrupt.checkpoint()?;
    let spool = runtime
        .create_volume(&format!("reimage-squid-spool-{suffix}"))
        .await?;
    partial.spool = Some(spool.clone());

    interrupt.checkpoint()?;
    let log = runtime
        .create_volume(&format!("reimage-squid-log-{suffix}"))
        .await?;
    partial.log = Some(log.clone());

    let mut labels = HashMap::new();
    labels.insert(MANAGED_LABEL.to_string(), "sidecar".to_string());
    let config = ContainerConfig {
        name: Some(format!("reimage-squid-{suffix}")),
        image: settings.image.clone(),
        labels,
        mounts: vec![
            MountSpec::volume(&spool, settings.spool_path.clone()),
            MountSpec::volume(&log, settings.log_path.clone()),
        ],
        ..Default::default()
    };

    interrupt.checkpoint()?;
    let container = runtime.create_container(&config).await?;
    partial.container = Some(container.clone());

    interrupt.checkpoint()?;
    runtime.start_container(&container).await?;

    let info = runtime.inspect_container(&container).await?;
    let ip = info
        .network_settings
        .primary_ip()
        .ok_or(SidecarError::NoAddress)?;
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| SidecarError::InvalidAddress(ip.to_string()))?;
    let address = SocketAddr::new(ip, settings.port);

    wait_until_reachable(
        address,
        settings.probe_interval,
        settings.probe_attempts,
        interrupt,
    )
    .await?;
    Ok(address)
}

/// Probe `address` until a TCP connect succeeds or attempts run out.
async fn wait_until_reachable(
    address: SocketAddr,
    interval: Duration,
    attempts: u32,
    interrupt: &Interrupt,
) -> Result<(), SidecarError> {
    for attempt in 1..=attempts {
        let probe = tokio::time::timeout(interval, TcpStream::connect(address));
        match interrupt.interruptible(probe).await? {
            Ok(Ok(_)) => {
                tracing::debug!(%address, attempt, "proxy accepting connections");
                return Ok(());
            }
            Ok(Err(e)) => tracing::trace!(%address, attempt, "proxy not ready: {}", e),
            Err(_) => tracing::trace!(%address, attempt, "proxy probe timed out"),
        }
        if attempt < attempts {
            interrupt.interruptible(tokio::time::sleep(interval)).await?;
        }
    }
    Err(SidecarError::NotReachable {
        address: address.to_string(),
        attempts,
    })
}

/// Remove whatever exists: container first, then both volumes. Every step
/// is attempted regardless of earlier failures.
async fn release<R: ContainerOps + VolumeOps + ?Sized>(
    runtime: &R,
    partial: Partial,
    diag: &mut Diagnostics,
) {
    if let Some(container) = partial.container {
        match runtime.remove_container(&container, true).await {
            Ok(()) | Err(ContainerError::NotFound(_)) => {}
            Err(e) => diag.warn(Warning::container_removal(format!(
                "could not remove proxy sidecar {}: {}",
                container.short(),
                e
            ))),
        }
    }
    for volume in [partial.spool, partial.log].into_iter().flatten() {
        match runtime.remove_volume(&volume, true).await {
            Ok(()) | Err(VolumeError::NotFound(_)) => {}
            Err(e) => diag.warn(Warning::volume_removal(format!(
                "could not remove proxy volume {}: {}",
                volume, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use tokio::net::TcpListener;

    fn settings(port: u16, attempts: u32) -> ProxySettings {
        ProxySettings {
            port,
            probe_interval: Duration::from_millis(10),
            probe_attempts: attempts,
            ..Default::default()
        }
    }

    /// A port nothing listens on.
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn starts_and_stops_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let rt = FakeRuntime::new();
        let mut diag = Diagnostics::default();

        let sidecar = ProxySidecar::start(&rt, &settings(port, 5), &Interrupt::never(), &mut diag)
            .await
            .unwrap();
        assert_eq!(sidecar.address().port(), port);
        assert_eq!(rt.volumes().len(), 2);
        assert_eq!(
            sidecar.network_mode(),
            format!("container:{}", sidecar.container_id())
        );

        let (_, config) = rt.created().pop().unwrap();
        assert_eq!(config.image, "ubuntu/squid:latest");
        assert_eq!(config.mounts.len(), 2);
        assert_eq!(config.mounts[0].target, "/var/spool/squid");

        sidecar.stop(&rt, &mut diag).await;
        assert!(rt.volumes().is_empty());
        assert!(rt.live_containers().is_empty());
        assert!(!diag.has_warnings());
    }

    #[tokio::test]
    async fn unreachable_proxy_is_torn_down() {
        let port = closed_port().await;
        let rt = FakeRuntime::new();
        let mut diag = Diagnostics::default();

        let err = ProxySidecar::start(&rt, &settings(port, 3), &Interrupt::never(), &mut diag)
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NotReachable { attempts: 3, .. }));
        assert!(rt.volumes().is_empty());
        assert!(rt.live_containers().is_empty());
    }

    #[tokio::test]
    async fn failed_container_create_removes_volumes() {
        let rt = FakeRuntime::new();
        rt.fail("create_container");
        let mut diag = Diagnostics::default();

        let err = ProxySidecar::start(&rt, &settings(3128, 1), &Interrupt::never(), &mut diag)
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::Container(_)));
        assert!(rt.volumes().is_empty());
    }

    #[tokio::test]
    async fn missing_address_is_an_error() {
        let rt = FakeRuntime::new();
        rt.set_sidecar_ip("");
        let mut diag = Diagnostics::default();

        let err = ProxySidecar::start(&rt, &settings(3128, 1), &Interrupt::never(), &mut diag)
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::NoAddress));
        assert!(rt.live_containers().is_empty());
    }

    #[tokio::test]
    async fn interrupt_during_setup_releases_resources() {
        let rt = FakeRuntime::new();
        let (handle, interrupt) = Interrupt::manual();
        rt.interrupt_on("create_container", handle);
        let mut diag = Diagnostics::default();

        let err = ProxySidecar::start(&rt, &settings(3128, 5), &interrupt, &mut diag)
            .await
            .unwrap_err();
        assert!(matches!(err, SidecarError::Interrupted(_)));
        assert!(rt.volumes().is_empty());
        assert!(rt.live_containers().is_empty());
    }

    #[tokio::test]
    async fn removal_failures_become_warnings() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let rt = FakeRuntime::new();
        let mut diag = Diagnostics::default();

        let sidecar = ProxySidecar::start(&rt, &settings(port, 5), &Interrupt::never(), &mut diag)
            .await
            .unwrap();
        rt.fail("remove_container");
        sidecar.stop(&rt, &mut diag).await;

        assert_eq!(diag.warnings().len(), 1);
        // Volumes are still attempted after the container failed.
        assert!(rt.volumes().is_empty());
    }
}
