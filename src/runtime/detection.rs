// ABOUTME: Runtime detection logic for the local system.
// ABOUTME: Checks for Podman sockets first, then Docker, unless overridden.

use super::types::{RuntimeConfig, RuntimeSocket, RuntimeType};
use std::path::Path;

/// Error during runtime detection.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container runtime found (checked Podman and Docker sockets)")]
    NoRuntimeFound,

    #[error("runtime socket does not exist: {0}")]
    SocketMissing(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Detect the container runtime on the local system.
///
/// Detection order (when not explicitly configured):
/// 1. Rootless Podman socket (`/run/user/$UID/podman/podman.sock`)
/// 2. Rootful Podman socket (`/run/podman/podman.sock`)
/// 3. Docker socket (`/var/run/docker.sock`)
///
/// An explicit socket must exist; an explicit runtime without a socket uses
/// that runtime's default path.
pub fn detect_local(config: Option<&RuntimeConfig>) -> Result<RuntimeSocket, DetectionError> {
    if let Some(cfg) = config
        && (cfg.runtime.is_some() || cfg.socket.is_some())
    {
        let runtime_type = cfg
            .runtime
            .or_else(|| cfg.socket.as_deref().map(guess_runtime))
            .unwrap_or(RuntimeType::Docker);
        let socket_path = cfg
            .socket
            .clone()
            .unwrap_or_else(|| default_socket_path(runtime_type));
        if !Path::new(&socket_path).exists() {
            return Err(DetectionError::SocketMissing(socket_path));
        }
        return Ok(RuntimeSocket {
            runtime_type,
            socket_path,
        });
    }

    // 1. Rootless Podman
    if let Some(uid) = get_uid() {
        let rootless_socket = format!("/run/user/{}/podman/podman.sock", uid);
        if Path::new(&rootless_socket).exists() {
            return Ok(RuntimeSocket {
                runtime_type: RuntimeType::Podman,
                socket_path: rootless_socket,
            });
        }
    }

    // 2. Rootful Podman
    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(RuntimeSocket {
            runtime_type: RuntimeType::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    // 3. Docker
    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(RuntimeSocket {
            runtime_type: RuntimeType::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoRuntimeFound)
}

fn get_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        // Fall back to reading /proc/self/status
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}

fn guess_runtime(socket: &str) -> RuntimeType {
    if socket.contains("podman") {
        RuntimeType::Podman
    } else {
        RuntimeType::Docker
    }
}

fn default_socket_path(runtime: RuntimeType) -> String {
    match runtime {
        RuntimeType::Docker => DOCKER_SOCKET.to_string(),
        RuntimeType::Podman => ROOTFUL_PODMAN.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_socket_is_reported() {
        let cfg = RuntimeConfig {
            runtime: None,
            socket: Some("/nonexistent/reimage-test.sock".to_string()),
        };
        let err = detect_local(Some(&cfg)).unwrap_err();
        assert!(matches!(err, DetectionError::SocketMissing(p) if p.contains("reimage-test")));
    }

    #[test]
    fn explicit_socket_guesses_podman_from_path() {
        assert_eq!(guess_runtime("/run/podman/podman.sock"), RuntimeType::Podman);
        assert_eq!(guess_runtime("/var/run/docker.sock"), RuntimeType::Docker);
    }
}
