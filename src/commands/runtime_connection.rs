// ABOUTME: Shared helper for connecting to the local container runtime.
// ABOUTME: Detects the socket, connects, and pings before anything else runs.

use reimage::config::Settings;
use reimage::error::Result;
use reimage::output::Output;
use reimage::runtime::{BollardRuntime, RuntimeConfig, RuntimeError, RuntimeInfoTrait, detect_local};

/// Connect to the container runtime on this host.
///
/// Command-line overrides win over the settings file. The ping makes an
/// unreachable daemon a precondition failure rather than a per-image one.
pub async fn connect_to_runtime(
    settings: &Settings,
    overrides: RuntimeConfig,
    output: &Output,
) -> Result<BollardRuntime> {
    let configured = settings.runtime_config();
    let config = RuntimeConfig {
        runtime: overrides.runtime.or(configured.runtime),
        socket: overrides.socket.or(configured.socket),
    };

    let socket = detect_local(Some(&config)).map_err(RuntimeError::from)?;
    output.progress(&format!(
        "Using {} at {}",
        socket.runtime_type, socket.socket_path
    ));

    let runtime = BollardRuntime::connect(&socket).map_err(RuntimeError::from)?;
    runtime.ping().await.map_err(RuntimeError::from)?;

    if let Ok(meta) = runtime.info().await {
        tracing::debug!(
            name = %meta.name,
            version = %meta.version,
            api = %meta.api_version,
            "connected to runtime"
        );
    }

    Ok(runtime)
}
