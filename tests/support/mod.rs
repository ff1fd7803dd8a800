// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup and local runtime access for integration tests.

use reimage::runtime::{BollardRuntime, RuntimeInfoTrait, detect_local};
use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env().add_directive("reimage=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Connect to the local runtime, or `None` when there is none to talk to.
#[allow(dead_code)]
pub async fn local_runtime() -> Option<BollardRuntime> {
    let socket = detect_local(None).ok()?;
    let runtime = BollardRuntime::connect(&socket).ok()?;
    runtime.ping().await.ok()?;
    Some(runtime)
}
