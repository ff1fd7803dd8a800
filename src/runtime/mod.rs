// ABOUTME: Container runtime access for Docker and Podman.
// ABOUTME: Capability traits, the bollard implementation, and local socket detection.

mod bollard;
mod detection;
mod error;
#[cfg(test)]
pub(crate) mod fake;
pub mod traits;
mod types;

pub use self::bollard::BollardRuntime;
pub use detection::{DetectionError, detect_local};
pub use error::{RuntimeError, RuntimeErrorKind};
pub use traits::RuntimeInfo as RuntimeInfoTrait;
pub use traits::*;
pub use types::{RuntimeConfig, RuntimeSocket, RuntimeType};
