// ABOUTME: The upgrade engine: resolution, proxy sidecar, per-image executor, session.
// ABOUTME: Everything that mutates runtime state lives below this module.

mod error;
mod executor;
mod interrupt;
mod outcome;
mod proxy;
mod resolver;
mod session;
mod status_channel;

pub use error::{ResolutionFailure, ResolutionReason, SidecarError, UpgradeError, UpgradeErrorKind};
pub use executor::{Executor, ExecutorOptions, LAYER_WARNING_THRESHOLD};
pub use interrupt::{FORCE_EXIT_PRESSES, Interrupt, InterruptHandle, Interrupted};
pub use outcome::{Disposition, FailureKind, SessionReport, UpgradeOutcome};
pub use proxy::{MANAGED_LABEL, ProxySidecar};
pub use resolver::{ResolveOptions, TargetSet, UpgradeTarget, resolve_targets};
pub use session::{ProxyMode, Session, SessionOptions};
pub use status_channel::StatusChannel;
