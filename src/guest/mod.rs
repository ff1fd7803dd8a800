// ABOUTME: Contract between the orchestrator and the disposable upgrade container.
// ABOUTME: Script delivery, status side-channel location, and exit code meaning.

mod script;
mod token;

pub use script::{GuestScript, ProxyEnv, ScriptError};
pub use token::StatusToken;

/// Where the status channel is mounted inside the container.
pub const STATUS_PATH: &str = "/.reimage-status";

/// Shell the script is piped into.
pub const GUEST_SHELL: &str = "/bin/sh";

/// Exit code the guest uses when it recognises no distribution.
pub const UNSUPPORTED_EXIT_CODE: i64 = 3;

/// How the guest run ended, before any commit decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestVerdict {
    /// Ran to completion and changed packages.
    Upgraded,
    /// Ran to completion with nothing to do.
    UpToDate,
    /// Did not recognise the operating system.
    Unsupported,
    /// Any other failure.
    Failed,
}

impl GuestVerdict {
    /// Interpret exit code, captured stdout, and status token.
    pub fn classify(exit_code: i64, output: &str, token: &StatusToken) -> Self {
        if exit_code != 0 {
            if exit_code == UNSUPPORTED_EXIT_CODE || token.is_unsupported() {
                return GuestVerdict::Unsupported;
            }
            return GuestVerdict::Failed;
        }
        if output.trim().is_empty() {
            GuestVerdict::UpToDate
        } else {
            GuestVerdict::Upgraded
        }
    }
}
