// ABOUTME: Operator interrupt handling with deferral around teardown.
// ABOUTME: Interrupts are latched and only honored at explicit cancellation points.

use crate::error::EXIT_INTERRUPTED;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Ctrl-C presses after which the process exits without finishing cleanup.
pub const FORCE_EXIT_PRESSES: u32 = 3;

/// The run was cancelled by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("interrupted by operator")]
pub struct Interrupted;

/// Latched interrupt flag shared by every component of a run.
///
/// Receiving a signal never aborts work by itself. Code opts in at points
/// where stopping is safe: `checkpoint()` between discrete runtime
/// operations, `interruptible()` around waits that hold no half-made
/// resource. Teardown sequences use neither, so an interrupt that arrives
/// during cleanup is honored only after every removal has been attempted.
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

/// Sets the interrupt flag.
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl InterruptHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

impl Interrupt {
    /// A flag plus the handle that raises it.
    pub fn manual() -> (InterruptHandle, Interrupt) {
        let (tx, rx) = watch::channel(false);
        (InterruptHandle { tx: Arc::new(tx) }, Interrupt { rx })
    }

    /// A flag that is never raised.
    pub fn never() -> Interrupt {
        Self::manual().1
    }

    /// Latch Ctrl-C for the lifetime of the process.
    ///
    /// The first press is deferred until cleanup finishes. Pressing
    /// [`FORCE_EXIT_PRESSES`] times exits at once, for a daemon that
    /// stopped answering mid-teardown.
    ///
    /// Must be called from within a tokio runtime.
    pub fn on_ctrl_c() -> Interrupt {
        let (handle, interrupt) = Self::manual();
        tokio::spawn(async move {
            let mut presses = 0;
            while tokio::signal::ctrl_c().await.is_ok() {
                presses += 1;
                match SignalResponse::after(presses) {
                    SignalResponse::Defer => {
                        tracing::warn!("interrupt received, cleaning up");
                    }
                    SignalResponse::Remind => {
                        tracing::warn!(
                            "interrupt already pending, waiting for cleanup to finish \
                             (press Ctrl-C {} more time(s) to exit now)",
                            FORCE_EXIT_PRESSES - presses
                        );
                    }
                    SignalResponse::Exit => {
                        tracing::error!("exiting without cleanup; containers or volumes may be left behind");
                        std::process::exit(EXIT_INTERRUPTED);
                    }
                }
                handle.trigger();
            }
        });
        interrupt
    }

    pub fn is_pending(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail if an interrupt is pending.
    pub fn checkpoint(&self) -> Result<(), Interrupted> {
        if self.is_pending() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves once the flag is raised; never resolves otherwise.
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|pending| *pending).await.is_err() {
            // Every handle is gone, so the flag can no longer change.
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the flag is raised first. An already pending
    /// interrupt wins without polling `fut`.
    pub async fn interruptible<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        tokio::select! {
            biased;
            _ = self.triggered() => Err(Interrupted),
            out = fut => Ok(out),
        }
    }
}

/// What the Ctrl-C handler does on the n-th press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalResponse {
    Defer,
    Remind,
    Exit,
}

impl SignalResponse {
    fn after(presses: u32) -> Self {
        match presses {
            0 | 1 => SignalResponse::Defer,
            n if n < FORCE_EXIT_PRESSES => SignalResponse::Remind,
            _ => SignalResponse::Exit,
        }
    }
}
