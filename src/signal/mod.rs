//! Interrupt handling and cancellation
//!
//! On the first SIGINT/SIGTERM the shared [`CancelToken`] is cancelled: the
//! deploy stops polling at its next check, the tunnel is torn down and the
//! outcome is reported as cancelled. A second signal exits immediately with
//! [`EXIT_CODE_CANCELLED`] after stopping any child processes registered
//! on the token.

use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Exit code for cancelled deploys
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Granularity at which sleeping pollers observe cancellation
pub const CANCEL_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Cloneable cancellation flag shared between the signal handler and the
/// deploy loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    children: Arc<Mutex<Vec<u32>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Register a child process to stop if we are forced to exit
    pub fn track_child(&self, pid: u32) {
        self.lock_children().push(pid);
    }

    pub fn untrack_child(&self, pid: u32) {
        self.lock_children().retain(|p| *p != pid);
    }

    pub fn tracked_children(&self) -> Vec<u32> {
        self.lock_children().clone()
    }

    fn lock_children(&self) -> std::sync::MutexGuard<'_, Vec<u32>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `duration`, waking early if cancelled.
    ///
    /// Returns `true` if the token was cancelled before the full duration
    /// elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.is_cancelled() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= duration {
                return false;
            }
            std::thread::sleep((duration - elapsed).min(CANCEL_CHECK_INTERVAL));
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: cancel the running deploy
    InitiateCancellation,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Tracks received signals and owns the cancel token
#[derive(Debug, Default)]
pub struct SignalState {
    token: CancelToken,
    signal_count: AtomicU8,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.token.cancel();
                SignalAction::InitiateCancellation
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }
}

/// Installs the process-wide Ctrl-C handler
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn token(&self) -> CancelToken {
        self.state.token()
    }

    /// Install the handler. Must be called once at program startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                tracing::warn!("received interrupt, cancelling deploy");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately...");
                stop_children(&state.token().tracked_children());
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

/// Send SIGTERM to each pid; children run in their own process group and
/// would otherwise outlive us.
fn stop_children(pids: &[u32]) {
    for pid in pids {
        let _ = Command::new("kill").arg(pid.to_string()).status();
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
