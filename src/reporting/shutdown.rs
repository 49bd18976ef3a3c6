// src/reporting/shutdown.rs

//! Abrupt termination of a realization run.
//!
//! Used when the run finished unsuccessfully and when a termination signal
//! arrives: every active reporter is stopped, then the whole process group
//! is SIGKILLed so no step process outlives the runner.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, warn};

use super::reporter::Reporter;

/// Kills the process group. Tests substitute a recording implementation.
pub trait ProcessGroupKiller: Send + Sync {
    fn kill_process_group(&self);
}

/// Sends SIGKILL to the runner's own process group (and so to itself).
#[derive(Debug, Default, Clone, Copy)]
pub struct KillOwnProcessGroup;

impl ProcessGroupKiller for KillOwnProcessGroup {
    #[cfg(unix)]
    fn kill_process_group(&self) {
        // SAFETY: plain syscalls without pointer arguments.
        unsafe {
            let pgid = libc::getpgid(0);
            if pgid < 0 || libc::killpg(pgid, libc::SIGKILL) != 0 {
                error!(error = %std::io::Error::last_os_error(), "killpg failed; exiting");
                std::process::exit(1);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_process_group(&self) {
        std::process::exit(1);
    }
}

/// Idempotent hard-shutdown path shared by the signal handler and the
/// failed-`Finish` handler.
#[derive(Debug)]
pub struct HardShutdown<K: ProcessGroupKiller> {
    killer: K,
    fired: AtomicBool,
}

impl<K: ProcessGroupKiller> HardShutdown<K> {
    pub fn new(killer: K) -> Self {
        Self {
            killer,
            fired: AtomicBool::new(false),
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    pub fn killer(&self) -> &K {
        &self.killer
    }

    /// Stop reporters and kill the process group. Only the first call has
    /// any effect.
    pub async fn fire<R: Reporter>(&self, reporters: &mut [R]) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(reporters = reporters.len(), "hard shutdown: stopping reporters and killing process group");
        stop_reporters(reporters).await;
        self.killer.kill_process_group();
    }
}

/// Stop every reporter, logging (not propagating) failures.
pub async fn stop_reporters<R: Reporter>(reporters: &mut [R]) {
    for reporter in reporters.iter_mut() {
        if let Err(e) = reporter.stop().await {
            warn!(reporter = reporter.name(), error = %e, "reporter failed to stop");
        }
    }
}

/// Completes when the process is asked to terminate.
#[cfg(unix)]
pub async fn wait_for_termination() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => {},
        _ = sigint.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_termination() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
