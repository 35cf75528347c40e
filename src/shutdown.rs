//! The single "begin draining" signal.
//!
//! The deadline timer, process signals and the request limit all trigger
//! the same [`Shutdown`]. The first trigger wins and its reason is kept.

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Why dispatching stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// SIGINT / SIGTERM (or an embedder calling `trigger`).
    Interrupted,
    /// `max_duration_secs` elapsed.
    DeadlineReached,
    /// `max_requests` attempts were dispatched.
    RequestLimit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::DeadlineReached => write!(f, "max duration reached"),
            StopReason::RequestLimit => write!(f, "max requests reached"),
        }
    }
}

/// Cloneable handle to the run's cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    reason: Arc<OnceLock<StopReason>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request draining. Later triggers keep the first reason.
    pub fn trigger(&self, reason: StopReason) {
        if self.reason.set(reason).is_ok() {
            info!(%reason, "stopping dispatch");
        }
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.get().copied()
    }

    /// Resolves once any producer has triggered.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// Trigger `DeadlineReached` after `limit`, independent of the dispatch loop.
pub fn spawn_deadline(limit: Duration, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(limit) => {
                info!(limit_secs = limit.as_secs_f64(), "max duration elapsed");
                shutdown.trigger(StopReason::DeadlineReached);
            }
            _ = shutdown.cancelled() => {}
        }
    })
}

/// Trigger `Interrupted` on SIGINT or SIGTERM.
pub fn spawn_signal_listener(shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            received = wait_for_signal() => match received {
                Ok(name) => {
                    info!(signal = name, "signal received, draining in-flight attempts");
                    shutdown.trigger(StopReason::Interrupted);
                }
                Err(e) => warn!(error = %e, "failed to install signal handler"),
            },
            _ = shutdown.cancelled() => {}
        }
    })
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|_| "ctrl-c")
}
