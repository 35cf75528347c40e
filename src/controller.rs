//! Run lifecycle: `Initializing -> Running -> Draining -> Terminated`.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactSet;
use crate::attempt_log::AttemptLog;
use crate::backend::AuthenticationBackend;
use crate::config::RunConfig;
use crate::credentials::CredentialSet;
use crate::error::StartupError;
use crate::mac::MacPool;
use crate::pool::WorkerPool;
use crate::selector;
use crate::shutdown::{self, Shutdown, StopReason};
use crate::stats::{StatsAggregator, StatsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Initializing,
    Running,
    Draining,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Initializing => "initializing",
            RunState::Running => "running",
            RunState::Draining => "draining",
            RunState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stats: StatsSnapshot,
    pub stop_reason: Option<StopReason>,
    pub worker_limit: usize,
    pub peak_in_flight: usize,
    /// Artifacts deleted on exit, when cleanup was requested.
    pub artifacts_removed: Option<usize>,
}

/// Owns everything a run needs and drives it to completion.
pub struct RunController {
    config: RunConfig,
    credentials: Arc<CredentialSet>,
    macs: Arc<MacPool>,
    artifacts: Arc<ArtifactSet>,
    backend: Arc<dyn AuthenticationBackend>,
    stats: Arc<StatsAggregator>,
    log: Arc<AttemptLog>,
    state: RunState,
}

impl RunController {
    /// Load credentials, build the MAC pool, check the backend and render
    /// client configurations. Any failure here aborts the run.
    pub async fn initialize(
        config: RunConfig,
        backend: Arc<dyn AuthenticationBackend>,
    ) -> Result<Self, StartupError> {
        info!(state = %RunState::Initializing, "preparing run");
        config.validate()?;

        let credentials = CredentialSet::load(&config.credentials_path, config.delimiter)
            .map_err(|e| StartupError::Credentials {
                path: config.credentials_path.clone(),
                reason: format!("{:#}", e),
            })?;

        let macs = MacPool::generate(config.mac_pool_size);
        if !macs.is_empty() {
            info!(size = macs.len(), "generated Calling-Station-Id pool");
        }

        backend.verify().await?;

        let artifacts = ArtifactSet::render_all(&config.work_dir, &credentials)?;

        let log = match &config.log_path {
            Some(path) => match AttemptLog::open(path).await {
                Ok(log) => log,
                Err(e) => {
                    if let Err(cleanup) = artifacts.cleanup() {
                        warn!(error = %cleanup, "failed to remove artifacts after startup error");
                    }
                    return Err(e);
                }
            },
            None if config.json_report => AttemptLog::stderr(),
            None => AttemptLog::stdout(),
        };

        Ok(Self {
            config,
            credentials: Arc::new(credentials),
            macs: Arc::new(macs),
            artifacts: Arc::new(artifacts),
            backend,
            stats: Arc::new(StatsAggregator::new()),
            log: Arc::new(log),
            state: RunState::Initializing,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialSet {
        &self.credentials
    }

    pub fn mac_pool(&self) -> &MacPool {
        &self.macs
    }

    pub fn stats(&self) -> &Arc<StatsAggregator> {
        &self.stats
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
    }

    /// Run until a limit is reached or SIGINT/SIGTERM arrives.
    pub async fn run(self) -> Result<RunSummary> {
        let shutdown = Shutdown::new();
        let signals = shutdown::spawn_signal_listener(shutdown.clone());
        let result = self.run_with_shutdown(shutdown).await;
        signals.abort();
        result
    }

    /// Run with an externally owned shutdown handle.
    pub async fn run_with_shutdown(mut self, shutdown: Shutdown) -> Result<RunSummary> {
        let run_id = self.stats.run_id();
        let limit = self.config.request_limit();
        let pool = WorkerPool::new(
            self.config.worker_limit,
            self.stats.clone(),
            self.log.clone(),
        );

        self.transition(RunState::Running);
        info!(
            %run_id,
            workers = pool.limit(),
            credentials = self.credentials.len(),
            macs = self.macs.len(),
            max_requests = self.config.max_requests,
            max_duration_secs = self.config.max_duration_secs,
            backend = self.backend.name(),
            "load run started"
        );

        let deadline = self
            .config
            .max_duration()
            .map(|d| shutdown::spawn_deadline(d, shutdown.clone()));

        loop {
            if shutdown.is_triggered() {
                break;
            }
            // Counted at dispatch, so the run never starts more than `max`.
            if limit.is_some_and(|max| pool.dispatched() >= max) {
                shutdown.trigger(StopReason::RequestLimit);
                break;
            }

            // Waiting for a slot must not delay a deadline or signal.
            let slot = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                slot = pool.acquire() => slot?,
            };
            if shutdown.is_triggered() {
                break;
            }

            let params = {
                let mut rng = rand::thread_rng();
                selector::select(&self.credentials, &self.macs, &mut rng)
            };
            let artifact = self
                .artifacts
                .path_for(&params.identity)
                .map(Path::to_path_buf)
                .with_context(|| format!("no client configuration for '{}'", params.identity))?;

            let backend = self.backend.clone();
            let hardware_id = params.hardware_id;
            pool.dispatch(slot, params, async move {
                backend.authenticate(&artifact, hardware_id.as_ref()).await
            });
        }

        self.transition(RunState::Draining);
        if let Some(timer) = deadline {
            timer.abort();
        }
        info!(in_flight = pool.in_flight(), "waiting for in-flight attempts");
        pool.drain().await?;

        self.transition(RunState::Terminated);
        let stats = self.stats.snapshot().await;
        info!(
            %run_id,
            requests = stats.requests_started,
            successes = stats.successes,
            failures = stats.failures,
            "load run finished"
        );

        let artifacts_removed = if self.config.cleanup_on_exit {
            match self.artifacts.cleanup() {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "cleanup incomplete");
                    None
                }
            }
        } else {
            None
        };

        Ok(RunSummary {
            stats,
            stop_reason: shutdown.reason(),
            worker_limit: pool.limit(),
            peak_in_flight: pool.peak_in_flight(),
            artifacts_removed,
        })
    }
}
