//! radload -- concurrent load generator for RADIUS/EAP authentication backends.
//!
//! Replays many authentication attempts through an external client
//! (`eapol_test` by default), rotating synthetic identities and optional
//! Calling-Station-Id values, and reports aggregate latency and success
//! statistics.

pub mod artifact;
pub mod attempt_log;
pub mod backend;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod mac;
pub mod pool;
pub mod selector;
pub mod shutdown;
pub mod stats;

use std::sync::Arc;

use anyhow::Result;

use crate::backend::EapolTestBackend;
use crate::config::RunConfig;
use crate::controller::{RunController, RunSummary};

/// Run a full load test with the `eapol_test` backend described by `config`.
///
/// Startup failures come back as [`error::StartupError`] inside the
/// `anyhow::Error` so callers can map them to exit codes.
pub async fn run(config: RunConfig) -> Result<RunSummary> {
    let backend = Arc::new(EapolTestBackend::new(
        config.backend_program.clone(),
        config.backend_args.clone(),
    ));
    let controller = RunController::initialize(config, backend).await?;
    controller.run().await
}
