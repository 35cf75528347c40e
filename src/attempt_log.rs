//! Per-attempt result lines.
//!
//! One line per completed attempt, written to stdout (stderr when stdout
//! carries the JSON report) or appended to a log file. Writes are serialized through a `tokio::sync::Mutex` so lines
//! from concurrent attempts never interleave.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::AttemptOutcome;
use crate::error::StartupError;
use crate::selector::AttemptParameters;

/// Format the log line for one finished attempt.
pub fn format_line(params: &AttemptParameters, outcome: &AttemptOutcome) -> String {
    let hw = params
        .hardware_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "[{} / {}] {} authentication. Duration {:.3} s",
        params.identity,
        hw,
        outcome.verdict(),
        outcome.duration.as_secs_f64()
    )
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Append-only, line-oriented attempt log.
pub struct AttemptLog {
    path: Option<PathBuf>,
    writer: Mutex<Sink>,
}

impl AttemptLog {
    pub fn stdout() -> Self {
        Self::from_writer(Box::new(tokio::io::stdout()))
    }

    /// Keeps stdout free for a machine-readable report.
    pub fn stderr() -> Self {
        Self::from_writer(Box::new(tokio::io::stderr()))
    }

    /// Write into an arbitrary async sink.
    pub fn from_writer(writer: Sink) -> Self {
        Self {
            path: None,
            writer: Mutex::new(writer),
        }
    }

    /// Open (or create) `path` in append mode.
    pub async fn open(path: &Path) -> Result<Self, StartupError> {
        let wrap = |source| StartupError::LogSink {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(wrap)?;
        debug!(path = %path.display(), "attempt log opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            writer: Mutex::new(Box::new(file) as Sink),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append the line for one finished attempt.
    pub async fn log(&self, params: &AttemptParameters, outcome: &AttemptOutcome) -> Result<()> {
        let mut line = format_line(params, outcome);
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .context("failed to write attempt log")?;
        writer.flush().await.context("failed to flush attempt log")?;
        Ok(())
    }
}
