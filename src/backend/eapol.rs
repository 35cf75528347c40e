//! `eapol_test` process wrapper.
//!
//! Each attempt spawns `eapol_test -c <artifact> [-N31:s:<mac>] <args...>`
//! and treats exit status 0 as a successful authentication.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::{debug, info};

use super::{AttemptOutcome, AuthenticationBackend, BackendError};
use crate::mac::HardwareId;

pub const DEFAULT_PROGRAM: &str = "eapol_test";

/// RADIUS attribute 31 (Calling-Station-Id), sent as a string.
pub fn calling_station_id(mac: &HardwareId) -> String {
    format!("-N31:s:{}", mac)
}

/// Subprocess-backed authentication using wpa_supplicant's `eapol_test`.
#[derive(Debug, Clone)]
pub struct EapolTestBackend {
    program: String,
    /// Extra arguments forwarded verbatim (server address, secret, ...).
    args: Vec<String>,
}

impl EapolTestBackend {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Full argument vector for one attempt.
    pub fn build_args(&self, artifact: &Path, hardware_id: Option<&HardwareId>) -> Vec<String> {
        let mut args = vec!["-c".to_string(), artifact.display().to_string()];
        if let Some(mac) = hardware_id {
            args.push(calling_station_id(mac));
        }
        args.extend(self.args.iter().cloned());
        args
    }
}

/// Resolve `program` to an existing file, searching `PATH` for bare names.
pub fn locate(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Last non-empty line of a process stream, for failure diagnostics.
fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

#[async_trait::async_trait]
impl AuthenticationBackend for EapolTestBackend {
    fn name(&self) -> &str {
        &self.program
    }

    async fn verify(&self) -> Result<(), BackendError> {
        let path = locate(&self.program).ok_or_else(|| BackendError::NotFound {
            program: self.program.clone(),
        })?;
        if !is_executable(&path) {
            return Err(BackendError::NotExecutable {
                path: path.display().to_string(),
            });
        }
        info!(path = %path.display(), "authentication backend located");
        Ok(())
    }

    async fn authenticate(
        &self,
        artifact: &Path,
        hardware_id: Option<&HardwareId>,
    ) -> AttemptOutcome {
        let args = self.build_args(artifact, hardware_id);
        let start = Instant::now();

        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;
        let duration = start.elapsed();

        match output {
            Ok(out) if out.status.success() => AttemptOutcome::success(duration),
            Ok(out) => {
                let detail = last_line(&out.stderr)
                    .or_else(|| last_line(&out.stdout))
                    .unwrap_or_else(|| "no output".to_string());
                debug!(status = %out.status, %detail, "backend reported failure");
                AttemptOutcome::failure(duration, format!("{}: {}", out.status, detail))
            }
            Err(e) => AttemptOutcome::failure(
                duration,
                format!("failed to execute {}: {}", self.program, e),
            ),
        }
    }
}
