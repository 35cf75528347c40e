//! Per-identity `eapol_test` client configuration files.
//!
//! Every credential gets one rendered network block in the working
//! directory before the run starts. Rendering failures are fatal at startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use askama::Template;
use tracing::{debug, info, warn};

use crate::credentials::{Credential, CredentialSet};
use crate::error::StartupError;

#[derive(Template)]
#[template(path = "eapol_test.conf", escape = "none")]
struct EapolConfTemplate<'a> {
    identity: &'a str,
    secret: &'a str,
}

/// Render the client configuration for one credential.
pub fn render(cred: &Credential) -> Result<String, StartupError> {
    let template_err = |reason: String| StartupError::Template {
        identity: cred.identity.clone(),
        reason,
    };
    for (field, value) in [("identity", &cred.identity), ("secret", &cred.secret)] {
        if value.contains(['"', '\n', '\r']) {
            return Err(template_err(format!(
                "{} contains a quote or line break",
                field
            )));
        }
    }
    EapolConfTemplate {
        identity: &cred.identity,
        secret: &cred.secret,
    }
    .render()
    .map_err(|e| template_err(e.to_string()))
}

/// Filesystem-safe form of an identity.
fn sanitize(identity: &str) -> String {
    identity
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Create the working directory. Directories created here are owner-only
/// on unix; an existing directory keeps its permissions.
pub fn prepare_work_dir(dir: &Path) -> Result<(), StartupError> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|source| StartupError::WorkDir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Rendered artifacts for a credential set, keyed by identity.
#[derive(Debug, Default)]
pub struct ArtifactSet {
    dir: PathBuf,
    paths: HashMap<String, PathBuf>,
}

impl ArtifactSet {
    /// Render and write one artifact per credential into `dir`.
    pub fn render_all(dir: &Path, credentials: &CredentialSet) -> Result<Self, StartupError> {
        prepare_work_dir(dir)?;
        let mut set = Self {
            dir: dir.to_path_buf(),
            paths: HashMap::with_capacity(credentials.len()),
        };

        for (idx, cred) in credentials.iter().enumerate() {
            let body = match render(cred) {
                Ok(body) => body,
                Err(e) => {
                    // Leave nothing half-written behind.
                    set.remove_quietly();
                    return Err(e);
                }
            };
            let path = dir.join(format!("{}-{}.conf", idx, sanitize(&cred.identity)));
            if let Err(source) = std::fs::write(&path, body) {
                set.remove_quietly();
                return Err(StartupError::WorkDir { path, source });
            }
            debug!(identity = %cred.identity, path = %path.display(), "artifact written");
            set.paths.insert(cred.identity.clone(), path);
        }

        info!(dir = %dir.display(), count = set.len(), "rendered client configurations");
        Ok(set)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn path_for(&self, identity: &str) -> Option<&Path> {
        self.paths.get(identity).map(PathBuf::as_path)
    }

    /// Delete every artifact this set created. Returns how many were removed.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.paths.values() {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to remove {}", path.display()))
                }
            }
        }
        info!(dir = %self.dir.display(), removed, "removed client configurations");
        Ok(removed)
    }

    fn remove_quietly(&self) {
        if let Err(e) = self.cleanup() {
            warn!(error = %e, "failed to remove partial artifacts");
        }
    }
}
