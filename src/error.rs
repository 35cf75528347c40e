//! Fatal startup errors and their process exit codes.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::BackendError;

/// Errors that abort the process before any attempt is dispatched.
///
/// Each variant maps to its own exit code so wrapper scripts can tell the
/// causes apart. Graceful termination always exits with 0.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("credential source {path}: {reason}")]
    Credentials { path: PathBuf, reason: String },

    #[error("working directory {path}: {source}")]
    WorkDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to render configuration for '{identity}': {reason}")]
    Template { identity: String, reason: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("attempt log {path}: {source}")]
    LogSink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StartupError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::Config(_) => 2,
            StartupError::Credentials { .. } => 3,
            StartupError::WorkDir { .. } => 4,
            StartupError::Template { .. } => 5,
            StartupError::Backend(_) => 6,
            StartupError::LogSink { .. } => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let errors = vec![
            StartupError::Config("x".into()),
            StartupError::Credentials {
                path: "a.csv".into(),
                reason: "empty".into(),
            },
            StartupError::WorkDir {
                path: "/tmp/x".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            },
            StartupError::Template {
                identity: "bob".into(),
                reason: "quote".into(),
            },
            StartupError::Backend(BackendError::NotFound {
                program: "eapol_test".into(),
            }),
            StartupError::LogSink {
                path: "radload.log".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
        ];

        let codes: HashSet<u8> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
        assert!(!codes.contains(&1));
    }
}
