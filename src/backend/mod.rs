//! Authentication backend capability.
//!
//! The load generator never speaks EAP or RADIUS itself. Each attempt is
//! handed to an [`AuthenticationBackend`], which reports success or failure
//! and how long the exchange took.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::mac::HardwareId;

pub mod eapol;

pub use eapol::EapolTestBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("authentication backend '{program}' not found")]
    NotFound { program: String },

    #[error("authentication backend '{path}' is not executable")]
    NotExecutable { path: String },
}

/// Result of one authentication attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptOutcome {
    pub succeeded: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

impl AttemptOutcome {
    pub fn success(duration: Duration) -> Self {
        Self {
            succeeded: true,
            duration,
            error: None,
        }
    }

    pub fn failure(duration: Duration, error: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            duration,
            error: Some(error.into()),
        }
    }

    pub fn verdict(&self) -> &'static str {
        if self.succeeded {
            "succeeded"
        } else {
            "failed"
        }
    }
}

/// Executes single authentication exchanges against the system under test.
///
/// Implementations must not panic on ordinary failures; a rejected or
/// broken exchange is reported as a failed [`AttemptOutcome`].
#[async_trait::async_trait]
pub trait AuthenticationBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Check that the backend can be invoked at all. Called once at startup.
    async fn verify(&self) -> Result<(), BackendError>;

    /// Run one exchange using the rendered client configuration at `artifact`.
    async fn authenticate(&self, artifact: &Path, hardware_id: Option<&HardwareId>)
        -> AttemptOutcome;
}
