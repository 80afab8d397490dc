//! Error types for the research controller

use lens_client::ClientError;
use lens_core::domain::job::JobState;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for research operations
pub type Result<T> = std::result::Result<T, ResearchError>;

/// Ways a research job can end without a completed result
///
/// Configuration, submission, transient polling, terminal backend state and
/// timeout stay distinct so callers can tell "the backend never finished"
/// from "the backend rejected the job". Cache failures never appear here.
#[derive(Debug, Error)]
pub enum ResearchError {
    /// A credential or endpoint is missing; nothing was sent
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backend refused the job or could not be reached at submit time
    #[error("Failed to start research: {0}")]
    Submission(#[source] ClientError),

    /// Status queries kept failing with retryable errors
    #[error("Status polling failed after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ClientError,
    },

    /// A status query failed with an error retrying cannot fix
    #[error("Status polling failed: {0}")]
    Backend(#[source] ClientError),

    /// The backend reported `failed`, `cancelled` or `incomplete`
    #[error("Research {state}: {message}")]
    Terminal { state: JobState, message: String },

    /// The wait budget ran out before a terminal state
    #[error("Research timed out after {} minute(s)", .0.as_secs().div_ceil(60))]
    Timeout(Duration),

    /// Cancelled through the controller
    #[error("Research cancelled")]
    Cancelled,

    /// The controller already has a job in flight
    #[error("A research job is already in progress")]
    Busy,

    /// Uploading or listing document collections failed
    #[error("Document collection request failed: {0}")]
    Collection(#[source] ClientError),
}

impl ResearchError {
    /// Classifies an error returned by `submit`
    pub fn from_submit(error: ClientError) -> Self {
        if error.is_configuration() {
            Self::Configuration(error.to_string())
        } else {
            Self::Submission(error)
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}
