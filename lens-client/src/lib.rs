//! Lens Backend Clients
//!
//! Type-safe HTTP clients for the analysis backends that run research jobs.
//!
//! Every backend implements [`AnalysisBackend`], so the research controller
//! can submit, poll and cancel jobs without knowing which service runs them:
//! - [`OpenAiClient`]: OpenAI Responses API in background mode (deep research)
//! - [`AzureOpenAiClient`]: Azure OpenAI chat completions, answered synchronously
//! - [`ZapierClient`]: Zapier catch hooks that relay to a deep-research model
//!
//! # Example
//!
//! ```no_run
//! use lens_client::{AnalysisBackend, OpenAiClient};
//! use lens_core::domain::request::JobRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OpenAiClient::new(std::env::var("OPENAI_API_KEY").ok());
//!
//!     let request = JobRequest::builder("Acme", "Assess Acme's seed round").build();
//!     let report = client.submit(&request).await?;
//!
//!     println!("Submitted job {} ({})", report.id, report.state);
//!     Ok(())
//! }
//! ```

mod azure;
pub mod error;
mod openai;
mod zapier;

// Re-export commonly used types
pub use azure::AzureOpenAiClient;
pub use error::{ClientError, Result};
pub use openai::OpenAiClient;
pub use zapier::ZapierClient;

use async_trait::async_trait;
use lens_core::domain::collection::CollectionInfo;
use lens_core::domain::job::JobHandle;
use lens_core::domain::request::{Attachment, JobRequest};
use lens_core::dto::job::JobStatusReport;
use serde::de::DeserializeOwned;

/// An external service that runs long analysis jobs
///
/// `submit` returns the initial status. Backends that answer synchronously
/// return a terminal report straight away and callers skip polling.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Submits a job without waiting for it to finish
    ///
    /// Implementations must check their credential before any network I/O
    /// and must either transmit every attachment or fail with
    /// [`ClientError::AttachmentsUnsupported`].
    async fn submit(&self, request: &JobRequest) -> Result<JobStatusReport>;

    /// Fetches the current status of a job
    async fn get_status(&self, handle: &JobHandle) -> Result<JobStatusReport>;

    /// Asks the backend to stop a job
    async fn cancel(&self, handle: &JobHandle) -> Result<()>;

    /// Uploads documents into a new named collection
    async fn create_collection(
        &self,
        _name: &str,
        _files: &[Attachment],
    ) -> Result<CollectionInfo> {
        Err(ClientError::unsupported(self.name(), "document collections"))
    }

    /// Lists the document collections available to this account
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        Err(ClientError::unsupported(self.name(), "document collections"))
    }

    /// Deletes a document collection and the files indexed in it
    async fn delete_collection(&self, _id: &str) -> Result<()> {
        Err(ClientError::unsupported(self.name(), "document collections"))
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// This checks the status code and returns an appropriate error if the
/// request failed, or deserializes the response body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response whose body is not needed
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(())
}

/// Strips a trailing slash so paths can be appended with `format!`
pub(crate) fn normalize_base_url(base_url: impl Into<String>) -> String {
    base_url.into().trim_end_matches('/').to_string()
}
