//! Zapier webhook backend
//!
//! A Zap catches the request, runs the deep-research model and answers the
//! webhook call with the narrative. The call is synchronous from our side,
//! bounded by a request timeout. Attachments travel inline as base64.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use lens_core::domain::job::JobHandle;
use lens_core::domain::request::{JobRequest, Lens};
use lens_core::dto::job::JobStatusReport;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::{AnalysisBackend, handle_response};

/// Upper bound on one webhook round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const BACKEND_NAME: &str = "zapier";

/// HTTP client for Zapier catch hooks, optionally one hook per lens
#[derive(Debug, Clone)]
pub struct ZapierClient {
    /// Hook used for lenses without a dedicated URL
    default_url: Option<String>,
    lens_urls: HashMap<Lens, String>,
    timeout: Duration,
    client: Client,
}

impl ZapierClient {
    pub fn new(default_url: Option<String>) -> Self {
        Self::with_client(default_url, Client::new())
    }

    pub fn with_client(default_url: Option<String>, client: Client) -> Self {
        Self {
            default_url: default_url.filter(|u| !u.trim().is_empty()),
            lens_urls: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            client,
        }
    }

    /// Route one lens to its own hook
    pub fn with_lens_url(mut self, lens: Lens, url: impl Into<String>) -> Self {
        self.lens_urls.insert(lens, url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Hook URL for `lens`, falling back to the default hook
    pub fn webhook_url(&self, lens: Lens) -> Option<&str> {
        self.lens_urls
            .get(&lens)
            .or(self.default_url.as_ref())
            .map(String::as_str)
    }
}

#[async_trait]
impl AnalysisBackend for ZapierClient {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobStatusReport> {
        let url = self
            .webhook_url(request.lens())
            .ok_or_else(|| ClientError::MissingCredential("ZAPIER_WEBHOOK_URL".to_string()))?;

        let body = WebhookRequest::from_request(request);
        info!(
            "Sending {} lens request for {} to Zapier ({} file(s))",
            request.lens(),
            request.company(),
            body.files.as_ref().map_or(0, Vec::len)
        );

        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        let reply: WebhookResponse = handle_response(response).await?;
        reply.into_report()
    }

    async fn get_status(&self, _handle: &JobHandle) -> Result<JobStatusReport> {
        Err(ClientError::unsupported(BACKEND_NAME, "job status"))
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        Err(ClientError::unsupported(BACKEND_NAME, "job cancellation"))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookRequest<'a> {
    company_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sector: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<&'a str>,
    lens_type: Lens,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<WebhookFile<'a>>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookFile<'a> {
    name: &'a str,
    content: String,
    content_type: &'a str,
}

impl<'a> WebhookRequest<'a> {
    fn from_request(request: &'a JobRequest) -> Self {
        let files = request.has_attachments().then(|| {
            request
                .attachments()
                .iter()
                .map(|a| WebhookFile {
                    name: &a.name,
                    content: STANDARD.encode(&a.data),
                    content_type: &a.media_type,
                })
                .collect()
        });

        Self {
            company_name: request.company(),
            sector: request.sector(),
            stage: request.stage(),
            location: request.location(),
            lens_type: request.lens(),
            prompt: request.query(),
            files,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    success: Option<bool>,
    result: Option<String>,
    message: Option<String>,
    error: Option<String>,
    request_id: Option<String>,
}

impl WebhookResponse {
    fn into_report(self) -> Result<JobStatusReport> {
        if self.success == Some(false) || self.error.is_some() {
            let reason = self
                .error
                .or(self.message)
                .unwrap_or_else(|| "webhook reported failure".to_string());
            return Err(ClientError::Rejected(reason));
        }

        // A bare catch-hook acknowledgement carries no analysis
        let Some(result) = self.result.filter(|r| !r.trim().is_empty()) else {
            return Err(ClientError::Rejected(
                "webhook acknowledged the request without an analysis result".to_string(),
            ));
        };

        let id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        debug!("Zapier request {} returned {} chars", id, result.len());

        Ok(JobStatusReport::completed(JobHandle::new(id), result, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_core::domain::job::JobState;
    use lens_core::domain::request::Attachment;

    #[test]
    fn test_lens_routing() {
        let client = ZapierClient::new(Some("https://hooks.example/default".to_string()))
            .with_lens_url(Lens::Cfo, "https://hooks.example/cfo");

        assert_eq!(client.webhook_url(Lens::Cfo), Some("https://hooks.example/cfo"));
        assert_eq!(
            client.webhook_url(Lens::Skeptical),
            Some("https://hooks.example/default")
        );
        assert_eq!(ZapierClient::new(Some(String::new())).webhook_url(Lens::Unified), None);
    }

    #[tokio::test]
    async fn test_missing_hook_fails_before_network() {
        let client = ZapierClient::new(None);
        let request = JobRequest::builder("Acme", "Analyze").build();

        let err = client.submit(&request).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_request_body_inlines_attachments() {
        let request = JobRequest::builder("Acme", "Analyze")
            .lens(Lens::Cfo)
            .sector("Fintech")
            .attachment(Attachment::new("deck.pdf", "application/pdf", b"hi".to_vec()))
            .build();

        let body = serde_json::to_value(WebhookRequest::from_request(&request)).unwrap();
        assert_eq!(body["companyName"], "Acme");
        assert_eq!(body["lensType"], "CFO");
        assert_eq!(body["sector"], "Fintech");
        assert!(body.get("stage").is_none());
        assert_eq!(body["files"][0]["content"], "aGk=");
        assert_eq!(body["files"][0]["contentType"], "application/pdf");
    }

    #[test]
    fn test_response_interpretation() {
        let ok: WebhookResponse = serde_json::from_value(serde_json::json!({
            "success": true,
            "result": "Strong Yes",
            "requestId": "zap-1"
        }))
        .unwrap();
        let report = ok.into_report().unwrap();
        assert_eq!(report.id, JobHandle::new("zap-1"));
        assert_eq!(report.state, JobState::Completed);

        let failed: WebhookResponse =
            serde_json::from_value(serde_json::json!({"success": false, "error": "quota"})).unwrap();
        assert!(matches!(failed.into_report(), Err(ClientError::Rejected(m)) if m == "quota"));

        let ack: WebhookResponse =
            serde_json::from_value(serde_json::json!({"status": "success"})).unwrap();
        assert!(ack.into_report().is_err());
    }

    #[tokio::test]
    async fn test_collections_unsupported() {
        let client = ZapierClient::new(Some("https://hooks.example/default".to_string()));

        assert!(client.list_collections().await.unwrap_err().is_unsupported());
        assert!(client.delete_collection("vs_1").await.unwrap_err().is_unsupported());
    }
}
