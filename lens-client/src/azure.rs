//! Azure OpenAI chat completions backend
//!
//! Chat completions answer in a single call, so `submit` returns a terminal
//! report and there is nothing to poll or cancel afterwards. The endpoint has
//! no way to carry binary documents; requests with attachments are refused.

use async_trait::async_trait;
use lens_core::domain::job::JobHandle;
use lens_core::domain::request::JobRequest;
use lens_core::dto::job::{JobStatusReport, SubmitEnvelope};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ClientError, Result};
use crate::{AnalysisBackend, handle_response, normalize_base_url};

/// API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "2025-01-01-preview";

const BACKEND_NAME: &str = "azure";
const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.95;
const MAX_TOKENS: u32 = 16_384;

/// HTTP client for one Azure OpenAI chat deployment
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    /// Resource endpoint (e.g., "https://my-resource.openai.azure.com")
    endpoint: String,
    /// Deployment name (e.g., "gpt-4o-mini")
    deployment: String,
    api_version: String,
    /// Sent as the `api-key` header; `None` fails before any I/O
    api_key: Option<String>,
    client: Client,
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self::with_client(endpoint, deployment, api_key, Client::new())
    }

    pub fn with_client(
        endpoint: impl Into<String>,
        deployment: impl Into<String>,
        api_key: Option<String>,
        client: Client,
    ) -> Self {
        Self {
            endpoint: normalize_base_url(endpoint),
            deployment: deployment.into(),
            api_version: DEFAULT_API_VERSION.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client,
        }
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, self.deployment, self.api_version
        )
    }
}

#[async_trait]
impl AnalysisBackend for AzureOpenAiClient {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobStatusReport> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ClientError::MissingCredential("AZURE_OPENAI_API_KEY".to_string()))?;

        if self.endpoint.is_empty() {
            return Err(ClientError::MissingCredential(
                "AZURE_OPENAI_ENDPOINT".to_string(),
            ));
        }

        if request.has_attachments() {
            return Err(ClientError::AttachmentsUnsupported(format!(
                "{} attachment(s) cannot be sent to Azure chat completions; use the openai or zapier backend",
                request.attachments().len()
            )));
        }

        let envelope = SubmitEnvelope::build(request, &[]);
        let body = ChatRequest {
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: envelope.instructions,
                },
                ChatMessage {
                    role: "user",
                    content: user_message(request),
                },
            ],
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
        };

        info!(
            "Requesting {} lens analysis for {} from deployment {}",
            request.lens(),
            request.company(),
            self.deployment
        );

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let completion: ChatResponse = handle_response(response).await?;
        let id = if completion.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            completion.id
        };
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(JobStatusReport::completed(
            JobHandle::new(id),
            content,
            Vec::new(),
        ))
    }

    async fn get_status(&self, _handle: &JobHandle) -> Result<JobStatusReport> {
        Err(ClientError::unsupported(BACKEND_NAME, "job status"))
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        Err(ClientError::unsupported(BACKEND_NAME, "job cancellation"))
    }
}

fn user_message(request: &JobRequest) -> String {
    format!(
        "Please analyze {} according to the instructions provided. Return a comprehensive \
         investment analysis with a clear recommendation, entry range, key sensitivity, \
         valuation scenarios and detailed reasoning. Format the response as structured text, not HTML.",
        request.company()
    )
}

#[derive(Serialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
