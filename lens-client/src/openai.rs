//! OpenAI Responses API backend
//!
//! Deep research runs as a background response: `POST /responses` with
//! `background: true` returns immediately with a queued response whose id is
//! then polled through `GET /responses/{id}`.
//!
//! Attached documents cannot be sent inline on this path. They are uploaded
//! through the Files API, ingested into a fresh vector store, and that store
//! is handed to the `file_search` tool.

use async_trait::async_trait;
use lens_core::domain::collection::CollectionInfo;
use lens_core::domain::job::{Citation, JobHandle, JobState};
use lens_core::domain::request::{Attachment, JobRequest};
use lens_core::dto::job::{
    EnvelopeMetadata, JobStatusReport, MAX_FILE_SEARCH_COLLECTIONS, SubmitEnvelope, Tool,
};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::{AnalysisBackend, handle_empty_response, handle_response, normalize_base_url};

/// Public OpenAI API root
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used for deep research jobs
pub const DEFAULT_MODEL: &str = "o3-deep-research";

const BACKEND_NAME: &str = "openai";
const INGEST_POLL_INTERVAL: Duration = Duration::from_secs(1);
const INGEST_MAX_ATTEMPTS: u32 = 120;

/// HTTP client for the OpenAI Responses and Vector Stores APIs
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    /// API root (e.g., "https://api.openai.com/v1")
    base_url: String,
    /// Bearer token; `None` fails every call before any I/O
    api_key: Option<String>,
    /// Model name sent with each submission
    model: String,
    /// HTTP client instance
    client: Client,
}

impl OpenAiClient {
    /// Create a client for the public API with the default model
    ///
    /// # Example
    /// ```
    /// use lens_client::OpenAiClient;
    ///
    /// let client = OpenAiClient::new(Some("sk-test".to_string()));
    /// assert_eq!(client.base_url(), "https://api.openai.com/v1");
    /// ```
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_client(DEFAULT_BASE_URL, api_key, Client::new())
    }

    /// Create a client with a custom API root and HTTP client
    ///
    /// This allows pointing at a compatible gateway and configuring timeouts,
    /// proxies or TLS settings.
    pub fn with_client(base_url: impl Into<String>, api_key: Option<String>, client: Client) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Override the model used for submissions
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Get the API root
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ClientError::MissingCredential("OPENAI_API_KEY".to_string()))
    }

    // =============================================================================
    // Document Ingestion
    // =============================================================================

    /// Upload one document through the Files API
    async fn upload_file(&self, api_key: &str, attachment: &Attachment) -> Result<String> {
        let url = format!("{}/files", self.base_url);

        let mut part = Part::bytes(attachment.data.clone()).file_name(attachment.name.clone());
        if !attachment.media_type.is_empty() {
            part = part.mime_str(&attachment.media_type)?;
        }
        let form = Form::new().text("purpose", "assistants").part("file", part);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let file: FileObject = handle_response(response).await?;
        debug!("Uploaded {} as file {}", attachment.name, file.id);
        Ok(file.id)
    }

    /// Upload documents and wait until the vector store has indexed them
    async fn ingest(&self, api_key: &str, name: &str, files: &[Attachment]) -> Result<VectorStore> {
        let mut file_ids = Vec::with_capacity(files.len());
        for attachment in files {
            file_ids.push(self.upload_file(api_key, attachment).await?);
        }

        let url = format!("{}/vector_stores", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&CreateVectorStore { name, file_ids })
            .send()
            .await?;
        let mut store: VectorStore = handle_response(response).await?;

        info!(
            "Created vector store {} with {} file(s)",
            store.id,
            files.len()
        );

        let mut attempts = 0;
        while store.status != "completed" {
            if store.status == "expired" {
                return Err(ClientError::Rejected(format!(
                    "vector store {} expired during ingestion",
                    store.id
                )));
            }
            if attempts >= INGEST_MAX_ATTEMPTS {
                return Err(ClientError::Rejected(format!(
                    "document ingestion into {} did not finish",
                    store.id
                )));
            }

            tokio::time::sleep(INGEST_POLL_INTERVAL).await;
            attempts += 1;

            let url = format!("{}/vector_stores/{}", self.base_url, store.id);
            let response = self.client.get(&url).bearer_auth(api_key).send().await?;
            store = handle_response(response).await?;
        }

        Ok(store)
    }
}

#[async_trait]
impl AnalysisBackend for OpenAiClient {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobStatusReport> {
        let api_key = self.api_key()?;

        // Uploaded attachments take one collection slot of their own
        let needed = request.collection_ids().len() + usize::from(request.has_attachments());
        if needed > MAX_FILE_SEARCH_COLLECTIONS {
            return Err(ClientError::InvalidRequest(format!(
                "at most {} document collections per job, including uploaded attachments (got {})",
                MAX_FILE_SEARCH_COLLECTIONS, needed
            )));
        }

        let mut collection_ids = Vec::new();
        if request.has_attachments() {
            info!(
                "Ingesting {} attachment(s) for {}",
                request.attachments().len(),
                request.company()
            );
            let name = format!("{} documents", request.company());
            let store = self.ingest(api_key, &name, request.attachments()).await?;
            collection_ids.push(store.id);
        }
        collection_ids.extend(request.collection_ids().iter().cloned());

        let envelope = SubmitEnvelope::build(request, &collection_ids);
        let url = format!("{}/responses", self.base_url);

        info!(
            "Submitting deep research for {} ({} tool(s))",
            request.company(),
            envelope.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&CreateResponse {
                model: &self.model,
                input: &envelope.instructions,
                background: true,
                store: true,
                tools: &envelope.tools,
                max_tool_calls: envelope.max_tool_calls,
                metadata: &envelope.metadata,
            })
            .send()
            .await?;

        let object: ResponseObject = handle_response(response).await?;
        Ok(object.into_report())
    }

    async fn get_status(&self, handle: &JobHandle) -> Result<JobStatusReport> {
        let api_key = self.api_key()?;
        let url = format!("{}/responses/{}", self.base_url, handle);
        let response = self.client.get(&url).bearer_auth(api_key).send().await?;

        let object: ResponseObject = handle_response(response).await?;
        Ok(object.into_report())
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<()> {
        let api_key = self.api_key()?;
        let url = format!("{}/responses/{}/cancel", self.base_url, handle);
        let response = self.client.post(&url).bearer_auth(api_key).send().await?;

        handle_empty_response(response).await
    }

    async fn create_collection(&self, name: &str, files: &[Attachment]) -> Result<CollectionInfo> {
        let api_key = self.api_key()?;
        if files.is_empty() {
            return Err(ClientError::InvalidRequest(
                "a collection needs at least one file".to_string(),
            ));
        }

        Ok(self.ingest(api_key, name, files).await?.into())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let api_key = self.api_key()?;
        let url = format!("{}/vector_stores", self.base_url);
        let response = self.client.get(&url).bearer_auth(api_key).send().await?;

        let list: VectorStoreList = handle_response(response).await?;
        Ok(list.data.into_iter().map(CollectionInfo::from).collect())
    }

    async fn delete_collection(&self, id: &str) -> Result<()> {
        let api_key = self.api_key()?;
        let url = format!("{}/vector_stores/{}", self.base_url, id);

        info!("Deleting vector store {}", id);
        let response = self.client.delete(&url).bearer_auth(api_key).send().await?;

        handle_empty_response(response).await
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct CreateResponse<'a> {
    model: &'a str,
    input: &'a str,
    background: bool,
    store: bool,
    tools: &'a [Tool],
    max_tool_calls: u32,
    metadata: &'a EnvelopeMetadata,
}

#[derive(Deserialize)]
struct ResponseObject {
    id: String,
    status: JobState,
    #[serde(default)]
    output: Vec<OutputItem>,
    error: Option<ResponseError>,
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum OutputItem {
    Message {
        #[serde(default)]
        content: Vec<ContentPart>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Annotation>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Annotation {
    UrlCitation {
        url: String,
        #[serde(default)]
        title: String,
        start_index: usize,
        end_index: usize,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

#[derive(Deserialize)]
struct IncompleteDetails {
    reason: Option<String>,
}

impl ResponseObject {
    /// Flattens message output into one narrative with shifted citation offsets
    fn into_report(self) -> JobStatusReport {
        let mut text = String::new();
        let mut citations = Vec::new();

        for item in self.output {
            let OutputItem::Message { content } = item else {
                continue;
            };
            for part in content {
                let ContentPart::OutputText {
                    text: part_text,
                    annotations,
                } = part
                else {
                    continue;
                };

                let offset = text.chars().count();
                for annotation in annotations {
                    if let Annotation::UrlCitation {
                        url,
                        title,
                        start_index,
                        end_index,
                    } = annotation
                    {
                        citations.push(Citation {
                            url,
                            title,
                            start_index: start_index + offset,
                            end_index: end_index + offset,
                        });
                    }
                }
                text.push_str(&part_text);
            }
        }

        let error = match (self.error, self.incomplete_details) {
            (Some(error), _) => Some(error.message),
            (None, Some(details)) if self.status == JobState::Incomplete => Some(format!(
                "Research incomplete: {}",
                details.reason.as_deref().unwrap_or("unknown reason")
            )),
            _ => None,
        };

        JobStatusReport {
            id: JobHandle::new(self.id),
            state: self.status,
            output: (!text.is_empty()).then_some(text),
            citations,
            error,
        }
    }
}

#[derive(Serialize)]
struct CreateVectorStore<'a> {
    name: &'a str,
    file_ids: Vec<String>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct VectorStore {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: String,
    created_at: i64,
    #[serde(default)]
    file_counts: FileCounts,
}

#[derive(Deserialize, Default)]
struct FileCounts {
    #[serde(default)]
    total: u64,
}

#[derive(Deserialize)]
struct VectorStoreList {
    data: Vec<VectorStore>,
}

impl From<VectorStore> for CollectionInfo {
    fn from(store: VectorStore) -> Self {
        CollectionInfo {
            id: store.id,
            name: store.name.unwrap_or_default(),
            file_count: store.file_counts.total,
            created_at: chrono::DateTime::from_timestamp(store.created_at, 0).unwrap_or_default(),
        }
    }
}
