//! Job DTOs exchanged with analysis backends

use serde::{Deserialize, Serialize};

use crate::domain::job::{Citation, JobHandle, JobResult, JobState};
use crate::domain::request::JobRequest;

/// Maximum number of document collections a `file_search` tool accepts
pub const MAX_FILE_SEARCH_COLLECTIONS: usize = 2;

/// Capability enabled for one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    WebSearchPreview,
    FileSearch { vector_store_ids: Vec<String> },
    CodeInterpreter { container: ToolContainer },
}

/// Execution container for the code interpreter tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolContainer {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ToolContainer {
    pub fn auto() -> Self {
        Self {
            kind: "auto".to_string(),
        }
    }
}

/// Opaque metadata stored alongside a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub company: String,
    pub lens: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Backend-agnostic submission envelope
///
/// Built from a [`JobRequest`] once any attachment ingestion has produced the
/// final list of collection ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitEnvelope {
    pub instructions: String,
    pub tools: Vec<Tool>,
    pub max_tool_calls: u32,
    pub metadata: EnvelopeMetadata,
}

impl SubmitEnvelope {
    /// Builds the envelope for `request`
    ///
    /// `collection_ids` replaces the request's own list so callers can put
    /// freshly ingested collections first. Only the first
    /// [`MAX_FILE_SEARCH_COLLECTIONS`] ids are used.
    pub fn build(request: &JobRequest, collection_ids: &[String]) -> Self {
        let mut tools = Vec::new();

        if request.use_web_search() {
            tools.push(Tool::WebSearchPreview);
        }

        if !collection_ids.is_empty() {
            tools.push(Tool::FileSearch {
                vector_store_ids: collection_ids
                    .iter()
                    .take(MAX_FILE_SEARCH_COLLECTIONS)
                    .cloned()
                    .collect(),
            });
        }

        if request.use_code_interpreter() {
            tools.push(Tool::CodeInterpreter {
                container: ToolContainer::auto(),
            });
        }

        // Deep research rejects an empty tool list
        if tools.is_empty() {
            tools.push(Tool::WebSearchPreview);
        }

        Self {
            instructions: build_instructions(request),
            tools,
            max_tool_calls: request.max_tool_calls(),
            metadata: EnvelopeMetadata {
                company: request.company().to_string(),
                lens: request.lens().label().to_string(),
                timestamp: chrono::Utc::now(),
            },
        }
    }
}

fn build_instructions(request: &JobRequest) -> String {
    let mut instructions = request.query().to_string();

    if request.has_attachments() {
        let manifest = request
            .attachments()
            .iter()
            .map(|a| {
                let media_type = if a.media_type.is_empty() {
                    "unknown type"
                } else {
                    a.media_type.as_str()
                };
                format!(
                    "- {} ({:.1} KB, {})",
                    a.name,
                    a.size() as f64 / 1024.0,
                    media_type
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        instructions.push_str("\n\n## UPLOADED COMPANY DOCUMENTS\n");
        instructions.push_str("The following documents have been provided for analysis:\n");
        instructions.push_str(&manifest);
        instructions
            .push_str("\n\nPlease incorporate insights from these documents into your analysis.");
    }

    instructions
}

/// Snapshot of a job returned by submission and status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub id: JobHandle,
    pub state: JobState,
    pub output: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    pub error: Option<String>,
}

impl JobStatusReport {
    /// Report for a job the backend finished synchronously
    pub fn completed(id: JobHandle, output: String, citations: Vec<Citation>) -> Self {
        Self {
            id,
            state: JobState::Completed,
            output: Some(output),
            citations,
            error: None,
        }
    }

    /// Converts a terminal report into its result
    ///
    /// Returns `None` while the job is still queued or running.
    pub fn into_result(self) -> Option<JobResult> {
        match self.state {
            JobState::Queued | JobState::InProgress => None,
            JobState::Completed => Some(JobResult::completed(
                self.id,
                self.output.unwrap_or_default(),
                self.citations,
            )),
            state => {
                let message = self
                    .error
                    .unwrap_or_else(|| format!("Research {}", state.label()));
                Some(JobResult::failed(self.id, state, message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::request::Attachment;

    #[test]
    fn test_tools_follow_request_flags() {
        let request = JobRequest::builder("Acme", "Analyze")
            .web_search(true)
            .code_interpreter(true)
            .build();
        let envelope = SubmitEnvelope::build(&request, &[]);
        assert_eq!(
            envelope.tools,
            vec![
                Tool::WebSearchPreview,
                Tool::CodeInterpreter {
                    container: ToolContainer::auto()
                }
            ]
        );
    }

    #[test]
    fn test_empty_tool_list_falls_back_to_web_search() {
        let request = JobRequest::builder("Acme", "Analyze")
            .web_search(false)
            .build();
        let envelope = SubmitEnvelope::build(&request, &[]);
        assert_eq!(envelope.tools, vec![Tool::WebSearchPreview]);
    }

    #[test]
    fn test_file_search_is_capped() {
        let request = JobRequest::builder("Acme", "Analyze")
            .web_search(false)
            .build();
        let ids = vec!["vs_a".to_string(), "vs_b".to_string(), "vs_c".to_string()];
        let envelope = SubmitEnvelope::build(&request, &ids);
        assert_eq!(
            envelope.tools,
            vec![Tool::FileSearch {
                vector_store_ids: vec!["vs_a".to_string(), "vs_b".to_string()]
            }]
        );
    }

    #[test]
    fn test_tool_wire_format() {
        let json = serde_json::to_value(Tool::CodeInterpreter {
            container: ToolContainer::auto(),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "code_interpreter", "container": {"type": "auto"}})
        );
    }

    #[test]
    fn test_instructions_list_attachments() {
        let request = JobRequest::builder("Acme", "Analyze")
            .attachment(Attachment::new("deck.pdf", "application/pdf", vec![0; 2048]))
            .build();
        let envelope = SubmitEnvelope::build(&request, &[]);
        assert!(envelope.instructions.starts_with("Analyze"));
        assert!(envelope.instructions.contains("- deck.pdf (2.0 KB, application/pdf)"));
    }

    #[test]
    fn test_into_result() {
        let running = JobStatusReport {
            id: JobHandle::new("resp_1"),
            state: JobState::InProgress,
            output: None,
            citations: Vec::new(),
            error: None,
        };
        assert!(running.clone().into_result().is_none());

        let failed = JobStatusReport {
            state: JobState::Failed,
            ..running
        };
        let result = failed.into_result().unwrap();
        assert_eq!(result.error_message(), Some("Research failed"));
    }
}
