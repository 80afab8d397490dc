//! Research request domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default budget of backend tool invocations per job
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 100;

/// Analytical perspective a request is run under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lens {
    Skeptical,
    Contrarian,
    Optimistic,
    #[serde(rename = "CFO")]
    Cfo,
    Unified,
}

impl Lens {
    /// The four single-perspective lenses, in report order
    pub const SINGLE: [Lens; 4] = [Lens::Skeptical, Lens::Contrarian, Lens::Optimistic, Lens::Cfo];

    pub fn label(&self) -> &'static str {
        match self {
            Lens::Skeptical => "Skeptical",
            Lens::Contrarian => "Contrarian",
            Lens::Optimistic => "Optimistic",
            Lens::Cfo => "CFO",
            Lens::Unified => "Unified",
        }
    }
}

impl fmt::Display for Lens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Lens {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skeptical" => Ok(Lens::Skeptical),
            "contrarian" => Ok(Lens::Contrarian),
            "optimistic" => Ok(Lens::Optimistic),
            "cfo" => Ok(Lens::Cfo),
            "unified" => Ok(Lens::Unified),
            other => Err(format!("unknown lens '{}'", other)),
        }
    }
}

/// A source document supplied with a request
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

// Raw bytes are noise in logs
impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("size", &self.data.len())
            .finish()
    }
}

/// One analysis request
///
/// Constructed through [`JobRequest::builder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    query: String,
    company: String,
    lens: Lens,
    sector: Option<String>,
    stage: Option<String>,
    location: Option<String>,
    attachments: Vec<Attachment>,
    collection_ids: Vec<String>,
    use_web_search: bool,
    use_code_interpreter: bool,
    max_tool_calls: u32,
}

impl JobRequest {
    /// Starts a request for `company` with the free-text `query`
    pub fn builder(company: impl Into<String>, query: impl Into<String>) -> JobRequestBuilder {
        JobRequestBuilder {
            request: JobRequest {
                query: query.into(),
                company: company.into(),
                lens: Lens::Unified,
                sector: None,
                stage: None,
                location: None,
                attachments: Vec::new(),
                collection_ids: Vec::new(),
                use_web_search: true,
                use_code_interpreter: false,
                max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
            },
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn company(&self) -> &str {
        &self.company
    }

    pub fn lens(&self) -> Lens {
        self.lens
    }

    pub fn sector(&self) -> Option<&str> {
        self.sector.as_deref()
    }

    pub fn stage(&self) -> Option<&str> {
        self.stage.as_deref()
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    pub fn collection_ids(&self) -> &[String] {
        &self.collection_ids
    }

    pub fn use_web_search(&self) -> bool {
        self.use_web_search
    }

    pub fn use_code_interpreter(&self) -> bool {
        self.use_code_interpreter
    }

    pub fn max_tool_calls(&self) -> u32 {
        self.max_tool_calls
    }

    /// Copy of this request run under a different lens
    pub fn with_lens(&self, lens: Lens) -> JobRequest {
        JobRequest {
            lens,
            ..self.clone()
        }
    }

    /// Copy whose attachments were already ingested into `collection_id`
    ///
    /// The collection replaces the attachments and is searched first.
    pub fn with_attachments_ingested(&self, collection_id: impl Into<String>) -> JobRequest {
        let mut collection_ids = vec![collection_id.into()];
        collection_ids.extend(self.collection_ids.iter().cloned());
        JobRequest {
            attachments: Vec::new(),
            collection_ids,
            ..self.clone()
        }
    }
}

/// Builder for [`JobRequest`]
#[derive(Debug, Clone)]
pub struct JobRequestBuilder {
    request: JobRequest,
}

impl JobRequestBuilder {
    pub fn lens(mut self, lens: Lens) -> Self {
        self.request.lens = lens;
        self
    }

    pub fn sector(mut self, sector: impl Into<String>) -> Self {
        self.request.sector = Some(sector.into());
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.request.stage = Some(stage.into());
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.request.location = Some(location.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.request.attachments.push(attachment);
        self
    }

    pub fn attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.request.attachments.extend(attachments);
        self
    }

    pub fn collection(mut self, collection_id: impl Into<String>) -> Self {
        self.request.collection_ids.push(collection_id.into());
        self
    }

    pub fn web_search(mut self, enabled: bool) -> Self {
        self.request.use_web_search = enabled;
        self
    }

    pub fn code_interpreter(mut self, enabled: bool) -> Self {
        self.request.use_code_interpreter = enabled;
        self
    }

    pub fn max_tool_calls(mut self, max: u32) -> Self {
        self.request.max_tool_calls = max;
        self
    }

    pub fn build(self) -> JobRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let request = JobRequest::builder("Acme", "Analyze Acme").build();
        assert_eq!(request.company(), "Acme");
        assert_eq!(request.lens(), Lens::Unified);
        assert!(request.use_web_search());
        assert!(!request.use_code_interpreter());
        assert_eq!(request.max_tool_calls(), DEFAULT_MAX_TOOL_CALLS);
        assert!(!request.has_attachments());
    }

    #[test]
    fn test_lens_parsing() {
        assert_eq!("cfo".parse::<Lens>().unwrap(), Lens::Cfo);
        assert_eq!("Skeptical".parse::<Lens>().unwrap(), Lens::Skeptical);
        assert!("bullish".parse::<Lens>().is_err());
        assert_eq!(serde_json::to_string(&Lens::Cfo).unwrap(), "\"CFO\"");
    }

    #[test]
    fn test_attachment_debug_hides_bytes() {
        let attachment = Attachment::new("deck.pdf", "application/pdf", vec![1, 2, 3]);
        let debug = format!("{:?}", attachment);
        assert!(debug.contains("size: 3"));
        assert!(!debug.contains("[1, 2, 3]"));
    }

    #[test]
    fn test_with_lens_keeps_other_fields() {
        let request = JobRequest::builder("Acme", "q")
            .collection("vs_1")
            .build();
        let cfo = request.with_lens(Lens::Cfo);
        assert_eq!(cfo.lens(), Lens::Cfo);
        assert_eq!(cfo.collection_ids(), request.collection_ids());
    }

    #[test]
    fn test_ingested_attachments_become_first_collection() {
        let request = JobRequest::builder("Acme", "q")
            .collection("vs_1")
            .attachment(Attachment::new("deck.pdf", "application/pdf", vec![1]))
            .build();
        let ingested = request.with_attachments_ingested("vs_docs");
        assert!(!ingested.has_attachments());
        assert_eq!(ingested.collection_ids(), ["vs_docs", "vs_1"]);
        assert_eq!(ingested.query(), request.query());
    }
}
