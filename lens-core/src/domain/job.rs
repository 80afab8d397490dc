//! Job domain types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier assigned by an analysis backend on submission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobHandle {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Job lifecycle state as reported by the analysis backend
///
/// Transitions only move forward: `Queued` -> `InProgress` -> terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Incomplete,
}

impl JobState {
    /// Wire label, identical to the serialized form
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
            JobState::Incomplete => "incomplete",
        }
    }

    /// Whether no further transition can happen from this state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled | JobState::Incomplete
        )
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Queued => 0,
            JobState::InProgress => 1,
            _ => 2,
        }
    }

    /// Whether moving from `self` to `next` respects forward-only ordering
    ///
    /// Repeating a non-terminal state (e.g. two `queued` polls in a row) is
    /// an observation, not a transition, and is allowed.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.rank() >= self.rank()
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source citation attached to a completed narrative
///
/// `start_index` and `end_index` are character offsets into the output text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub start_index: usize,
    pub end_index: usize,
}

/// Final outcome of one job
///
/// Built once from a terminal status and never mutated afterwards; fields are
/// only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    job_id: JobHandle,
    state: JobState,
    output: Option<String>,
    #[serde(default)]
    citations: Vec<Citation>,
    error_message: Option<String>,
}

impl JobResult {
    /// A successfully completed job
    pub fn completed(job_id: JobHandle, output: String, citations: Vec<Citation>) -> Self {
        Self {
            job_id,
            state: JobState::Completed,
            output: Some(output),
            citations,
            error_message: None,
        }
    }

    /// A job that ended in `state` with an error description
    ///
    /// Non-terminal or `Completed` states are recorded as `Failed`.
    pub fn failed(job_id: JobHandle, state: JobState, error_message: impl Into<String>) -> Self {
        let state = match state {
            JobState::Cancelled | JobState::Incomplete => state,
            _ => JobState::Failed,
        };
        Self {
            job_id,
            state,
            output: None,
            citations: Vec::new(),
            error_message: Some(error_message.into()),
        }
    }

    pub fn job_id(&self) -> &JobHandle {
        &self.job_id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Narrative text, empty for failed jobs
    pub fn output(&self) -> &str {
        self.output.as_deref().unwrap_or_default()
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}
