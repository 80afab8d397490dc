//! Scripted backend for controller and poller tests

use async_trait::async_trait;
use lens_client::{AnalysisBackend, ClientError, Result};
use lens_core::domain::collection::CollectionInfo;
use lens_core::domain::job::{JobHandle, JobState};
use lens_core::domain::request::{Attachment, JobRequest};
use lens_core::dto::job::JobStatusReport;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const HANDLE: &str = "resp_test";

enum Step {
    Report(JobStatusReport),
    Error(ClientError),
}

#[derive(Clone, Copy)]
enum Repeat {
    State(JobState),
    ErrorStatus(u16),
}

enum Submit {
    Queued,
    Completed(String),
    Error(ClientError),
    MissingCredential,
}

/// Backend answering status queries from a fixed script
///
/// Once the script runs out, the `repeat` step (if any) answers forever;
/// otherwise queries fail with a 404.
pub(crate) struct ScriptedBackend {
    submit: Mutex<Option<Submit>>,
    script: Mutex<VecDeque<Step>>,
    repeat: Option<Repeat>,
    accept_cancel: bool,
    submit_delay: Option<Duration>,
    created_collections: AtomicUsize,
    deleted_collections: Mutex<Vec<String>>,
    submitted: Mutex<Vec<JobRequest>>,
    submit_calls: AtomicUsize,
    status_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    network_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self {
            submit: Mutex::new(Some(Submit::Queued)),
            script: Mutex::new(VecDeque::new()),
            repeat: None,
            accept_cancel: true,
            submit_delay: None,
            created_collections: AtomicUsize::new(0),
            deleted_collections: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            network_calls: AtomicUsize::new(0),
        }
    }

    fn push(self, step: Step) -> Self {
        self.script.lock().unwrap().push_back(step);
        self
    }

    fn report(state: JobState) -> JobStatusReport {
        JobStatusReport {
            id: JobHandle::new(HANDLE),
            state,
            output: None,
            citations: Vec::new(),
            error: None,
        }
    }

    pub(crate) fn status(self, state: JobState) -> Self {
        self.push(Step::Report(Self::report(state)))
    }

    pub(crate) fn completed(self, output: &str) -> Self {
        self.push(Step::Report(JobStatusReport::completed(
            JobHandle::new(HANDLE),
            output.to_string(),
            Vec::new(),
        )))
    }

    pub(crate) fn failed(self, state: JobState, error: &str) -> Self {
        self.push(Step::Report(JobStatusReport {
            error: Some(error.to_string()),
            ..Self::report(state)
        }))
    }

    pub(crate) fn error(self, error: ClientError) -> Self {
        self.push(Step::Error(error))
    }

    pub(crate) fn repeat(mut self, state: JobState) -> Self {
        self.repeat = Some(Repeat::State(state));
        self
    }

    pub(crate) fn repeat_error(mut self, status: u16) -> Self {
        self.repeat = Some(Repeat::ErrorStatus(status));
        self
    }

    /// `submit` answers synchronously with a completed report
    pub(crate) fn submit_completed(self, output: &str) -> Self {
        *self.submit.lock().unwrap() = Some(Submit::Completed(output.to_string()));
        self
    }

    pub(crate) fn submit_error(self, error: ClientError) -> Self {
        *self.submit.lock().unwrap() = Some(Submit::Error(error));
        self
    }

    /// `submit` fails its credential check before any I/O
    pub(crate) fn without_credential(self) -> Self {
        *self.submit.lock().unwrap() = Some(Submit::MissingCredential);
        self
    }

    pub(crate) fn reject_cancel(mut self) -> Self {
        self.accept_cancel = false;
        self
    }

    /// Every `submit` takes `delay` before the backend answers
    pub(crate) fn submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    pub(crate) fn created_collections(&self) -> usize {
        self.created_collections.load(Ordering::SeqCst)
    }

    pub(crate) fn deleted_collections(&self) -> Vec<String> {
        self.deleted_collections.lock().unwrap().clone()
    }

    /// Requests seen by `submit`, in call order
    pub(crate) fn submitted(&self) -> Vec<JobRequest> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    /// Calls that would have reached the network
    pub(crate) fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobStatusReport> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted.lock().unwrap().push(request.clone());

        // A submit behaviour applies once; later submissions queue normally
        let behaviour = self.submit.lock().unwrap().take().unwrap_or(Submit::Queued);
        if let Submit::MissingCredential = behaviour {
            return Err(ClientError::MissingCredential("TEST_API_KEY".to_string()));
        }

        self.network_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        match behaviour {
            Submit::Queued => Ok(Self::report(JobState::Queued)),
            Submit::Completed(output) => Ok(JobStatusReport::completed(
                JobHandle::new(HANDLE),
                output,
                Vec::new(),
            )),
            Submit::Error(e) => Err(e),
            Submit::MissingCredential => unreachable!(),
        }
    }

    async fn get_status(&self, _handle: &JobHandle) -> Result<JobStatusReport> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.network_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(step) = self.script.lock().unwrap().pop_front() {
            return match step {
                Step::Report(report) => Ok(report),
                Step::Error(e) => Err(e),
            };
        }

        match self.repeat {
            Some(Repeat::State(state)) => Ok(Self::report(state)),
            Some(Repeat::ErrorStatus(status)) => Err(ClientError::api_error(status, "scripted")),
            None => Err(ClientError::api_error(404, "script exhausted")),
        }
    }

    async fn cancel(&self, _handle: &JobHandle) -> Result<()> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.network_calls.fetch_add(1, Ordering::SeqCst);

        if self.accept_cancel {
            Ok(())
        } else {
            Err(ClientError::api_error(400, "response already completed"))
        }
    }

    async fn create_collection(&self, name: &str, files: &[Attachment]) -> Result<CollectionInfo> {
        self.created_collections.fetch_add(1, Ordering::SeqCst);
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(CollectionInfo {
            id: "vs_test".to_string(),
            name: name.to_string(),
            file_count: files.len() as u64,
            created_at: chrono::Utc::now(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }

    async fn delete_collection(&self, id: &str) -> Result<()> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        self.deleted_collections.lock().unwrap().push(id.to_string());
        Ok(())
    }
}
