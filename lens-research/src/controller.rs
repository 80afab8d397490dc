//! Research controller
//!
//! One controller owns at most one in-flight job. It consults the result
//! cache, submits through the configured backend, drives the poll loop and
//! publishes a [`ResearchState`] snapshot after every step so a UI can follow
//! along through [`ResearchController::subscribe`].
//!
//! A second `start_research` while a job is in flight is rejected with
//! [`ResearchError::Busy`]; the previous job is never orphaned.

use lens_client::AnalysisBackend;
use lens_core::Fingerprint;
use lens_core::domain::collection::CollectionInfo;
use lens_core::domain::job::{JobHandle, JobResult, JobState};
use lens_core::domain::request::{Attachment, JobRequest};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ResearchError, Result};
use crate::scheduler::{PollPolicy, poll_until_terminal};
use crate::service::ResultCache;

pub const PROGRESS_STARTING: &str = "Starting research...";
pub const PROGRESS_QUEUED: &str = "Research queued, waiting for available resources...";
pub const PROGRESS_IN_PROGRESS: &str = "Research in progress, analyzing data...";
pub const PROGRESS_COMPLETED: &str = "Research completed!";
pub const PROGRESS_CANCELLED: &str = "Research cancelled";

/// Human readable progress line for a reported state
pub fn progress_label(state: JobState) -> String {
    match state {
        JobState::Queued => PROGRESS_QUEUED.to_string(),
        JobState::InProgress => PROGRESS_IN_PROGRESS.to_string(),
        JobState::Completed => PROGRESS_COMPLETED.to_string(),
        JobState::Cancelled => PROGRESS_CANCELLED.to_string(),
        other => format!("Status: {}", other),
    }
}

/// Snapshot of the controller as seen by a UI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchState {
    pub is_loading: bool,
    pub progress: String,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

struct CurrentJob {
    id: u64,
    handle: Option<JobHandle>,
    cancel: CancellationToken,
}

/// Submits, polls, cancels and caches research jobs for one backend
pub struct ResearchController {
    backend: Arc<dyn AnalysisBackend>,
    cache: Option<ResultCache>,
    policy: PollPolicy,
    state: watch::Sender<ResearchState>,
    current: Mutex<Option<CurrentJob>>,
    next_id: AtomicU64,
}

impl ResearchController {
    pub fn new(backend: Arc<dyn AnalysisBackend>) -> Self {
        let (state, _) = watch::channel(ResearchState::default());
        Self {
            backend,
            cache: None,
            policy: PollPolicy::default(),
            state,
            current: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn backend(&self) -> &Arc<dyn AnalysisBackend> {
        &self.backend
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Receiver that sees every published state
    pub fn subscribe(&self) -> watch::Receiver<ResearchState> {
        self.state.subscribe()
    }

    /// Latest published state
    pub fn state(&self) -> ResearchState {
        self.state.borrow().clone()
    }

    /// Whether a job is currently in flight
    pub async fn is_busy(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Handle of the in-flight job, once the backend has assigned one
    pub async fn current_handle(&self) -> Option<JobHandle> {
        self.current
            .lock()
            .await
            .as_ref()
            .and_then(|job| job.handle.clone())
    }

    /// Runs one research job to completion
    ///
    /// Cached results are returned without any backend call. Only completed
    /// results are written back to the cache.
    pub async fn start_research(&self, request: JobRequest) -> Result<JobResult> {
        let (job_id, cancel) = self.begin().await?;

        self.state.send_replace(ResearchState {
            is_loading: true,
            progress: PROGRESS_STARTING.to_string(),
            result: None,
            error: None,
        });

        let outcome = self.run(job_id, &request, &cancel).await;
        self.finish(job_id, &outcome).await;
        outcome
    }

    async fn begin(&self) -> Result<(u64, CancellationToken)> {
        let mut current = self.current.lock().await;
        if current.is_some() {
            warn!("Rejected research request: a job is already in flight");
            return Err(ResearchError::Busy);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *current = Some(CurrentJob {
            id,
            handle: None,
            cancel: cancel.clone(),
        });
        Ok((id, cancel))
    }

    async fn run(
        &self,
        job_id: u64,
        request: &JobRequest,
        cancel: &CancellationToken,
    ) -> Result<JobResult> {
        let fingerprint = Fingerprint::of(request);

        let cached = match &self.cache {
            Some(cache) => cache.fetch(&fingerprint).await,
            None => None,
        };
        if let Some(cached) = cached {
            info!(
                "Using cached research for {} ({} lens)",
                request.company(),
                request.lens()
            );
            return Ok(cached);
        }

        info!(
            "Submitting research for {} ({} lens) to {}",
            request.company(),
            request.lens(),
            self.backend.name()
        );
        let report = self
            .backend
            .submit(request)
            .await
            .map_err(ResearchError::from_submit)?;
        let handle = report.id.clone();
        info!("Research job {} accepted ({})", handle, report.state);

        {
            let mut current = self.current.lock().await;
            if let Some(job) = current.as_mut().filter(|job| job.id == job_id) {
                job.handle = Some(handle.clone());
            }
        }

        // Cancelled before the backend assigned a handle
        if cancel.is_cancelled() {
            if !report.state.is_terminal() {
                if let Err(e) = self.backend.cancel(&handle).await {
                    warn!("Failed to cancel job {} after submission: {}", handle, e);
                }
            }
            return Err(ResearchError::Cancelled);
        }

        let result = if report.state.is_terminal() {
            let state = report.state;
            let error = report.error.clone();
            report.into_result().ok_or_else(|| ResearchError::Terminal {
                state,
                message: error.unwrap_or_else(|| "no details reported".to_string()),
            })?
        } else {
            self.publish_progress(report.state, cancel);
            poll_until_terminal(
                self.backend.as_ref(),
                &handle,
                &self.policy,
                cancel,
                |state| self.publish_progress(state, cancel),
            )
            .await?
        };

        if cancel.is_cancelled() {
            return Err(ResearchError::Cancelled);
        }

        if !result.is_success() {
            return Err(ResearchError::Terminal {
                state: result.state(),
                message: result
                    .error_message()
                    .unwrap_or("no details reported")
                    .to_string(),
            });
        }

        if let Some(cache) = &self.cache {
            cache.save(&fingerprint, &result).await;
        }
        Ok(result)
    }

    fn publish_progress(&self, state: JobState, cancel: &CancellationToken) {
        // A late poll must not overwrite the cancelled state
        if cancel.is_cancelled() {
            return;
        }
        self.state.send_modify(|s| s.progress = progress_label(state));
    }

    async fn finish(&self, job_id: u64, outcome: &Result<JobResult>) {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|job| job.id != job_id) {
            // A newer job owns the state
            return;
        }
        *current = None;

        let next = match outcome {
            Ok(result) => ResearchState {
                is_loading: false,
                progress: PROGRESS_COMPLETED.to_string(),
                result: Some(result.clone()),
                error: None,
            },
            Err(ResearchError::Cancelled) => ResearchState {
                is_loading: false,
                progress: PROGRESS_CANCELLED.to_string(),
                result: None,
                error: None,
            },
            Err(e) => {
                error!("Research failed: {}", e);
                let progress = match e {
                    ResearchError::Terminal { state, .. } => progress_label(*state),
                    _ => self.state.borrow().progress.clone(),
                };
                ResearchState {
                    is_loading: false,
                    progress,
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        };
        self.state.send_replace(next);
    }

    /// Asks the backend to cancel the in-flight job
    ///
    /// Returns `true` when the job was cancelled (or will be, as soon as its
    /// submission answers). A rejected cancel is logged and the job keeps
    /// polling until it reaches its own terminal state.
    pub async fn cancel_research(&self) -> bool {
        let (job_id, handle, cancel) = {
            let current = self.current.lock().await;
            match current.as_ref() {
                Some(job) => (job.id, job.handle.clone(), job.cancel.clone()),
                None => return false,
            }
        };

        let Some(handle) = handle else {
            info!("Cancelling research before the backend assigned a handle");
            cancel.cancel();
            return true;
        };

        match self.backend.cancel(&handle).await {
            Ok(()) => {
                info!("Cancelled research job {}", handle);
                cancel.cancel();

                let mut current = self.current.lock().await;
                if current.as_ref().is_some_and(|job| job.id == job_id) {
                    *current = None;
                    self.state.send_replace(ResearchState {
                        is_loading: false,
                        progress: PROGRESS_CANCELLED.to_string(),
                        result: None,
                        error: None,
                    });
                }
                true
            }
            Err(e) => {
                warn!("Backend refused to cancel job {}: {}", handle, e);
                false
            }
        }
    }

    /// Uploads `files` as a new named collection, returning its id
    pub async fn upload_files(&self, name: &str, files: &[Attachment]) -> Result<String> {
        info!("Uploading {} file(s) to collection '{}'", files.len(), name);
        let collection = self
            .backend
            .create_collection(name, files)
            .await
            .map_err(ResearchError::Collection)?;
        info!(
            "Created collection {} with {} file(s)",
            collection.id, collection.file_count
        );
        Ok(collection.id)
    }

    pub async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        self.backend
            .list_collections()
            .await
            .map_err(ResearchError::Collection)
    }

    pub async fn delete_collection(&self, id: &str) -> Result<()> {
        self.backend
            .delete_collection(id)
            .await
            .map_err(ResearchError::Collection)?;
        info!("Deleted collection {}", id);
        Ok(())
    }
}
