//! Job poller
//!
//! Drives one submitted job to a terminal state. The loop is a strict
//! sequence of "wait, then query" steps: a status query is only issued after
//! the previous one has answered, and the wait is interrupted as soon as the
//! job is cancelled.

use lens_client::AnalysisBackend;
use lens_core::domain::job::{JobHandle, JobResult, JobState};
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ResearchError, Result};

/// Timing limits for one poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between successful status queries
    pub poll_interval: Duration,

    /// Wall-clock budget for the whole loop, independent of retries
    pub max_wait: Duration,

    /// Consecutive retryable failures tolerated before giving up
    pub max_transient_retries: u32,

    /// First delay after a retryable failure, doubled on each repeat
    pub initial_backoff: Duration,

    /// Upper bound for the retry delay
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(20 * 60),
            max_transient_retries: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    /// Delay before the retry following `failures` consecutive failures
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }
}

/// Polls `handle` until it reaches a terminal state
///
/// `on_progress` is called with the reported state after every successful
/// query. `Completed` yields the result; `failed`, `cancelled` and
/// `incomplete` are returned at once without retrying. Retryable query
/// errors back off exponentially up to `max_transient_retries`; other query
/// errors end the loop immediately.
pub async fn poll_until_terminal<F>(
    backend: &dyn AnalysisBackend,
    handle: &JobHandle,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<JobResult>
where
    F: FnMut(JobState) + Send,
{
    info!(
        "Polling job {} (interval: {:?}, budget: {:?})",
        handle, policy.poll_interval, policy.max_wait
    );

    let deadline = Instant::now() + policy.max_wait;
    let mut delay = policy.poll_interval;
    let mut failures = 0u32;
    let mut last_state: Option<JobState> = None;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Job {} did not finish within {:?}", handle, policy.max_wait);
            return Err(ResearchError::Timeout(policy.max_wait));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Stopped polling cancelled job {}", handle);
                return Err(ResearchError::Cancelled);
            }
            _ = time::sleep(delay.min(remaining)) => {}
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            warn!("Job {} did not finish within {:?}", handle, policy.max_wait);
            return Err(ResearchError::Timeout(policy.max_wait));
        }

        let status = match time::timeout(remaining, backend.get_status(handle)).await {
            Ok(status) => status,
            Err(_) => {
                warn!("Status query for job {} outlived the wait budget", handle);
                return Err(ResearchError::Timeout(policy.max_wait));
            }
        };

        let report = match status {
            Ok(report) => report,
            Err(e) if e.is_transient() => {
                failures += 1;
                if failures > policy.max_transient_retries {
                    return Err(ResearchError::Transient {
                        attempts: failures,
                        source: e,
                    });
                }
                delay = policy.backoff(failures);
                warn!(
                    "Status query for job {} failed (attempt {}/{}): {}; retrying in {:?}",
                    handle,
                    failures,
                    policy.max_transient_retries + 1,
                    e,
                    delay
                );
                continue;
            }
            Err(e) => return Err(ResearchError::Backend(e)),
        };

        failures = 0;
        delay = policy.poll_interval;

        if let Some(previous) = last_state {
            if !previous.can_transition_to(report.state) {
                warn!("Job {} reported {} after {}", handle, report.state, previous);
            }
        }
        last_state = Some(report.state);

        debug!("Job {} is {}", handle, report.state);
        on_progress(report.state);

        match report.state {
            JobState::Queued | JobState::InProgress => continue,
            JobState::Completed => {
                info!("Job {} completed", handle);
                return report.into_result().ok_or(ResearchError::Terminal {
                    state: JobState::Completed,
                    message: "completed without a result".to_string(),
                });
            }
            state => {
                let message = report
                    .error
                    .unwrap_or_else(|| "no details reported".to_string());
                warn!("Job {} ended {}: {}", handle, state, message);
                return Err(ResearchError::Terminal { state, message });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedBackend;
    use lens_client::ClientError;

    fn fast_policy() -> PollPolicy {
        PollPolicy {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_secs(5),
            max_transient_retries: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_progress_reported_for_every_poll() {
        let backend = ScriptedBackend::new()
            .status(JobState::Queued)
            .status(JobState::Queued)
            .completed("Acme is a Yes");
        let mut labels = Vec::new();

        let result = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &CancellationToken::new(),
            |state| labels.push(state.label()),
        )
        .await
        .unwrap();

        assert_eq!(labels, vec!["queued", "queued", "completed"]);
        assert_eq!(result.output(), "Acme is a Yes");
        assert_eq!(backend.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_never_finishing_job_times_out() {
        let backend = ScriptedBackend::new().repeat(JobState::InProgress);
        let policy = PollPolicy {
            max_wait: Duration::from_millis(60),
            ..fast_policy()
        };

        let err = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &policy,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(backend.status_calls() >= 1);
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let backend = ScriptedBackend::new()
            .status(JobState::InProgress)
            .failed(JobState::Failed, "quota exceeded")
            .completed("never reached");

        let err = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ResearchError::Terminal { state: JobState::Failed, ref message } if message == "quota exceeded"
        ));
        assert_eq!(backend.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let backend = ScriptedBackend::new()
            .error(ClientError::api_error(503, "unavailable"))
            .error(ClientError::api_error(502, "bad gateway"))
            .completed("recovered");
        let mut labels = Vec::new();

        let result = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &CancellationToken::new(),
            |state| labels.push(state),
        )
        .await
        .unwrap();

        assert_eq!(result.output(), "recovered");
        assert_eq!(labels, vec![JobState::Completed]);
        assert_eq!(backend.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_retries_are_bounded() {
        let backend = ScriptedBackend::new().repeat_error(503);

        let err = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResearchError::Transient { attempts: 4, .. }));
        assert_eq!(backend.status_calls(), 4);
    }

    #[tokio::test]
    async fn test_non_transient_error_fails_immediately() {
        let backend = ScriptedBackend::new()
            .error(ClientError::api_error(404, "no such response"))
            .completed("never reached");

        let err = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResearchError::Backend(ref e) if e.is_not_found()));
        assert_eq!(backend.status_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_next_query() {
        let backend = ScriptedBackend::new().repeat(JobState::InProgress);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poll_until_terminal(
            &backend,
            &JobHandle::new("resp_1"),
            &fast_policy(),
            &cancel,
            |_| {},
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ResearchError::Cancelled));
        assert_eq!(backend.status_calls(), 0);
    }
}
