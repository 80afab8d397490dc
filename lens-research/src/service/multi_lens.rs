//! Multi-lens analysis
//!
//! Runs the Skeptical, Contrarian, Optimistic and CFO lenses side by side,
//! one controller per lens, and stitches the successful narratives into a
//! single report. Partial failures are tolerated and listed in the report.

use futures::future::join_all;
use lens_client::AnalysisBackend;
use lens_core::Fingerprint;
use lens_core::domain::job::{Citation, JobHandle, JobResult, JobState};
use lens_core::domain::request::{JobRequest, Lens};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::ResearchController;
use crate::error::{ResearchError, Result};
use crate::scheduler::PollPolicy;
use crate::service::ResultCache;

/// Combined outcome of a multi-lens run
#[derive(Debug, Clone, PartialEq)]
pub struct MultiLensReport {
    pub result: JobResult,
    /// Lenses whose analysis did not complete, in report order
    pub failed_lenses: Vec<Lens>,
}

impl MultiLensReport {
    pub fn is_partial(&self) -> bool {
        !self.failed_lenses.is_empty()
    }
}

/// Runs every single lens for `request` and combines the results
///
/// The combined report lives in its own cache key space, apart from single
/// runs of the same request. It is only cached when every lens completed, so
/// a retry can fill in the missing sections.
///
/// Attachments are ingested once into a temporary collection shared by all
/// lenses. Backends without collections get the attachments inline instead.
/// Cancelling `cancel` cancels every lens job and yields
/// [`ResearchError::Cancelled`].
pub async fn run_multi_lens(
    backend: Arc<dyn AnalysisBackend>,
    cache: Option<ResultCache>,
    policy: &PollPolicy,
    request: &JobRequest,
    cancel: &CancellationToken,
) -> Result<MultiLensReport> {
    let fingerprint = Fingerprint::of_multi_lens(request);

    let cached = match &cache {
        Some(cache) => cache.fetch(&fingerprint).await,
        None => None,
    };
    if let Some(result) = cached {
        info!("Using cached multi-lens analysis for {}", request.company());
        return Ok(MultiLensReport {
            result,
            failed_lenses: Vec::new(),
        });
    }

    let (shared, collection) = ingest_attachments(backend.as_ref(), request).await?;

    info!(
        "Running {} lens analyses for {}",
        Lens::SINGLE.len(),
        request.company()
    );

    // Per-lens entries keyed on a temporary collection could never hit again
    let lens_cache = if collection.is_none() { cache.clone() } else { None };
    let controllers: Vec<ResearchController> = Lens::SINGLE
        .iter()
        .map(|_| {
            let controller = ResearchController::new(backend.clone()).with_policy(policy.clone());
            match &lens_cache {
                Some(cache) => controller.with_cache(cache.clone()),
                None => controller,
            }
        })
        .collect();

    let runs = join_all(controllers.iter().zip(Lens::SINGLE).map(|(controller, lens)| {
        let lens_request = shared.with_lens(lens);
        async move { (lens, controller.start_research(lens_request).await) }
    }));
    tokio::pin!(runs);

    let (outcomes, cancelled) = tokio::select! {
        biased;
        outcomes = &mut runs => (outcomes, false),
        _ = cancel.cancelled() => {
            info!("Cancelling multi-lens analysis for {}", request.company());
            join_all(controllers.iter().map(|c| c.cancel_research())).await;
            (runs.await, true)
        }
    };

    if let Some(id) = collection {
        if let Err(e) = backend.delete_collection(&id).await {
            warn!("Failed to delete temporary collection {}: {}", id, e);
        }
    }

    if cancelled {
        return Err(ResearchError::Cancelled);
    }

    let mut sections = Vec::new();
    let mut failed_lenses = Vec::new();
    for (lens, outcome) in outcomes {
        match outcome {
            Ok(result) => sections.push((lens, result)),
            Err(e) => {
                warn!("{} lens analysis failed: {}", lens, e);
                failed_lenses.push(lens);
            }
        }
    }

    if sections.is_empty() {
        return Err(ResearchError::Terminal {
            state: JobState::Failed,
            message: "All lens analyses failed".to_string(),
        });
    }

    let result = combine(
        JobHandle::new(format!("multi-lens-{}", fingerprint)),
        request.company(),
        &sections,
        &failed_lenses,
    );

    if failed_lenses.is_empty() {
        if let Some(cache) = &cache {
            cache.save(&fingerprint, &result).await;
        }
    } else {
        warn!(
            "Multi-lens analysis for {} is partial; not caching",
            request.company()
        );
    }

    Ok(MultiLensReport {
        result,
        failed_lenses,
    })
}

/// Uploads the attachments of `request` once for every lens
///
/// Returns the request the lenses should run and the temporary collection
/// to delete afterwards, if one was created.
async fn ingest_attachments(
    backend: &dyn AnalysisBackend,
    request: &JobRequest,
) -> Result<(JobRequest, Option<String>)> {
    if !request.has_attachments() {
        return Ok((request.clone(), None));
    }

    let name = format!("{} documents", request.company());
    match backend.create_collection(&name, request.attachments()).await {
        Ok(collection) => {
            info!(
                "Ingested {} attachment(s) into {} for all lenses",
                collection.file_count, collection.id
            );
            let shared = request.with_attachments_ingested(collection.id.clone());
            Ok((shared, Some(collection.id)))
        }
        Err(e) if e.is_unsupported() => {
            debug!("{} has no collections; sending attachments inline", backend.name());
            Ok((request.clone(), None))
        }
        Err(e) => Err(ResearchError::Collection(e)),
    }
}

/// Builds the combined markdown report
///
/// Citation offsets are shifted so they keep pointing into their section.
fn combine(
    id: JobHandle,
    company: &str,
    sections: &[(Lens, JobResult)],
    failed_lenses: &[Lens],
) -> JobResult {
    let mut output = format!("# Investment Analysis for {}\n\n", company);
    let mut citations = Vec::new();

    for (lens, result) in sections {
        output.push_str(&format!("## {} Lens Analysis\n\n", lens));
        let offset = output.chars().count();
        citations.extend(result.citations().iter().map(|c| Citation {
            start_index: c.start_index + offset,
            end_index: c.end_index + offset,
            ..c.clone()
        }));
        output.push_str(result.output());
        output.push_str("\n\n");
    }

    if !failed_lenses.is_empty() {
        let names: Vec<&str> = failed_lenses.iter().map(|l| l.label()).collect();
        output.push_str(&format!(
            "## Note\n\nThe following lens analyses failed to complete: {}. You may want to try again for these lenses.\n",
            names.join(", ")
        ));
    }

    JobResult::completed(id, output, citations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::ScriptedBackend;
    use async_trait::async_trait;
    use lens_client::ClientError;
    use lens_core::domain::request::Attachment;
    use lens_core::dto::job::JobStatusReport;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers each lens synchronously, failing the listed ones
    struct LensBackend {
        failing: Vec<Lens>,
        submits: AtomicUsize,
        attachments_seen: Mutex<Vec<usize>>,
    }

    impl LensBackend {
        fn new(failing: Vec<Lens>) -> Arc<Self> {
            Arc::new(Self {
                failing,
                submits: AtomicUsize::new(0),
                attachments_seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl AnalysisBackend for LensBackend {
        fn name(&self) -> &'static str {
            "lens-test"
        }

        async fn submit(&self, request: &JobRequest) -> lens_client::Result<JobStatusReport> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            self.attachments_seen
                .lock()
                .unwrap()
                .push(request.attachments().len());
            let lens = request.lens();
            if self.failing.contains(&lens) {
                return Err(ClientError::api_error(500, "lens unavailable"));
            }
            Ok(JobStatusReport::completed(
                JobHandle::new(format!("resp_{}", lens)),
                format!("{} view", lens),
                vec![Citation {
                    url: "https://example.com".to_string(),
                    title: "Source".to_string(),
                    start_index: 0,
                    end_index: 4,
                }],
            ))
        }

        async fn get_status(&self, _handle: &JobHandle) -> lens_client::Result<JobStatusReport> {
            Err(ClientError::unsupported("lens-test", "status queries"))
        }

        async fn cancel(&self, _handle: &JobHandle) -> lens_client::Result<()> {
            Ok(())
        }
    }

    fn request() -> JobRequest {
        JobRequest::builder("Acme", "Assess Acme").build()
    }

    #[tokio::test]
    async fn test_all_lenses_are_combined_in_order() {
        let backend = LensBackend::new(vec![]);

        let report = run_multi_lens(
            backend.clone(),
            None,
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
            .unwrap();

        assert!(!report.is_partial());
        let output = report.result.output();
        assert!(output.starts_with("# Investment Analysis for Acme\n\n"));
        let positions: Vec<usize> = ["Skeptical", "Contrarian", "Optimistic", "CFO"]
            .iter()
            .map(|lens| output.find(&format!("## {} Lens Analysis", lens)).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!output.contains("## Note"));
        assert_eq!(backend.submits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_citations_point_into_their_section() {
        let backend = LensBackend::new(vec![]);

        let report = run_multi_lens(
            backend,
            None,
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
            .unwrap();

        let chars: Vec<char> = report.result.output().chars().collect();
        assert_eq!(report.result.citations().len(), 4);
        for citation in report.result.citations() {
            let cited: String = chars[citation.start_index..citation.end_index].iter().collect();
            assert!(["Skep", "Cont", "Opti", "CFO "].contains(&cited.as_str()));
        }
    }

    #[tokio::test]
    async fn test_partial_failure_is_noted_and_not_cached() {
        let backend = LensBackend::new(vec![Lens::Contrarian, Lens::Cfo]);
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));

        let report = run_multi_lens(
            backend,
            Some(cache.clone()),
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.failed_lenses, vec![Lens::Contrarian, Lens::Cfo]);
        let output = report.result.output();
        assert!(output.contains("## Skeptical Lens Analysis"));
        assert!(!output.contains("## Contrarian Lens Analysis"));
        assert!(output.contains("failed to complete: Contrarian, CFO."));

        assert!(cache.lookup(&Fingerprint::of_multi_lens(&request())).is_none());
    }

    #[tokio::test]
    async fn test_all_failed_is_an_error() {
        let backend = LensBackend::new(Lens::SINGLE.to_vec());

        let err = run_multi_lens(
            backend,
            None,
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Research failed: All lens analyses failed");
    }

    #[tokio::test]
    async fn test_complete_report_is_cached() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        let first = LensBackend::new(vec![]);
        let report = run_multi_lens(
            first,
            Some(cache.clone()),
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let second = LensBackend::new(vec![]);
        let cached = run_multi_lens(
            second.clone(),
            Some(cache),
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(cached.result, report.result);
        assert_eq!(second.submits.load(Ordering::SeqCst), 0);
    }
    #[tokio::test]
    async fn test_single_run_result_is_not_a_multi_lens_hit() {
        let cache = ResultCache::new(Arc::new(MemoryStore::new()));
        let single = JobResult::completed(JobHandle::new("resp_u"), "unified view".into(), vec![]);
        cache.store(&Fingerprint::of(&request()), &single);

        let backend = LensBackend::new(vec![]);
        let report = run_multi_lens(
            backend.clone(),
            Some(cache),
            &PollPolicy::default(),
            &request(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(backend.submits.load(Ordering::SeqCst), 4);
        assert!(report.result.output().contains("## Skeptical Lens Analysis"));
        assert!(!report.result.output().contains("unified view"));
    }

    #[tokio::test]
    async fn test_attachments_inline_without_collections() {
        let backend = LensBackend::new(vec![]);
        let request = JobRequest::builder("Acme", "Assess Acme")
            .attachment(Attachment::new("deck.pdf", "application/pdf", vec![1, 2]))
            .build();

        run_multi_lens(
            backend.clone(),
            None,
            &PollPolicy::default(),
            &request,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*backend.attachments_seen.lock().unwrap(), vec![1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_cancel_reaches_every_lens_job() {
        let backend = Arc::new(ScriptedBackend::new().repeat(JobState::InProgress));
        let cancel = CancellationToken::new();
        let policy = PollPolicy {
            poll_interval: Duration::from_millis(20),
            ..PollPolicy::default()
        };
        let request = JobRequest::builder("Acme", "Assess Acme")
            .attachment(Attachment::new("deck.pdf", "application/pdf", vec![1, 2]))
            .build();

        let trigger = async {
            while backend.status_calls() < Lens::SINGLE.len() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            cancel.cancel();
        };
        let (outcome, ()) = tokio::join!(
            run_multi_lens(backend.clone(), None, &policy, &request, &cancel),
            trigger
        );

        assert!(matches!(outcome, Err(ResearchError::Cancelled)));
        assert_eq!(backend.cancel_calls(), 4);

        // Attachments were uploaded once and shared by every lens
        assert_eq!(backend.created_collections(), 1);
        assert_eq!(backend.deleted_collections(), vec!["vs_test".to_string()]);
        let submitted = backend.submitted();
        assert_eq!(submitted.len(), 4);
        assert!(submitted.iter().all(|r| !r.has_attachments()));
        assert!(submitted.iter().all(|r| r.collection_ids() == ["vs_test"]));
    }
}
