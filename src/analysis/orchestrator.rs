//! Background execution of analysis runs under the job state machine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, Semaphore, watch};
use tracing::Instrument;
use uuid::Uuid;

use super::AnalysisPipeline;
use super::types::{FinalAnalysis, PipelineError};
use crate::documents::Document;
use crate::jobs::{AnalysisJob, InsertOutcome, JobStatus, JobStore, StoreError};
use crate::metrics::AnalysisMetrics;

/// What a start request did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run was spawned for the returned in-progress job.
    Started(AnalysisJob),
    /// A run was already executing; nothing new was spawned.
    AlreadyRunning(AnalysisJob),
    /// The job is completed or failed and re-analysis was not forced.
    AlreadyFinished(AnalysisJob),
}

impl StartOutcome {
    /// Job record observed by the request.
    pub fn job(&self) -> &AnalysisJob {
        match self {
            Self::Started(job) | Self::AlreadyRunning(job) | Self::AlreadyFinished(job) => job,
        }
    }

    /// Consume the outcome, keeping the job record.
    pub fn into_job(self) -> AnalysisJob {
        match self {
            Self::Started(job) | Self::AlreadyRunning(job) | Self::AlreadyFinished(job) => job,
        }
    }

    /// Whether this request spawned a run.
    pub fn started(&self) -> bool {
        matches!(self, Self::Started(_))
    }

    /// Stable name used in responses and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Started(_) => "started",
            Self::AlreadyRunning(_) => "already_running",
            Self::AlreadyFinished(_) => "already_finished",
        }
    }

    fn existing(job: AnalysisJob) -> Self {
        if job.status.is_terminal() {
            Self::AlreadyFinished(job)
        } else {
            Self::AlreadyRunning(job)
        }
    }
}

/// Starts analysis runs at most once per document and supervises them.
///
/// Each run is a tokio task that waits for a permit from a bounded pool, runs the pipeline, and
/// records the outcome in the job store. [`Orchestrator::shutdown`] cancels in-flight runs, which
/// are recorded as failed.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    pipeline: Arc<AnalysisPipeline>,
    metrics: Arc<AnalysisMetrics>,
    permits: Arc<Semaphore>,
    shutdown_tx: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
}

impl Orchestrator {
    /// Build an orchestrator running at most `max_concurrent_jobs` pipelines at once.
    pub fn new(
        store: Arc<dyn JobStore>,
        pipeline: Arc<AnalysisPipeline>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let metrics = pipeline.metrics();
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            pipeline,
            metrics,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
            shutdown_tx,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Counters shared with the pipeline.
    pub fn metrics(&self) -> Arc<AnalysisMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Start analysis of `document` unless a run is active or the job already finished.
    ///
    /// A finished job is re-analyzed only when `force` is set. Returns as soon as the job record
    /// is written; the run itself continues in the background. Every write that moves a job to
    /// `in_progress` spawns its run before anything else can fail.
    pub async fn start(
        &self,
        document: &Document,
        force: bool,
    ) -> Result<StartOutcome, StoreError> {
        let digest = document.content_digest();
        let existing = match self.store.insert(&document.id, &digest).await? {
            InsertOutcome::Created(job) => return Ok(self.launch(document, job)),
            InsertOutcome::Duplicate(existing) => existing,
        };

        if !existing.status.is_terminal() {
            self.metrics.record_duplicate_start();
            tracing::debug!(document_id = %document.id, "Analysis already running");
            return Ok(StartOutcome::AlreadyRunning(existing));
        }
        if !force {
            return Ok(StartOutcome::AlreadyFinished(existing));
        }
        if let Some(job) = self.store.restart(&document.id, &digest).await? {
            tracing::info!(
                document_id = %document.id,
                previous = %existing.status,
                "Restarting analysis"
            );
            return Ok(self.launch(document, job));
        }

        // Another forced start won the restart.
        let current = self.current(&document.id).await?;
        if current.status == JobStatus::InProgress {
            self.metrics.record_duplicate_start();
        }
        Ok(StartOutcome::existing(current))
    }

    /// Wait until no run is executing.
    pub async fn wait_idle(&self) {
        self.in_flight.wait_idle().await;
    }

    /// Cancel in-flight runs and wait for them to be recorded as failed.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.in_flight.wait_idle().await;
    }

    async fn current(&self, document_id: &str) -> Result<AnalysisJob, StoreError> {
        self.store
            .get(document_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt {
                document_id: document_id.to_string(),
                detail: "job missing after restart".into(),
            })
    }

    fn launch(&self, document: &Document, job: AnalysisJob) -> StartOutcome {
        self.spawn_run(document.clone());
        StartOutcome::Started(job)
    }

    fn spawn_run(&self, document: Document) {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("analysis", document_id = %document.id, %run_id);
        let guard = self.in_flight.enter();
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let metrics = Arc::clone(&self.metrics);
        let permits = Arc::clone(&self.permits);
        let mut shutdown = self.shutdown_tx.subscribe();
        self.metrics.record_run_started();

        tokio::spawn(
            async move {
                let _guard = guard;
                tracing::info!(chars = document.text.chars().count(), "Analysis started");
                let outcome = tokio::select! {
                    biased;
                    () = cancelled(&mut shutdown) => Err(PipelineError::Cancelled),
                    outcome = execute(&permits, &pipeline, &document.text) => outcome,
                };
                settle(store.as_ref(), &metrics, &document.id, outcome).await;
            }
            .instrument(span),
        );
    }
}

async fn execute(
    permits: &Semaphore,
    pipeline: &AnalysisPipeline,
    text: &str,
) -> Result<FinalAnalysis, PipelineError> {
    let _permit = permits
        .acquire()
        .await
        .map_err(|_| PipelineError::Cancelled)?;
    pipeline.run(text).await
}

/// Resolves once shutdown is signalled; never resolves if the orchestrator is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let closed = shutdown.wait_for(|stop| *stop).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

async fn settle(
    store: &dyn JobStore,
    metrics: &AnalysisMetrics,
    document_id: &str,
    outcome: Result<FinalAnalysis, PipelineError>,
) {
    match outcome {
        Ok(analysis) => match store.complete(document_id, &analysis).await {
            Ok(()) => {
                metrics.record_run_completed();
                tracing::info!(
                    key_characters = analysis.key_characters.len(),
                    themes = analysis.themes.len(),
                    "Analysis completed"
                );
            }
            Err(error) => {
                tracing::error!(%error, "Failed to persist analysis");
                record_failure(
                    store,
                    metrics,
                    document_id,
                    &format!("Failed to persist analysis: {error}"),
                )
                .await;
            }
        },
        Err(error) => {
            tracing::warn!(%error, "Analysis failed");
            record_failure(store, metrics, document_id, &error.to_string()).await;
        }
    }
}

async fn record_failure(
    store: &dyn JobStore,
    metrics: &AnalysisMetrics,
    document_id: &str,
    reason: &str,
) {
    metrics.record_run_failed();
    if let Err(error) = store.fail(document_id, reason).await {
        tracing::error!(%error, reason, "Failed to record analysis failure");
    }
}

/// Count of spawned runs that have not settled yet.
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> RunGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        RunGuard(Arc::clone(self))
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct RunGuard(Arc<InFlight>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}
