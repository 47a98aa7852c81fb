//! Application service tying documents, jobs, and the orchestrator together.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::orchestrator::{Orchestrator, StartOutcome};
use super::{AnalysisPipeline, PipelineSettings};
use crate::config::Config;
use crate::documents::{DirectoryDocumentSource, Document, DocumentError, DocumentSource};
use crate::jobs::{AnalysisJob, JobStore, SqliteJobStore, StoreError};
use crate::metrics::{AnalysisMetrics, MetricsSnapshot};
use crate::summarization::{CompletionError, build_completion_client};

const INTERRUPTED_REASON: &str = "Analysis interrupted by restart";

/// Errors surfaced synchronously to callers of the service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Document acquisition failed.
    #[error(transparent)]
    Document(#[from] DocumentError),
    /// Job persistence failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The summarization client could not be built.
    #[error(transparent)]
    Client(#[from] CompletionError),
}

/// A fetched document and the analysis request it triggered.
#[derive(Debug, Clone)]
pub struct OpenedDocument {
    /// Fetched document.
    pub document: Document,
    /// Start outcome, absent when the job store could not be reached.
    pub analysis: Option<StartOutcome>,
}

/// Operations exposed to the HTTP surface.
#[async_trait]
pub trait AnalysisApi: Send + Sync {
    /// Ids of documents available for analysis.
    async fn list_documents(&self) -> Result<Vec<String>, ServiceError>;

    /// Fetch a document and start its analysis in the background.
    ///
    /// Store failures do not fail the fetch; they are logged and reported as a missing outcome.
    async fn open_document(&self, document_id: &str) -> Result<OpenedDocument, ServiceError>;

    /// Start (or with `force`, restart) analysis of a document.
    async fn start_analysis(
        &self,
        document_id: &str,
        force: bool,
    ) -> Result<StartOutcome, ServiceError>;

    /// Current job record for a document.
    async fn analysis(&self, document_id: &str) -> Result<Option<AnalysisJob>, ServiceError>;

    /// Every recorded job, ordered by document id.
    async fn list_analyses(&self) -> Result<Vec<AnalysisJob>, ServiceError>;

    /// Analysis counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Default [`AnalysisApi`] implementation.
pub struct AnalysisService {
    documents: Arc<dyn DocumentSource>,
    store: Arc<dyn JobStore>,
    orchestrator: Orchestrator,
}

impl AnalysisService {
    /// Assemble a service from its collaborators.
    pub fn new(
        documents: Arc<dyn DocumentSource>,
        store: Arc<dyn JobStore>,
        orchestrator: Orchestrator,
    ) -> Self {
        Self {
            documents,
            store,
            orchestrator,
        }
    }

    /// Build the production service from configuration.
    ///
    /// Opens the SQLite job store, marks jobs left running by a previous process as failed, and
    /// builds the configured summarization client.
    pub async fn from_config(config: &Config) -> Result<Self, ServiceError> {
        let store: Arc<dyn JobStore> = Arc::new(SqliteJobStore::open(&config.database_path)?);
        let recovered = store.fail_interrupted(INTERRUPTED_REASON).await?;
        if recovered > 0 {
            tracing::warn!(jobs = recovered, "Marked interrupted analyses as failed");
        }

        let client = build_completion_client(config)?;
        let pipeline = Arc::new(AnalysisPipeline::new(
            client,
            PipelineSettings::from_config(config),
            Arc::new(AnalysisMetrics::new()),
        ));
        let orchestrator = Orchestrator::new(
            Arc::clone(&store),
            pipeline,
            config.analysis_max_concurrent_jobs,
        );
        let documents = Arc::new(DirectoryDocumentSource::new(config.documents_dir.clone()));
        tracing::info!(
            documents_dir = %config.documents_dir.display(),
            database = %config.database_path.display(),
            "Analysis service initialized"
        );

        Ok(Self::new(documents, store, orchestrator))
    }

    /// Wait until no analysis is running.
    pub async fn wait_idle(&self) {
        self.orchestrator.wait_idle().await;
    }

    /// Cancel running analyses and wait for them to be recorded.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
    }
}

#[async_trait]
impl AnalysisApi for AnalysisService {
    async fn list_documents(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.documents.list().await?)
    }

    async fn open_document(&self, document_id: &str) -> Result<OpenedDocument, ServiceError> {
        let document = self.documents.fetch(document_id).await?;
        let analysis = match self.orchestrator.start(&document, false).await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                tracing::error!(document_id, %error, "Failed to start analysis");
                None
            }
        };
        Ok(OpenedDocument { document, analysis })
    }

    async fn start_analysis(
        &self,
        document_id: &str,
        force: bool,
    ) -> Result<StartOutcome, ServiceError> {
        let document = self.documents.fetch(document_id).await?;
        let outcome = self.orchestrator.start(&document, force).await?;
        tracing::info!(document_id, force, outcome = outcome.label(), "Analysis requested");
        Ok(outcome)
    }

    async fn analysis(&self, document_id: &str) -> Result<Option<AnalysisJob>, ServiceError> {
        crate::documents::validate_id(document_id)?;
        Ok(self.store.get(document_id).await?)
    }

    async fn list_analyses(&self) -> Result<Vec<AnalysisJob>, ServiceError> {
        Ok(self.store.list().await?)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.orchestrator.metrics().snapshot()
    }
}
