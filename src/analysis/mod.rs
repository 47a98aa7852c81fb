//! Two-stage document analysis.
//!
//! A run segments the document into bounded chunks, samples a representative subset, asks the
//! summarization service to analyze each sampled chunk, merges the per-chunk answers into a draft,
//! and asks the service once more to consolidate the draft. The [`Orchestrator`] wraps runs in the
//! persisted job state machine and executes them in the background.

mod extract;
mod merge;
mod orchestrator;
mod prompts;
mod sample;
mod segment;
mod service;
mod stages;
mod types;

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{
    Config, DEFAULT_CHUNK_MAX_CHARS, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_SAMPLE_COUNT,
    DEFAULT_STAGE_TIMEOUT_SECS, DEFAULT_TEMPERATURE,
};
use crate::metrics::AnalysisMetrics;
use crate::summarization::CompletionClient;

pub use extract::extract_json;
pub use merge::{merge_extracted, merge_responses};
pub use orchestrator::{Orchestrator, StartOutcome};
pub use sample::sample;
pub use segment::{SegmentError, Segments, segment};
pub use service::{AnalysisApi, AnalysisService, OpenedDocument, ServiceError};
pub use stages::{StageModel, analyze_chunks, consolidate};
pub use types::{AnalysisFields, Consolidation, FinalAnalysis, MergedDraft, PipelineError, Stage};

/// Tunables applied to every analysis run.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum chunk length in characters.
    pub max_chunk_chars: usize,
    /// Target number of sampled chunks.
    pub sample_count: usize,
    /// Seed for reproducible sampling; entropy-seeded when absent.
    pub sample_seed: Option<u64>,
    /// First-stage requests allowed in flight at once.
    pub max_concurrent_requests: usize,
    /// Time budget for each stage.
    pub stage_timeout: Duration,
}

impl PipelineSettings {
    /// Default settings for the given model.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_chunk_chars: DEFAULT_CHUNK_MAX_CHARS,
            sample_count: DEFAULT_SAMPLE_COUNT,
            sample_seed: None,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
        }
    }

    /// Settings taken from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.llm_model.clone(),
            temperature: config.llm_temperature,
            max_chunk_chars: config.analysis_chunk_max_chars,
            sample_count: config.analysis_sample_count,
            sample_seed: config.analysis_sample_seed,
            max_concurrent_requests: config.analysis_max_concurrent_requests,
            stage_timeout: Duration::from_secs(config.analysis_stage_timeout_secs),
        }
    }

    fn stage_model(&self) -> StageModel {
        StageModel {
            model: self.model.clone(),
            temperature: self.temperature,
        }
    }
}

/// Segment, sample, analyze, merge, and consolidate a single document.
pub struct AnalysisPipeline {
    client: Arc<dyn CompletionClient>,
    settings: PipelineSettings,
    metrics: Arc<AnalysisMetrics>,
}

impl AnalysisPipeline {
    /// Build a pipeline around an injected summarization client.
    pub fn new(
        client: Arc<dyn CompletionClient>,
        settings: PipelineSettings,
        metrics: Arc<AnalysisMetrics>,
    ) -> Self {
        Self {
            client,
            settings,
            metrics,
        }
    }

    /// Shared counters updated by runs.
    pub fn metrics(&self) -> Arc<AnalysisMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run both stages over `text` and return the consolidated analysis.
    pub async fn run(&self, text: &str) -> Result<FinalAnalysis, PipelineError> {
        let settings = &self.settings;
        let chunks: Vec<String> = segment(text, settings.max_chunk_chars)?
            .map(str::to_owned)
            .collect();
        let segmented = chunks.len();
        let sampled = {
            let mut rng = match settings.sample_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            sample(chunks, settings.sample_count, &mut rng)
        };
        if sampled.is_empty() {
            return Err(PipelineError::NothingToAnalyze);
        }
        tracing::info!(
            chunks = segmented,
            sampled = sampled.len(),
            "Starting chunk analysis"
        );

        let model = settings.stage_model();
        let responses = tokio::time::timeout(
            settings.stage_timeout,
            analyze_chunks(
                Arc::clone(&self.client),
                model.clone(),
                sampled,
                settings.max_concurrent_requests,
                Arc::clone(&self.metrics),
            ),
        )
        .await
        .map_err(|_| PipelineError::timed_out(Stage::ChunkAnalysis, settings.stage_timeout))?;

        let draft = merge_responses(&responses);
        if draft.is_empty() {
            tracing::warn!(
                responses = responses.len(),
                "No chunk analysis could be parsed; consolidating an empty draft"
            );
        }

        let consolidation = tokio::time::timeout(
            settings.stage_timeout,
            consolidate(self.client.as_ref(), &model, &draft),
        )
        .await
        .map_err(|_| PipelineError::timed_out(Stage::Consolidation, settings.stage_timeout))?;

        match consolidation {
            Consolidation::Analysis(analysis) if analysis.is_empty() => {
                Err(PipelineError::EmptyAnalysis)
            }
            Consolidation::Analysis(analysis) => Ok(analysis),
            Consolidation::ParseFailure => Err(PipelineError::UnparsableConsolidation),
            Consolidation::ServiceError(error) => Err(PipelineError::Service(error)),
        }
    }
}
