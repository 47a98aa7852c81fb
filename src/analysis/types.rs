//! Structured analysis records and stage outcomes.

use crate::summarization::CompletionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::segment::SegmentError;

/// Structured fields produced by both summarization stages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisFields {
    /// Narrative summary.
    pub summary: String,
    /// Overall sentiment description.
    pub sentiment: String,
    /// Detected language.
    pub language: String,
    /// Distinct key characters.
    pub key_characters: Vec<String>,
    /// Distinct themes.
    pub themes: Vec<String>,
}

impl AnalysisFields {
    /// Whether every field is empty.
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.sentiment.is_empty()
            && self.language.is_empty()
            && self.key_characters.is_empty()
            && self.themes.is_empty()
    }
}

/// Combined first-stage results awaiting consolidation.
pub type MergedDraft = AnalysisFields;

/// Consolidated result persisted on a completed job.
pub type FinalAnalysis = AnalysisFields;

/// Outcome of the consolidation request.
#[derive(Debug)]
pub enum Consolidation {
    /// The response carried a parseable analysis.
    Analysis(FinalAnalysis),
    /// The response held no fenced JSON object.
    ParseFailure,
    /// The request itself failed.
    ServiceError(CompletionError),
}

/// Pipeline stages bounded by a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Per-chunk first-stage requests.
    ChunkAnalysis,
    /// Single second-stage request.
    Consolidation,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChunkAnalysis => f.write_str("chunk analysis"),
            Self::Consolidation => f.write_str("consolidation"),
        }
    }
}

/// Reasons an analysis run ends without a persisted result.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Segmentation settings were invalid.
    #[error("Failed to segment document: {0}")]
    Segmentation(#[from] SegmentError),
    /// The document produced no chunks.
    #[error("Document has no text to analyze")]
    NothingToAnalyze,
    /// A stage exceeded its time budget.
    #[error("{stage} stage timed out after {timeout_secs}s")]
    StageTimeout {
        /// Stage that overran.
        stage: Stage,
        /// Budget that was exceeded, in seconds.
        timeout_secs: u64,
    },
    /// The consolidation request failed.
    #[error("Consolidation request failed: {0}")]
    Service(#[source] CompletionError),
    /// The consolidation response held no parseable analysis.
    #[error("Consolidation response contained no parseable analysis")]
    UnparsableConsolidation,
    /// The consolidation response parsed but every field was empty.
    #[error("Consolidated analysis was empty")]
    EmptyAnalysis,
    /// The run was interrupted by shutdown.
    #[error("Analysis cancelled by shutdown")]
    Cancelled,
}

impl PipelineError {
    pub(crate) fn timed_out(stage: Stage, timeout: Duration) -> Self {
        Self::StageTimeout {
            stage,
            timeout_secs: timeout.as_secs(),
        }
    }
}
