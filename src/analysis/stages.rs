//! Remote calls for the chunk analysis and consolidation stages.

use futures_util::{StreamExt, stream};
use std::sync::Arc;

use super::extract::extract_json;
use super::prompts::{chunk_analysis_messages, consolidation_messages};
use super::types::{AnalysisFields, Consolidation, MergedDraft};
use crate::metrics::AnalysisMetrics;
use crate::summarization::{ChatMessage, CompletionClient, CompletionRequest};

/// Model parameters shared by every request in a run.
#[derive(Debug, Clone)]
pub struct StageModel {
    /// Model identifier passed to the provider.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
}

impl StageModel {
    fn request(&self, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
        }
    }
}

/// Issue one analysis request per chunk with at most `concurrency` in flight.
///
/// The result holds one slot per chunk in chunk order. A failed request leaves `None` in its slot
/// and never stops the remaining requests.
pub async fn analyze_chunks(
    client: Arc<dyn CompletionClient>,
    model: StageModel,
    chunks: Vec<String>,
    concurrency: usize,
    metrics: Arc<AnalysisMetrics>,
) -> Vec<Option<String>> {
    let total = chunks.len();
    stream::iter(chunks.into_iter().enumerate())
        .map(move |(index, chunk)| {
            let client = Arc::clone(&client);
            let metrics = Arc::clone(&metrics);
            let request = model.request(chunk_analysis_messages(&chunk));
            async move {
                match client.complete(request).await {
                    Ok(text) => {
                        metrics.record_chunk_call(true);
                        tracing::debug!(chunk = index, total, "Chunk analysis received");
                        Some(text)
                    }
                    Err(error) => {
                        metrics.record_chunk_call(false);
                        tracing::warn!(chunk = index, total, %error, "Chunk analysis failed");
                        None
                    }
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}

/// Ask the provider to consolidate a merged draft into the final analysis.
pub async fn consolidate(
    client: &dyn CompletionClient,
    model: &StageModel,
    draft: &MergedDraft,
) -> Consolidation {
    let request = model.request(consolidation_messages(draft));
    match client.complete(request).await {
        Ok(text) => match extract_json(&text) {
            Some(payload) => Consolidation::Analysis(AnalysisFields::from_map(&payload)),
            None => {
                tracing::warn!(
                    response_chars = text.chars().count(),
                    "Consolidation response held no fenced JSON object"
                );
                Consolidation::ParseFailure
            }
        },
        Err(error) => Consolidation::ServiceError(error),
    }
}
