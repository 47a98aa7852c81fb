//! Instruction templates for both summarization stages.

use serde_json::json;

use super::types::MergedDraft;
use crate::summarization::ChatMessage;

pub(crate) const CHUNK_ANALYSIS_PROMPT: &str = "\
You analyze one excerpt of a longer literary work. Read the excerpt and report:
- summary: a short narrative summary of the excerpt
- sentiment: the overall emotional tone
- language: the language the excerpt is written in
- key_characters: the people or characters that matter in the excerpt
- themes: the main themes the excerpt touches on

Respond with a single fenced JSON object and nothing else, using exactly this shape:
```json
{\"summary\": \"\", \"sentiment\": \"\", \"language\": \"\", \"key_characters\": [], \"themes\": []}
```";

pub(crate) const CONSOLIDATION_PROMPT: &str = "\
You consolidate draft analyses of a literary work. The draft was assembled from several excerpts, \
so its fields repeat and overlap. Produce one coherent analysis of the whole work:
- summary: rewrite the combined summaries into a single narrative summary
- sentiment: one deduplicated description of the overall tone
- language: the deduplicated language name
- key_characters: remove duplicates and trivial mentions, keep meaningful variants
- themes: remove duplicates and near-duplicates, keep meaningful variants

Respond strictly with a single fenced JSON object of the same shape as the draft:
```json
{\"summary\": \"\", \"sentiment\": \"\", \"language\": \"\", \"key_characters\": [], \"themes\": []}
```";

pub(crate) fn chunk_analysis_messages(chunk: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CHUNK_ANALYSIS_PROMPT),
        ChatMessage::user(format!("Excerpt:\n\n{chunk}")),
    ]
}

pub(crate) fn consolidation_messages(draft: &MergedDraft) -> Vec<ChatMessage> {
    let payload = json!({
        "summary": draft.summary,
        "sentiment": draft.sentiment,
        "language": draft.language,
        "key_characters": draft.key_characters,
        "themes": draft.themes,
    });
    vec![
        ChatMessage::system(CONSOLIDATION_PROMPT),
        ChatMessage::user(format!("Draft analysis:\n```json\n{payload:#}\n```")),
    ]
}
