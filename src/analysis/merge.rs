//! Merging of per-chunk analyses into a single draft.

use serde_json::{Map, Value};

use super::extract::extract_json;
use super::types::{AnalysisFields, MergedDraft};

/// Extract every response and merge the survivors in order.
///
/// Absent responses (failed requests) and responses without a fenced JSON object contribute
/// nothing. When nothing survives the draft is empty.
pub fn merge_responses<S: AsRef<str>>(responses: &[Option<S>]) -> MergedDraft {
    let extracted = responses
        .iter()
        .flatten()
        .filter_map(|response| extract_json(response.as_ref()));
    merge_extracted(extracted)
}

/// Merge already-extracted payloads.
///
/// `summary`, `sentiment`, and `language` concatenate their non-empty string values with a single
/// space. `key_characters` and `themes` take the union of list or scalar values, stringifying
/// non-strings and dropping exact duplicates while keeping first-seen order.
pub fn merge_extracted<I>(payloads: I) -> MergedDraft
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    let mut builder = DraftBuilder::default();
    for payload in payloads {
        builder.absorb(&payload);
    }
    builder.finish()
}

impl AnalysisFields {
    /// Read a single payload with the same leniency as [`merge_extracted`].
    pub fn from_map(payload: &Map<String, Value>) -> Self {
        let mut builder = DraftBuilder::default();
        builder.absorb(payload);
        builder.finish()
    }
}

#[derive(Default)]
struct DraftBuilder {
    summary: Vec<String>,
    sentiment: Vec<String>,
    language: Vec<String>,
    key_characters: Vec<String>,
    themes: Vec<String>,
}

impl DraftBuilder {
    fn absorb(&mut self, payload: &Map<String, Value>) {
        push_text(&mut self.summary, payload.get("summary"));
        push_text(&mut self.sentiment, payload.get("sentiment"));
        push_text(&mut self.language, payload.get("language"));
        union_into(&mut self.key_characters, payload.get("key_characters"));
        union_into(&mut self.themes, payload.get("themes"));
    }

    fn finish(self) -> MergedDraft {
        MergedDraft {
            summary: self.summary.join(" "),
            sentiment: self.sentiment.join(" "),
            language: self.language.join(" "),
            key_characters: self.key_characters,
            themes: self.themes,
        }
    }
}

fn push_text(parts: &mut Vec<String>, value: Option<&Value>) {
    if let Some(Value::String(text)) = value {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }
}

fn union_into(set: &mut Vec<String>, value: Option<&Value>) {
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                if let Some(entry) = stringify(item) {
                    insert_unique(set, entry);
                }
            }
        }
        Some(other) => {
            if let Some(entry) = stringify(other) {
                insert_unique(set, entry);
            }
        }
    }
}

fn stringify(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        other => other.to_string(),
    };
    (!text.is_empty()).then_some(text)
}

fn insert_unique(set: &mut Vec<String>, entry: String) {
    if !set.contains(&entry) {
        set.push(entry);
    }
}
