//! Extraction of fenced JSON payloads from free-form completions.

use serde_json::{Map, Value};

const FENCE: &str = "```";

/// Locate the first fenced block holding a JSON object and parse it.
///
/// Accepts ```` ```json ```` (any language tag) and bare ```` ``` ```` fences. Returns `None` when
/// there is no complete fence pair or no block parses as a JSON object. Never panics.
pub fn extract_json(response: &str) -> Option<Map<String, Value>> {
    fenced_blocks(response)
        .into_iter()
        .find_map(|block| match serde_json::from_str::<Value>(block.trim()) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
}

fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let body = skip_info_string(&rest[open + FENCE.len()..]);
        let Some(close) = body.find(FENCE) else {
            break;
        };
        blocks.push(&body[..close]);
        rest = &body[close + FENCE.len()..];
    }
    blocks
}

/// Drop a language tag such as `json` that follows an opening fence.
fn skip_info_string(text: &str) -> &str {
    let line_end = text.find('\n').unwrap_or(text.len());
    let tag = text[..line_end].trim();
    if tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        &text[line_end..]
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_json_tagged_fence() {
        let response = "Here is the analysis:\n```json\n{\"summary\": \"A voyage.\", \"themes\": [\"sea\"]}\n```\nHope it helps.";
        let map = extract_json(response).expect("payload");
        assert_eq!(map["summary"], json!("A voyage."));
        assert_eq!(map["themes"], json!(["sea"]));
    }

    #[test]
    fn parses_bare_and_inline_fences() {
        let bare = "```\n{\"language\": \"English\"}\n```";
        assert_eq!(extract_json(bare).expect("bare")["language"], "English");

        let inline = "```{\"language\": \"French\"}```";
        assert_eq!(extract_json(inline).expect("inline")["language"], "French");
    }

    #[test]
    fn missing_fences_yield_no_result() {
        assert!(extract_json("{\"summary\": \"unfenced\"}").is_none());
        assert!(extract_json("no json here at all").is_none());
        assert!(extract_json("").is_none());
    }

    #[test]
    fn invalid_or_non_object_json_yields_no_result() {
        assert!(extract_json("```json\n{\"summary\": \"unterminated\n```").is_none());
        assert!(extract_json("```json\n[1, 2, 3]\n```").is_none());
    }

    #[test]
    fn unbalanced_fences_never_panic() {
        for input in ["```", "```json", "```json\n{", "``` ``` ```", "text ```json\n{}"] {
            let _ = extract_json(input);
        }
        assert!(extract_json("```json\n{\"a\": 1}").is_none());
    }

    #[test]
    fn skips_unparseable_blocks_until_an_object_is_found() {
        let response = "```text\nnot json\n```\n```json\n{\"sentiment\": \"hopeful\"}\n```";
        assert_eq!(extract_json(response).expect("second")["sentiment"], "hopeful");
    }

    #[test]
    fn extraction_is_idempotent() {
        let response = "```json\n{\"summary\": \"x\", \"themes\": [\"a\", \"b\"]}\n```";
        assert_eq!(extract_json(response), extract_json(response));
        assert_eq!(extract_json("garbage"), extract_json("garbage"));
    }
}
