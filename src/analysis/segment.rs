//! Sentence-aware segmentation of document text into bounded chunks.

use std::iter::FusedIterator;
use thiserror::Error;

/// Errors produced while configuring segmentation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    /// A zero-length budget would never make progress.
    #[error("chunk length must be greater than zero")]
    InvalidChunkLength,
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Each split lands just after the last `.` that keeps the chunk within budget; when the window
/// holds no period the text is cut at exactly `max_chars` characters. Chunks are trimmed and
/// whitespace-only chunks are skipped, so whitespace-only input yields nothing.
pub fn segment(text: &str, max_chars: usize) -> Result<Segments<'_>, SegmentError> {
    if max_chars == 0 {
        return Err(SegmentError::InvalidChunkLength);
    }
    Ok(Segments {
        remaining: text,
        max_chars,
    })
}

/// Lazily produced chunk sequence returned by [`segment`].
#[derive(Debug)]
pub struct Segments<'a> {
    remaining: &'a str,
    max_chars: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while !self.remaining.is_empty() {
            let (chunk, rest) = split_bounded(self.remaining, self.max_chars);
            self.remaining = rest;
            let trimmed = chunk.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        None
    }
}

impl FusedIterator for Segments<'_> {}

fn split_bounded(text: &str, max_chars: usize) -> (&str, &str) {
    // Byte offset of the first character past the budget.
    let Some((limit, _)) = text.char_indices().nth(max_chars) else {
        return (text, "");
    };
    let cut = text[..limit]
        .rfind('.')
        .map(|period| period + 1)
        .unwrap_or(limit);
    text.split_at(cut)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(text: &str, max_chars: usize) -> Vec<&str> {
        segment(text, max_chars).expect("valid length").collect()
    }

    fn without_whitespace(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        assert_eq!(collect("  A short tale.  ", 5000), vec!["A short tale."]);
    }

    #[test]
    fn splits_after_last_period_within_budget() {
        let chunks = collect("One two. Three four. Five six seven.", 22);
        assert_eq!(chunks, vec!["One two. Three four.", "Five six seven."]);
    }

    #[test]
    fn hard_cuts_when_no_period_is_available() {
        let chunks = collect("abcdefghijklmnopqrstuvwxyz", 10);
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxyz"]);
    }

    #[test]
    fn chunks_respect_the_budget_and_reconstruct_the_text() {
        let text = "It was the best of times. It was the worst of times!\n\nIt was the age of \
                    wisdom, it was the age of foolishness. It was the epoch of belief";
        let chunks = collect(text, 30);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "chunk too long: {chunk:?}");
        }
        assert_eq!(without_whitespace(&chunks.concat()), without_whitespace(text));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let text = "éééééééééé";
        let chunks = collect(text, 4);
        assert_eq!(chunks, vec!["éééé", "éééé", "éé"]);
    }

    #[test]
    fn whitespace_only_text_yields_no_chunks() {
        assert!(collect(" \n\t ", 10).is_empty());
        assert!(collect("", 10).is_empty());
    }

    #[test]
    fn rejects_zero_length() {
        assert_eq!(
            segment("text", 0).unwrap_err(),
            SegmentError::InvalidChunkLength
        );
    }

    #[test]
    fn twelve_thousand_characters_yield_three_chunks() {
        let text = "The harbor was quiet at dawn. ".repeat(400);
        assert_eq!(text.chars().count(), 12_000);

        let chunks = collect(&text, 5000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.ends_with('.')));
    }
}
