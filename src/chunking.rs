//! Text chunking for long-content embeddings
//!
//! Embedding models have a bounded input window. Content beyond it is
//! silently dropped, making long interactions unsearchable by their
//! later text. This module splits text into overlapping, offset-stable
//! spans before embedding.
//!
//! Guarantees:
//! - Spans cover the full input with no gaps.
//! - Consecutive spans overlap by exactly the configured amount
//!   (clamped for short inputs); the final span may be shorter.
//! - Output is deterministic for identical input and settings.
//! - Input that fits one window yields exactly one span.
//!
//! Token counts are approximated in characters (4 chars/token) so the
//! chunker needs no tokenizer and stays byte-exact across runs. Spans
//! are computed over char indices and reported as byte offsets, so
//! slicing the original text at a span's offsets reproduces its text.

use serde::{Deserialize, Serialize};

use crate::constants::{CHARS_PER_TOKEN, DEFAULT_CHUNK_MAX_TOKENS, DEFAULT_CHUNK_OVERLAP_TOKENS};

/// Chunking parameters, threaded in per call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkSettings {
    /// Window size in tokens.
    pub max_tokens: usize,
    /// Overlap between consecutive windows in tokens.
    pub overlap_tokens: usize,
}

impl Default for ChunkSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_CHUNK_MAX_TOKENS,
            overlap_tokens: DEFAULT_CHUNK_OVERLAP_TOKENS,
        }
    }
}

/// One span of the source text with stable byte offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Byte offset of the span start in the source text.
    pub start: usize,
    /// Byte offset one past the span end.
    pub end: usize,
}

/// Split text into overlapping spans for embedding.
///
/// Empty input yields a single empty span so callers never have to
/// special-case "no chunks".
pub fn chunk_text(text: &str, settings: &ChunkSettings) -> Vec<Chunk> {
    let window_chars = settings.max_tokens.max(1) * CHARS_PER_TOKEN;
    // Overlap must leave a positive step or the loop cannot advance.
    let overlap_chars = (settings.overlap_tokens * CHARS_PER_TOKEN).min(window_chars - 1);
    let step = window_chars - overlap_chars;

    // Byte offset of every char, plus the end sentinel, so spans can
    // be cut at exact char boundaries.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n_chars = offsets.len() - 1;

    if n_chars <= window_chars {
        return vec![Chunk {
            text: text.to_string(),
            start: 0,
            end: text.len(),
        }];
    }

    let mut chunks = Vec::with_capacity(n_chars / step + 1);
    let mut start_char = 0;
    loop {
        let end_char = (start_char + window_chars).min(n_chars);
        let start = offsets[start_char];
        let end = offsets[end_char];
        chunks.push(Chunk {
            text: text[start..end].to_string(),
            start,
            end,
        });
        if end_char == n_chars {
            break;
        }
        start_char += step;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(max_tokens: usize, overlap_tokens: usize) -> ChunkSettings {
        ChunkSettings {
            max_tokens,
            overlap_tokens,
        }
    }

    #[test]
    fn short_input_single_span() {
        let chunks = chunk_text("hello world", &ChunkSettings::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 11);
        assert_eq!(chunks[0].text, "hello world");
    }

    #[test]
    fn empty_input_single_empty_span() {
        let chunks = chunk_text("", &ChunkSettings::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn spans_cover_input_with_exact_overlap() {
        // 10-token window (40 chars), 2-token overlap (8 chars).
        let text: String = ('a'..='z').cycle().take(200).collect();
        let s = settings(10, 2);
        let chunks = chunk_text(&text, &s);
        assert!(chunks.len() > 1);

        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, text.len());
        for pair in chunks.windows(2) {
            // Next span starts inside the previous one by exactly the
            // configured overlap: no gaps, no drift.
            assert_eq!(pair[0].end - pair[1].start, 8);
        }
        for c in &chunks {
            assert_eq!(&text[c.start..c.end], c.text);
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let text: String = "the quick brown fox ".repeat(50);
        let s = settings(12, 3);
        assert_eq!(chunk_text(&text, &s), chunk_text(&text, &s));
    }

    #[test]
    fn multibyte_text_cuts_on_char_boundaries() {
        let text: String = "héllo wörld – ärger ".repeat(30);
        let s = settings(8, 2);
        let chunks = chunk_text(&text, &s);
        for c in &chunks {
            assert!(text.is_char_boundary(c.start));
            assert!(text.is_char_boundary(c.end));
            assert_eq!(&text[c.start..c.end], c.text);
        }
        assert_eq!(chunks.last().unwrap().end, text.len());
    }

    #[test]
    fn overlap_clamped_when_overlap_exceeds_window() {
        let text: String = "x".repeat(500);
        // Overlap bigger than the window must still make progress.
        let chunks = chunk_text(&text, &settings(10, 50));
        assert!(chunks.len() > 1);
        assert_eq!(chunks.last().unwrap().end, text.len());
    }
}
