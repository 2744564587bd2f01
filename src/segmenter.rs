//! Structural splitting of raw text into extraction-sized segments.
//!
//! Segmentation is a pure function of the input text. It normalizes blank
//! lines, splits on paragraph boundaries, breaks recognized lists at each
//! item, and falls back to sentence splitting for paragraphs that exceed
//! the size bound. Document order is preserved and nothing is discarded
//! here; size filtering happens downstream.

use regex::Regex;
use std::sync::LazyLock;

/// Runs of blank (or whitespace-only) lines collapse to one paragraph break.
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static regex"));

/// Leading bullet, dash, asterisk, or `digit.` list marker.
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[•\-*+]|\d+\.)\s").expect("static regex"));

/// Sentence-final punctuation followed by whitespace.
static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s+").expect("static regex"));

/// Split `text` into ordered segments.
///
/// Paragraphs at or under `max_chunk_size` characters are kept whole;
/// oversized ones are split at sentence boundaries. A paragraph whose first
/// line carries a list marker is split at each new list item instead.
#[must_use]
pub fn segment(text: &str, max_chunk_size: usize) -> Vec<String> {
    let collapsed = BLANK_LINE_RUN.replace_all(text, "\n\n");
    let mut segments = Vec::new();

    for paragraph in collapsed.trim().split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if LIST_MARKER.is_match(paragraph) {
            segments.extend(split_list_items(paragraph));
        } else if paragraph.chars().count() <= max_chunk_size {
            segments.push(paragraph.to_owned());
        } else {
            segments.extend(split_sentences(paragraph));
        }
    }

    segments
}

/// Split a list paragraph at each line that opens a new item.
fn split_list_items(paragraph: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in paragraph.lines() {
        if LIST_MARKER.is_match(line) && !current.is_empty() {
            items.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        items.push(current);
    }

    items
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Split an oversized paragraph at sentence-final punctuation.
fn split_sentences(paragraph: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for found in SENTENCE_BREAK.find_iter(paragraph) {
        // Keep the punctuation mark, drop the trailing whitespace.
        let punct_end = found.start() + 1;
        let sentence = paragraph[start..punct_end].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_owned());
        }
        start = found.end();
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail.to_owned());
    }

    sentences
}

// ── Tests ──────────────────────────────────────────────────────────────
