//! Core data types for the extraction pipeline.
//!
//! These are the records that flow between pipeline stages:
//!
//! - [`QaPair`]: a validated question/answer record, the unit that becomes a
//!   flashcard.
//! - [`Chunk`]: one or more merged segments together with their QA pairs.
//! - [`MergeDecision`]: the verdict for an adjacent chunk pair, produced by
//!   the merge planner and never revised afterwards.
//! - [`PipelineError`]: the fatal, document-level error taxonomy. Everything
//!   below the document level is swallowed and degrades output quality
//!   instead of aborting.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::sink::SinkError;

// ── QaPair ─────────────────────────────────────────────────────────────

/// A validated question/answer record.
///
/// Instances are only produced by the validator
/// ([`validate`](crate::validate)); once constructed they are immutable.
/// Both fields are non-empty and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    /// The prompt side of the flashcard. At least 5 characters.
    pub question: String,
    /// The answer side. At least 3 characters and never a placeholder
    /// like "it" or "n/a".
    pub answer: String,
}

impl QaPair {
    /// Construct a pair without validation.
    ///
    /// Intended for callers that already hold validated data (tests,
    /// deserialized storage). Everything coming out of a model response
    /// goes through [`validate_candidate`](crate::validate::validate_candidate)
    /// instead.
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

// ── Chunk ──────────────────────────────────────────────────────────────

/// A span of source text with the QA pairs extracted from it.
///
/// Chunks start out as one-per-segment and may grow during assembly when
/// adjacent chunks are merged. The assembler owns chunks exclusively while
/// it runs; ownership transfers to the caller on return and the records
/// should be treated as frozen from then on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Concatenated segment text. Merged segments are joined with a blank
    /// line.
    pub text: String,
    /// Validated pairs, in extraction order.
    pub qa_pairs: Vec<QaPair>,
    /// Character count of `text`.
    pub char_count: usize,
    /// Why this chunk absorbed its right neighbour, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_reason: Option<String>,
    /// Why this chunk was kept separate from its left neighbour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split_reason: Option<String>,
}

impl Chunk {
    /// Build the initial chunk for a single segment.
    #[must_use]
    pub fn from_segment(text: impl Into<String>, qa_pairs: Vec<QaPair>) -> Self {
        let text = text.into();
        let char_count = text.chars().count();
        Self {
            text,
            qa_pairs,
            char_count,
            merge_reason: None,
            split_reason: None,
        }
    }

    /// Absorb `other` into this chunk, joining the texts with a blank line.
    pub(crate) fn absorb(&mut self, other: Chunk, reason: impl Into<String>) {
        self.text.push_str("\n\n");
        self.text.push_str(&other.text);
        self.qa_pairs.extend(other.qa_pairs);
        self.char_count = self.text.chars().count();
        self.merge_reason = Some(reason.into());
    }
}

// ── MergeDecision ──────────────────────────────────────────────────────

/// Verdict for one adjacent chunk pair.
///
/// Decisions are derived once per pair and never retroactively revised.
/// The failure-safe default is "keep separate": merging is a quality
/// optimization, not a correctness requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    /// `true` when both sides cover the same topic and fit the size bound.
    pub should_merge: bool,
    /// Short human-readable justification, recorded on the resulting chunk.
    pub reason: String,
}

impl MergeDecision {
    /// Convenience constructor for a merge verdict.
    #[must_use]
    pub fn merge(reason: impl Into<String>) -> Self {
        Self {
            should_merge: true,
            reason: reason.into(),
        }
    }

    /// Convenience constructor for a keep-separate verdict.
    #[must_use]
    pub fn keep(reason: impl Into<String>) -> Self {
        Self {
            should_merge: false,
            reason: reason.into(),
        }
    }
}

// ── PipelineError ──────────────────────────────────────────────────────

/// Fatal, document-level failures.
///
/// This is the only error class surfaced to callers. Model-call failures,
/// unparseable responses and rejected candidates are all handled inside the
/// pipeline: they yield empty batch results or no-merge defaults and are
/// logged, never raised.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input file could not be read.
    #[error("failed to read input file at {}: {source}", path.display())]
    FileRead {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The input bytes do not decode as UTF-8 text.
    #[error("input is not valid UTF-8 text: {source}")]
    InvalidUtf8 {
        /// Underlying decode error.
        source: std::string::FromUtf8Error,
    },

    /// The whole document yielded zero valid QA pairs after filtering.
    #[error("no valid question/answer pairs could be extracted from the document")]
    NoCards,

    /// The persistence collaborator refused the extracted deck.
    #[error("failed to persist deck '{deck_name}': {source}")]
    Sink {
        /// Deck that was being stored.
        deck_name: String,
        /// Error reported by the sink.
        source: SinkError,
    },
}

// ── Tests ──────────────────────────────────────────────────────────────
