//! Merge planning for adjacent chunk pairs.
//!
//! The planner decides, per adjacent pair, whether two chunks cover the
//! same topic closely enough to fuse. It mirrors the extractor's shape:
//! trivial cases short-circuit locally, cached pairs skip the model, and
//! everything left is packed into one comparison prompt per batch.
//!
//! Merging is a quality optimization, not a correctness requirement, so
//! the failure-safe default on any unparseable response is to keep chunks
//! separate.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::cache::{ResultCache, content_hash};
use crate::model::GenerativeModel;
use crate::prompts::merge_prompt;
use crate::recovery::recover_json;
use crate::types::{Chunk, MergeDecision};

/// Questions per side that feed the comparison prompt and the cache key.
///
/// The key covers only the leading questions, so two distinct chunks that
/// share their first three questions on both sides would share a cached
/// decision. Tolerable for a best-effort cache; widen the key if that
/// ever bites.
const QUESTIONS_PER_SIDE: usize = 3;

/// Reason recorded when either side has no QA pairs.
pub const REASON_EMPTY: &str = "One or both chunks are empty";
/// Reason recorded when fusing would exceed the chunk size bound.
pub const REASON_TOO_LARGE: &str = "Combined size would be too large";
/// Reason recorded when the batch response could not be parsed.
pub const REASON_PARSE_ERROR: &str = "Parse error";
/// Reason recorded when the response parsed but skipped this comparison.
pub const REASON_UNKNOWN: &str = "Unknown";

/// Decides whether adjacent chunk pairs should fuse.
pub struct MergePlanner {
    model: Arc<dyn GenerativeModel>,
    cache: Arc<ResultCache<MergeDecision>>,
    max_chunk_size: usize,
}

impl MergePlanner {
    /// Build a planner over a model and a shared merge-decision cache.
    #[must_use]
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        cache: Arc<ResultCache<MergeDecision>>,
        max_chunk_size: usize,
    ) -> Self {
        Self {
            model,
            cache,
            max_chunk_size,
        }
    }

    /// Produce one decision per pair, index-aligned with `pairs`.
    ///
    /// Decisions are never an error: every failure mode degrades to a
    /// keep-separate verdict with a descriptive reason.
    pub async fn plan_merges(&self, pairs: &[(Chunk, Chunk)]) -> Vec<MergeDecision> {
        if pairs.is_empty() {
            return Vec::new();
        }

        let mut results: Vec<Option<MergeDecision>> = Vec::with_capacity(pairs.len());
        let mut uncached: Vec<(usize, String)> = Vec::new();

        for (idx, (left, right)) in pairs.iter().enumerate() {
            // Trivial rejections cost no model call and are not cached.
            if left.qa_pairs.is_empty() || right.qa_pairs.is_empty() {
                results.push(Some(MergeDecision::keep(REASON_EMPTY)));
                continue;
            }
            if left.char_count + right.char_count > self.max_chunk_size {
                results.push(Some(MergeDecision::keep(REASON_TOO_LARGE)));
                continue;
            }

            let key = comparison_key(left, right);
            match self.cache.lookup(&key) {
                Some(decision) => {
                    tracing::debug!(pair = idx, "merge cache hit");
                    results.push(Some(decision));
                }
                None => {
                    results.push(None);
                    uncached.push((idx, key));
                }
            }
        }

        if uncached.is_empty() {
            return unwrap_all(results);
        }

        let comparisons: Vec<(Vec<&str>, Vec<&str>)> = uncached
            .iter()
            .map(|(idx, _)| {
                let (left, right) = &pairs[*idx];
                (leading_questions(left), leading_questions(right))
            })
            .collect();
        let prompt = merge_prompt(&comparisons);

        tracing::debug!(pairs = uncached.len(), "invoking model for merge batch");
        let parsed = match self.model.invoke(&prompt).await {
            Ok(response) => parse_decisions(&response.into_text()),
            Err(err) => {
                tracing::warn!(error = %err, "merge call failed, defaulting to no merge");
                None
            }
        };

        // Fill the uncached slots; unanswered comparisons keep chunks
        // separate. Computed decisions and defaults are both memoized,
        // matching the pairwise key above.
        for (batch_pos, (idx, key)) in uncached.into_iter().enumerate() {
            let decision = match &parsed {
                Some(by_id) => by_id
                    .get(&(batch_pos as u64))
                    .cloned()
                    .unwrap_or_else(|| MergeDecision::keep(REASON_UNKNOWN)),
                None => MergeDecision::keep(REASON_PARSE_ERROR),
            };
            self.cache.store(key, decision.clone());
            results[idx] = Some(decision);
        }

        unwrap_all(results)
    }

    /// Number of memoized merge decisions.
    #[must_use]
    pub fn cached_decisions(&self) -> usize {
        self.cache.len()
    }
}

/// Up to the first [`QUESTIONS_PER_SIDE`] questions of a chunk.
fn leading_questions(chunk: &Chunk) -> Vec<&str> {
    chunk
        .qa_pairs
        .iter()
        .take(QUESTIONS_PER_SIDE)
        .map(|pair| pair.question.as_str())
        .collect()
}

/// Cache key over the leading questions of both sides.
fn comparison_key(left: &Chunk, right: &Chunk) -> String {
    let mut parts: Vec<&str> = leading_questions(left);
    parts.push("||");
    parts.extend(leading_questions(right));
    content_hash(&parts)
}

/// Parse the comparison response into decisions keyed by `comparison_id`.
///
/// `None` means the response as a whole was unusable and every
/// outstanding pair should default to a parse-error verdict.
fn parse_decisions(response: &str) -> Option<FxHashMap<u64, MergeDecision>> {
    let document = recover_json(response)?;
    let Some(records) = document.get("comparisons").and_then(Value::as_array) else {
        tracing::warn!("merge response has no 'comparisons' array");
        return None;
    };

    let mut by_id = FxHashMap::default();
    for record in records {
        let Some(object) = record.as_object() else {
            continue;
        };
        let Some(id) = object.get("comparison_id").and_then(Value::as_u64) else {
            continue;
        };
        let should_merge = object
            .get("should_merge")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let reason = object
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or(REASON_UNKNOWN)
            .to_owned();
        by_id.insert(
            id,
            MergeDecision {
                should_merge,
                reason,
            },
        );
    }
    Some(by_id)
}

fn unwrap_all(results: Vec<Option<MergeDecision>>) -> Vec<MergeDecision> {
    results
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| MergeDecision::keep(REASON_PARSE_ERROR)))
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────
