//! Batched extraction of QA pairs from text segments.
//!
//! One model call covers a whole batch: every uncached segment is packed
//! into a single prompt and the response carries one record per segment
//! index. The flow per batch is cache partition, model call, response
//! normalization, JSON recovery, candidate validation, cache write-back.
//!
//! Failure is batch-scoped. A failed call or an unrecoverable response
//! yields empty results for the uncached indices of that batch and
//! nothing else; sibling batches are unaffected and no error propagates.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::cache::{ResultCache, content_hash};
use crate::model::GenerativeModel;
use crate::prompts::extraction_prompt;
use crate::recovery::recover_json;
use crate::types::QaPair;
use crate::validate::validate_candidates;

/// Responses shorter than this cannot contain a record and are dropped
/// without attempting recovery.
const MIN_USEFUL_RESPONSE_LEN: usize = 10;

/// Drives segment-to-QA-pairs extraction in bounded batches.
pub struct BatchExtractor {
    model: Arc<dyn GenerativeModel>,
    cache: Arc<ResultCache<Vec<QaPair>>>,
}

impl BatchExtractor {
    /// Build an extractor over a model and a shared extraction cache.
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>, cache: Arc<ResultCache<Vec<QaPair>>>) -> Self {
        Self { model, cache }
    }

    /// Extract QA pairs for every segment in the batch.
    ///
    /// The returned vector is index-aligned with `segments`. A segment
    /// with zero valid pairs yields an empty entry, not an error. Pure
    /// with respect to the caller except for cache mutation.
    pub async fn extract_batch(&self, segments: &[String]) -> Vec<Vec<QaPair>> {
        if segments.is_empty() {
            return Vec::new();
        }

        // Partition into cached and uncached by content hash.
        let mut results: Vec<Option<Vec<QaPair>>> = Vec::with_capacity(segments.len());
        let mut uncached: Vec<(usize, &str)> = Vec::new();

        for (idx, segment) in segments.iter().enumerate() {
            match self.cache.lookup(&content_hash(&[segment])) {
                Some(pairs) => {
                    tracing::debug!(segment = idx, "extraction cache hit");
                    results.push(Some(pairs));
                }
                None => {
                    results.push(None);
                    uncached.push((idx, segment.as_str()));
                }
            }
        }

        if uncached.is_empty() {
            return fill_remaining(results);
        }

        let texts: Vec<&str> = uncached.iter().map(|(_, text)| *text).collect();
        let prompt = extraction_prompt(&texts);

        tracing::debug!(segments = uncached.len(), "invoking model for extraction batch");
        let response = match self.model.invoke(&prompt).await {
            Ok(response) => response.into_text(),
            Err(err) => {
                tracing::warn!(error = %err, "extraction call failed, batch yields empty results");
                return fill_remaining(results);
            }
        };

        if response.trim().len() < MIN_USEFUL_RESPONSE_LEN {
            tracing::warn!(len = response.len(), "extraction response too short to use");
            return fill_remaining(results);
        }

        let Some(document) = recover_json(&response) else {
            return fill_remaining(results);
        };
        let Some(records) = document.get("segments").and_then(Value::as_array) else {
            tracing::warn!("extraction response has no 'segments' array");
            return fill_remaining(results);
        };

        // Collect validated pairs per batch-local segment id.
        let mut by_id: FxHashMap<u64, Vec<QaPair>> = FxHashMap::default();
        let mut rejected = 0usize;
        for record in records {
            let Some(object) = record.as_object() else {
                continue;
            };
            let Some(id) = object.get("segment_id").and_then(Value::as_u64) else {
                continue;
            };
            let candidates = object
                .get("qa_pairs")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();

            let outcome = validate_candidates(id, candidates);
            rejected += outcome.rejected;
            by_id.insert(id, outcome.accepted);
        }

        // Fill the uncached slots and memoize every one of them, empty
        // results included, so identical segments never call again.
        let mut accepted = 0usize;
        for (batch_pos, (original_idx, text)) in uncached.iter().enumerate() {
            let pairs = by_id.remove(&(batch_pos as u64)).unwrap_or_default();
            accepted += pairs.len();
            self.cache.store(content_hash(&[text]), pairs.clone());
            results[*original_idx] = Some(pairs);
        }

        tracing::info!(
            segments = uncached.len(),
            accepted,
            rejected,
            "extraction batch complete"
        );
        fill_remaining(results)
    }
}

/// Replace still-unfilled slots with empty results.
///
/// On the failure paths this runs with every uncached slot empty; those
/// slots skip the cache so a later call may retry.
fn fill_remaining(results: Vec<Option<Vec<QaPair>>>) -> Vec<Vec<QaPair>> {
    results
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect()
}

// ── Tests ──────────────────────────────────────────────────────────────
