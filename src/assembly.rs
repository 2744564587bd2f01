//! Greedy left-to-right assembly of the final chunk sequence.
//!
//! The assembler walks the per-segment chunks once, in document order,
//! pairing each candidate with the current tail of the result and applying
//! the planner's decisions as they arrive. Finalized chunks are never
//! re-evaluated, so output order always matches segment order.
//!
//! Short documents skip the whole phase: below the configured chunk-count
//! threshold the input is returned unmodified and no merge call is made.
//!
//! Decisions arrive in batches, so a pair can go stale: an earlier split
//! in the same batch replaces the tail the pair was formed against. Each
//! pending pair therefore records the tail *position* it was formed
//! against, and a merge verdict only applies while that position is still
//! the tail. Merges growing the tail in place keep the position valid;
//! splits invalidate every pair formed before them.

use crate::bridge::{ConcurrencyBridge, ExecutionMode};
use crate::merge::MergePlanner;
use crate::types::{Chunk, MergeDecision};

/// Applies merge decisions to produce the final chunk sequence.
pub struct ChunkAssembler {
    planner: MergePlanner,
    bridge: ConcurrencyBridge,
    batch_size: usize,
    skip_merge_threshold: usize,
}

/// A candidate chunk waiting for its merge decision, together with the
/// result position of the tail it was compared against.
struct Pending {
    tail_index: usize,
    candidate: Chunk,
}

impl ChunkAssembler {
    /// Build an assembler over a planner and the shared batch bridge.
    #[must_use]
    pub fn new(
        planner: MergePlanner,
        bridge: ConcurrencyBridge,
        batch_size: usize,
        skip_merge_threshold: usize,
    ) -> Self {
        Self {
            planner,
            bridge,
            batch_size,
            skip_merge_threshold,
        }
    }

    /// Reduce per-segment chunks into the final sequence.
    ///
    /// Below the skip threshold the input comes back untouched.
    pub async fn assemble(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if chunks.len() <= 1 || chunks.len() < self.skip_merge_threshold {
            tracing::info!(
                chunks = chunks.len(),
                threshold = self.skip_merge_threshold,
                "below merge threshold, skipping merge analysis"
            );
            return chunks;
        }

        tracing::info!(chunks = chunks.len(), "running merge analysis");
        let assembled = match self.bridge.mode() {
            ExecutionMode::Sequential => self.assemble_sequential(chunks).await,
            ExecutionMode::Parallel { .. } => self.assemble_parallel(chunks).await,
        };
        tracing::info!(chunks = assembled.len(), "merge analysis complete");
        assembled
    }

    /// One batch in flight at a time; later pairs form against the tail
    /// as updated by earlier batches.
    async fn assemble_sequential(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut iter = chunks.into_iter();
        let mut result = vec![iter.next().expect("assemble checked len > 1")];
        let mut pending: Vec<Pending> = Vec::new();
        let mut pairs: Vec<(Chunk, Chunk)> = Vec::new();

        for candidate in iter {
            let tail_index = result.len() - 1;
            pairs.push((result[tail_index].clone(), candidate.clone()));
            pending.push(Pending {
                tail_index,
                candidate,
            });

            if pending.len() >= self.batch_size {
                let decisions = self.planner.plan_merges(&pairs).await;
                apply_decisions(&mut result, std::mem::take(&mut pending), decisions);
                pairs.clear();
            }
        }

        if !pending.is_empty() {
            let decisions = self.planner.plan_merges(&pairs).await;
            apply_decisions(&mut result, pending, decisions);
        }

        result
    }

    /// All batches dispatched up front and gathered before any decision is
    /// applied. Pairs form against the tail as known at formation time;
    /// the stale-tail guard sorts out whatever shifted underneath them.
    async fn assemble_parallel(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let mut iter = chunks.into_iter();
        let mut result = vec![iter.next().expect("assemble checked len > 1")];
        let tail_index = result.len() - 1;

        let mut batches: Vec<Vec<Pending>> = Vec::new();
        let mut pair_batches: Vec<Vec<(Chunk, Chunk)>> = Vec::new();
        let mut pending: Vec<Pending> = Vec::new();
        let mut pairs: Vec<(Chunk, Chunk)> = Vec::new();

        for candidate in iter {
            pairs.push((result[tail_index].clone(), candidate.clone()));
            pending.push(Pending {
                tail_index,
                candidate,
            });

            if pending.len() >= self.batch_size {
                batches.push(std::mem::take(&mut pending));
                pair_batches.push(std::mem::take(&mut pairs));
            }
        }
        if !pending.is_empty() {
            batches.push(pending);
            pair_batches.push(pairs);
        }

        let futures: Vec<_> = pair_batches
            .iter()
            .map(|batch| self.planner.plan_merges(batch))
            .collect();
        let all_decisions = self.bridge.run_all(futures).await;

        for (batch, decisions) in batches.into_iter().zip(all_decisions) {
            apply_decisions(&mut result, batch, decisions);
        }

        result
    }
}

/// Apply one batch of decisions against the growing result.
fn apply_decisions(result: &mut Vec<Chunk>, batch: Vec<Pending>, decisions: Vec<MergeDecision>) {
    for (pending, decision) in batch.into_iter().zip(decisions) {
        let tail_is_current = result.len() - 1 == pending.tail_index;
        if decision.should_merge && tail_is_current {
            result
                .last_mut()
                .expect("result is seeded with the first chunk")
                .absorb(pending.candidate, decision.reason);
        } else {
            let mut candidate = pending.candidate;
            candidate.split_reason = Some(decision.reason);
            result.push(candidate);
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResultCache;
    use crate::model::{GenerativeModel, MockModel};
    use crate::types::QaPair;
    use std::sync::Arc;

    fn chunk(tag: u32) -> Chunk {
        Chunk::from_segment(
            format!("segment {tag} body text"),
            vec![QaPair::new(
                format!("What is segment {tag}?"),
                format!("Body {tag} of the document."),
            )],
        )
    }

    fn assembler(model: MockModel, batch_size: usize, threshold: usize) -> ChunkAssembler {
        assembler_with_mode(model, batch_size, threshold, ExecutionMode::Sequential)
    }

    fn assembler_with_mode(
        model: MockModel,
        batch_size: usize,
        threshold: usize,
        mode: ExecutionMode,
    ) -> ChunkAssembler {
        let planner = MergePlanner::new(
            Arc::new(model) as Arc<dyn GenerativeModel>,
            Arc::new(ResultCache::new()),
            10_000,
        );
        ChunkAssembler::new(planner, ConcurrencyBridge::new(mode), batch_size, threshold)
    }

    /// Mock that approves or rejects every comparison in any prompt.
    fn uniform_model(should_merge: bool) -> MockModel {
        MockModel::from_fn(move |prompt| {
            let comparisons = prompt.matches("--- COMPARISON").count();
            let entries: Vec<String> = (0..comparisons)
                .map(|i| {
                    format!(
                        r#"{{"comparison_id": {i}, "should_merge": {should_merge}, "reason": "verdict"}}"#
                    )
                })
                .collect();
            Ok(crate::model::ModelResponse::text(format!(
                r#"{{"comparisons": [{}]}}"#,
                entries.join(", ")
            )))
        })
    }

    #[tokio::test]
    async fn below_threshold_returns_input_unmodified() {
        let asm = assembler(MockModel::fixed("should never be called"), 8, 10);

        let input: Vec<Chunk> = (0..4).map(chunk).collect();
        let output = asm.assemble(input.clone()).await;
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn always_merge_collapses_to_one_chunk() {
        let asm = assembler(uniform_model(true), 8, 2);

        let input: Vec<Chunk> = (0..12).map(chunk).collect();
        let output = asm.assemble(input).await;

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].qa_pairs.len(), 12);
        // Original order is preserved through every merge.
        for (i, pair) in output[0].qa_pairs.iter().enumerate() {
            assert_eq!(pair.question, format!("What is segment {i}?"));
        }
        assert!(output[0].merge_reason.is_some());
    }

    #[tokio::test]
    async fn never_merge_keeps_every_chunk_with_reasons() {
        let asm = assembler(uniform_model(false), 8, 2);

        let input: Vec<Chunk> = (0..5).map(chunk).collect();
        let output = asm.assemble(input).await;

        assert_eq!(output.len(), 5);
        assert!(output[0].split_reason.is_none());
        for later in &output[1..] {
            assert_eq!(later.split_reason.as_deref(), Some("verdict"));
        }
    }

    #[tokio::test]
    async fn stale_pair_splits_even_when_approved() {
        // One batch of two comparisons: the first splits, which moves the
        // tail, so the second verdict (a merge) no longer applies.
        let model = MockModel::from_fn(|_| {
            Ok(crate::model::ModelResponse::text(
                r#"{"comparisons": [
                    {"comparison_id": 0, "should_merge": false, "reason": "off topic"},
                    {"comparison_id": 1, "should_merge": true, "reason": "same topic"}
                ]}"#
                .to_owned(),
            ))
        });
        let asm = assembler(model, 2, 2);

        let input: Vec<Chunk> = (0..3).map(chunk).collect();
        let output = asm.assemble(input).await;

        assert_eq!(output.len(), 3);
        assert_eq!(output[1].split_reason.as_deref(), Some("off topic"));
        // Approved but stale: recorded as a split with the model's reason.
        assert_eq!(output[2].split_reason.as_deref(), Some("same topic"));
    }

    #[tokio::test]
    async fn parallel_mode_merges_against_the_formation_tail() {
        let asm = assembler_with_mode(uniform_model(true), 8, 2, ExecutionMode::parallel());

        let input: Vec<Chunk> = (0..12).map(chunk).collect();
        let output = asm.assemble(input).await;

        // Every pair was formed against the first chunk, and merges keep
        // that position current, so everything still collapses into one.
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].qa_pairs.len(), 12);
    }
}
