//! The extraction pipeline service.
//!
//! [`ExtractionPipeline`] wires the stages together and owns everything
//! with a lifetime: the model handle, both result caches, and the batch
//! bridge. One instance is meant to serve many documents; its caches keep
//! repeated content from re-invoking the model across calls.
//!
//! Entry points, from low to high level:
//!
//! - [`chunk_segments`](ExtractionPipeline::chunk_segments): pre-split input
//! - [`chunk_text`](ExtractionPipeline::chunk_text): raw text
//! - [`chunk_bytes`](ExtractionPipeline::chunk_bytes): UTF-8 bytes (decode
//!   failure is fatal)
//! - [`chunk_file`](ExtractionPipeline::chunk_file): a text file on disk
//! - [`extract_cards`](ExtractionPipeline::extract_cards): text to a flat
//!   card list (zero cards is fatal)
//! - [`build_deck`](ExtractionPipeline::build_deck): text to a stored deck
//!   via a [`FlashcardSink`]

use std::path::Path;
use std::sync::Arc;

use crate::assembly::ChunkAssembler;
use crate::bridge::ConcurrencyBridge;
use crate::cache::{CacheStats, ResultCache};
use crate::config::PipelineConfig;
use crate::extractor::BatchExtractor;
use crate::merge::MergePlanner;
use crate::model::GenerativeModel;
use crate::segmenter;
use crate::sink::{DeckRequest, FlashcardSink};
use crate::types::{Chunk, MergeDecision, PipelineError, QaPair};

/// Document-to-flashcards extraction pipeline.
pub struct ExtractionPipeline {
    config: PipelineConfig,
    model: Arc<dyn GenerativeModel>,
    qa_cache: Arc<ResultCache<Vec<QaPair>>>,
    merge_cache: Arc<ResultCache<MergeDecision>>,
    bridge: ConcurrencyBridge,
}

impl ExtractionPipeline {
    /// Build a pipeline over a model with the given configuration.
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>, config: PipelineConfig) -> Self {
        let bridge = ConcurrencyBridge::new(config.mode);
        Self {
            config,
            model,
            qa_cache: Arc::new(ResultCache::new()),
            merge_cache: Arc::new(ResultCache::new()),
            bridge,
        }
    }

    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> ExtractionPipelineBuilder {
        ExtractionPipelineBuilder::default()
    }

    /// The configuration this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Chunk raw text into flashcard-ready chunks.
    ///
    /// Transient failures (model calls, unparseable responses) degrade the
    /// output instead of failing it, so this entry point is infallible: a
    /// document that yields nothing returns an empty vector.
    pub async fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        let segments = segmenter::segment(text, self.config.max_chunk_size);
        self.chunk_segments(segments).await
    }

    /// Chunk UTF-8 bytes, typically an uploaded file body.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidUtf8`] when the bytes do not decode;
    /// that is fatal for the request.
    pub async fn chunk_bytes(&self, bytes: &[u8]) -> Result<Vec<Chunk>, PipelineError> {
        let text = String::from_utf8(bytes.to_vec())
            .map_err(|source| PipelineError::InvalidUtf8 { source })?;
        Ok(self.chunk_text(&text).await)
    }

    /// Chunk a text file from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::FileRead`] when the file cannot be read and
    /// [`PipelineError::InvalidUtf8`] when it is not UTF-8 text.
    pub async fn chunk_file(&self, path: impl AsRef<Path>) -> Result<Vec<Chunk>, PipelineError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| PipelineError::FileRead {
                path: path.to_owned(),
                source,
            })?;
        self.chunk_bytes(&bytes).await
    }

    /// Process pre-split segments into the final chunk sequence.
    ///
    /// Segments below the configured minimum size are excluded up front.
    /// Extraction runs in batches under the configured execution mode; the
    /// merge phase starts only after every extraction batch has completed.
    pub async fn chunk_segments(&self, segments: Vec<String>) -> Vec<Chunk> {
        let total = segments.len();
        let valid: Vec<String> = segments
            .into_iter()
            .filter(|segment| segment.chars().count() >= self.config.min_chunk_size)
            .collect();

        if valid.is_empty() {
            tracing::info!(total, "no segments meet the minimum size, nothing to extract");
            return Vec::new();
        }
        tracing::info!(
            segments = valid.len(),
            skipped = total - valid.len(),
            batch_size = self.config.batch_size,
            "starting extraction"
        );

        let extractor = BatchExtractor::new(Arc::clone(&self.model), Arc::clone(&self.qa_cache));
        let batches: Vec<&[String]> = valid.chunks(self.config.batch_size).collect();
        let futures: Vec<_> = batches
            .iter()
            .map(|batch| extractor.extract_batch(batch))
            .collect();
        let per_batch = self.bridge.run_all(futures).await;
        let per_segment: Vec<Vec<QaPair>> = per_batch.into_iter().flatten().collect();

        // Segments that produced nothing are dropped here; order of the
        // survivors still matches document order.
        let chunks: Vec<Chunk> = valid
            .into_iter()
            .zip(per_segment)
            .filter(|(_, pairs)| !pairs.is_empty())
            .map(|(segment, pairs)| Chunk::from_segment(segment, pairs))
            .collect();

        if chunks.is_empty() {
            tracing::warn!("extraction produced no chunks with valid QA pairs");
            return chunks;
        }

        let planner = MergePlanner::new(
            Arc::clone(&self.model),
            Arc::clone(&self.merge_cache),
            self.config.max_chunk_size,
        );
        let assembler = ChunkAssembler::new(
            planner,
            self.bridge.clone(),
            self.config.batch_size,
            self.config.skip_merge_threshold,
        );
        assembler.assemble(chunks).await
    }

    /// Extract a flat flashcard list from raw text.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NoCards`] when the whole document yields
    /// zero valid pairs; partial extraction is not an error.
    pub async fn extract_cards(&self, text: &str) -> Result<Vec<QaPair>, PipelineError> {
        let chunks = self.chunk_text(text).await;
        let cards = flatten_qa_pairs(&chunks);
        if cards.is_empty() {
            return Err(PipelineError::NoCards);
        }
        Ok(cards)
    }

    /// Extract flashcards from text and hand them to the persistence
    /// collaborator as a new deck. Returns the stored cards.
    ///
    /// # Errors
    ///
    /// Propagates extraction failures ([`PipelineError::NoCards`]) and
    /// wraps sink failures in [`PipelineError::Sink`].
    pub async fn build_deck(
        &self,
        text: &str,
        deck: &DeckRequest,
        sink: &dyn FlashcardSink,
    ) -> Result<Vec<QaPair>, PipelineError> {
        let cards = self.extract_cards(text).await?;
        sink.store_deck(deck, &cards)
            .await
            .map_err(|source| PipelineError::Sink {
                deck_name: deck.deck_name.clone(),
                source,
            })?;
        tracing::info!(
            deck = %deck.deck_name,
            cards = cards.len(),
            "deck stored"
        );
        Ok(cards)
    }

    /// Usage snapshot of both memo caches.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        CacheStats {
            qa_entries: self.qa_cache.len(),
            merge_entries: self.merge_cache.len(),
        }
    }

    /// Drop every memoized extraction result and merge decision.
    pub fn clear_caches(&self) {
        self.qa_cache.clear();
        self.merge_cache.clear();
        tracing::debug!("pipeline caches cleared");
    }
}

/// Flatten the QA pairs of every chunk into one ordered list.
#[must_use]
pub fn flatten_qa_pairs(chunks: &[Chunk]) -> Vec<QaPair> {
    chunks
        .iter()
        .flat_map(|chunk| chunk.qa_pairs.iter().cloned())
        .collect()
}

// ── ExtractionPipelineBuilder ──────────────────────────────────────────

/// Builder for [`ExtractionPipeline`].
#[derive(Default)]
pub struct ExtractionPipelineBuilder {
    model: Option<Arc<dyn GenerativeModel>>,
    config: Option<PipelineConfig>,
}

impl ExtractionPipelineBuilder {
    /// Set the generative model (required).
    #[must_use]
    pub fn model(mut self, model: impl GenerativeModel + 'static) -> Self {
        self.model = Some(Arc::new(model));
        self
    }

    /// Set the model from an existing handle, sharing it with other
    /// components.
    #[must_use]
    pub fn model_arc(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Override the default configuration.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the pipeline.
    ///
    /// # Panics
    ///
    /// Panics if [`model()`](Self::model) was not called.
    #[must_use]
    pub fn build(self) -> ExtractionPipeline {
        ExtractionPipeline::new(
            self.model
                .expect("ExtractionPipelineBuilder requires a model"),
            self.config.unwrap_or_default(),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MockModel;
    use crate::types::QaPair;

    #[test]
    fn flatten_preserves_chunk_order() {
        let chunks = vec![
            Chunk::from_segment(
                "first",
                vec![
                    QaPair::new("What is one?", "The first."),
                    QaPair::new("What is two?", "The second."),
                ],
            ),
            Chunk::from_segment("second", vec![QaPair::new("What is three?", "The third.")]),
        ];

        let flat = flatten_qa_pairs(&chunks);
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[2].question, "What is three?");
    }

    #[tokio::test]
    async fn empty_text_yields_no_chunks() {
        let pipeline = ExtractionPipeline::builder()
            .model(MockModel::fixed("unused"))
            .build();
        assert!(pipeline.chunk_text("").await.is_empty());
        assert!(pipeline.chunk_text("   \n\n  ").await.is_empty());
    }

    #[tokio::test]
    async fn undersized_segments_never_reach_the_model() {
        let model = std::sync::Arc::new(MockModel::fixed("unused"));
        let pipeline = ExtractionPipeline::builder()
            .model_arc(model.clone() as Arc<dyn GenerativeModel>)
            .build();

        let chunks = pipeline.chunk_text("Too short.").await;
        assert!(chunks.is_empty());
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn extract_cards_fails_on_empty_yield() {
        let pipeline = ExtractionPipeline::builder()
            .model(MockModel::fixed(r#"{"segments": []}"#))
            .build();

        let text = "A paragraph that is comfortably longer than the minimum segment size bound.";
        let err = pipeline.extract_cards(text).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoCards));
    }
}
