//! ```text
//! Raw text ──► segmenter ──► segments ──► BatchExtractor ─┬─► ResultCache
//!                                             │           ├─► GenerativeModel
//!                                             │           ├─► recovery (normalize,
//!                                             │           │   soft / aggressive repair)
//!                                             │           └─► validate
//!                                             ▼
//!                                   per-segment Chunks
//!                                             │
//!                      (chunk count ≥ threshold?) ──► MergePlanner ──► ChunkAssembler
//!                                             │
//!                                             ▼
//!                                   final Chunk sequence ──► flatten ──► FlashcardSink
//! ```
//!
//! # decksmith
//!
//! **Turn unstructured documents into validated flashcards through an
//! unreliable generative model.**
//!
//! The hard part of flashcard extraction is not prompting; it is
//! surviving the model. Responses arrive wrapped in markdown fences,
//! truncated by length limits, or malformed in creative ways, and losing a
//! whole document to one bad batch is unacceptable. decksmith structures
//! the work so every failure is contained:
//!
//! - Text is split into bounded segments and extracted in **batches**,
//!   one model call per batch, so a failure costs one batch, never the
//!   document.
//! - Responses pass through a **tolerant recovery parser** that strips
//!   wrappers, repairs truncated JSON, and falls back to salvaging the
//!   complete leading records.
//! - Candidate pairs are **validated** individually; rejects are counted
//!   and logged, never fatal.
//! - Adjacent chunks about the same topic are **merged** by a second round
//!   of batched model calls, with keep-separate as the failure-safe
//!   default.
//! - Extraction and merge decisions are **memoized** per pipeline
//!   instance, so repeated content never pays for a second call.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use decksmith::prelude::*;
//!
//! let pipeline = ExtractionPipeline::builder()
//!     .model(my_model)
//!     .config(PipelineConfig::builder().mode(ExecutionMode::parallel()).build()?)
//!     .build();
//!
//! let chunks = pipeline.chunk_file("notes.txt").await?;
//! let cards = decksmith::service::flatten_qa_pairs(&chunks);
//! ```
//!
//! ## Execution modes
//!
//! The same per-batch semantics run either sequentially (one batch in
//! flight, document order) or in parallel (all batches dispatched against
//! a bounded pool, results reassembled by index). See
//! [`bridge::ExecutionMode`].
//!
//! ## Error posture
//!
//! Only document-level problems surface as errors: an unreadable file,
//! bytes that are not UTF-8, or a document that yields zero valid cards.
//! Everything below that degrades output quality instead of failing; see
//! [`types::PipelineError`].

pub mod assembly;
pub mod bridge;
pub mod cache;
pub mod config;
pub mod extractor;
pub mod merge;
pub mod model;
mod prompts;
pub mod recovery;
pub mod segmenter;
pub mod service;
pub mod sink;
pub mod types;
pub mod validate;

/// Re-exports for convenient access to the core types.
pub mod prelude {
    pub use crate::bridge::{BlockingModel, ConcurrencyBridge, ExecutionMode, SyncModel};
    pub use crate::cache::{CacheStats, ResultCache};
    pub use crate::config::{PipelineConfig, PipelineConfigBuilder};
    pub use crate::model::{GenerativeModel, MockModel, ModelError, ModelResponse};
    pub use crate::service::{ExtractionPipeline, ExtractionPipelineBuilder, flatten_qa_pairs};
    pub use crate::sink::{DeckRequest, FlashcardSink, SinkError};
    pub use crate::types::{Chunk, MergeDecision, PipelineError, QaPair};
}
