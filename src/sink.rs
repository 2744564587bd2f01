//! The persistence collaborator seam.
//!
//! The pipeline does not know how flashcards are stored. It hands the
//! final flattened QA pair list, plus deck and user identifiers, to
//! whatever implements [`FlashcardSink`]; schema and storage technology
//! are entirely the collaborator's business.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::QaPair;

/// Identifies the deck a batch of cards belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckRequest {
    /// Display name for the new deck.
    pub deck_name: String,
    /// Owner of the deck.
    pub user_id: String,
}

impl DeckRequest {
    /// Convenience constructor.
    #[must_use]
    pub fn new(deck_name: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            deck_name: deck_name.into(),
            user_id: user_id.into(),
        }
    }
}

/// An error reported by the persistence collaborator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SinkError {
    /// Build an error from a message alone.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Build an error wrapping an underlying cause.
    #[must_use]
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Receives extracted flashcards for storage.
#[async_trait]
pub trait FlashcardSink: Send + Sync {
    /// Persist `cards` as a new deck.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the deck could not be stored; the
    /// pipeline surfaces it as a fatal error for the request.
    async fn store_deck(&self, deck: &DeckRequest, cards: &[QaPair]) -> Result<(), SinkError>;
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_error_carries_its_source() {
        let io = std::io::Error::other("disk full");
        let err = SinkError::with_source("insert failed", io);
        assert_eq!(err.to_string(), "insert failed");
        assert!(std::error::Error::source(&err).is_some());
    }
}
