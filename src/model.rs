//! The generative model boundary.
//!
//! The pipeline treats the text model as an opaque external capability with
//! a single contract: plain text in, plain text out. The one wrinkle is the
//! response shape — depending on the backend, `content` arrives either as a
//! plain string or as a sequence of typed blocks each exposing a `text`
//! field. That polymorphism is modeled as a tagged union
//! ([`ResponseContent`]) and resolved to plain text exactly once, at this
//! boundary, via [`ModelResponse::into_text`]. Nothing downstream ever
//! inspects the raw shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── ModelError ─────────────────────────────────────────────────────────

/// A failed model invocation.
///
/// These are transient, batch-scoped failures: the affected batch yields
/// empty results (or default no-merge decisions) and the error is logged,
/// never surfaced past the pipeline.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The backend call itself failed (network, process, API error).
    #[error("model backend call failed: {reason}")]
    Backend {
        /// Human-readable failure description.
        reason: String,
    },

    /// The externally enforced wait ceiling elapsed before a response
    /// arrived. Treated exactly like any other backend failure.
    #[error("model call exceeded the {waited_ms} ms wait ceiling")]
    TimedOut {
        /// How long the caller waited.
        waited_ms: u64,
    },
}

// ── Response shape ─────────────────────────────────────────────────────

/// The `content` field of a model response.
///
/// Deserializes from either a bare string or an array of blocks, matching
/// what common chat backends emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseContent {
    /// Plain string content.
    Text(String),
    /// A sequence of typed content blocks. Kept as raw JSON values so the
    /// string-form fallback below stays faithful to whatever the backend
    /// sent.
    Blocks(Vec<serde_json::Value>),
}

/// A response from the generative model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Polymorphic content payload.
    pub content: ResponseContent,
}

impl ModelResponse {
    /// Wrap a plain string response.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: ResponseContent::Text(content.into()),
        }
    }

    /// Wrap a block-sequence response.
    #[must_use]
    pub fn blocks(blocks: Vec<serde_json::Value>) -> Self {
        Self {
            content: ResponseContent::Blocks(blocks),
        }
    }

    /// Resolve the polymorphic content to plain text.
    ///
    /// For block sequences: the first block's `text` field if it has one,
    /// otherwise the block's string form. An empty sequence resolves to an
    /// empty string.
    #[must_use]
    pub fn into_text(self) -> String {
        match self.content {
            ResponseContent::Text(s) => s,
            ResponseContent::Blocks(blocks) => match blocks.into_iter().next() {
                Some(first) => match first.get("text").and_then(|t| t.as_str()) {
                    Some(text) => text.to_owned(),
                    None => first.to_string(),
                },
                None => String::new(),
            },
        }
    }
}

// ── GenerativeModel ────────────────────────────────────────────────────

/// The external generative text model.
///
/// Implementations wrap whatever backend serves the completions (a local
/// inference server, a remote API). No streaming and no structured
/// function-calling contract is required; the pipeline sends one prompt
/// and reads one response.
///
/// Implementations that block the calling thread should be wrapped in
/// [`BlockingModel`](crate::bridge::BlockingModel) so the call runs off
/// the cooperative scheduler.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Send one prompt and await the full response.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the backend call fails or times out.
    async fn invoke(&self, prompt: &str) -> Result<ModelResponse, ModelError>;
}

// ── MockModel ──────────────────────────────────────────────────────────

/// Deterministic model double for tests and offline runs.
///
/// Wraps a handler function from prompt to response, and counts
/// invocations so tests can assert how many calls a pipeline issued.
pub struct MockModel {
    handler: Box<dyn Fn(&str) -> Result<ModelResponse, ModelError> + Send + Sync>,
    calls: std::sync::atomic::AtomicUsize,
}

impl MockModel {
    /// Build a mock from a handler function.
    #[must_use]
    pub fn from_fn(
        handler: impl Fn(&str) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Build a mock that answers every prompt with the same text.
    #[must_use]
    pub fn fixed(response: impl Into<String>) -> Self {
        let response = response.into();
        Self::from_fn(move |_| Ok(ModelResponse::text(response.clone())))
    }

    /// Number of prompts this mock has received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

impl std::fmt::Debug for MockModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockModel")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl GenerativeModel for MockModel {
    async fn invoke(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        (self.handler)(prompt)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_content_passes_through() {
        let response = ModelResponse::text("hello");
        assert_eq!(response.into_text(), "hello");
    }

    #[test]
    fn first_block_text_field_wins() {
        let response = ModelResponse::blocks(vec![
            json!({"type": "text", "text": "first"}),
            json!({"type": "text", "text": "second"}),
        ]);
        assert_eq!(response.into_text(), "first");
    }

    #[test]
    fn block_without_text_field_falls_back_to_string_form() {
        let response = ModelResponse::blocks(vec![json!({"type": "image", "id": 7})]);
        let text = response.into_text();
        assert!(text.contains("image"));
        assert!(text.contains('7'));
    }

    #[test]
    fn empty_block_sequence_is_empty_text() {
        let response = ModelResponse::blocks(vec![]);
        assert_eq!(response.into_text(), "");
    }

    #[test]
    fn content_deserializes_from_both_shapes() {
        let plain: ModelResponse = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert_eq!(plain.into_text(), "hi");

        let blocks: ModelResponse =
            serde_json::from_str(r#"{"content": [{"text": "block hi"}]}"#).unwrap();
        assert_eq!(blocks.into_text(), "block hi");
    }

    #[tokio::test]
    async fn mock_counts_calls() {
        let mock = MockModel::fixed("pong");
        assert_eq!(mock.call_count(), 0);
        let _ = mock.invoke("ping").await.unwrap();
        let _ = mock.invoke("ping").await.unwrap();
        assert_eq!(mock.call_count(), 2);
    }
}
