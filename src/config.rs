//! Pipeline configuration.
//!
//! [`PipelineConfig`] carries the size bounds and batching knobs for a
//! pipeline instance. Values are resolved in the following order (later
//! wins):
//!
//! 1. Compiled defaults
//! 2. Builder overrides
//! 3. Environment variables (`DECKSMITH_*`, opt-in via
//!    [`PipelineConfigBuilder::with_env`])
//!
//! The builder validates the final set of values, so a constructed config
//! is always internally consistent.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bridge::ExecutionMode;

/// Segments shorter than this are excluded from extraction input.
pub const DEFAULT_MIN_CHUNK_SIZE: usize = 50;
/// Upper character bound for a chunk; merges that would exceed it are
/// rejected without a model call.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;
/// Segments (or pending merge pairs) grouped into one model call.
pub const DEFAULT_BATCH_SIZE: usize = 8;
/// Documents producing fewer chunks than this skip the merge phase.
pub const DEFAULT_SKIP_MERGE_THRESHOLD: usize = 10;

/// Errors raised while building a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric field was set to a value that makes no sense.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name as exposed on the builder.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment variable was present but could not be parsed.
    #[error("failed to parse environment variable {key}={value}: expected {expected}")]
    EnvParse {
        /// Variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// Expected type description.
        expected: &'static str,
    },
}

/// Tuning knobs for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum segment length (characters) admitted to extraction.
    pub min_chunk_size: usize,
    /// Maximum chunk length (characters) after merging.
    pub max_chunk_size: usize,
    /// Number of segments per extraction batch and pending pairs per merge
    /// batch.
    pub batch_size: usize,
    /// Below this many non-empty chunks the merge phase is skipped entirely.
    pub skip_merge_threshold: usize,
    /// How batches are scheduled against the model.
    pub mode: ExecutionMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            skip_merge_threshold: DEFAULT_SKIP_MERGE_THRESHOLD,
            mode: ExecutionMode::Sequential,
        }
    }
}

impl PipelineConfig {
    /// Start building a config from the compiled defaults.
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    base: PipelineConfig,
    use_env: bool,
}

impl PipelineConfigBuilder {
    /// Set the minimum admitted segment length.
    #[must_use]
    pub fn min_chunk_size(mut self, chars: usize) -> Self {
        self.base.min_chunk_size = chars;
        self
    }

    /// Set the maximum chunk length.
    #[must_use]
    pub fn max_chunk_size(mut self, chars: usize) -> Self {
        self.base.max_chunk_size = chars;
        self
    }

    /// Set the batch size for extraction and merge calls.
    #[must_use]
    pub fn batch_size(mut self, segments: usize) -> Self {
        self.base.batch_size = segments;
        self
    }

    /// Set the chunk-count threshold below which merging is skipped.
    #[must_use]
    pub fn skip_merge_threshold(mut self, chunks: usize) -> Self {
        self.base.skip_merge_threshold = chunks;
        self
    }

    /// Set the execution mode.
    #[must_use]
    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.base.mode = mode;
        self
    }

    /// Apply `DECKSMITH_*` environment overrides at build time.
    ///
    /// Recognized variables: `DECKSMITH_MIN_CHUNK_SIZE`,
    /// `DECKSMITH_MAX_CHUNK_SIZE`, `DECKSMITH_BATCH_SIZE`,
    /// `DECKSMITH_SKIP_MERGE_THRESHOLD`.
    #[must_use]
    pub fn with_env(mut self) -> Self {
        self.use_env = true;
        self
    }

    /// Validate and build the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a value is out of range, the size
    /// bounds are inverted, or an environment override fails to parse.
    pub fn build(mut self) -> Result<PipelineConfig, ConfigError> {
        if self.use_env {
            self.apply_env()?;
        }

        let cfg = &self.base;
        if cfg.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "batch_size",
                reason: "must be at least 1".into(),
            });
        }
        if cfg.max_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_chunk_size",
                reason: "must be at least 1".into(),
            });
        }
        if cfg.min_chunk_size >= cfg.max_chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "min_chunk_size",
                reason: format!(
                    "must be smaller than max_chunk_size ({} >= {})",
                    cfg.min_chunk_size, cfg.max_chunk_size
                ),
            });
        }
        if let ExecutionMode::Parallel { concurrency } = cfg.mode
            && concurrency == 0
        {
            return Err(ConfigError::InvalidValue {
                field: "mode",
                reason: "parallel concurrency must be at least 1".into(),
            });
        }

        Ok(self.base)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        fn read(key: &'static str, target: &mut usize) -> Result<(), ConfigError> {
            if let Ok(raw) = std::env::var(key) {
                *target = raw.parse().map_err(|_| ConfigError::EnvParse {
                    key,
                    value: raw,
                    expected: "unsigned integer",
                })?;
            }
            Ok(())
        }

        read("DECKSMITH_MIN_CHUNK_SIZE", &mut self.base.min_chunk_size)?;
        read("DECKSMITH_MAX_CHUNK_SIZE", &mut self.base.max_chunk_size)?;
        read("DECKSMITH_BATCH_SIZE", &mut self.base.batch_size)?;
        read(
            "DECKSMITH_SKIP_MERGE_THRESHOLD",
            &mut self.base.skip_merge_threshold,
        )?;
        Ok(())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::builder().build().unwrap();
        assert_eq!(cfg.min_chunk_size, DEFAULT_MIN_CHUNK_SIZE);
        assert_eq!(cfg.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.skip_merge_threshold, DEFAULT_SKIP_MERGE_THRESHOLD);
        assert_eq!(cfg.mode, ExecutionMode::Sequential);
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let err = PipelineConfig::builder()
            .min_chunk_size(500)
            .max_chunk_size(100)
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "min_chunk_size",
                ..
            }
        ));
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = PipelineConfig::builder().batch_size(0).build().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "batch_size",
                ..
            }
        ));
    }

    #[test]
    fn zero_parallel_concurrency_is_rejected() {
        let err = PipelineConfig::builder()
            .mode(ExecutionMode::Parallel { concurrency: 0 })
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "mode", .. }));
    }
}
