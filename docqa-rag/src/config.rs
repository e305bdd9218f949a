//! Configuration for ingestion, retrieval and answering.
//!
//! Every component takes its section of [`RagConfig`] explicitly at
//! construction time, so pipelines with different policies can share a process.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::generator::{EmptyContextPolicy, GeneratorConfig};
use crate::language::LanguageConfig;
use crate::retry::RetryPolicy;
use crate::source::SourceConfig;

/// Chunk window parameters, in characters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1024, chunk_overlap: 20 }
    }
}

/// Ingestion batching and concurrency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Chunks per embedding request.
    pub embed_batch_size: usize,
    /// Upper bound on concurrent embed/upsert calls.
    pub max_concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { embed_batch_size: 64, max_concurrency: 4 }
    }
}

/// Retrieval defaults.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of nearest neighbours requested from the index.
    pub top_k: usize,
    /// Results scoring below this are dropped.
    pub score_threshold: f32,
    /// Maximum assembled context size, in characters.
    pub context_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 5, score_threshold: 0.7, context_budget: 6000 }
    }
}

/// Configuration parameters for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub chunking: ChunkingConfig,
    pub ingest: IngestConfig,
    pub retrieval: RetrievalConfig,
    pub language: LanguageConfig,
    pub generator: GeneratorConfig,
    pub retry: RetryPolicy,
    pub source: SourceConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size == 0` or `chunk_overlap >= chunk_size`
    /// - `top_k == 0`
    /// - `score_threshold` is outside `[-1, 1]`
    /// - `context_budget < chunk_size` (a single chunk would never fit)
    /// - `generator.max_context_chars < chunk_size`
    /// - `embed_batch_size == 0` or `max_concurrency == 0`
    /// - any nested section is invalid
    pub fn validate(&self) -> Result<()> {
        let ChunkingConfig { chunk_size, chunk_overlap } = self.chunking;
        if chunk_size == 0 {
            return Err(RagError::ConfigError("chunk_size must be greater than zero".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.score_threshold) {
            return Err(RagError::ConfigError(format!(
                "score_threshold ({}) must be within [-1, 1]",
                self.retrieval.score_threshold
            )));
        }
        if self.retrieval.context_budget < chunk_size {
            return Err(RagError::ConfigError(format!(
                "context_budget ({}) must be at least chunk_size ({chunk_size})",
                self.retrieval.context_budget
            )));
        }
        if self.generator.max_context_chars < chunk_size {
            return Err(RagError::ConfigError(format!(
                "generator.max_context_chars ({}) must be at least chunk_size ({chunk_size})",
                self.generator.max_context_chars
            )));
        }
        if self.ingest.embed_batch_size == 0 {
            return Err(RagError::ConfigError("embed_batch_size must be greater than zero".into()));
        }
        if self.ingest.max_concurrency == 0 {
            return Err(RagError::ConfigError("max_concurrency must be greater than zero".into()));
        }
        self.language.validate()?;
        self.generator.validate()?;
        self.retry.validate()?;
        self.source.validate()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in characters.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in characters.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunking.chunk_overlap = overlap;
        self
    }

    /// Set the number of top results to request from vector search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retrieval.top_k = k;
        self
    }

    /// Set the minimum similarity score for retrieved passages.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.retrieval.score_threshold = threshold;
        self
    }

    /// Set the context size budget in characters.
    pub fn context_budget(mut self, budget: usize) -> Self {
        self.config.retrieval.context_budget = budget;
        self
    }

    pub fn embed_batch_size(mut self, size: usize) -> Self {
        self.config.ingest.embed_batch_size = size;
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.ingest.max_concurrency = limit;
        self
    }

    pub fn language(mut self, language: LanguageConfig) -> Self {
        self.config.language = language;
        self
    }

    pub fn empty_context_policy(mut self, policy: EmptyContextPolicy) -> Self {
        self.config.generator.empty_context = policy;
        self
    }

    pub fn generator(mut self, generator: GeneratorConfig) -> Self {
        self.config.generator = generator;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn source(mut self, source: SourceConfig) -> Self {
        self.config.source = source;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_rejects_overlap_not_below_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("chunk_overlap")));
    }

    #[test]
    fn builder_rejects_zero_top_k_and_small_budget() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().chunk_size(1000).context_budget(999).build().is_err());
        assert!(RagConfig::builder().max_concurrency(0).build().is_err());
    }

    #[test]
    fn builder_rejects_model_context_smaller_than_a_chunk() {
        let err = RagConfig::builder()
            .chunk_size(15_000)
            .context_budget(20_000)
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::ConfigError(msg) if msg.contains("max_context_chars")));

        let generator = GeneratorConfig { max_context_chars: 20_000, ..GeneratorConfig::default() };
        assert!(
            RagConfig::builder()
                .chunk_size(15_000)
                .context_budget(20_000)
                .generator(generator)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn partial_toml_like_json_fills_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"chunking": {"chunk_size": 500}, "retrieval": {"top_k": 3}}"#)
                .unwrap();
        assert_eq!(config.chunking.chunk_size, 500);
        assert_eq!(config.chunking.chunk_overlap, 20);
        assert_eq!(config.retrieval.top_k, 3);
        assert!(config.validate().is_ok());
    }
}
