//! Query-time retrieval: embed, search, threshold, rank, assemble.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::RetrievalConfig;
use crate::document::{Context, MetadataFilter, RetrievalResult};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;
use crate::vectorstore::{VectorStore, check_dimension};

/// Per-query overrides of the retrieval defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub score_threshold: Option<f32>,
    /// Only chunks whose metadata matches are considered.
    pub filter: Option<MetadataFilter>,
}

impl QueryOptions {
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }

    pub fn filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Finds the passages most relevant to a query.
///
/// Concurrent queries share only the read-only store and embedder handles.
#[derive(Clone)]
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
    retry: RetryPolicy,
}

impl RetrievalEngine {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DimensionMismatch`] if the embedder and store
    /// disagree on vector size.
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
        retry: RetryPolicy,
    ) -> Result<Self> {
        if embedder.dimensions() != store.dimensions() {
            return Err(RagError::DimensionMismatch {
                expected: store.dimensions(),
                actual: embedder.dimensions(),
            });
        }
        retry.validate()?;
        Ok(Self { embedder, store, config, retry })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `top_k` passages scoring at least `score_threshold`.
    pub async fn retrieve(&self, query: &str, top_k: usize, score_threshold: f32) -> Result<Context> {
        let options = QueryOptions::default().top_k(top_k).score_threshold(score_threshold);
        self.retrieve_with(query, &options).await
    }

    /// Retrieve with per-query options; unset fields use the engine defaults.
    ///
    /// No result above the threshold yields an empty [`Context`], not an
    /// error.
    ///
    /// # Errors
    ///
    /// - [`RagError::ConfigError`] if `top_k == 0`
    /// - [`RagError::DimensionMismatch`] if the embedder returns a vector of
    ///   the wrong size
    /// - [`RagError::RetrievalError`] if embedding or the index query fails
    pub async fn retrieve_with(&self, query: &str, options: &QueryOptions) -> Result<Context> {
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        let threshold = options.score_threshold.unwrap_or(self.config.score_threshold);

        let embedder = &self.embedder;
        let vector = self.retry.run("embed_query", || embedder.embed(query)).await.map_err(|e| {
            error!(provider = embedder.name(), error = %e, "query embedding failed");
            match e {
                RagError::DimensionMismatch { .. } => e,
                other => RagError::RetrievalError(format!("query embedding failed: {other}")),
            }
        })?;
        check_dimension(self.store.dimensions(), &vector)?;

        let store = &self.store;
        let filter = options.filter.as_ref();
        let hits = self
            .retry
            .run("vector_query", || store.query(&vector, top_k, filter))
            .await
            .map_err(|e| {
                error!(backend = store.name(), error = %e, "vector index query failed");
                match e {
                    RagError::DimensionMismatch { .. } => e,
                    other => RagError::RetrievalError(format!("index query failed: {other}")),
                }
            })?;
        let candidates = hits.len();

        let mut kept: Vec<_> = hits.into_iter().filter(|h| h.score >= threshold).collect();
        // Stable: equal scores keep the order the index returned.
        kept.sort_by(|a, b| b.score.total_cmp(&a.score));
        let ranked: Vec<RetrievalResult> = kept
            .into_iter()
            .enumerate()
            .map(|(i, hit)| RetrievalResult { chunk: hit.chunk, score: hit.score, rank: i + 1 })
            .collect();
        let above_threshold = ranked.len();

        let context = Context::assemble(ranked, self.config.context_budget);
        if context.is_empty() {
            debug!(candidates, threshold, "no passages above threshold");
        }
        info!(
            top_k,
            candidates,
            above_threshold,
            passages = context.len(),
            context_chars = context.size(),
            "retrieval completed"
        );
        Ok(context)
    }
}
