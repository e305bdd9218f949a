//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{EmbeddedChunk, MetadataFilter, ScoredChunk};
use crate::error::{RagError, Result};

/// Summary statistics about an index.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub total_vectors: usize,
    pub dimension: usize,
}

/// A vector index with a fixed dimension and cosine similarity search.
///
/// Implementations store [`EmbeddedChunk`]s keyed by [`Chunk::id`](crate::Chunk::id)
/// with insert-or-overwrite semantics. Writes or queries whose vector length
/// differs from [`dimensions`](VectorStore::dimensions) fail with
/// [`RagError::DimensionMismatch`].
///
/// # Example
///
/// ```rust,ignore
/// use docqa_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(384);
/// store.upsert(&embedded).await?;
/// let hits = store.query(&query_embedding, 5, None).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The dimension fixed when the index was created.
    fn dimensions(&self) -> usize;

    /// Insert or overwrite chunks by id.
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Return up to `top_k` chunks ordered by descending cosine similarity.
    ///
    /// Chunks with equal scores are returned in insertion order.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<ScoredChunk>>;

    /// Delete chunks by id. Unknown ids are ignored.
    async fn delete(&self, ids: &[&str]) -> Result<()>;

    /// Ids of every stored chunk that belongs to `document_id`.
    async fn chunk_ids(&self, document_id: &str) -> Result<Vec<String>>;

    /// Vector count and dimension.
    async fn stats(&self) -> Result<IndexStats>;

    /// A short backend name used in logs and errors.
    fn name(&self) -> &str {
        "vector_store"
    }
}

/// Fail with [`RagError::DimensionMismatch`] unless `vector` has `expected` entries.
pub fn check_dimension(expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(RagError::DimensionMismatch { expected, actual: vector.len() });
    }
    Ok(())
}
